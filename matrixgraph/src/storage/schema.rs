// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Schema & attribute registry
//!
//! Interns label, relation-type and property-key names to dense ids assigned
//! in insertion order. Names are never removed, so an id keeps its meaning
//! for the lifetime of the graph. Every new name bumps the graph signature.

use std::collections::HashMap;

use crate::storage::types::{AttributeId, GraphError, LabelId, RelationId, MAX_SCHEMA_ID};

/// Bidirectional name ⇄ id map
#[derive(Debug, Clone, Default)]
pub struct NameRegistry {
    names: Vec<String>,
    ids: HashMap<String, u32>,
}

impl NameRegistry {
    pub fn from_names(names: Vec<String>) -> Self {
        let ids = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i as u32))
            .collect();
        Self { names, ids }
    }

    /// Returns the id and whether the name was newly added.
    pub fn intern(&mut self, name: &str) -> Result<(u32, bool), GraphError> {
        if let Some(&id) = self.ids.get(name) {
            return Ok((id, false));
        }
        let id = self.names.len() as u32;
        if id > MAX_SCHEMA_ID {
            return Err(GraphError::SchemaFull(format!(
                "cannot register '{}': id space exhausted",
                name
            )));
        }
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        Ok((id, true))
    }

    pub fn id(&self, name: &str) -> Option<u32> {
        self.ids.get(name).copied()
    }

    pub fn name(&self, id: u32) -> Option<&str> {
        self.names.get(id as usize).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Per-graph schema: labels, relation types and attribute keys
#[derive(Debug, Clone, Default)]
pub struct Schema {
    labels: NameRegistry,
    relations: NameRegistry,
    attributes: NameRegistry,
    version: u64,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn restore(labels: Vec<String>, relations: Vec<String>, attributes: Vec<String>) -> Self {
        let version = (labels.len() + relations.len() + attributes.len()) as u64;
        Self {
            labels: NameRegistry::from_names(labels),
            relations: NameRegistry::from_names(relations),
            attributes: NameRegistry::from_names(attributes),
            version,
        }
    }

    fn bump(&mut self, added: bool) {
        if added {
            self.version += 1;
        }
    }

    pub fn intern_label(&mut self, name: &str) -> Result<LabelId, GraphError> {
        let (id, added) = self.labels.intern(name)?;
        self.bump(added);
        Ok(id)
    }

    pub fn intern_relation(&mut self, name: &str) -> Result<RelationId, GraphError> {
        let (id, added) = self.relations.intern(name)?;
        self.bump(added);
        Ok(id)
    }

    pub fn intern_attribute(&mut self, name: &str) -> Result<AttributeId, GraphError> {
        let (id, added) = self.attributes.intern(name)?;
        self.bump(added);
        Ok(id)
    }

    pub fn label_id(&self, name: &str) -> Option<LabelId> {
        self.labels.id(name)
    }

    pub fn relation_id(&self, name: &str) -> Option<RelationId> {
        self.relations.id(name)
    }

    pub fn attribute_id(&self, name: &str) -> Option<AttributeId> {
        self.attributes.id(name)
    }

    pub fn label_name(&self, id: LabelId) -> Option<&str> {
        self.labels.name(id)
    }

    pub fn relation_name(&self, id: RelationId) -> Option<&str> {
        self.relations.name(id)
    }

    pub fn attribute_name(&self, id: AttributeId) -> Option<&str> {
        self.attributes.name(id)
    }

    pub fn labels(&self) -> &[String] {
        self.labels.names()
    }

    pub fn relations(&self) -> &[String] {
        self.relations.names()
    }

    pub fn attributes(&self) -> &[String] {
        self.attributes.names()
    }

    /// Graph signature: strictly increases whenever a name is added.
    pub fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_is_idempotent_and_dense() {
        let mut schema = Schema::new();
        assert_eq!(schema.intern_label("Person").unwrap(), 0);
        assert_eq!(schema.intern_label("City").unwrap(), 1);
        assert_eq!(schema.intern_label("Person").unwrap(), 0);
        assert_eq!(schema.label_name(1), Some("City"));
        assert_eq!(schema.label_id("Nope"), None);
    }

    #[test]
    fn test_signature_bumps_only_on_new_names() {
        let mut schema = Schema::new();
        let v0 = schema.version();
        schema.intern_attribute("name").unwrap();
        let v1 = schema.version();
        schema.intern_attribute("name").unwrap();
        assert!(v1 > v0);
        assert_eq!(schema.version(), v1);
        schema.intern_relation("KNOWS").unwrap();
        assert!(schema.version() > v1);
    }

    #[test]
    fn test_namespaces_are_independent() {
        let mut schema = Schema::new();
        schema.intern_label("x").unwrap();
        assert_eq!(schema.intern_relation("x").unwrap(), 0);
        assert_eq!(schema.intern_attribute("x").unwrap(), 0);
    }
}
