// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Entity records, identifier types and error types for the graph store

use crate::storage::value::Value;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type NodeId = u64;
pub type EdgeId = u64;
pub type LabelId = u32;
pub type RelationId = u32;
pub type AttributeId = u32;

/// Largest entity identifier the store hands out
pub const MAX_ENTITY_ID: u64 = (1 << 48) - 1;

/// Largest schema identifier (labels, relation types, attributes)
pub const MAX_SCHEMA_ID: u32 = u16::MAX as u32;

/// Error types for graph operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Edge not found: {0}")]
    EdgeNotFound(EdgeId),

    #[error("Invalid edge: from node {src} to node {dst} - one or both nodes don't exist")]
    InvalidEdge { src: NodeId, dst: NodeId },

    #[error("Schema is full: {0}")]
    SchemaFull(String),

    #[error("Property values can only be of primitive types or arrays of primitive types, got {0}")]
    InvalidPropertyValue(String),
}

/// Error types for storage operations (graph store, indexes, persistence)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("{0}")]
    Graph(#[from] GraphError),

    #[error("Graph not found: {0}")]
    GraphNotFound(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupted virtual key {key}: {reason}")]
    Corrupted { key: String, reason: String },

    #[error("Unsupported encoding version {0}")]
    UnsupportedVersion(u8),

    #[error("{0}")]
    Index(#[from] crate::storage::indexes::IndexError),

    #[error("{0}")]
    ConstraintViolation(String),

    #[error("Invalid constraint: {0}")]
    InvalidConstraint(String),
}

/// Properties stored on an entity, keyed by interned attribute id.
///
/// Kept as an insertion-ordered vector; entities rarely carry more than a
/// handful of keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyMap {
    entries: Vec<(AttributeId, Value)>,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, attr: AttributeId) -> Option<&Value> {
        self.entries.iter().find(|(a, _)| *a == attr).map(|(_, v)| v)
    }

    /// Set `attr` to `value`. Null removes the key. Returns the previous value.
    pub fn set(&mut self, attr: AttributeId, value: Value) -> Option<Value> {
        let pos = self.entries.iter().position(|(a, _)| *a == attr);
        match (pos, value) {
            (Some(i), Value::Null) => Some(self.entries.remove(i).1),
            (Some(i), v) => Some(std::mem::replace(&mut self.entries[i].1, v)),
            (None, Value::Null) => None,
            (None, v) => {
                self.entries.push((attr, v));
                None
            }
        }
    }

    pub fn remove(&mut self, attr: AttributeId) -> Option<Value> {
        self.set(attr, Value::Null)
    }

    pub fn iter(&self) -> impl Iterator<Item = (AttributeId, &Value)> {
        self.entries.iter().map(|(a, v)| (*a, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = AttributeId> + '_ {
        self.entries.iter().map(|(a, _)| *a)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) -> Vec<(AttributeId, Value)> {
        std::mem::take(&mut self.entries)
    }
}

/// Stored node payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub labels: Vec<LabelId>,
    pub properties: PropertyMap,
}

impl NodeRecord {
    pub fn has_label(&self, label: LabelId) -> bool {
        self.labels.contains(&label)
    }
}

/// Stored edge payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub relation: RelationId,
    pub src: NodeId,
    pub dst: NodeId,
    pub properties: PropertyMap,
}

/// Entity kind, shared by indexes and constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Node,
    Edge,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Node => "NODE",
            EntityKind::Edge => "RELATIONSHIP",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_map_null_removes() {
        let mut props = PropertyMap::new();
        assert_eq!(props.set(1, Value::Integer(5)), None);
        assert_eq!(props.set(1, Value::Integer(6)), Some(Value::Integer(5)));
        assert_eq!(props.set(1, Value::Null), Some(Value::Integer(6)));
        assert!(props.is_empty());
        assert_eq!(props.set(2, Value::Null), None);
        assert!(props.is_empty());
    }

    #[test]
    fn test_property_map_keeps_insertion_order() {
        let mut props = PropertyMap::new();
        props.set(3, Value::Integer(1));
        props.set(1, Value::Integer(2));
        let keys: Vec<AttributeId> = props.keys().collect();
        assert_eq!(keys, vec![3, 1]);
    }
}
