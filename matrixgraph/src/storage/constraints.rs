// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Unique and mandatory property constraints

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::storage::types::{AttributeId, EntityKind, LabelId, PropertyMap};
use crate::storage::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintKind {
    Unique,
    Mandatory,
}

impl ConstraintKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstraintKind::Unique => "UNIQUE",
            ConstraintKind::Mandatory => "MANDATORY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintStatus {
    Operational,
    Failed,
}

impl fmt::Display for ConstraintStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintStatus::Operational => write!(f, "OPERATIONAL"),
            ConstraintStatus::Failed => write!(f, "FAILED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintDefinition {
    pub kind: ConstraintKind,
    pub entity: EntityKind,
    pub label: String,
    pub properties: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Constraint {
    pub definition: ConstraintDefinition,
    pub label_id: LabelId,
    pub attributes: Vec<AttributeId>,
    pub status: ConstraintStatus,
}

impl Constraint {
    /// Values of the constrained attributes; `None` when any is missing.
    pub fn key(&self, properties: &PropertyMap) -> Option<Vec<Value>> {
        self.attributes
            .iter()
            .map(|a| properties.get(*a).cloned())
            .collect()
    }

    /// Message for an entity breaking this constraint
    pub fn violation(&self) -> String {
        let entity = match self.definition.entity {
            EntityKind::Node => "node with label",
            EntityKind::Edge => "relationship with type",
        };
        match self.definition.kind {
            ConstraintKind::Unique => format!(
                "unique constraint violation on {} {}",
                entity, self.definition.label
            ),
            ConstraintKind::Mandatory => format!(
                "mandatory constraint violation: {} {} missing property {}",
                entity,
                self.definition.label,
                self.definition.properties.join(", ")
            ),
        }
    }
}
