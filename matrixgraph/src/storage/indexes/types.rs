// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Type definitions for the indexing system

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::storage::types::EntityKind;

/// Index type enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum IndexKind {
    Exact,
    FullText,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Exact => "exact-match",
            IndexKind::FullText => "full-text",
        }
    }
}

/// Population state of an index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    UnderConstruction,
    Operational,
}

impl fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexStatus::UnderConstruction => write!(f, "UNDER CONSTRUCTION"),
            IndexStatus::Operational => write!(f, "OPERATIONAL"),
        }
    }
}

/// Weighted field of a full-text index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FullTextField {
    pub name: String,
    pub weight: f64,
}

/// Analyzer settings of a full-text index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FullTextConfig {
    pub language: String,
    /// User stopwords; replaces the language list when present
    pub stopwords: Option<Vec<String>>,
    pub fields: Vec<FullTextField>,
}

impl Default for FullTextConfig {
    fn default() -> Self {
        Self {
            language: "english".to_string(),
            stopwords: None,
            fields: Vec::new(),
        }
    }
}

/// Persistent description of an index; enough to rebuild it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexDefinition {
    pub kind: IndexKind,
    pub entity: EntityKind,
    /// Label or relation-type name
    pub label: String,
    pub properties: Vec<String>,
    pub fulltext: Option<FullTextConfig>,
}

impl IndexDefinition {
    pub fn exact(entity: EntityKind, label: &str, properties: Vec<String>) -> Self {
        Self {
            kind: IndexKind::Exact,
            entity,
            label: label.to_string(),
            properties,
            fulltext: None,
        }
    }

    pub fn fulltext(label: &str, config: FullTextConfig) -> Self {
        Self {
            kind: IndexKind::FullText,
            entity: EntityKind::Node,
            label: label.to_string(),
            properties: config.fields.iter().map(|f| f.name.clone()).collect(),
            fulltext: Some(config),
        }
    }

    /// `:Label(p, q)` rendering used in messages
    pub fn describe(&self) -> String {
        format!(":{}({})", self.label, self.properties.join(", "))
    }
}

/// Status flag and cancellation token shared with the population task
#[derive(Debug)]
pub struct IndexState {
    status: AtomicU8,
    cancelled: AtomicBool,
}

impl Default for IndexState {
    fn default() -> Self {
        Self {
            status: AtomicU8::new(0),
            cancelled: AtomicBool::new(false),
        }
    }
}

impl IndexState {
    pub fn status(&self) -> IndexStatus {
        match self.status.load(Ordering::Acquire) {
            0 => IndexStatus::UnderConstruction,
            _ => IndexStatus::Operational,
        }
    }

    pub fn mark_operational(&self) {
        self.status.store(1, Ordering::Release);
    }

    pub fn is_operational(&self) -> bool {
        self.status() == IndexStatus::Operational
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
