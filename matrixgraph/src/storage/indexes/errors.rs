// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Error types for the indexing system

use thiserror::Error;

/// Errors that can occur during index operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexError {
    #[error("Attribute '{0}' is already indexed")]
    AlreadyExists(String),

    #[error("Unable to drop index on {0}: no such index.")]
    NotFound(String),

    #[error("Invalid index configuration: {0}")]
    InvalidConfiguration(String),
}

impl IndexError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfiguration(msg.into())
    }
}
