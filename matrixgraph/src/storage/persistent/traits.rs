// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Key/value store trait
//!
//! Serialized graphs are written as a set of byte blobs under string keys.
//! Anything able to hold those blobs can back persistence.

use crate::storage::types::StorageError;

pub type StorageResult<T> = Result<T, StorageError>;

/// Byte store addressed by string keys
pub trait KeyValueStore: Send + Sync {
    /// Insert or overwrite a key
    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Get a value by key
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Remove a key; removing a missing key is not an error
    fn delete(&self, key: &str) -> StorageResult<()>;

    /// Every key currently stored, sorted
    fn keys(&self) -> StorageResult<Vec<String>>;

    fn contains(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Make previous writes durable
    fn flush(&self) -> StorageResult<()> {
        Ok(())
    }
}
