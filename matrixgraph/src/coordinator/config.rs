// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Server configuration
//!
//! Every field is addressable by its upper-case key through `CONFIG GET`
//! and `CONFIG SET`. `THREAD_COUNT`, `NODE_CREATION_BUFFER` and
//! `CACHE_SIZE` are fixed once the server starts.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::DEFAULT_PLAN_CACHE_SIZE;
use crate::exec::ExecutionError;
use crate::storage::DEFAULT_NODE_CREATION_BUFFER;

/// Smallest accepted node creation buffer
pub const MIN_NODE_CREATION_BUFFER: u64 = 128;

pub const DEFAULT_VKEY_MAX_ENTITY_COUNT: u64 = 100_000;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Unknown configuration field '{0}'")]
    UnknownKey(String),

    #[error("Failed to set config value {key} to {value}")]
    InvalidValue { key: String, value: String },

    #[error("Field '{0}' can not be set at runtime")]
    NotRuntime(String),

    #[error("Missing value for configuration field '{0}'")]
    MissingValue(String),
}

impl From<ConfigError> for ExecutionError {
    fn from(e: ConfigError) -> Self {
        ExecutionError::Config(e.to_string())
    }
}

/// Recognized keys, in `CONFIG GET *` order
pub const CONFIG_KEYS: [&str; 7] = [
    "CACHE_SIZE",
    "MAX_QUEUED_QUERIES",
    "NODE_CREATION_BUFFER",
    "QUERY_MEM_CAPACITY",
    "THREAD_COUNT",
    "TIMEOUT",
    "VKEY_MAX_ENTITY_COUNT",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Config {
    /// Query worker threads
    pub thread_count: u64,
    /// Admission cap; submissions over it fail with `QueueFull`
    pub max_queued_queries: u64,
    /// Per-query memory cap in bytes, 0 is unlimited
    pub query_mem_capacity: u64,
    /// Growth step for entity storage and matrices
    pub node_creation_buffer: u64,
    /// Entities per persisted chunk
    pub vkey_max_entity_count: u64,
    /// Default read-query timeout in milliseconds, 0 is none
    pub timeout: u64,
    /// Plans cached per graph
    pub cache_size: u64,
}

impl Default for Config {
    fn default() -> Self {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get() as u64)
            .unwrap_or(1);
        Self {
            thread_count: threads,
            max_queued_queries: u64::MAX,
            query_mem_capacity: 0,
            node_creation_buffer: DEFAULT_NODE_CREATION_BUFFER,
            vkey_max_entity_count: DEFAULT_VKEY_MAX_ENTITY_COUNT,
            timeout: 0,
            cache_size: DEFAULT_PLAN_CACHE_SIZE as u64,
        }
    }
}

impl Config {
    /// Build a configuration from load arguments: `KEY value` pairs.
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Result<Self, ConfigError> {
        let mut config = Config::default();
        let mut args = args.iter().map(AsRef::as_ref);
        while let Some(key) = args.next() {
            let value = args
                .next()
                .ok_or_else(|| ConfigError::MissingValue(key.to_string()))?;
            config.apply(key, value)?;
        }
        Ok(config)
    }

    /// Current value of `key`
    pub fn get(&self, key: &str) -> Result<u64, ConfigError> {
        let value = match normalize(key).as_str() {
            "THREAD_COUNT" => self.thread_count,
            "MAX_QUEUED_QUERIES" => self.max_queued_queries,
            "QUERY_MEM_CAPACITY" => self.query_mem_capacity,
            "NODE_CREATION_BUFFER" => self.node_creation_buffer,
            "VKEY_MAX_ENTITY_COUNT" => self.vkey_max_entity_count,
            "TIMEOUT" => self.timeout,
            "CACHE_SIZE" => self.cache_size,
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        };
        Ok(value)
    }

    /// Every `(key, value)` pair
    pub fn entries(&self) -> Vec<(String, u64)> {
        CONFIG_KEYS
            .iter()
            .filter_map(|k| self.get(k).ok().map(|v| (k.to_string(), v)))
            .collect()
    }

    /// Runtime update through `CONFIG SET`
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let name = normalize(key);
        if matches!(
            name.as_str(),
            "THREAD_COUNT" | "NODE_CREATION_BUFFER" | "CACHE_SIZE"
        ) {
            return Err(ConfigError::NotRuntime(name));
        }
        self.apply(key, value)?;
        log::info!("config {} set to {}", name, value);
        Ok(())
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let name = normalize(key);
        let invalid = || ConfigError::InvalidValue {
            key: name.clone(),
            value: value.to_string(),
        };
        // negative values mean "no limit" for the admission cap
        let parsed: u64 = match value.trim().parse::<i64>() {
            Ok(n) if n < 0 && name == "MAX_QUEUED_QUERIES" => u64::MAX,
            Ok(n) if n < 0 => return Err(invalid()),
            Ok(n) => n as u64,
            Err(_) => value.trim().parse::<u64>().map_err(|_| invalid())?,
        };
        match name.as_str() {
            "THREAD_COUNT" => {
                if parsed == 0 {
                    return Err(invalid());
                }
                self.thread_count = parsed;
            }
            "MAX_QUEUED_QUERIES" => self.max_queued_queries = parsed,
            "QUERY_MEM_CAPACITY" => self.query_mem_capacity = parsed,
            "NODE_CREATION_BUFFER" => {
                self.node_creation_buffer = parsed
                    .max(MIN_NODE_CREATION_BUFFER)
                    .checked_next_power_of_two()
                    .ok_or_else(invalid)?;
            }
            "VKEY_MAX_ENTITY_COUNT" => {
                if parsed == 0 {
                    return Err(invalid());
                }
                self.vkey_max_entity_count = parsed;
            }
            "TIMEOUT" => self.timeout = parsed,
            "CACHE_SIZE" => {
                if parsed == 0 {
                    return Err(invalid());
                }
                self.cache_size = parsed;
            }
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }
}

fn normalize(key: &str) -> String {
    key.trim().to_ascii_uppercase()
}
