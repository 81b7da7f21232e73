// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! MatrixGraph - an in-memory property graph engine
//!
//! Graphs are stored as entity tables plus sparse boolean matrix views
//! (adjacency, one matrix per label, one per relationship type) and are
//! queried with a Cypher dialect.
//!
//! # Usage
//!
//! ```ignore
//! use matrixgraph::{Config, GraphServer, QueryMode, QueryOptions};
//!
//! let server = GraphServer::new(Config::default())?;
//! server.query("social", "CREATE (:Person {name: 'Ann'})", QueryMode::Query, QueryOptions::default())?;
//! let response = server.query(
//!     "social",
//!     "MATCH (p:Person) RETURN p.name",
//!     QueryMode::ReadOnly,
//!     QueryOptions::default(),
//! )?;
//! ```
//!
//! The `matrixgraph` binary wraps the same server in a REPL.

// Entry point for hosts
pub mod coordinator;

// Engine layers
pub mod ast;
pub mod cache;
pub mod exec;
pub mod functions;
pub mod plan;
pub mod procedures;
pub mod storage;

pub use coordinator::{
    Command, Config, ConfigError, GraphServer, QueryMode, QueryOptions, QueryResponse, Reply,
    SlowlogEntry,
};
pub use exec::{ErrorKind, ExecutionError, QueryResult, QueryStatistics};
pub use storage::Value;

/// MatrixGraph version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// MatrixGraph crate name
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
