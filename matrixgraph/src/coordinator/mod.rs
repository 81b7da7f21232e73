// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Graph server and command surface
//!
//! The [`GraphServer`] is the entry point hosts talk to: it owns the graph
//! keys, schedules queries, and answers the administrative commands.

pub mod command;
pub mod config;
pub mod server;
pub mod slowlog;

pub use command::{split_args, Command, ConstraintOp, Reply};
pub use config::{Config, ConfigError};
pub use server::{GraphEntry, GraphServer, QueryMode, QueryOptions, QueryResponse};
pub use slowlog::{Slowlog, SlowlogEntry};
