// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! CLI module for MatrixGraph
//!
//! Provides the interactive console (REPL), one-off query execution and a
//! raw command runner over an in-process graph server.

pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{Cli, Commands};
pub use handlers::{build_server, handle_exec, handle_query, handle_repl, QueryRequest};
