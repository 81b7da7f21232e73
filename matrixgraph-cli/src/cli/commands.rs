// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Command line definitions

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "matrixgraph", version, about = "MatrixGraph - in-memory property graph engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<log::Level>,

    /// Shorthand for --log-level debug
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Server configuration, repeatable: --config THREAD_COUNT=4
    #[arg(long = "config", value_name = "KEY=VALUE", global = true)]
    pub config: Vec<String>,

    /// Directory backing SAVE and RESTORE; in memory when omitted
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print version information
    Version,

    /// Start the interactive console
    Repl {
        /// Graph key queried by bare Cypher input
        #[arg(short, long, default_value = "default")]
        graph: String,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Run one query
    Query {
        /// Graph key
        graph: String,

        /// Query text
        query: String,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,

        /// Refuse queries that write
        #[arg(long)]
        read_only: bool,

        /// Print the plan instead of executing
        #[arg(long, conflicts_with = "profile")]
        explain: bool,

        /// Execute and print the plan annotated with record counts
        #[arg(long)]
        profile: bool,

        /// Query parameter, repeatable: --param name=value (value is JSON)
        #[arg(long = "param", value_name = "NAME=VALUE")]
        params: Vec<String>,

        /// Read-query timeout in milliseconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Run one raw server command, e.g. `exec CONFIG GET '*'`
    Exec {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        line: Vec<String>,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}
