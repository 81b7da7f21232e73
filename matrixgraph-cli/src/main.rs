// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! MatrixGraph CLI entry point

use clap::Parser;
use colored::Colorize;

mod cli;
use cli::{Cli, Commands};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // -v wins over --log-level; RUST_LOG still applies on top
    let log_level = if cli.verbose {
        log::LevelFilter::Debug
    } else if let Some(level) = cli.log_level {
        level.to_level_filter()
    } else {
        log::LevelFilter::Warn
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    match cli.command {
        Commands::Version => {
            println!("{} {}", "MatrixGraph".bold().green(), matrixgraph::VERSION);
            println!("In-memory property graph engine");
            Ok(())
        }

        Commands::Repl { graph, format } => {
            let server = cli::build_server(&cli.config, cli.data_dir.as_deref())?;
            cli::handle_repl(&server, graph, format)
        }

        Commands::Query {
            graph,
            query,
            format,
            read_only,
            explain,
            profile,
            params,
            timeout,
        } => {
            let server = cli::build_server(&cli.config, cli.data_dir.as_deref())?;
            let request = cli::QueryRequest {
                graph,
                query,
                read_only,
                explain,
                profile,
                params,
                timeout,
            };
            cli::handle_query(&server, request, format)
        }

        Commands::Exec { line, format } => {
            let server = cli::build_server(&cli.config, cli.data_dir.as_deref())?;
            cli::handle_exec(&server, &line, format)
        }
    }
}
