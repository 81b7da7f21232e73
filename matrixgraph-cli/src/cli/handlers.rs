// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! CLI command handlers for MatrixGraph

use colored::Colorize;
use rustyline::{error::ReadlineError, CompletionType, Config as EditorConfig, EditMode, Editor};
use std::path::Path;
use std::sync::Arc;

use matrixgraph::storage::persistent::DirectoryStore;
use matrixgraph::{Command, Config, GraphServer, QueryMode, Reply, Value};

use super::commands::OutputFormat;
use super::output::ResultFormatter;

/// Words that start a raw server command in the console
const SERVER_COMMANDS: [&str; 13] = [
    "QUERY", "RO_QUERY", "PROFILE", "EXPLAIN", "SLOWLOG", "CONFIG", "ALIAS", "CONSTRAINT", "DELETE",
    "LIST", "COPY", "SAVE", "RESTORE",
];

/// Arguments of the `query` subcommand
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub graph: String,
    pub query: String,
    pub read_only: bool,
    pub explain: bool,
    pub profile: bool,
    pub params: Vec<String>,
    pub timeout: Option<u64>,
}

/// Build a server from `--config KEY=VALUE` flags and an optional data
/// directory.
pub fn build_server(
    config: &[String],
    data_dir: Option<&Path>,
) -> Result<GraphServer, Box<dyn std::error::Error>> {
    let mut args = Vec::with_capacity(config.len() * 2);
    for pair in config {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("--config expects KEY=VALUE, got '{}'", pair))?;
        args.push(key.to_string());
        args.push(value.to_string());
    }
    let config = Config::from_args(&args)?;
    let server = match data_dir {
        Some(path) => GraphServer::with_store(config, Arc::new(DirectoryStore::open(path)?))?,
        None => GraphServer::new(config)?,
    };
    Ok(server)
}

/// Handle the `query` command
pub fn handle_query(
    server: &GraphServer,
    request: QueryRequest,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let mode = if request.explain {
        QueryMode::Explain
    } else if request.profile {
        QueryMode::Profile
    } else if request.read_only {
        QueryMode::ReadOnly
    } else {
        QueryMode::Query
    };
    let mut parameters = std::collections::HashMap::new();
    for param in &request.params {
        let (name, value) = param
            .split_once('=')
            .ok_or_else(|| format!("--param expects NAME=VALUE, got '{}'", param))?;
        let value = serde_json::from_str(value)
            .map(Value::from_json)
            .unwrap_or_else(|_| Value::from(value));
        parameters.insert(name.to_string(), value);
    }
    let command = Command::Query {
        mode,
        graph: request.graph,
        query: request.query,
        parameters,
        timeout_ms: request.timeout,
    };
    run_and_print(server, command, format)
}

/// Handle the `exec` command
pub fn handle_exec(
    server: &GraphServer,
    line: &[String],
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    run_and_print(server, Command::parse(line)?, format)
}

fn run_and_print(
    server: &GraphServer,
    command: Command,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match server.execute(command) {
        Ok(reply) => {
            print!("{}", ResultFormatter::format(&reply, format));
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", format!("Error: {}", e).red());
            Err(e.into())
        }
    }
}

/// Handle the `repl` command
pub fn handle_repl(
    server: &GraphServer,
    graph: String,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut graph = graph;

    println!("{}", "MatrixGraph".bold().green());
    println!("Type 'help' for commands, 'exit' or 'quit' to exit");
    println!("Cypher input runs against the current graph - use ';' to terminate\n");

    let config = EditorConfig::builder()
        .edit_mode(EditMode::Emacs)
        .history_ignore_space(true)
        .completion_type(CompletionType::List)
        .auto_add_history(false)
        .build();
    let mut rl = Editor::<(), _>::with_config(config)?;

    let history_path = ".matrixgraph/history.txt";
    if let Some(parent) = Path::new(history_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let _ = rl.load_history(history_path);

    let mut buffer = String::new();
    loop {
        let prompt = if buffer.is_empty() {
            format!("{}> ", graph.cyan())
        } else {
            format!("{}... ", " ".repeat(graph.len()))
        };

        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                if !buffer.is_empty() {
                    buffer.clear();
                    println!("{}", "\nQuery buffer cleared".yellow());
                }
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("{}", "Goodbye!".green());
                break;
            }
            Err(err) => {
                eprintln!("{}", format!("Error: {:?}", err).red());
                break;
            }
        };

        let trimmed = line.trim();
        if buffer.is_empty() {
            match trimmed.to_lowercase().as_str() {
                "exit" | "quit" => {
                    println!("{}", "Goodbye!".green());
                    break;
                }
                "help" => {
                    print_help();
                    continue;
                }
                "" => continue,
                _ => {}
            }
            if let Some(name) = trimmed.strip_prefix(":use ") {
                graph = name.trim().to_string();
                println!("{}", format!("Using graph '{}'", graph).cyan());
                continue;
            }
            if is_server_command(trimmed) {
                rl.add_history_entry(trimmed)?;
                let reply = Command::parse_line(trimmed.trim_end_matches(';'))
                    .and_then(|command| server.execute(command));
                print_reply(reply, format);
                continue;
            }
        }

        buffer.push_str(&line);
        buffer.push('\n');

        if trimmed.ends_with(';') {
            let query = buffer.trim().trim_end_matches(';').trim().to_string();
            rl.add_history_entry(&query)?;
            let reply = server.execute(Command::Query {
                mode: QueryMode::Query,
                graph: graph.clone(),
                query,
                parameters: Default::default(),
                timeout_ms: None,
            });
            print_reply(reply, format);
            buffer.clear();
        }
    }

    let _ = rl.save_history(history_path);
    Ok(())
}

fn print_reply(reply: matrixgraph::exec::ExecResult<Reply>, format: OutputFormat) {
    match reply {
        Ok(reply) => print!("{}", ResultFormatter::format(&reply, format)),
        Err(e) => eprintln!("{}", format!("Error: {}", e).red()),
    }
}

fn is_server_command(line: &str) -> bool {
    let first = line.split_whitespace().next().unwrap_or("").to_ascii_uppercase();
    let first = first.strip_prefix("GRAPH.").unwrap_or(&first);
    SERVER_COMMANDS.contains(&first)
}

fn print_help() {
    println!("{}", "Available commands:".bold().green());
    println!("  {}  - Show this help message", "help".cyan());
    println!("  {}  - Exit the console", "exit/quit".cyan());
    println!("  {}  - Switch the current graph", ":use <graph>".cyan());
    println!("\n{}", "Server commands:".bold().green());
    println!("  QUERY | RO_QUERY | PROFILE | EXPLAIN <graph> \"<query>\"");
    println!("  SLOWLOG <graph>, CONFIG GET|SET <key> [value], ALIAS <name> <graph>");
    println!("  DELETE <graph>, LIST, COPY <src> <dst>, SAVE <graph>, RESTORE <graph> <key>");
    println!("\n{}", "Examples:".bold().green());
    println!("  {}", "CREATE (:Person {name: 'Ann'})-[:KNOWS]->(:Person {name: 'Bob'});".yellow());
    println!("  {}", "MATCH (a)-[:KNOWS]->(b) RETURN a.name, b.name;".yellow());
    println!("  {}", "EXPLAIN default \"MATCH (n:Person) RETURN n\"".yellow());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_command_detection() {
        assert!(is_server_command("GRAPH.QUERY g \"RETURN 1\""));
        assert!(is_server_command("list"));
        assert!(!is_server_command("MATCH (n) RETURN n;"));
        assert!(!is_server_command("CREATE (:L);"));
    }

    #[test]
    fn test_build_server_from_flags() {
        let server = build_server(&["TIMEOUT=250".to_string()], None).unwrap();
        assert_eq!(server.config().timeout, 250);
        assert!(build_server(&["TIMEOUT".to_string()], None).is_err());
        assert!(build_server(&["NOPE=1".to_string()], None).is_err());
    }

    #[test]
    fn test_data_dir_backs_save_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        {
            let server = build_server(&[], Some(dir.path())).unwrap();
            server.execute_line("QUERY g \"CREATE (:L {v: 7})\"").unwrap();
            server.execute_line("SAVE g").unwrap();
        }
        let server = build_server(&[], Some(dir.path())).unwrap();
        server.execute_line("RESTORE g g").unwrap();
        match server.execute_line("QUERY g \"MATCH (n:L) RETURN n.v\"").unwrap() {
            Reply::Result(response) => {
                assert_eq!(response.result.rows, vec![vec![Value::Integer(7)]])
            }
            other => panic!("unexpected reply {:?}", other),
        }
    }
}
