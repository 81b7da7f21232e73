// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Command surface
//!
//! Parses host commands such as `QUERY g "MATCH (n) RETURN n"` into
//! [`Command`] values and dispatches them to a [`GraphServer`]. Command
//! names are case-insensitive and may carry a `GRAPH.` prefix.

use std::collections::HashMap;

use crate::coordinator::server::{GraphServer, QueryMode, QueryOptions, QueryResponse};
use crate::coordinator::slowlog::SlowlogEntry;
use crate::exec::{ExecResult, ExecutionError};
use crate::storage::{ConstraintDefinition, ConstraintKind, EntityKind, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintOp {
    Create,
    Drop,
}

#[derive(Debug, Clone)]
pub enum Command {
    Query {
        mode: QueryMode,
        graph: String,
        query: String,
        parameters: HashMap<String, Value>,
        timeout_ms: Option<u64>,
    },
    Slowlog {
        graph: String,
        reset: bool,
    },
    ConfigGet(String),
    ConfigSet(String, String),
    Alias {
        alias: String,
        graph: String,
    },
    Constraint {
        op: ConstraintOp,
        graph: String,
        definition: ConstraintDefinition,
    },
    Delete(String),
    List,
    Copy {
        src: String,
        dst: String,
    },
    Save(String),
    Restore {
        graph: String,
        key: String,
    },
}

/// Reply to one command
#[derive(Debug, Clone)]
pub enum Reply {
    Result(QueryResponse),
    Plan(Vec<String>),
    Slowlog(Vec<SlowlogEntry>),
    Config(Vec<(String, u64)>),
    Keys(Vec<String>),
    Integer(i64),
    Status(String),
}

impl Reply {
    fn ok() -> Self {
        Reply::Status("OK".to_string())
    }
}

fn arity_error(name: &str) -> ExecutionError {
    ExecutionError::syntax(format!("wrong number of arguments for '{}' command", name))
}

impl Command {
    /// Parse a command line; see [`split_args`] for quoting rules.
    pub fn parse_line(line: &str) -> ExecResult<Command> {
        Command::parse(&split_args(line)?)
    }

    /// Parse already-split arguments; the first is the command name.
    pub fn parse<S: AsRef<str>>(args: &[S]) -> ExecResult<Command> {
        let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
        let Some((name, rest)) = args.split_first() else {
            return Err(ExecutionError::syntax("empty command"));
        };
        let upper = name.to_ascii_uppercase();
        let command = upper.strip_prefix("GRAPH.").unwrap_or(&upper);
        match command {
            "QUERY" | "RO_QUERY" | "PROFILE" | "EXPLAIN" => {
                let mode = match command {
                    "QUERY" => QueryMode::Query,
                    "RO_QUERY" => QueryMode::ReadOnly,
                    "PROFILE" => QueryMode::Profile,
                    _ => QueryMode::Explain,
                };
                parse_query_command(command, mode, rest)
            }
            "SLOWLOG" => match rest {
                [graph] => Ok(Command::Slowlog {
                    graph: graph.to_string(),
                    reset: false,
                }),
                [graph, reset] if reset.eq_ignore_ascii_case("RESET") => Ok(Command::Slowlog {
                    graph: graph.to_string(),
                    reset: true,
                }),
                _ => Err(arity_error(command)),
            },
            "CONFIG" => match rest {
                [op, key] if op.eq_ignore_ascii_case("GET") => Ok(Command::ConfigGet(key.to_string())),
                [op, key, value] if op.eq_ignore_ascii_case("SET") => {
                    Ok(Command::ConfigSet(key.to_string(), value.to_string()))
                }
                [op, ..] if !op.eq_ignore_ascii_case("GET") && !op.eq_ignore_ascii_case("SET") => {
                    Err(ExecutionError::syntax(format!("Unknown subcommand for CONFIG: {}", op)))
                }
                _ => Err(arity_error(command)),
            },
            "ALIAS" => match rest {
                [alias, graph] => Ok(Command::Alias {
                    alias: alias.to_string(),
                    graph: graph.to_string(),
                }),
                _ => Err(arity_error(command)),
            },
            "CONSTRAINT" => parse_constraint(rest),
            "DELETE" => match rest {
                [graph] => Ok(Command::Delete(graph.to_string())),
                _ => Err(arity_error(command)),
            },
            "LIST" => match rest {
                [] => Ok(Command::List),
                _ => Err(arity_error(command)),
            },
            "COPY" => match rest {
                [src, dst] => Ok(Command::Copy {
                    src: src.to_string(),
                    dst: dst.to_string(),
                }),
                _ => Err(arity_error(command)),
            },
            "SAVE" => match rest {
                [graph] => Ok(Command::Save(graph.to_string())),
                _ => Err(arity_error(command)),
            },
            "RESTORE" => match rest {
                [graph, key] => Ok(Command::Restore {
                    graph: graph.to_string(),
                    key: key.to_string(),
                }),
                _ => Err(arity_error(command)),
            },
            _ => Err(ExecutionError::syntax(format!("unknown command '{}'", name))),
        }
    }
}

/// `<graph> <text> [name=value…] [timeout N]`; parameter values are JSON,
/// falling back to a plain string.
fn parse_query_command(name: &str, mode: QueryMode, rest: &[&str]) -> ExecResult<Command> {
    let [graph, query, extra @ ..] = rest else {
        return Err(arity_error(name));
    };
    let mut parameters = HashMap::new();
    let mut timeout_ms = None;
    let mut extra = extra.iter();
    while let Some(arg) = extra.next() {
        if arg.eq_ignore_ascii_case("timeout") {
            let value = extra.next().ok_or_else(|| arity_error(name))?;
            let ms = value.parse::<u64>().map_err(|_| {
                ExecutionError::syntax(format!("Failed to parse query timeout value '{}'", value))
            })?;
            timeout_ms = Some(ms);
        } else if arg.eq_ignore_ascii_case("--compact") {
            continue;
        } else if let Some((key, value)) = arg.split_once('=') {
            let value = serde_json::from_str(value)
                .map(Value::from_json)
                .unwrap_or_else(|_| Value::from(value));
            parameters.insert(key.to_string(), value);
        } else {
            return Err(ExecutionError::syntax(format!("Unrecognized argument '{}'", arg)));
        }
    }
    Ok(Command::Query {
        mode,
        graph: graph.to_string(),
        query: query.to_string(),
        parameters,
        timeout_ms,
    })
}

/// `CREATE|DROP <graph> UNIQUE|MANDATORY NODE|RELATIONSHIP <label>
/// PROPERTIES <n> <prop…>`
fn parse_constraint(rest: &[&str]) -> ExecResult<Command> {
    let [op, graph, kind, entity, label, keyword, count, properties @ ..] = rest else {
        return Err(arity_error("CONSTRAINT"));
    };
    let op = match op.to_ascii_uppercase().as_str() {
        "CREATE" => ConstraintOp::Create,
        "DROP" => ConstraintOp::Drop,
        _ => return Err(ExecutionError::syntax(format!("Invalid constraint operation '{}'", op))),
    };
    let kind = match kind.to_ascii_uppercase().as_str() {
        "UNIQUE" => ConstraintKind::Unique,
        "MANDATORY" => ConstraintKind::Mandatory,
        _ => return Err(ExecutionError::syntax(format!("Invalid constraint type '{}'", kind))),
    };
    let entity = match entity.to_ascii_uppercase().as_str() {
        "NODE" => EntityKind::Node,
        "RELATIONSHIP" => EntityKind::Edge,
        _ => {
            return Err(ExecutionError::syntax(format!(
                "Invalid constraint entity type '{}'",
                entity
            )))
        }
    };
    if !keyword.eq_ignore_ascii_case("PROPERTIES") {
        return Err(ExecutionError::syntax("Expected PROPERTIES keyword"));
    }
    let count: usize = count
        .parse()
        .map_err(|_| ExecutionError::syntax(format!("Invalid number of properties '{}'", count)))?;
    if count == 0 || count != properties.len() {
        return Err(ExecutionError::syntax(
            "Number of properties doesn't match property count",
        ));
    }
    Ok(Command::Constraint {
        op,
        graph: graph.to_string(),
        definition: ConstraintDefinition {
            kind,
            entity,
            label: label.to_string(),
            properties: properties.iter().map(|p| p.to_string()).collect(),
        },
    })
}

impl GraphServer {
    /// Run one parsed command.
    pub fn execute(&self, command: Command) -> ExecResult<Reply> {
        match command {
            Command::Query {
                mode,
                graph,
                query,
                parameters,
                timeout_ms,
            } => {
                let options = QueryOptions {
                    parameters,
                    timeout_ms,
                };
                let response = self.query(&graph, &query, mode, options)?;
                Ok(match mode {
                    QueryMode::Profile | QueryMode::Explain => Reply::Plan(response.plan),
                    QueryMode::Query | QueryMode::ReadOnly => Reply::Result(response),
                })
            }
            Command::Slowlog { graph, reset } => {
                if reset {
                    self.slowlog_reset(&graph)?;
                    Ok(Reply::ok())
                } else {
                    Ok(Reply::Slowlog(self.slowlog(&graph)?))
                }
            }
            Command::ConfigGet(key) => Ok(Reply::Config(self.config_get(&key)?)),
            Command::ConfigSet(key, value) => {
                self.config_set(&key, &value)?;
                Ok(Reply::ok())
            }
            Command::Alias { alias, graph } => {
                self.alias(&alias, &graph)?;
                Ok(Reply::ok())
            }
            Command::Constraint {
                op,
                graph,
                definition,
            } => match op {
                ConstraintOp::Create => {
                    let status = self.create_constraint(&graph, definition)?;
                    Ok(Reply::Status(status.to_string()))
                }
                ConstraintOp::Drop => {
                    self.drop_constraint(&graph, &definition)?;
                    Ok(Reply::ok())
                }
            },
            Command::Delete(graph) => {
                self.delete(&graph)?;
                Ok(Reply::ok())
            }
            Command::List => Ok(Reply::Keys(self.list())),
            Command::Copy { src, dst } => {
                self.copy(&src, &dst)?;
                Ok(Reply::ok())
            }
            Command::Save(graph) => Ok(Reply::Integer(self.save(&graph)? as i64)),
            Command::Restore { graph, key } => {
                self.restore(&graph, &key)?;
                Ok(Reply::ok())
            }
        }
    }

    /// Parse and run one command line.
    pub fn execute_line(&self, line: &str) -> ExecResult<Reply> {
        self.execute(Command::parse_line(line)?)
    }
}

/// Split a command line into arguments. Single and double quotes group
/// words; inside double quotes a backslash escapes the next character.
pub fn split_args(line: &str) -> ExecResult<Vec<String>> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_arg = false;
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' | '\'' => {
                in_arg = true;
                let quote = c;
                loop {
                    match chars.next() {
                        Some(ch) if ch == quote => break,
                        Some('\\') if quote == '"' => match chars.next() {
                            Some('n') => current.push('\n'),
                            Some('t') => current.push('\t'),
                            Some(escaped) => current.push(escaped),
                            None => return Err(ExecutionError::syntax("unbalanced quotes in request")),
                        },
                        Some(ch) => current.push(ch),
                        None => return Err(ExecutionError::syntax("unbalanced quotes in request")),
                    }
                }
            }
            c if c.is_whitespace() => {
                if in_arg {
                    args.push(std::mem::take(&mut current));
                    in_arg = false;
                }
            }
            c => {
                in_arg = true;
                current.push(c);
            }
        }
    }
    if in_arg {
        args.push(current);
    }
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::config::Config;
    use crate::exec::ErrorKind;

    #[test]
    fn test_split_args() {
        assert_eq!(
            split_args(r#"GRAPH.QUERY g "MATCH (n {name: 'a b'}) RETURN n""#).unwrap(),
            vec!["GRAPH.QUERY", "g", "MATCH (n {name: 'a b'}) RETURN n"]
        );
        assert_eq!(split_args("a  'b c'  \"\"").unwrap(), vec!["a", "b c", ""]);
        assert_eq!(split_args(r#""say \"hi\"""#).unwrap(), vec![r#"say "hi""#]);
        assert!(split_args("QUERY g \"open").is_err());
    }

    #[test]
    fn test_parse_query_arguments() {
        let command = Command::parse(&["query", "g", "RETURN $x", "x=[1,2]", "timeout", "50"]).unwrap();
        match command {
            Command::Query {
                mode,
                graph,
                parameters,
                timeout_ms,
                ..
            } => {
                assert_eq!(mode, QueryMode::Query);
                assert_eq!(graph, "g");
                assert_eq!(
                    parameters.get("x"),
                    Some(&Value::List(vec![Value::Integer(1), Value::Integer(2)]))
                );
                assert_eq!(timeout_ms, Some(50));
            }
            other => panic!("unexpected command {:?}", other),
        }
        let err = Command::parse(&["GRAPH.RO_QUERY", "g"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Syntax);
        assert!(Command::parse(&["QUERY", "g", "RETURN 1", "timeout", "soon"]).is_err());
    }

    #[test]
    fn test_parse_arity_errors() {
        for line in ["ALIAS a", "ALIAS a b c", "DELETE", "LIST x", "COPY a", "RESTORE g", "SLOWLOG"] {
            let err = Command::parse_line(line).unwrap_err();
            assert!(err.to_string().contains("wrong number of arguments"), "{}", line);
        }
        assert!(Command::parse_line("FLY g").is_err());
    }

    #[test]
    fn test_parse_constraint() {
        let command =
            Command::parse_line("CONSTRAINT CREATE g UNIQUE NODE Person PROPERTIES 2 first last").unwrap();
        match command {
            Command::Constraint { op, definition, .. } => {
                assert_eq!(op, ConstraintOp::Create);
                assert_eq!(definition.kind, ConstraintKind::Unique);
                assert_eq!(definition.entity, EntityKind::Node);
                assert_eq!(definition.properties, vec!["first", "last"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert!(Command::parse_line("CONSTRAINT CREATE g UNIQUE NODE P PROPERTIES 2 a").is_err());
        assert!(Command::parse_line("CONSTRAINT CREATE g EXISTS NODE P PROPERTIES 1 a").is_err());
    }

    #[test]
    fn test_execute_lines() {
        let server = GraphServer::new(Config::from_args(&["THREAD_COUNT", "1"]).unwrap()).unwrap();
        match server.execute_line("GRAPH.QUERY g \"CREATE (:L {v: 1})\"").unwrap() {
            Reply::Result(response) => assert_eq!(response.result.stats.nodes_created, 1),
            other => panic!("unexpected reply {:?}", other),
        }
        match server.execute_line("EXPLAIN g \"MATCH (n:L) RETURN n\"").unwrap() {
            Reply::Plan(lines) => assert_eq!(lines[0], "Results"),
            other => panic!("unexpected reply {:?}", other),
        }
        match server.execute_line("PROFILE g \"MATCH (n:L) RETURN n\"").unwrap() {
            Reply::Plan(lines) => assert!(lines[0].contains("Records produced: 1")),
            other => panic!("unexpected reply {:?}", other),
        }
        match server.execute_line("CONFIG GET TIMEOUT").unwrap() {
            Reply::Config(pairs) => assert_eq!(pairs, vec![("TIMEOUT".to_string(), 0)]),
            other => panic!("unexpected reply {:?}", other),
        }
        let err = server.execute_line("CONFIG SET THREAD_COUNT 8").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        match server.execute_line("LIST").unwrap() {
            Reply::Keys(keys) => assert_eq!(keys, vec!["g".to_string()]),
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn test_constraint_commands() {
        let server = GraphServer::new(Config::from_args(&["THREAD_COUNT", "1"]).unwrap()).unwrap();
        server.execute_line("QUERY g \"CREATE (:P {name: 'a'}), (:P)\"").unwrap();
        match server
            .execute_line("CONSTRAINT CREATE g MANDATORY NODE P PROPERTIES 1 name")
            .unwrap()
        {
            Reply::Status(status) => assert_eq!(status, "FAILED"),
            other => panic!("unexpected reply {:?}", other),
        }
        let err = server
            .execute_line("CONSTRAINT CREATE g UNIQUE NODE P PROPERTIES 1 name")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
        server
            .execute_line("CONSTRAINT DROP g MANDATORY NODE P PROPERTIES 1 name")
            .unwrap();
    }
}
