// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Result formatting for CLI output

use colored::*;
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use matrixgraph::{QueryResult, Reply, Value};

use super::commands::OutputFormat;

/// Reply formatter for the supported output formats
pub struct ResultFormatter;

impl ResultFormatter {
    pub fn format(reply: &Reply, format: OutputFormat) -> String {
        match reply {
            Reply::Result(response) => match format {
                OutputFormat::Table => Self::format_table(&response.result),
                OutputFormat::Json => Self::format_json(&response.result),
                OutputFormat::Csv => Self::format_csv(&response.result),
            },
            Reply::Plan(lines) => match format {
                OutputFormat::Json => Self::pretty(&serde_json::json!(lines)),
                _ => format!("{}\n", lines.join("\n")),
            },
            Reply::Slowlog(entries) => match format {
                OutputFormat::Json => Self::pretty(&serde_json::json!(entries)),
                _ => {
                    let rows = entries
                        .iter()
                        .map(|e| {
                            vec![
                                e.timestamp.to_rfc3339(),
                                e.command.clone(),
                                e.query.clone(),
                                format!("{:.6}", e.elapsed_ms),
                            ]
                        })
                        .collect();
                    Self::simple_table(&["timestamp", "command", "query", "elapsed ms"], rows, format)
                }
            },
            Reply::Config(pairs) => match format {
                OutputFormat::Json => Self::pretty(&serde_json::Value::Object(
                    pairs
                        .iter()
                        .map(|(k, v)| (k.clone(), serde_json::json!(v)))
                        .collect(),
                )),
                _ => {
                    let rows = pairs.iter().map(|(k, v)| vec![k.clone(), v.to_string()]).collect();
                    Self::simple_table(&["key", "value"], rows, format)
                }
            },
            Reply::Keys(keys) => match format {
                OutputFormat::Json => Self::pretty(&serde_json::json!(keys)),
                _ if keys.is_empty() => format!("{}\n", "(empty list)".yellow()),
                _ => format!("{}\n", keys.join("\n")),
            },
            Reply::Integer(n) => format!("(integer) {}\n", n),
            Reply::Status(status) => format!("{}\n", status.green()),
        }
    }

    fn format_table(result: &QueryResult) -> String {
        let mut output = String::new();

        if !result.columns.is_empty() {
            if result.rows.is_empty() {
                output.push_str(&format!("{}\n", "No results found".yellow()));
            } else {
                let mut table = Table::new();
                table.load_preset(UTF8_FULL);
                let header: Vec<Cell> = result
                    .columns
                    .iter()
                    .map(|col| Cell::new(col).fg(Color::Green))
                    .collect();
                table.set_header(header);
                for row in &result.rows {
                    table.add_row(row.iter().map(|v| v.to_string()).collect::<Vec<_>>());
                }
                output.push_str(&table.to_string());
                output.push('\n');
            }
        }

        for line in result.stats.summary() {
            output.push_str(&format!("{}\n", line.dimmed()));
        }
        if result.cached_execution {
            output.push_str(&format!("{}\n", "Cached execution: 1".dimmed()));
        }
        output
    }

    fn format_json(result: &QueryResult) -> String {
        let json = serde_json::json!({
            "status": "success",
            "columns": result.columns,
            "rows": result.rows.iter().map(|row| {
                serde_json::Value::Array(row.iter().map(Value::to_json).collect())
            }).collect::<Vec<_>>(),
            "statistics": result.stats,
            "cached_execution": result.cached_execution,
            "graph_version": result.graph_version,
        });
        Self::pretty(&json)
    }

    fn format_csv(result: &QueryResult) -> String {
        let mut output = String::new();
        output.push_str(&result.columns.join(","));
        output.push('\n');
        for row in &result.rows {
            let cells: Vec<String> = row.iter().map(|v| Self::csv_cell(&v.to_string())).collect();
            output.push_str(&cells.join(","));
            output.push('\n');
        }
        output
    }

    fn simple_table(header: &[&str], rows: Vec<Vec<String>>, format: OutputFormat) -> String {
        if format == OutputFormat::Csv {
            let mut output = header.join(",");
            output.push('\n');
            for row in rows {
                let cells: Vec<String> = row.iter().map(|c| Self::csv_cell(c)).collect();
                output.push_str(&cells.join(","));
                output.push('\n');
            }
            return output;
        }
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(header.iter().map(|h| Cell::new(h).fg(Color::Green)).collect::<Vec<_>>());
        for row in rows {
            table.add_row(row);
        }
        format!("{}\n", table)
    }

    fn csv_cell(s: &str) -> String {
        if s.contains(',') || s.contains('"') || s.contains('\n') {
            format!("\"{}\"", s.replace('"', "\"\""))
        } else {
            s.to_string()
        }
    }

    fn pretty(json: &serde_json::Value) -> String {
        serde_json::to_string_pretty(json).unwrap_or_else(|_| {
            "{\"status\": \"error\", \"error\": \"Could not serialize results to JSON\"}".to_string()
        })
    }
}
