// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Query execution results

use serde::Serialize;

use crate::storage::{Graph, PathValue, Value};

/// Counters reported in the statistics trailer of every response
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryStatistics {
    pub labels_added: u64,
    pub labels_removed: u64,
    pub nodes_created: u64,
    pub nodes_deleted: u64,
    pub relationships_created: u64,
    pub relationships_deleted: u64,
    pub properties_set: u64,
    pub properties_removed: u64,
    pub indices_created: u64,
    pub indices_deleted: u64,
    pub execution_time_ms: f64,
}

impl QueryStatistics {
    /// Whether the query changed anything
    pub fn has_changes(&self) -> bool {
        self.counters().iter().any(|(_, n)| *n > 0)
    }

    fn counters(&self) -> [(&'static str, u64); 10] {
        [
            ("Labels added", self.labels_added),
            ("Labels removed", self.labels_removed),
            ("Nodes created", self.nodes_created),
            ("Nodes deleted", self.nodes_deleted),
            ("Properties set", self.properties_set),
            ("Properties removed", self.properties_removed),
            ("Relationships created", self.relationships_created),
            ("Relationships deleted", self.relationships_deleted),
            ("Indices created", self.indices_created),
            ("Indices deleted", self.indices_deleted),
        ]
    }

    /// Trailer lines; zero counters are omitted, the timing line never is.
    pub fn summary(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .counters()
            .iter()
            .filter(|(_, n)| *n > 0)
            .map(|(label, n)| format!("{}: {}", label, n))
            .collect();
        lines.push(format!(
            "Query internal execution time: {:.6} milliseconds",
            self.execution_time_ms
        ));
        lines
    }
}

/// Tabular result of a query
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub stats: QueryStatistics,
    /// Graph signature after the query ran
    pub graph_version: u64,
    /// Whether the plan came from the plan cache
    pub cached_execution: bool,
}

impl QueryResult {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            ..Default::default()
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one column by name
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let index = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| &row[index]).collect())
    }
}

/// Replace id references in `value` with fully populated entities.
///
/// Entities deleted by the query keep whatever the reference carried.
pub(crate) fn materialize(graph: &Graph, value: Value) -> Value {
    match value {
        Value::Node(n) => Value::Node(graph.node_value(n.id).unwrap_or(n)),
        Value::Edge(e) => Value::Edge(graph.edge_value(e.id).unwrap_or(e)),
        Value::Path(p) => Value::Path(PathValue {
            nodes: p
                .nodes
                .into_iter()
                .map(|n| graph.node_value(n.id).unwrap_or(n))
                .collect(),
            edges: p
                .edges
                .into_iter()
                .map(|e| graph.edge_value(e.id).unwrap_or(e))
                .collect(),
        }),
        Value::List(items) => Value::List(items.into_iter().map(|v| materialize(graph, v)).collect()),
        Value::Map(entries) => Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k, materialize(graph, v)))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{NodeValue, PropertyMap};

    #[test]
    fn test_summary_omits_zero_counters() {
        let stats = QueryStatistics {
            nodes_created: 2,
            properties_set: 3,
            execution_time_ms: 1.5,
            ..Default::default()
        };
        let lines = stats.summary();
        assert_eq!(lines[0], "Nodes created: 2");
        assert_eq!(lines[1], "Properties set: 3");
        assert!(lines[2].starts_with("Query internal execution time: 1.5"));
        assert_eq!(lines.len(), 3);
        assert!(stats.has_changes());
        assert!(!QueryStatistics::default().has_changes());
    }

    #[test]
    fn test_materialize_nested_nodes() {
        let mut graph = Graph::new("g");
        let label = graph.intern_label("L").unwrap();
        let id = graph.create_node(&[label], PropertyMap::new()).unwrap();
        graph.flush().unwrap();
        let value = Value::List(vec![Value::Node(NodeValue::reference(id))]);
        match materialize(&graph, value) {
            Value::List(items) => match &items[0] {
                Value::Node(n) => assert_eq!(n.labels, vec!["L".to_string()]),
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }
}
