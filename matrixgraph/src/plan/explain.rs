// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! `EXPLAIN` rendering

use crate::plan::logical::{LogicalPlan, PlannedStatement};

/// Operator tree of a plan, one line per operator, children indented by
/// four spaces.
pub fn explain(plan: &LogicalPlan) -> Vec<String> {
    let mut lines = Vec::new();
    render(plan, 0, &mut lines);
    lines
}

/// `EXPLAIN` output of any statement; index statements have a single line.
pub fn explain_statement(statement: &PlannedStatement) -> Vec<String> {
    match statement {
        PlannedStatement::Query(query) => explain(&query.root),
        PlannedStatement::CreateIndex(index) => vec![format!("Create Index | :{}", index.label)],
        PlannedStatement::DropIndex(index) => vec![format!("Drop Index | :{}", index.label)],
    }
}

fn render(plan: &LogicalPlan, depth: usize, lines: &mut Vec<String>) {
    let mut line = format!("{}{}", "    ".repeat(depth), plan.op.name());
    if let Some(text) = plan.op.describe() {
        line.push_str(" | ");
        line.push_str(&text);
    }
    lines.push(line);
    for child in &plan.children {
        render(child, depth + 1, lines);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parse_query;
    use crate::plan::planner::plan_document;
    use crate::storage::Graph;

    fn lines(query: &str) -> Vec<String> {
        let graph = Graph::new("g");
        explain_statement(&plan_document(&parse_query(query).unwrap(), &graph).unwrap())
    }

    #[test]
    fn test_explain_indents_children() {
        let out = lines("MATCH (a:A)-[r:R]->(b) RETURN a");
        assert_eq!(
            out,
            vec![
                "Results",
                "    Project",
                "        Conditional Traverse | (a)-[r:R]->(b)",
                "            Node By Label Scan | (a:A)",
            ]
        );
    }

    #[test]
    fn test_explain_index_statement() {
        assert_eq!(lines("CREATE INDEX ON :L(v)"), vec!["Create Index | :L"]);
    }
}
