// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Plan execution
//!
//! Drives one planned statement against one graph: builds the operator
//! tree, pulls every record through it, and wraps writes in the graph's
//! undo log so that any error leaves the graph untouched.

use std::collections::HashMap;
use std::time::Instant;

use crate::exec::context::{ExecutionContext, GraphAccess};
use crate::exec::error::{ExecResult, ExecutionError};
use crate::exec::memory_budget::{MemoryBudget, MemoryCharge};
use crate::exec::operators::{self, profile_lines};
use crate::exec::result::{materialize, QueryResult};
use crate::exec::{record_size, Record};
use crate::ast::IndexStatement;
use crate::plan::logical::{PlannedStatement, QueryPlan};
use crate::storage::indexes::{IndexDefinition, IndexHandle, IndexKind};
use crate::storage::{Graph, Value};

/// Everything one execution needs besides the plan and the graph
#[derive(Debug, Clone, Default)]
pub struct ExecutionRequest {
    pub parameters: HashMap<String, Value>,
    pub profile: bool,
    /// Abort read queries past this instant
    pub deadline: Option<Instant>,
    /// Per-query memory cap in bytes; 0 is unlimited
    pub memory_limit: usize,
}

impl ExecutionRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parameters(mut self, parameters: HashMap<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_profile(mut self, profile: bool) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_memory_limit(mut self, limit: usize) -> Self {
        self.memory_limit = limit;
        self
    }

    fn budget(&self) -> MemoryBudget {
        if self.memory_limit == 0 {
            MemoryBudget::unlimited()
        } else {
            MemoryBudget::new(self.memory_limit)
        }
    }
}

/// Outcome of a successful execution
#[derive(Debug)]
pub struct Execution {
    pub result: QueryResult,
    /// Indexes registered by the statement; they still need populating
    pub new_indexes: Vec<IndexHandle>,
    /// Annotated operator tree, when profiling
    pub profile: Vec<String>,
}

/// Run a read-only statement under shared access.
pub fn execute_read(
    statement: &PlannedStatement,
    graph: &Graph,
    request: ExecutionRequest,
) -> ExecResult<Execution> {
    if statement.is_write() {
        return Err(ExecutionError::Internal(
            "write plan executed under a read lock".to_string(),
        ));
    }
    match statement {
        PlannedStatement::Query(plan) => run(plan, GraphAccess::Read(graph), request, true),
        _ => Err(ExecutionError::Internal("index statement is not read-only".to_string())),
    }
}

/// Run any statement under exclusive access. Writes are committed on
/// success and rolled back on every error.
pub fn execute_write(
    statement: &PlannedStatement,
    graph: &mut Graph,
    request: ExecutionRequest,
) -> ExecResult<Execution> {
    let started = Instant::now();
    graph.begin_write();
    let outcome = match statement {
        PlannedStatement::Query(plan) => {
            let deadline_applies = !plan.root.is_write();
            run(plan, GraphAccess::Write(graph), request, deadline_applies)
        }
        PlannedStatement::CreateIndex(index) => create_index(graph, index),
        PlannedStatement::DropIndex(index) => drop_index(graph, index),
    };
    let mut execution = match outcome.and_then(|e| graph.commit().map(|_| e).map_err(Into::into)) {
        Ok(execution) => execution,
        Err(e) => {
            graph.rollback();
            log::warn!("graph '{}': query aborted ({}): {}", graph.name(), e.kind(), e);
            return Err(e);
        }
    };
    execution.result.graph_version = graph.version();
    if !matches!(statement, PlannedStatement::Query(_)) {
        execution.result.stats.execution_time_ms = started.elapsed().as_secs_f64() * 1000.0;
    }
    Ok(execution)
}

fn run(
    plan: &QueryPlan,
    access: GraphAccess<'_>,
    request: ExecutionRequest,
    deadline_applies: bool,
) -> ExecResult<Execution> {
    let started = Instant::now();
    let budget = request.budget();
    let deadline = if deadline_applies { request.deadline } else { None };
    let mut ctx = ExecutionContext::new(access, request.parameters, budget).with_deadline(deadline);

    // CYPHER name=value prefixes override parameters passed alongside
    let empty: Record = Vec::new();
    for (name, expr) in &plan.parameters {
        let value = ctx.eval(expr, &empty)?;
        ctx.parameters.insert(name.clone(), value);
    }

    let mut root = operators::build(&plan.root, request.profile)?;
    root.open(&mut ctx)?;
    let mut rows = Vec::new();
    let mut charge = MemoryCharge::default();
    let width = plan.columns.len();
    let pulled = (|| -> ExecResult<()> {
        while let Some(mut record) = root.next(&mut ctx)? {
            ctx.check_deadline()?;
            if width == 0 {
                continue;
            }
            record.resize(width, Value::Null);
            charge.add(&ctx.budget, record_size(&record))?;
            rows.push(record);
        }
        Ok(())
    })();
    root.close();
    charge.release(&ctx.budget);
    pulled?;

    let profile = if request.profile {
        profile_lines(root.as_ref())
    } else {
        Vec::new()
    };

    let stats = std::mem::take(&mut ctx.stats);
    let new_indexes = std::mem::take(&mut ctx.new_indexes);
    let graph = ctx.graph();
    let mut result = QueryResult::new(plan.columns.clone());
    result.rows = rows
        .into_iter()
        .map(|row| row.into_iter().map(|v| materialize(graph, v)).collect())
        .collect();
    result.graph_version = graph.version();
    result.stats = stats;
    result.stats.execution_time_ms = started.elapsed().as_secs_f64() * 1000.0;
    log::debug!(
        "executed plan: {} row(s), peak memory {} bytes",
        result.rows.len(),
        ctx.budget.peak()
    );

    Ok(Execution {
        result,
        new_indexes,
        profile,
    })
}

fn create_index(graph: &mut Graph, index: &IndexStatement) -> ExecResult<Execution> {
    let mut new_indexes = Vec::new();
    let mut result = QueryResult::default();
    for property in &index.properties {
        let def = IndexDefinition::exact(index.entity, &index.label, vec![property.clone()]);
        new_indexes.push(graph.create_index(def)?);
        result.stats.indices_created += 1;
    }
    Ok(Execution {
        result,
        new_indexes,
        profile: Vec::new(),
    })
}

fn drop_index(graph: &mut Graph, index: &IndexStatement) -> ExecResult<Execution> {
    let mut result = QueryResult::default();
    for property in &index.properties {
        graph.drop_index(
            IndexKind::Exact,
            index.entity,
            &index.label,
            std::slice::from_ref(property),
        )?;
        result.stats.indices_deleted += 1;
    }
    Ok(Execution {
        result,
        new_indexes: Vec::new(),
        profile: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ErrorKind;
    use crate::plan::expr::Expr;
    use crate::plan::logical::{CreateSpec, LogicalOp, LogicalPlan, NodeCreate};
    use crate::storage::EntityKind;

    fn create_plan(value: Expr) -> PlannedStatement {
        let create = LogicalOp::Create(CreateSpec {
            nodes: vec![NodeCreate {
                slot: 0,
                labels: vec!["L".to_string()],
                properties: Some(Expr::Map(vec![("v".to_string(), value)])),
            }],
            ..Default::default()
        });
        PlannedStatement::Query(QueryPlan {
            root: LogicalPlan::unary(LogicalOp::Results, LogicalPlan::leaf(create)),
            columns: Vec::new(),
            parameters: Vec::new(),
        })
    }

    #[test]
    fn test_write_commits_and_reports_stats() {
        let mut graph = Graph::new("g");
        let execution = execute_write(&create_plan(Expr::constant(1i64)), &mut graph, ExecutionRequest::new()).unwrap();
        assert_eq!(execution.result.stats.nodes_created, 1);
        assert_eq!(execution.result.stats.properties_set, 1);
        assert_eq!(graph.node_count(), 1);
        assert_eq!(execution.result.graph_version, graph.version());
    }

    #[test]
    fn test_failed_write_rolls_back() {
        let mut graph = Graph::new("g");
        // integer division by zero fails after the node is staged
        let failing = Expr::binary(
            crate::ast::BinaryOperator::Divide,
            Expr::constant(1i64),
            Expr::constant(0i64),
        );
        let err = execute_write(&create_plan(failing), &mut graph, ExecutionRequest::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DivisionByZero);
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn test_read_rejects_write_plan() {
        let graph = Graph::new("g");
        let err = execute_read(&create_plan(Expr::constant(1i64)), &graph, ExecutionRequest::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_index_statements() {
        let mut graph = Graph::new("g");
        let index = IndexStatement {
            entity: EntityKind::Node,
            label: "L".to_string(),
            properties: vec!["v".to_string()],
        };
        let created = execute_write(
            &PlannedStatement::CreateIndex(index.clone()),
            &mut graph,
            ExecutionRequest::new(),
        )
        .unwrap();
        assert_eq!(created.result.stats.indices_created, 1);
        assert_eq!(created.new_indexes.len(), 1);

        let again = execute_write(
            &PlannedStatement::CreateIndex(index.clone()),
            &mut graph,
            ExecutionRequest::new(),
        )
        .unwrap_err();
        assert_eq!(again.kind(), ErrorKind::IndexExists);

        let dropped = execute_write(&PlannedStatement::DropIndex(index), &mut graph, ExecutionRequest::new()).unwrap();
        assert_eq!(dropped.result.stats.indices_deleted, 1);
        assert!(created.new_indexes[0].state().is_cancelled());
    }

    #[test]
    fn test_rows_padded_to_columns_and_memory_capped() {
        let graph = Graph::new("g");
        let unwind = LogicalPlan::leaf(LogicalOp::Unwind {
            expression: Expr::Call {
                function: crate::functions::registry().get("range").unwrap(),
                arguments: vec![Expr::constant(1i64), Expr::constant(1000i64)],
            },
            slot: 0,
        });
        let statement = PlannedStatement::Query(QueryPlan {
            root: LogicalPlan::unary(LogicalOp::Results, unwind),
            columns: vec!["i".to_string(), "missing".to_string()],
            parameters: Vec::new(),
        });
        let ok = execute_read(&statement, &graph, ExecutionRequest::new()).unwrap();
        assert_eq!(ok.result.rows.len(), 1000);
        assert!(ok.result.rows[0][1].is_null());

        let err = execute_read(&statement, &graph, ExecutionRequest::new().with_memory_limit(1024)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MemoryLimitExceeded);
    }
}
