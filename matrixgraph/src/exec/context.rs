// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Execution context shared by every operator of one query

use std::collections::HashMap;
use std::time::Instant;

use crate::exec::error::{ExecResult, ExecutionError};
use crate::exec::eval::Evaluator;
use crate::exec::memory_budget::MemoryBudget;
use crate::exec::result::QueryStatistics;
use crate::exec::Record;
use crate::plan::expr::Expr;
use crate::storage::indexes::IndexHandle;
use crate::storage::{Graph, Value};

/// How the query holds its graph: shared for reads, exclusive for writes
pub enum GraphAccess<'g> {
    Read(&'g Graph),
    Write(&'g mut Graph),
}

pub struct ExecutionContext<'g> {
    graph: GraphAccess<'g>,
    pub parameters: HashMap<String, Value>,
    pub budget: MemoryBudget,
    pub stats: QueryStatistics,
    deadline: Option<Instant>,
    /// Records injected into `Argument` leaves, by argument id
    arguments: Vec<Option<Record>>,
    /// Indexes created by this query, populated once the write commits
    pub(crate) new_indexes: Vec<IndexHandle>,
}

impl<'g> ExecutionContext<'g> {
    pub fn new(graph: GraphAccess<'g>, parameters: HashMap<String, Value>, budget: MemoryBudget) -> Self {
        Self {
            graph,
            parameters,
            budget,
            stats: QueryStatistics::default(),
            deadline: None,
            arguments: Vec::new(),
            new_indexes: Vec::new(),
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn graph(&self) -> &Graph {
        match &self.graph {
            GraphAccess::Read(g) => g,
            GraphAccess::Write(g) => g,
        }
    }

    pub fn graph_mut(&mut self) -> ExecResult<&mut Graph> {
        match &mut self.graph {
            GraphAccess::Write(g) => Ok(g),
            GraphAccess::Read(_) => Err(ExecutionError::Internal(
                "write attempted under a read lock".to_string(),
            )),
        }
    }

    pub fn is_writable(&self) -> bool {
        matches!(self.graph, GraphAccess::Write(_))
    }

    /// Fail with `Timeout` once the read deadline has passed.
    pub fn check_deadline(&self) -> ExecResult<()> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(ExecutionError::Timeout),
            _ => Ok(()),
        }
    }

    pub fn set_argument(&mut self, id: usize, record: Record) {
        if self.arguments.len() <= id {
            self.arguments.resize(id + 1, None);
        }
        self.arguments[id] = Some(record);
    }

    pub fn argument(&self, id: usize) -> Option<&Record> {
        self.arguments.get(id).and_then(Option::as_ref)
    }

    /// Evaluate `expr` against `record`.
    pub fn eval(&self, expr: &Expr, record: &Record) -> ExecResult<Value> {
        Evaluator::new(self).eval(expr, record)
    }

    /// Evaluate a predicate; only an exact `true` passes.
    pub fn eval_predicate(&self, expr: &Expr, record: &Record) -> ExecResult<bool> {
        Ok(matches!(self.eval(expr, record)?, Value::Boolean(true)))
    }

    /// Bytes still available to transient allocations, when limited
    pub fn memory_headroom(&self) -> Option<usize> {
        self.budget
            .is_limited()
            .then(|| self.budget.limit().saturating_sub(self.budget.allocated()))
    }
}
