// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Record-at-a-time operators: filter, projection and unwind

use std::collections::VecDeque;

use crate::exec::context::ExecutionContext;
use crate::exec::error::ExecResult;
use crate::exec::operators::Operator;
use crate::exec::{set_slot, Record};
use crate::plan::expr::Expr;
use crate::storage::Value;

/// Drops records whose predicate is not exactly `true`.
pub struct FilterOp {
    input: Box<dyn Operator>,
    predicate: Expr,
}

impl FilterOp {
    pub fn new(input: Box<dyn Operator>, predicate: Expr) -> Self {
        Self { input, predicate }
    }
}

impl Operator for FilterOp {
    fn name(&self) -> &'static str {
        "Filter"
    }

    fn inputs(&self) -> Vec<&dyn Operator> {
        vec![self.input.as_ref()]
    }

    fn inputs_mut(&mut self) -> Vec<&mut dyn Operator> {
        vec![self.input.as_mut()]
    }

    fn next(&mut self, ctx: &mut ExecutionContext<'_>) -> ExecResult<Option<Record>> {
        while let Some(record) = self.input.next(ctx)? {
            if ctx.eval_predicate(&self.predicate, &record)? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }
}

/// Evaluates expressions into further slots of the incoming record.
pub struct ExtendOp {
    input: Box<dyn Operator>,
    items: Vec<(usize, Expr)>,
}

impl ExtendOp {
    pub fn new(input: Box<dyn Operator>, items: Vec<(usize, Expr)>) -> Self {
        Self { input, items }
    }
}

impl Operator for ExtendOp {
    fn name(&self) -> &'static str {
        "Project"
    }

    fn inputs(&self) -> Vec<&dyn Operator> {
        vec![self.input.as_ref()]
    }

    fn inputs_mut(&mut self) -> Vec<&mut dyn Operator> {
        vec![self.input.as_mut()]
    }

    fn next(&mut self, ctx: &mut ExecutionContext<'_>) -> ExecResult<Option<Record>> {
        let mut record = match self.input.next(ctx)? {
            Some(record) => record,
            None => return Ok(None),
        };
        // items may read slots written by earlier items
        for (slot, expr) in &self.items {
            let value = ctx.eval(expr, &record)?;
            set_slot(&mut record, *slot, value);
        }
        Ok(Some(record))
    }
}

/// Emits a fresh record holding only the projected expressions.
pub struct ProjectOp {
    input: Box<dyn Operator>,
    items: Vec<Expr>,
}

impl ProjectOp {
    pub fn new(input: Box<dyn Operator>, items: Vec<Expr>) -> Self {
        Self { input, items }
    }
}

impl Operator for ProjectOp {
    fn name(&self) -> &'static str {
        "Project"
    }

    fn inputs(&self) -> Vec<&dyn Operator> {
        vec![self.input.as_ref()]
    }

    fn inputs_mut(&mut self) -> Vec<&mut dyn Operator> {
        vec![self.input.as_mut()]
    }

    fn next(&mut self, ctx: &mut ExecutionContext<'_>) -> ExecResult<Option<Record>> {
        let record = match self.input.next(ctx)? {
            Some(record) => record,
            None => return Ok(None),
        };
        let out = self
            .items
            .iter()
            .map(|expr| ctx.eval(expr, &record))
            .collect::<ExecResult<Record>>()?;
        Ok(Some(out))
    }
}

/// `UNWIND`: null yields nothing, a list one record per element, any other
/// value a single record.
pub struct UnwindOp {
    input: Box<dyn Operator>,
    expression: Expr,
    slot: usize,
    pending: VecDeque<Record>,
}

impl UnwindOp {
    pub fn new(input: Box<dyn Operator>, expression: Expr, slot: usize) -> Self {
        Self {
            input,
            expression,
            slot,
            pending: VecDeque::new(),
        }
    }
}

impl Operator for UnwindOp {
    fn name(&self) -> &'static str {
        "Unwind"
    }

    fn inputs(&self) -> Vec<&dyn Operator> {
        vec![self.input.as_ref()]
    }

    fn inputs_mut(&mut self) -> Vec<&mut dyn Operator> {
        vec![self.input.as_mut()]
    }

    fn next(&mut self, ctx: &mut ExecutionContext<'_>) -> ExecResult<Option<Record>> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Ok(Some(record));
            }
            let record = match self.input.next(ctx)? {
                Some(record) => record,
                None => return Ok(None),
            };
            let elements = match ctx.eval(&self.expression, &record)? {
                Value::Null => Vec::new(),
                Value::List(items) => items,
                other => vec![other],
            };
            for element in elements {
                let mut out = record.clone();
                set_slot(&mut out, self.slot, element);
                self.pending.push_back(out);
            }
        }
    }

    fn rewind(&mut self) {
        self.pending.clear();
    }
}
