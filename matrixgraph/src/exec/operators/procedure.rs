// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! `CALL` operator

use std::collections::VecDeque;
use std::sync::Arc;

use crate::exec::context::ExecutionContext;
use crate::exec::error::ExecResult;
use crate::exec::operators::Operator;
use crate::exec::{set_slot, Record};
use crate::plan::expr::Expr;
use crate::procedures::Procedure;
use crate::storage::Value;

/// Invokes a procedure once per input record and binds the yielded columns.
pub struct ProcedureCallOp {
    input: Box<dyn Operator>,
    procedure: Arc<dyn Procedure>,
    arguments: Vec<Expr>,
    /// `(output index, slot)` pairs
    outputs: Vec<(usize, usize)>,
    pending: VecDeque<Record>,
}

impl ProcedureCallOp {
    pub fn new(
        input: Box<dyn Operator>,
        procedure: Arc<dyn Procedure>,
        arguments: Vec<Expr>,
        outputs: Vec<(usize, usize)>,
    ) -> Self {
        Self {
            input,
            procedure,
            arguments,
            outputs,
            pending: VecDeque::new(),
        }
    }
}

impl Operator for ProcedureCallOp {
    fn name(&self) -> &'static str {
        "ProcedureCall"
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
            let arguments = self
                .arguments
                .iter()
                .map(|a| ctx.eval(a, &record))
                .collect::<ExecResult<Vec<Value>>>()?;
            for row in self.procedure.invoke(ctx, &arguments)? {
                let mut out = record.clone();
                for (index, slot) in &self.outputs {
                    let value = row.get(*index).cloned().unwrap_or(Value::Null);
                    set_slot(&mut out, *slot, value);
                }
                self.pending.push_back(out);
            }
        }
    }

    fn rewind(&mut self) {
        self.pending.clear();
    }
}
