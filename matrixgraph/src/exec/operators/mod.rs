// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Physical operators
//!
//! Operators are pull-based state machines: `open` prepares the subtree,
//! each `next` yields one record, `reset` rewinds to the just-opened state
//! (apply operators rewind their inner side once per outer record) and
//! `close` releases buffered state. Operators never spawn threads; a query
//! runs its whole pipeline on one worker.

mod aggregate;
mod join;
mod procedure;
mod project;
mod scan;
mod sort;
mod traverse;
mod write;

use std::time::Instant;

use crate::exec::context::ExecutionContext;
use crate::exec::error::ExecResult;
use crate::exec::Record;
use crate::plan::logical::{LogicalOp, LogicalPlan};

pub use aggregate::AggregateOp;
pub use join::{ApplyOp, CartesianProductOp, RollupApplyOp, ValueHashJoinOp};
pub use procedure::ProcedureCallOp;
pub use project::{ExtendOp, FilterOp, ProjectOp, UnwindOp};
pub use scan::{ArgumentOp, IndexScanOp, NodeScanOp, OnceOp};
pub use sort::{DistinctOp, LimitOp, ResultsOp, SkipOp, SortOp, UnionOp};
pub use traverse::{AllShortestPathsOp, TraverseOp, VarLenTraverseOp};
pub use write::{CreateOp, DeleteOp, MergeOp, UpdateOp};

/// Counters collected by `PROFILE`
#[derive(Debug, Clone, Copy, Default)]
pub struct OperatorProfile {
    pub records: u64,
    pub elapsed_ms: f64,
}

pub trait Operator {
    /// Display name, as printed by `EXPLAIN` and `PROFILE`
    fn name(&self) -> &'static str;

    fn inputs(&self) -> Vec<&dyn Operator>;

    fn inputs_mut(&mut self) -> Vec<&mut dyn Operator>;

    fn next(&mut self, ctx: &mut ExecutionContext<'_>) -> ExecResult<Option<Record>>;

    /// Prepare this operator's own state; inputs are already open.
    fn init(&mut self, _ctx: &mut ExecutionContext<'_>) -> ExecResult<()> {
        Ok(())
    }

    /// Drop this operator's own state so the next pull starts over.
    fn rewind(&mut self) {}

    fn profile(&self) -> Option<OperatorProfile> {
        None
    }

    /// Plan text shown next to the name
    fn describe(&self) -> Option<&str> {
        None
    }

    /// Hidden operators are left out of plan printouts.
    fn hidden(&self) -> bool {
        false
    }

    fn open(&mut self, ctx: &mut ExecutionContext<'_>) -> ExecResult<()> {
        for input in self.inputs_mut() {
            input.open(ctx)?;
        }
        self.init(ctx)
    }

    fn reset(&mut self) {
        for input in self.inputs_mut() {
            input.reset();
        }
        self.rewind();
    }

    fn close(&mut self) {
        for input in self.inputs_mut() {
            input.close();
        }
        self.rewind();
    }
}

/// Wraps an operator to count the records it produces and the time spent
/// inside its `next` calls, children included.
pub struct ProfiledOperator {
    inner: Box<dyn Operator>,
    text: Option<String>,
    stats: OperatorProfile,
}

impl ProfiledOperator {
    pub fn new(inner: Box<dyn Operator>, text: Option<String>) -> Self {
        Self {
            inner,
            text,
            stats: OperatorProfile::default(),
        }
    }
}

impl Operator for ProfiledOperator {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn inputs(&self) -> Vec<&dyn Operator> {
        self.inner.inputs()
    }

    fn inputs_mut(&mut self) -> Vec<&mut dyn Operator> {
        self.inner.inputs_mut()
    }

    fn next(&mut self, ctx: &mut ExecutionContext<'_>) -> ExecResult<Option<Record>> {
        let started = Instant::now();
        let record = self.inner.next(ctx);
        self.stats.elapsed_ms += started.elapsed().as_secs_f64() * 1000.0;
        if let Ok(Some(_)) = &record {
            self.stats.records += 1;
        }
        record
    }

    fn profile(&self) -> Option<OperatorProfile> {
        Some(self.stats)
    }

    fn describe(&self) -> Option<&str> {
        self.text.as_deref()
    }

    fn hidden(&self) -> bool {
        self.inner.hidden()
    }

    fn open(&mut self, ctx: &mut ExecutionContext<'_>) -> ExecResult<()> {
        self.inner.open(ctx)
    }

    fn reset(&mut self) {
        self.inner.reset()
    }

    fn close(&mut self) {
        self.inner.close()
    }
}

/// Render an executed, profiled operator tree.
pub fn profile_lines(root: &dyn Operator) -> Vec<String> {
    let mut lines = Vec::new();
    render_profile(root, 0, &mut lines);
    lines
}

fn render_profile(op: &dyn Operator, depth: usize, lines: &mut Vec<String>) {
    if op.hidden() {
        return;
    }
    let mut line = format!("{}{}", "    ".repeat(depth), op.name());
    if let Some(text) = op.describe() {
        line.push_str(" | ");
        line.push_str(text);
    }
    if let Some(stats) = op.profile() {
        line.push_str(&format!(
            " | Records produced: {}, Execution time: {:.6} ms",
            stats.records, stats.elapsed_ms
        ));
    }
    lines.push(line);
    for input in op.inputs() {
        render_profile(input, depth + 1, lines);
    }
}

/// Build the physical operator tree of a logical plan. A missing input is
/// replaced by a hidden operator emitting one empty record.
pub fn build(plan: &LogicalPlan, profile: bool) -> ExecResult<Box<dyn Operator>> {
    let mut inputs = plan
        .children
        .iter()
        .map(|child| build(child, profile))
        .collect::<ExecResult<Vec<_>>>()?
        .into_iter();
    let mut input = || -> Box<dyn Operator> {
        inputs
            .next()
            .unwrap_or_else(|| Box::new(OnceOp::new()))
    };

    let op: Box<dyn Operator> = match &plan.op {
        LogicalOp::Results => Box::new(ResultsOp::new(input())),
        LogicalOp::AllNodeScan(spec) | LogicalOp::LabelScan(spec) => {
            Box::new(NodeScanOp::new(spec.clone(), input()))
        }
        LogicalOp::IndexScan(spec) => Box::new(IndexScanOp::new(spec.clone(), input())),
        LogicalOp::Traverse(spec) => Box::new(TraverseOp::new(spec.clone(), false, input())),
        LogicalOp::ExpandInto(spec) => Box::new(TraverseOp::new(spec.clone(), true, input())),
        LogicalOp::VarLenTraverse(spec) => Box::new(VarLenTraverseOp::new(spec.clone(), input())),
        LogicalOp::AllShortestPaths(spec) => {
            Box::new(AllShortestPathsOp::new(spec.clone(), input()))
        }
        LogicalOp::CartesianProduct { right_slots } => {
            let left = input();
            Box::new(CartesianProductOp::new(left, input(), right_slots.clone()))
        }
        LogicalOp::ValueHashJoin {
            left_key,
            right_key,
            right_slots,
        } => {
            let left = input();
            Box::new(ValueHashJoinOp::new(
                left,
                input(),
                left_key.clone(),
                right_key.clone(),
                right_slots.clone(),
            ))
        }
        LogicalOp::Apply {
            argument,
            optional,
            inner_slots,
        } => {
            let (outer, inner) = outer_and_inner(plan, &mut input);
            Box::new(ApplyOp::new(
                outer,
                inner,
                *argument,
                *optional,
                inner_slots.clone(),
            ))
        }
        LogicalOp::RollupApply {
            argument,
            collect,
            slot,
        } => {
            let (outer, inner) = outer_and_inner(plan, &mut input);
            Box::new(RollupApplyOp::new(outer, inner, *argument, collect.clone(), *slot))
        }
        LogicalOp::Argument { id } => Box::new(ArgumentOp::new(*id)),
        LogicalOp::Filter(predicate) => Box::new(FilterOp::new(input(), predicate.clone())),
        LogicalOp::Extend(items) => Box::new(ExtendOp::new(input(), items.clone())),
        LogicalOp::Project(items) => Box::new(ProjectOp::new(input(), items.clone())),
        LogicalOp::Aggregate {
            keys,
            aggregates,
            width,
        } => Box::new(AggregateOp::new(
            input(),
            keys.clone(),
            aggregates.clone(),
            *width,
        )),
        LogicalOp::Sort {
            keys,
            width,
            skip,
            limit,
        } => Box::new(SortOp::new(
            input(),
            keys.clone(),
            *width,
            skip.clone(),
            limit.clone(),
        )),
        LogicalOp::Skip(count) => Box::new(SkipOp::new(input(), count.clone())),
        LogicalOp::Limit(count) => Box::new(LimitOp::new(input(), count.clone())),
        LogicalOp::Distinct { width } => Box::new(DistinctOp::new(input(), *width)),
        LogicalOp::Union => {
            let branches = (0..plan.children.len()).map(|_| input()).collect();
            Box::new(UnionOp::new(branches))
        }
        LogicalOp::Unwind { expression, slot } => {
            Box::new(UnwindOp::new(input(), expression.clone(), *slot))
        }
        LogicalOp::Create(spec) => Box::new(CreateOp::new(input(), spec.clone())),
        LogicalOp::Merge(spec) => {
            let (outer, matcher) = outer_and_inner(plan, &mut input);
            Box::new(MergeOp::new(outer, matcher, spec.clone()))
        }
        LogicalOp::Update(items) => Box::new(UpdateOp::new(input(), items.clone())),
        LogicalOp::Delete(targets) => Box::new(DeleteOp::new(input(), targets.clone())),
        LogicalOp::ProcedureCall {
            procedure,
            arguments,
            outputs,
        } => Box::new(ProcedureCallOp::new(
            input(),
            procedure.clone(),
            arguments.clone(),
            outputs.clone(),
        )),
    };

    if profile {
        Ok(Box::new(ProfiledOperator::new(op, plan.op.describe())))
    } else {
        Ok(op)
    }
}

/// Inputs of an operator that runs a subplan per outer record. A lone
/// child is the subplan; the outer side is then a single empty record.
fn outer_and_inner(
    plan: &LogicalPlan,
    input: &mut dyn FnMut() -> Box<dyn Operator>,
) -> (Box<dyn Operator>, Box<dyn Operator>) {
    if plan.children.len() < 2 {
        let inner = input();
        return (Box::new(OnceOp::new()), inner);
    }
    let outer = input();
    (outer, input())
}

/// Drain an opened operator into a vector of records.
pub fn collect(op: &mut dyn Operator, ctx: &mut ExecutionContext<'_>) -> ExecResult<Vec<Record>> {
    let mut out = Vec::new();
    while let Some(record) = op.next(ctx)? {
        ctx.check_deadline()?;
        out.push(record);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{GraphAccess, MemoryBudget};
    use crate::plan::expr::Expr;
    use crate::storage::{Graph, Value};
    use std::collections::HashMap;

    #[test]
    fn test_missing_input_becomes_single_empty_record() {
        let g = Graph::new("g");
        let mut ctx = ExecutionContext::new(GraphAccess::Read(&g), HashMap::new(), MemoryBudget::unlimited());
        let plan = LogicalPlan::leaf(LogicalOp::Project(vec![Expr::constant(1i64)]));
        let mut op = build(&plan, false).unwrap();
        op.open(&mut ctx).unwrap();
        let rows = collect(op.as_mut(), &mut ctx).unwrap();
        assert_eq!(rows, vec![vec![Value::Integer(1)]]);

        op.reset();
        assert_eq!(collect(op.as_mut(), &mut ctx).unwrap().len(), 1);
    }

    #[test]
    fn test_profile_counts_records() {
        let g = Graph::new("g");
        let mut ctx = ExecutionContext::new(GraphAccess::Read(&g), HashMap::new(), MemoryBudget::unlimited());
        let plan = LogicalPlan::unary(
            LogicalOp::Results,
            LogicalPlan::leaf(LogicalOp::Unwind {
                expression: Expr::constant(vec![1i64, 2, 3]),
                slot: 0,
            }),
        );
        let mut op = build(&plan, true).unwrap();
        op.open(&mut ctx).unwrap();
        collect(op.as_mut(), &mut ctx).unwrap();
        let lines = profile_lines(op.as_ref());
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Results | Records produced: 3"));
        assert!(lines[1].starts_with("    Unwind | Records produced: 3"));
    }
}
