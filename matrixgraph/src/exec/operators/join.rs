// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Binary operators: cartesian product, value hash join and the apply family
//!
//! All of them share the planner's slot layout, so combining two records
//! means copying the slots the right (inner) side binds onto the left one.

use std::collections::HashMap;

use crate::exec::context::ExecutionContext;
use crate::exec::error::ExecResult;
use crate::exec::memory_budget::MemoryCharge;
use crate::exec::operators::Operator;
use crate::exec::{record_size, set_slot, slot_value, Record};
use crate::plan::expr::Expr;
use crate::storage::Value;

fn merge_slots(left: &Record, right: &Record, slots: &[usize]) -> Record {
    let mut out = left.clone();
    for slot in slots {
        set_slot(&mut out, *slot, slot_value(right, *slot).clone());
    }
    out
}

/// Combines independent match components. The right side is rewound for
/// every left record.
pub struct CartesianProductOp {
    left: Box<dyn Operator>,
    right: Box<dyn Operator>,
    right_slots: Vec<usize>,
    current: Option<Record>,
    right_fresh: bool,
}

impl CartesianProductOp {
    pub fn new(left: Box<dyn Operator>, right: Box<dyn Operator>, right_slots: Vec<usize>) -> Self {
        Self {
            left,
            right,
            right_slots,
            current: None,
            right_fresh: true,
        }
    }
}

impl Operator for CartesianProductOp {
    fn name(&self) -> &'static str {
        "Cartesian Product"
    }

    fn inputs(&self) -> Vec<&dyn Operator> {
        vec![self.left.as_ref(), self.right.as_ref()]
    }

    fn inputs_mut(&mut self) -> Vec<&mut dyn Operator> {
        vec![self.left.as_mut(), self.right.as_mut()]
    }

    fn next(&mut self, ctx: &mut ExecutionContext<'_>) -> ExecResult<Option<Record>> {
        loop {
            if let Some(left) = &self.current {
                if let Some(right) = self.right.next(ctx)? {
                    return Ok(Some(merge_slots(left, &right, &self.right_slots)));
                }
            }
            match self.left.next(ctx)? {
                Some(left) => {
                    if !self.right_fresh {
                        self.right.reset();
                    }
                    self.right_fresh = false;
                    self.current = Some(left);
                }
                None => return Ok(None),
            }
        }
    }

    fn rewind(&mut self) {
        self.current = None;
        // the reset that reached us also rewound the right side
        self.right_fresh = true;
    }
}

/// Equality join. The right side is built into a hash table once; null and
/// NaN keys never match.
pub struct ValueHashJoinOp {
    left: Box<dyn Operator>,
    right: Box<dyn Operator>,
    left_key: Expr,
    right_key: Expr,
    right_slots: Vec<usize>,
    table: Option<HashMap<Value, Vec<Record>>>,
    charge: MemoryCharge,
    current: Option<(Record, Vec<Record>)>,
}

fn joinable(key: &Value) -> bool {
    match key {
        Value::Null => false,
        Value::Float(f) => !f.is_nan(),
        _ => true,
    }
}

/// Integers and integral floats share one hash bucket.
fn bucket_key(key: Value) -> Value {
    match key {
        Value::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Value::Integer(f as i64),
        other => other,
    }
}

impl ValueHashJoinOp {
    pub fn new(
        left: Box<dyn Operator>,
        right: Box<dyn Operator>,
        left_key: Expr,
        right_key: Expr,
        right_slots: Vec<usize>,
    ) -> Self {
        Self {
            left,
            right,
            left_key,
            right_key,
            right_slots,
            table: None,
            charge: MemoryCharge::default(),
            current: None,
        }
    }

    fn build(&mut self, ctx: &mut ExecutionContext<'_>) -> ExecResult<HashMap<Value, Vec<Record>>> {
        let mut table: HashMap<Value, Vec<Record>> = HashMap::new();
        while let Some(record) = self.right.next(ctx)? {
            let key = ctx.eval(&self.right_key, &record)?;
            if !joinable(&key) {
                continue;
            }
            self.charge.add(&ctx.budget, record_size(&record))?;
            table.entry(bucket_key(key)).or_default().push(record);
        }
        Ok(table)
    }
}

impl Operator for ValueHashJoinOp {
    fn name(&self) -> &'static str {
        "Value Hash Join"
    }

    fn inputs(&self) -> Vec<&dyn Operator> {
        vec![self.left.as_ref(), self.right.as_ref()]
    }

    fn inputs_mut(&mut self) -> Vec<&mut dyn Operator> {
        vec![self.left.as_mut(), self.right.as_mut()]
    }

    fn next(&mut self, ctx: &mut ExecutionContext<'_>) -> ExecResult<Option<Record>> {
        if self.table.is_none() {
            let table = self.build(ctx)?;
            self.table = Some(table);
        }
        loop {
            if let Some((left, matches)) = &mut self.current {
                if let Some(right) = matches.pop() {
                    return Ok(Some(merge_slots(left, &right, &self.right_slots)));
                }
            }
            let left = match self.left.next(ctx)? {
                Some(left) => left,
                None => {
                    self.charge.release(&ctx.budget);
                    return Ok(None);
                }
            };
            let key = ctx.eval(&self.left_key, &left)?;
            if !joinable(&key) {
                continue;
            }
            let mut matches = self
                .table
                .as_ref()
                .and_then(|t| t.get(&bucket_key(key)))
                .cloned()
                .unwrap_or_default();
            // popped from the back; keep build order
            matches.reverse();
            self.current = Some((left, matches));
        }
    }

    fn rewind(&mut self) {
        self.table = None;
        self.current = None;
    }
}

/// Runs the inner plan once per outer record. The inner plan's `Argument`
/// leaf replays the outer record, so inner records already carry it.
/// Optional applies null-extend outer records the inner plan rejects.
pub struct ApplyOp {
    outer: Box<dyn Operator>,
    inner: Box<dyn Operator>,
    argument: usize,
    optional: bool,
    inner_slots: Vec<usize>,
    current: Option<Record>,
    matched: bool,
}

impl ApplyOp {
    pub fn new(
        outer: Box<dyn Operator>,
        inner: Box<dyn Operator>,
        argument: usize,
        optional: bool,
        inner_slots: Vec<usize>,
    ) -> Self {
        Self {
            outer,
            inner,
            argument,
            optional,
            inner_slots,
            current: None,
            matched: false,
        }
    }
}

impl Operator for ApplyOp {
    fn name(&self) -> &'static str {
        if self.optional {
            "Optional"
        } else {
            "Apply"
        }
    }

    fn inputs(&self) -> Vec<&dyn Operator> {
        vec![self.outer.as_ref(), self.inner.as_ref()]
    }

    fn inputs_mut(&mut self) -> Vec<&mut dyn Operator> {
        vec![self.outer.as_mut(), self.inner.as_mut()]
    }

    fn next(&mut self, ctx: &mut ExecutionContext<'_>) -> ExecResult<Option<Record>> {
        loop {
            if self.current.is_some() {
                if let Some(record) = self.inner.next(ctx)? {
                    self.matched = true;
                    return Ok(Some(record));
                }
                let outer = self.current.take();
                if self.optional && !self.matched {
                    if let Some(mut record) = outer {
                        for slot in &self.inner_slots {
                            set_slot(&mut record, *slot, Value::Null);
                        }
                        return Ok(Some(record));
                    }
                }
                continue;
            }
            match self.outer.next(ctx)? {
                Some(outer) => {
                    ctx.set_argument(self.argument, outer.clone());
                    self.inner.reset();
                    self.current = Some(outer);
                    self.matched = false;
                }
                None => return Ok(None),
            }
        }
    }

    fn rewind(&mut self) {
        self.current = None;
        self.matched = false;
    }
}

/// Collects the inner plan's output for every outer record into one list
/// value, e.g. the paths of a pattern expression.
pub struct RollupApplyOp {
    outer: Box<dyn Operator>,
    inner: Box<dyn Operator>,
    argument: usize,
    collect: Expr,
    slot: usize,
}

impl RollupApplyOp {
    pub fn new(
        outer: Box<dyn Operator>,
        inner: Box<dyn Operator>,
        argument: usize,
        collect: Expr,
        slot: usize,
    ) -> Self {
        Self {
            outer,
            inner,
            argument,
            collect,
            slot,
        }
    }
}

impl Operator for RollupApplyOp {
    fn name(&self) -> &'static str {
        "Rollup Apply"
    }

    fn inputs(&self) -> Vec<&dyn Operator> {
        vec![self.outer.as_ref(), self.inner.as_ref()]
    }

    fn inputs_mut(&mut self) -> Vec<&mut dyn Operator> {
        vec![self.outer.as_mut(), self.inner.as_mut()]
    }

    fn next(&mut self, ctx: &mut ExecutionContext<'_>) -> ExecResult<Option<Record>> {
        let mut outer = match self.outer.next(ctx)? {
            Some(outer) => outer,
            None => return Ok(None),
        };
        ctx.set_argument(self.argument, outer.clone());
        self.inner.reset();
        let mut items = Vec::new();
        while let Some(record) = self.inner.next(ctx)? {
            items.push(ctx.eval(&self.collect, &record)?);
        }
        set_slot(&mut outer, self.slot, Value::List(items));
        Ok(Some(outer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinaryOperator;
    use crate::exec::operators::{collect, ArgumentOp, FilterOp, OnceOp, UnwindOp};
    use crate::exec::{GraphAccess, MemoryBudget};
    use crate::storage::Graph;

    fn run(op: &mut dyn Operator) -> Vec<Record> {
        let g = Graph::new("g");
        let mut ctx = ExecutionContext::new(GraphAccess::Read(&g), HashMap::new(), MemoryBudget::unlimited());
        op.open(&mut ctx).unwrap();
        collect(op, &mut ctx).unwrap()
    }

    fn unwind(items: Vec<Value>, slot: usize) -> Box<dyn Operator> {
        Box::new(UnwindOp::new(Box::new(OnceOp::new()), Expr::Constant(Value::List(items)), slot))
    }

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().map(|v| Value::Integer(*v)).collect()
    }

    #[test]
    fn test_cartesian_product_rewinds_right() {
        let mut op = CartesianProductOp::new(unwind(ints(&[1, 2]), 0), unwind(ints(&[10, 20, 30]), 1), vec![1]);
        let rows = run(&mut op);
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[3], ints(&[2, 10]));
    }

    #[test]
    fn test_hash_join_skips_null_and_matches_numerically() {
        let left = unwind(vec![Value::Integer(1), Value::Null, Value::Integer(2)], 0);
        let right = unwind(vec![Value::Float(1.0), Value::Null, Value::Integer(3)], 1);
        let mut op = ValueHashJoinOp::new(left, right, Expr::Slot(0), Expr::Slot(1), vec![1]);
        let rows = run(&mut op);
        assert_eq!(rows, vec![vec![Value::Integer(1), Value::Float(1.0)]]);
    }

    #[test]
    fn test_optional_apply_null_extends() {
        // inner keeps only outer values greater than one
        let inner = FilterOp::new(
            Box::new(ArgumentOp::new(0)),
            Expr::binary(BinaryOperator::GreaterThan, Expr::Slot(0), Expr::constant(1i64)),
        );
        let inner = UnwindOp::new(Box::new(inner), Expr::constant(vec![7i64]), 1);
        let mut op = ApplyOp::new(unwind(ints(&[1, 2]), 0), Box::new(inner), 0, true, vec![1]);
        let rows = run(&mut op);
        assert_eq!(rows, vec![vec![Value::Integer(1), Value::Null], ints(&[2, 7])]);
    }

    #[test]
    fn test_rollup_collects_per_outer_record() {
        let inner = UnwindOp::new(Box::new(ArgumentOp::new(0)), Expr::Slot(0), 1);
        let outer = unwind(vec![Value::List(ints(&[1, 2])), Value::List(Vec::new())], 0);
        let mut op = RollupApplyOp::new(outer, Box::new(inner), 0, Expr::Slot(1), 2);
        let rows = run(&mut op);
        assert_eq!(rows[0][2], Value::List(ints(&[1, 2])));
        assert_eq!(rows[1][2], Value::List(Vec::new()));
    }
}
