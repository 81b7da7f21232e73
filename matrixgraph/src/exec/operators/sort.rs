// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Ordering, paging, deduplication and union

use std::collections::{HashSet, VecDeque};

use crate::exec::context::ExecutionContext;
use crate::exec::error::{ExecResult, ExecutionError};
use crate::exec::memory_budget::MemoryCharge;
use crate::exec::operators::Operator;
use crate::exec::streaming_topk::{compare_keys, StreamingTopK};
use crate::exec::{record_size, slot_value, Record};
use crate::plan::expr::Expr;
use crate::plan::logical::SortKey;
use crate::storage::Value;

/// Root of every query plan; the executor drains it.
pub struct ResultsOp {
    input: Box<dyn Operator>,
}

impl ResultsOp {
    pub fn new(input: Box<dyn Operator>) -> Self {
        Self { input }
    }
}

impl Operator for ResultsOp {
    fn name(&self) -> &'static str {
        "Results"
    }

    fn inputs(&self) -> Vec<&dyn Operator> {
        vec![self.input.as_ref()]
    }

    fn inputs_mut(&mut self) -> Vec<&mut dyn Operator> {
        vec![self.input.as_mut()]
    }

    fn next(&mut self, ctx: &mut ExecutionContext<'_>) -> ExecResult<Option<Record>> {
        self.input.next(ctx)
    }
}

/// Evaluate a `SKIP`/`LIMIT` count. Counts are constants or parameters.
fn row_count(ctx: &ExecutionContext<'_>, clause: &str, expr: &Expr) -> ExecResult<usize> {
    match ctx.eval(expr, &Vec::new())? {
        Value::Integer(n) if n >= 0 => Ok(n as usize),
        Value::Integer(_) => Err(ExecutionError::Argument(format!(
            "{} specified value of invalid type, must be a positive integer",
            clause
        ))),
        other => Err(ExecutionError::type_mismatch("Integer", other.type_name())),
    }
}

/// Sorts its whole input. When the downstream `SKIP`/`LIMIT` are known,
/// only the best `skip + limit` records are retained.
pub struct SortOp {
    input: Box<dyn Operator>,
    keys: Vec<SortKey>,
    width: usize,
    skip: Option<Expr>,
    limit: Option<Expr>,
    output: Option<VecDeque<Record>>,
    charge: MemoryCharge,
}

impl SortOp {
    pub fn new(
        input: Box<dyn Operator>,
        keys: Vec<SortKey>,
        width: usize,
        skip: Option<Expr>,
        limit: Option<Expr>,
    ) -> Self {
        Self {
            input,
            keys,
            width,
            skip,
            limit,
            output: None,
            charge: MemoryCharge::default(),
        }
    }

    fn sort_keys(&self, record: &Record) -> Vec<Value> {
        self.keys
            .iter()
            .map(|k| slot_value(record, k.slot).clone())
            .collect()
    }

    fn consume(&mut self, ctx: &mut ExecutionContext<'_>) -> ExecResult<Vec<Record>> {
        let descending: Vec<bool> = self.keys.iter().map(|k| k.descending).collect();
        let bound = match &self.limit {
            Some(limit) => {
                let skip = match &self.skip {
                    Some(skip) => row_count(ctx, "SKIP", skip)?,
                    None => 0,
                };
                Some(skip.saturating_add(row_count(ctx, "LIMIT", limit)?))
            }
            None => None,
        };

        if let Some(k) = bound {
            let mut heap = StreamingTopK::new(k, descending);
            while let Some(record) = self.input.next(ctx)? {
                let keys = self.sort_keys(&record);
                heap.add(keys, record);
            }
            return Ok(heap.into_sorted());
        }

        let mut rows: Vec<(Vec<Value>, Record)> = Vec::new();
        while let Some(record) = self.input.next(ctx)? {
            self.charge.add(&ctx.budget, record_size(&record))?;
            rows.push((self.sort_keys(&record), record));
        }
        rows.sort_by(|a, b| compare_keys(&a.0, &b.0, &descending));
        Ok(rows.into_iter().map(|(_, record)| record).collect())
    }
}

impl Operator for SortOp {
    fn name(&self) -> &'static str {
        "Sort"
    }

    fn inputs(&self) -> Vec<&dyn Operator> {
        vec![self.input.as_ref()]
    }

    fn inputs_mut(&mut self) -> Vec<&mut dyn Operator> {
        vec![self.input.as_mut()]
    }

    fn next(&mut self, ctx: &mut ExecutionContext<'_>) -> ExecResult<Option<Record>> {
        if self.output.is_none() {
            let sorted = self.consume(ctx)?;
            self.charge.release(&ctx.budget);
            self.output = Some(sorted.into());
        }
        let width = self.width;
        Ok(self.output.as_mut().and_then(VecDeque::pop_front).map(|mut record| {
            // drop sort-only columns
            record.truncate(width);
            record
        }))
    }

    fn rewind(&mut self) {
        self.output = None;
    }
}

pub struct SkipOp {
    input: Box<dyn Operator>,
    count: Expr,
    remaining: Option<usize>,
}

impl SkipOp {
    pub fn new(input: Box<dyn Operator>, count: Expr) -> Self {
        Self {
            input,
            count,
            remaining: None,
        }
    }
}

impl Operator for SkipOp {
    fn name(&self) -> &'static str {
        "Skip"
    }

    fn inputs(&self) -> Vec<&dyn Operator> {
        vec![self.input.as_ref()]
    }

    fn inputs_mut(&mut self) -> Vec<&mut dyn Operator> {
        vec![self.input.as_mut()]
    }

    fn init(&mut self, ctx: &mut ExecutionContext<'_>) -> ExecResult<()> {
        self.remaining = Some(row_count(ctx, "SKIP", &self.count)?);
        Ok(())
    }

    fn next(&mut self, ctx: &mut ExecutionContext<'_>) -> ExecResult<Option<Record>> {
        let mut remaining = match self.remaining {
            Some(n) => n,
            None => row_count(ctx, "SKIP", &self.count)?,
        };
        while remaining > 0 {
            if self.input.next(ctx)?.is_none() {
                self.remaining = Some(0);
                return Ok(None);
            }
            remaining -= 1;
        }
        self.remaining = Some(0);
        self.input.next(ctx)
    }

    fn rewind(&mut self) {
        self.remaining = None;
    }
}

pub struct LimitOp {
    input: Box<dyn Operator>,
    count: Expr,
    remaining: Option<usize>,
}

impl LimitOp {
    pub fn new(input: Box<dyn Operator>, count: Expr) -> Self {
        Self {
            input,
            count,
            remaining: None,
        }
    }
}

impl Operator for LimitOp {
    fn name(&self) -> &'static str {
        "Limit"
    }

    fn inputs(&self) -> Vec<&dyn Operator> {
        vec![self.input.as_ref()]
    }

    fn inputs_mut(&mut self) -> Vec<&mut dyn Operator> {
        vec![self.input.as_mut()]
    }

    fn init(&mut self, ctx: &mut ExecutionContext<'_>) -> ExecResult<()> {
        self.remaining = Some(row_count(ctx, "LIMIT", &self.count)?);
        Ok(())
    }

    fn next(&mut self, ctx: &mut ExecutionContext<'_>) -> ExecResult<Option<Record>> {
        let remaining = match self.remaining {
            Some(n) => n,
            None => row_count(ctx, "LIMIT", &self.count)?,
        };
        // stop pulling once exhausted so upstream writes do not run further
        if remaining == 0 {
            self.remaining = Some(0);
            return Ok(None);
        }
        let record = self.input.next(ctx)?;
        self.remaining = Some(if record.is_some() { remaining - 1 } else { 0 });
        Ok(record)
    }

    fn rewind(&mut self) {
        self.remaining = None;
    }
}

/// Keeps the first occurrence of every distinct leading `width` slots.
/// Slots past `width` pass through untouched for a following `Sort`.
pub struct DistinctOp {
    input: Box<dyn Operator>,
    width: usize,
    seen: HashSet<Record>,
    charge: MemoryCharge,
}

impl DistinctOp {
    pub fn new(input: Box<dyn Operator>, width: usize) -> Self {
        Self {
            input,
            width,
            seen: HashSet::new(),
            charge: MemoryCharge::default(),
        }
    }
}

impl Operator for DistinctOp {
    fn name(&self) -> &'static str {
        "Distinct"
    }

    fn inputs(&self) -> Vec<&dyn Operator> {
        vec![self.input.as_ref()]
    }

    fn inputs_mut(&mut self) -> Vec<&mut dyn Operator> {
        vec![self.input.as_mut()]
    }

    fn next(&mut self, ctx: &mut ExecutionContext<'_>) -> ExecResult<Option<Record>> {
        while let Some(mut record) = self.input.next(ctx)? {
            if record.len() < self.width {
                record.resize(self.width, Value::Null);
            }
            // trailing slots carry sort keys and stay on the record
            let key = &record[..self.width];
            if self.seen.contains(key) {
                continue;
            }
            let key = key.to_vec();
            self.charge.add(&ctx.budget, record_size(&key))?;
            self.seen.insert(key);
            return Ok(Some(record));
        }
        self.charge.release(&ctx.budget);
        Ok(None)
    }

    fn rewind(&mut self) {
        self.seen.clear();
    }
}

/// Concatenates its branches in order; `UNION` adds a `Distinct` above.
pub struct UnionOp {
    branches: Vec<Box<dyn Operator>>,
    current: usize,
}

impl UnionOp {
    pub fn new(branches: Vec<Box<dyn Operator>>) -> Self {
        Self {
            branches,
            current: 0,
        }
    }
}

impl Operator for UnionOp {
    fn name(&self) -> &'static str {
        "Union"
    }

    fn inputs(&self) -> Vec<&dyn Operator> {
        self.branches.iter().map(|b| b.as_ref()).collect()
    }

    fn inputs_mut(&mut self) -> Vec<&mut dyn Operator> {
        self.branches
            .iter_mut()
            .map(|b| b.as_mut() as &mut dyn Operator)
            .collect()
    }

    fn next(&mut self, ctx: &mut ExecutionContext<'_>) -> ExecResult<Option<Record>> {
        while let Some(branch) = self.branches.get_mut(self.current) {
            if let Some(record) = branch.next(ctx)? {
                return Ok(Some(record));
            }
            self.current += 1;
        }
        Ok(None)
    }

    fn rewind(&mut self) {
        self.current = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::operators::{collect, OnceOp, UnwindOp};
    use crate::exec::{ErrorKind, GraphAccess, MemoryBudget};
    use crate::storage::Graph;
    use std::collections::HashMap;

    fn unwind(values: &[i64]) -> Box<dyn Operator> {
        Box::new(UnwindOp::new(
            Box::new(OnceOp::new()),
            Expr::constant(values.to_vec()),
            0,
        ))
    }

    fn run(op: &mut dyn Operator) -> ExecResult<Vec<Record>> {
        let g = Graph::new("g");
        let mut ctx = ExecutionContext::new(GraphAccess::Read(&g), HashMap::new(), MemoryBudget::unlimited());
        op.open(&mut ctx)?;
        collect(op, &mut ctx)
    }

    fn column(rows: &[Record]) -> Vec<i64> {
        rows.iter().filter_map(|r| r[0].as_i64()).collect()
    }

    fn desc() -> Vec<SortKey> {
        vec![SortKey {
            slot: 0,
            descending: true,
        }]
    }

    #[test]
    fn test_full_sort_and_top_k_agree() {
        let mut full = SortOp::new(unwind(&[3, 1, 4, 1, 5]), desc(), 1, None, None);
        assert_eq!(column(&run(&mut full).unwrap()), vec![5, 4, 3, 1, 1]);
        let mut top = SortOp::new(
            unwind(&[3, 1, 4, 1, 5]),
            desc(),
            1,
            Some(Expr::constant(1i64)),
            Some(Expr::constant(2i64)),
        );
        assert_eq!(column(&run(&mut top).unwrap()), vec![5, 4, 3]);
    }

    #[test]
    fn test_skip_limit() {
        let skip = SkipOp::new(unwind(&[1, 2, 3, 4]), Expr::constant(1i64));
        let mut limit = LimitOp::new(Box::new(skip), Expr::constant(2i64));
        assert_eq!(column(&run(&mut limit).unwrap()), vec![2, 3]);

        let mut bad = LimitOp::new(unwind(&[1]), Expr::constant(-1i64));
        let err = run(&mut bad).unwrap_err();
        assert!(err.to_string().contains("must be a positive integer"));
        let mut bad = SkipOp::new(unwind(&[1]), Expr::constant("x"));
        let err = run(&mut bad).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        assert!(err.to_string().contains("expected Integer"));
    }

    #[test]
    fn test_distinct_keeps_sort_keys() {
        use crate::ast::BinaryOperator;
        use crate::exec::operators::ProjectOp;

        // slot 1 holds the sort key -x past the distinct width
        let negated = Expr::binary(BinaryOperator::Subtract, Expr::constant(0i64), Expr::Slot(0));
        let project = ProjectOp::new(unwind(&[3, 1, 3, 2]), vec![Expr::Slot(0), negated]);
        let distinct = DistinctOp::new(Box::new(project), 1);
        let keys = vec![SortKey {
            slot: 1,
            descending: false,
        }];
        let mut sort = SortOp::new(Box::new(distinct), keys, 1, None, None);
        let rows = run(&mut sort).unwrap();
        assert_eq!(column(&rows), vec![3, 2, 1]);
        assert!(rows.iter().all(|r| r.len() == 1));
    }

    #[test]
    fn test_union_then_distinct() {
        let union = UnionOp::new(vec![unwind(&[1, 2]), unwind(&[2, 3])]);
        let mut all = UnionOp::new(vec![unwind(&[1, 2]), unwind(&[2, 3])]);
        assert_eq!(column(&run(&mut all).unwrap()), vec![1, 2, 2, 3]);
        let mut distinct = DistinctOp::new(Box::new(union), 1);
        assert_eq!(column(&run(&mut distinct).unwrap()), vec![1, 2, 3]);
    }
}
