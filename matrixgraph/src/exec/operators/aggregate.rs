// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Grouping aggregation
//!
//! Output records hold the grouping key values in their first slots,
//! padded with nulls to `width`, followed by one slot per aggregate.
//! Groups are emitted in first-seen order.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::exec::context::ExecutionContext;
use crate::exec::error::ExecResult;
use crate::exec::memory_budget::MemoryCharge;
use crate::exec::operators::Operator;
use crate::exec::{record_size, Record};
use crate::functions::Accumulator;
use crate::plan::expr::Expr;
use crate::plan::logical::AggregateCall;
use crate::storage::Value;

struct Group {
    key: Vec<Value>,
    accumulators: Vec<Box<dyn Accumulator>>,
    /// Argument tuples already folded, for `DISTINCT` aggregates
    seen: Vec<Option<HashSet<Vec<Value>>>>,
}

pub struct AggregateOp {
    input: Box<dyn Operator>,
    keys: Vec<Expr>,
    aggregates: Vec<AggregateCall>,
    width: usize,
    output: Option<VecDeque<Record>>,
    charge: MemoryCharge,
}

impl AggregateOp {
    pub fn new(input: Box<dyn Operator>, keys: Vec<Expr>, aggregates: Vec<AggregateCall>, width: usize) -> Self {
        Self {
            input,
            keys,
            aggregates,
            width,
            output: None,
            charge: MemoryCharge::default(),
        }
    }

    fn new_group(&self, key: Vec<Value>) -> Group {
        Group {
            key,
            accumulators: self.aggregates.iter().map(|a| a.function.accumulator()).collect(),
            seen: self
                .aggregates
                .iter()
                .map(|a| a.distinct.then(HashSet::new))
                .collect(),
        }
    }

    fn consume(&mut self, ctx: &mut ExecutionContext<'_>) -> ExecResult<VecDeque<Record>> {
        let mut groups: Vec<Group> = Vec::new();
        let mut lookup: HashMap<Vec<Value>, usize> = HashMap::new();

        while let Some(record) = self.input.next(ctx)? {
            let key = self
                .keys
                .iter()
                .map(|k| ctx.eval(k, &record))
                .collect::<ExecResult<Vec<Value>>>()?;
            let index = match lookup.get(&key) {
                Some(index) => *index,
                None => {
                    self.charge.add(&ctx.budget, record_size(&key))?;
                    groups.push(self.new_group(key.clone()));
                    lookup.insert(key, groups.len() - 1);
                    groups.len() - 1
                }
            };
            let group = &mut groups[index];
            for (i, call) in self.aggregates.iter().enumerate() {
                let arguments = call
                    .arguments
                    .iter()
                    .map(|a| ctx.eval(a, &record))
                    .collect::<ExecResult<Vec<Value>>>()?;
                if let Some(seen) = &mut group.seen[i] {
                    if arguments.iter().any(Value::is_null) || !seen.insert(arguments.clone()) {
                        continue;
                    }
                }
                group.accumulators[i].update(&arguments)?;
            }
        }

        // a global aggregate over no input still yields one row
        if groups.is_empty() && self.keys.is_empty() {
            groups.push(self.new_group(Vec::new()));
        }

        let mut out = VecDeque::with_capacity(groups.len());
        for mut group in groups {
            let mut record = std::mem::take(&mut group.key);
            record.resize(self.width.max(record.len()), Value::Null);
            for accumulator in &mut group.accumulators {
                record.push(accumulator.finish()?);
            }
            out.push_back(record);
        }
        Ok(out)
    }
}

impl Operator for AggregateOp {
    fn name(&self) -> &'static str {
        "Aggregate"
    }

    fn inputs(&self) -> Vec<&dyn Operator> {
        vec![self.input.as_ref()]
    }

    fn inputs_mut(&mut self) -> Vec<&mut dyn Operator> {
        vec![self.input.as_mut()]
    }

    fn next(&mut self, ctx: &mut ExecutionContext<'_>) -> ExecResult<Option<Record>> {
        if self.output.is_none() {
            let output = self.consume(ctx)?;
            self.charge.release(&ctx.budget);
            self.output = Some(output);
        }
        Ok(self.output.as_mut().and_then(VecDeque::pop_front))
    }

    fn rewind(&mut self) {
        self.output = None;
    }
}
