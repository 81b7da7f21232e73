// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Leaf operators: node scans, index scans and argument injection
//!
//! Scans run once per input record. The candidate id set is taken when a
//! new input record arrives, so nodes created earlier in the same query are
//! visible to a later scan.

use std::ops::Bound;

use crate::exec::context::ExecutionContext;
use crate::exec::error::ExecResult;
use crate::exec::eval::node_has_labels;
use crate::exec::operators::Operator;
use crate::exec::{set_slot, Record};
use crate::plan::logical::{IndexPredicate, IndexScan, NodeScan};
use crate::storage::{EntityKind, Graph, NodeId, NodeValue, Value};

/// Emits a single empty record; stands in for a missing input.
pub struct OnceOp {
    done: bool,
}

impl OnceOp {
    pub fn new() -> Self {
        Self { done: false }
    }
}

impl Default for OnceOp {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for OnceOp {
    fn name(&self) -> &'static str {
        "Once"
    }

    fn inputs(&self) -> Vec<&dyn Operator> {
        Vec::new()
    }

    fn inputs_mut(&mut self) -> Vec<&mut dyn Operator> {
        Vec::new()
    }

    fn next(&mut self, _ctx: &mut ExecutionContext<'_>) -> ExecResult<Option<Record>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;
        Ok(Some(Vec::new()))
    }

    fn rewind(&mut self) {
        self.done = false;
    }

    fn hidden(&self) -> bool {
        true
    }
}

/// Leaf of an apply's inner plan; emits the outer record once.
pub struct ArgumentOp {
    id: usize,
    done: bool,
}

impl ArgumentOp {
    pub fn new(id: usize) -> Self {
        Self { id, done: false }
    }
}

impl Operator for ArgumentOp {
    fn name(&self) -> &'static str {
        "Argument"
    }

    fn inputs(&self) -> Vec<&dyn Operator> {
        Vec::new()
    }

    fn inputs_mut(&mut self) -> Vec<&mut dyn Operator> {
        Vec::new()
    }

    fn next(&mut self, ctx: &mut ExecutionContext<'_>) -> ExecResult<Option<Record>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;
        Ok(Some(ctx.argument(self.id).cloned().unwrap_or_default()))
    }

    fn rewind(&mut self) {
        self.done = false;
    }
}

/// Candidate ids plus the input record they extend
struct Cursor {
    record: Record,
    ids: Vec<NodeId>,
    position: usize,
}

impl Cursor {
    fn next_id(&mut self) -> Option<NodeId> {
        let id = self.ids.get(self.position).copied();
        self.position += 1;
        id
    }
}

/// All-node scan or label scan, depending on whether the spec carries a label.
pub struct NodeScanOp {
    spec: NodeScan,
    input: Box<dyn Operator>,
    cursor: Option<Cursor>,
}

impl NodeScanOp {
    pub fn new(spec: NodeScan, input: Box<dyn Operator>) -> Self {
        Self {
            spec,
            input,
            cursor: None,
        }
    }

    fn candidates(&self, graph: &Graph) -> Vec<NodeId> {
        match &self.spec.label {
            None => graph.node_ids(),
            Some(label) => match graph.schema().label_id(label) {
                Some(id) => graph.label_nodes(id),
                None => Vec::new(),
            },
        }
    }
}

impl Operator for NodeScanOp {
    fn name(&self) -> &'static str {
        if self.spec.label.is_some() {
            "Node By Label Scan"
        } else {
            "All Node Scan"
        }
    }

    fn inputs(&self) -> Vec<&dyn Operator> {
        vec![self.input.as_ref()]
    }

    fn inputs_mut(&mut self) -> Vec<&mut dyn Operator> {
        vec![self.input.as_mut()]
    }

    fn next(&mut self, ctx: &mut ExecutionContext<'_>) -> ExecResult<Option<Record>> {
        loop {
            if let Some(cursor) = &mut self.cursor {
                while let Some(id) = cursor.next_id() {
                    let node = NodeValue::reference(id);
                    if !self.spec.extra_labels.is_empty()
                        && !node_has_labels(ctx.graph(), &node, &self.spec.extra_labels)
                    {
                        continue;
                    }
                    let mut record = cursor.record.clone();
                    set_slot(&mut record, self.spec.slot, Value::Node(node));
                    return Ok(Some(record));
                }
            }
            match self.input.next(ctx)? {
                Some(record) => {
                    let ids = self.candidates(ctx.graph());
                    self.cursor = Some(Cursor {
                        record,
                        ids,
                        position: 0,
                    });
                }
                None => return Ok(None),
            }
        }
    }

    fn rewind(&mut self) {
        self.cursor = None;
    }
}

/// Seeks an operational exact-match index. When the index is gone or not
/// yet operational at run time, falls back to scanning the label; the
/// predicate is still enforced by the filter above.
pub struct IndexScanOp {
    spec: IndexScan,
    input: Box<dyn Operator>,
    cursor: Option<Cursor>,
}

impl IndexScanOp {
    pub fn new(spec: IndexScan, input: Box<dyn Operator>) -> Self {
        Self {
            spec,
            input,
            cursor: None,
        }
    }

    fn candidates(&self, ctx: &ExecutionContext<'_>, record: &Record) -> ExecResult<Vec<NodeId>> {
        let graph = ctx.graph();
        let label = match graph.schema().label_id(&self.spec.label) {
            Some(label) => label,
            None => return Ok(Vec::new()),
        };
        let attr = match graph.schema().attribute_id(&self.spec.attribute) {
            Some(attr) => attr,
            None => return Ok(Vec::new()),
        };
        let index = match graph.indexes().operational_exact(EntityKind::Node, label, attr) {
            Some(index) => index,
            None => return Ok(graph.label_nodes(label)),
        };
        let mut ids = match &self.spec.predicate {
            IndexPredicate::Equal(expr) => {
                let value = ctx.eval(expr, record)?;
                if value.is_null() {
                    Vec::new()
                } else {
                    index.seek_eq(attr, &value)
                }
            }
            IndexPredicate::Prefix(expr) => match ctx.eval(expr, record)? {
                Value::String(prefix) => index.seek_prefix(attr, &prefix),
                _ => Vec::new(),
            },
            IndexPredicate::Range { lower, upper } => {
                let lower = bound(ctx, lower, record)?;
                let upper = bound(ctx, upper, record)?;
                match (lower, upper) {
                    (Some(lower), Some(upper)) => {
                        index.seek_range(attr, lower.as_ref(), upper.as_ref())
                    }
                    _ => Vec::new(),
                }
            }
        };
        ids.retain(|id| graph.node_has_label(*id, label));
        ids.sort_unstable();
        Ok(ids)
    }
}

/// Evaluated range bound; `None` when the bound value is null and so
/// nothing can match.
fn bound(
    ctx: &ExecutionContext<'_>,
    spec: &Option<(crate::plan::expr::Expr, bool)>,
    record: &Record,
) -> ExecResult<Option<Bound<Value>>> {
    Ok(match spec {
        None => Some(Bound::Unbounded),
        Some((expr, inclusive)) => match ctx.eval(expr, record)? {
            Value::Null => None,
            v if *inclusive => Some(Bound::Included(v)),
            v => Some(Bound::Excluded(v)),
        },
    })
}

impl Operator for IndexScanOp {
    fn name(&self) -> &'static str {
        "Node By Index Scan"
    }

    fn inputs(&self) -> Vec<&dyn Operator> {
        vec![self.input.as_ref()]
    }

    fn inputs_mut(&mut self) -> Vec<&mut dyn Operator> {
        vec![self.input.as_mut()]
    }

    fn next(&mut self, ctx: &mut ExecutionContext<'_>) -> ExecResult<Option<Record>> {
        loop {
            if let Some(cursor) = &mut self.cursor {
                while let Some(id) = cursor.next_id() {
                    let node = NodeValue::reference(id);
                    if !self.spec.extra_labels.is_empty()
                        && !node_has_labels(ctx.graph(), &node, &self.spec.extra_labels)
                    {
                        continue;
                    }
                    let mut record = cursor.record.clone();
                    set_slot(&mut record, self.spec.slot, Value::Node(node));
                    return Ok(Some(record));
                }
            }
            match self.input.next(ctx)? {
                Some(record) => {
                    let ids = self.candidates(ctx, &record)?;
                    self.cursor = Some(Cursor {
                        record,
                        ids,
                        position: 0,
                    });
                }
                None => return Ok(None),
            }
        }
    }

    fn rewind(&mut self) {
        self.cursor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::operators::collect;
    use crate::exec::{GraphAccess, MemoryBudget};
    use crate::plan::expr::Expr;
    use crate::storage::indexes::IndexDefinition;
    use crate::storage::PropertyMap;
    use std::collections::HashMap;

    fn people() -> Graph {
        let mut g = Graph::new("g");
        let person = g.intern_label("Person").unwrap();
        let other = g.intern_label("Other").unwrap();
        let age = g.intern_attribute("age").unwrap();
        for (i, labels) in [vec![person], vec![person, other], vec![other]].iter().enumerate() {
            let mut p = PropertyMap::new();
            p.set(age, Value::Integer(20 + i as i64));
            g.create_node(labels, p).unwrap();
        }
        g.commit().unwrap();
        g
    }

    fn scan(label: Option<&str>, extra: &[&str]) -> NodeScan {
        NodeScan {
            slot: 0,
            label: label.map(str::to_string),
            extra_labels: extra.iter().map(|s| s.to_string()).collect(),
            text: String::new(),
        }
    }

    fn run(g: &Graph, op: &mut dyn Operator) -> Vec<Record> {
        let mut ctx = ExecutionContext::new(GraphAccess::Read(g), HashMap::new(), MemoryBudget::unlimited());
        op.open(&mut ctx).unwrap();
        collect(op, &mut ctx).unwrap()
    }

    #[test]
    fn test_label_scan_and_extra_labels() {
        let g = people();
        let mut all = NodeScanOp::new(scan(None, &[]), Box::new(OnceOp::new()));
        assert_eq!(run(&g, &mut all).len(), 3);
        let mut by_label = NodeScanOp::new(scan(Some("Person"), &[]), Box::new(OnceOp::new()));
        assert_eq!(run(&g, &mut by_label).len(), 2);
        let mut both = NodeScanOp::new(scan(Some("Person"), &["Other"]), Box::new(OnceOp::new()));
        assert_eq!(run(&g, &mut both).len(), 1);
        let mut missing = NodeScanOp::new(scan(Some("Nope"), &[]), Box::new(OnceOp::new()));
        assert!(run(&g, &mut missing).is_empty());
    }

    #[test]
    fn test_index_scan_seeks_and_falls_back() {
        let mut g = people();
        let spec = IndexScan {
            slot: 0,
            label: "Person".into(),
            attribute: "age".into(),
            predicate: IndexPredicate::Range {
                lower: Some((Expr::constant(21i64), true)),
                upper: None,
            },
            extra_labels: Vec::new(),
            text: String::new(),
        };
        // no index yet: every Person is a candidate
        let mut op = IndexScanOp::new(spec.clone(), Box::new(OnceOp::new()));
        assert_eq!(run(&g, &mut op).len(), 2);

        let handle = g
            .create_index(IndexDefinition::exact(EntityKind::Node, "Person", vec!["age".into()]))
            .unwrap();
        g.populate_index(&handle);
        let mut op = IndexScanOp::new(spec, Box::new(OnceOp::new()));
        let rows = run(&g, &mut op);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0].as_node_id(), Some(1));
    }
}
