// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Mutation operators
//!
//! `Create`, `Update` and `Delete` are eager: they drain their input before
//! touching the graph, so upstream scans never observe their own writes.
//! Every operator flushes the graph once its batch is applied, which is also
//! where constraints are checked. `Merge` works one outer record at a time
//! so a later record can match what an earlier one created.

use std::collections::{BTreeSet, VecDeque};

use crate::exec::context::ExecutionContext;
use crate::exec::error::{ExecResult, ExecutionError};
use crate::exec::memory_budget::MemoryCharge;
use crate::exec::operators::Operator;
use crate::exec::result::materialize;
use crate::exec::{record_size, set_slot, slot_value, Record};
use crate::plan::expr::Expr;
use crate::plan::logical::{CreateSpec, MergeSpec, UpdateItem};
use crate::storage::{EdgeId, EdgeValue, NodeId, NodeValue, PropertyMap, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entity {
    Node(NodeId),
    Edge(EdgeId),
}

fn entity(value: &Value) -> ExecResult<Option<Entity>> {
    match value {
        Value::Null => Ok(None),
        Value::Node(n) => Ok(Some(Entity::Node(n.id))),
        Value::Edge(e) => Ok(Some(Entity::Edge(e.id))),
        other => Err(ExecutionError::type_mismatch(
            "Node or Relationship",
            other.type_name(),
        )),
    }
}

/// Key/value pairs of a map, or of a node's or edge's properties.
fn map_entries(ctx: &ExecutionContext<'_>, value: Value) -> ExecResult<Vec<(String, Value)>> {
    match materialize(ctx.graph(), value) {
        Value::Null => Ok(Vec::new()),
        Value::Map(entries) => Ok(entries),
        Value::Node(n) => Ok(n.properties),
        Value::Edge(e) => Ok(e.properties),
        other => Err(ExecutionError::type_mismatch("a map", other.type_name())),
    }
}

/// Intern the keys of `entries` into a property map; null values are dropped.
fn property_map(ctx: &mut ExecutionContext<'_>, entries: Vec<(String, Value)>) -> ExecResult<PropertyMap> {
    let graph = ctx.graph_mut()?;
    let mut properties = PropertyMap::new();
    for (key, value) in entries {
        if value.is_null() {
            continue;
        }
        let attr = graph.intern_attribute(&key)?;
        properties.set(attr, value);
    }
    Ok(properties)
}

fn evaluated_properties(
    ctx: &mut ExecutionContext<'_>,
    expr: &Option<Expr>,
    record: &Record,
) -> ExecResult<PropertyMap> {
    let entries = match expr {
        Some(expr) => {
            let value = ctx.eval(expr, record)?;
            map_entries(ctx, value)?
        }
        None => Vec::new(),
    };
    property_map(ctx, entries)
}

/// Allocate every entity of `spec` for one record and bind them into it.
fn create_entities(ctx: &mut ExecutionContext<'_>, spec: &CreateSpec, record: &mut Record) -> ExecResult<()> {
    for node in &spec.nodes {
        let properties = evaluated_properties(ctx, &node.properties, record)?;
        let set = properties.len() as u64;
        let graph = ctx.graph_mut()?;
        let mut labels = Vec::with_capacity(node.labels.len());
        let mut new_labels = 0;
        for name in &node.labels {
            if graph.schema().label_id(name).is_none() {
                new_labels += 1;
            }
            labels.push(graph.intern_label(name)?);
        }
        let id = graph.create_node(&labels, properties)?;
        ctx.stats.nodes_created += 1;
        ctx.stats.labels_added += new_labels;
        ctx.stats.properties_set += set;
        set_slot(record, node.slot, Value::Node(NodeValue::reference(id)));
    }
    for edge in &spec.edges {
        let properties = evaluated_properties(ctx, &edge.properties, record)?;
        let set = properties.len() as u64;
        let endpoints = (
            slot_value(record, edge.source).as_node_id(),
            slot_value(record, edge.target).as_node_id(),
        );
        let (src, dst) = match endpoints {
            (Some(src), Some(dst)) => (src, dst),
            _ => {
                return Err(ExecutionError::Argument(
                    "Failed to create relationship; endpoint was not found.".to_string(),
                ))
            }
        };
        let graph = ctx.graph_mut()?;
        let relation = graph.intern_relation(&edge.relation)?;
        let id = graph.create_edge(relation, src, dst, properties)?;
        ctx.stats.relationships_created += 1;
        ctx.stats.properties_set += set;
        set_slot(record, edge.slot, Value::Edge(EdgeValue::reference(id, src, dst)));
    }
    for (slot, parts) in &spec.paths {
        let path = ctx.eval(&Expr::BuildPath(parts.clone()), record)?;
        set_slot(record, *slot, path);
    }
    Ok(())
}

/// One update with every expression already evaluated
enum PendingUpdate {
    Set(Entity, String, Value),
    Replace(Entity, Vec<(String, Value)>),
    Merge(Entity, Vec<(String, Value)>),
    AddLabels(NodeId, Vec<String>),
    RemoveLabels(NodeId, Vec<String>),
}

fn node_target(ctx: &ExecutionContext<'_>, target: &Expr, record: &Record) -> ExecResult<Option<NodeId>> {
    match ctx.eval(target, record)? {
        Value::Null => Ok(None),
        Value::Node(n) => Ok(Some(n.id)),
        other => Err(ExecutionError::type_mismatch("Node", other.type_name())),
    }
}

/// Evaluate `items` against `record` before any of them is applied, so
/// `SET a.v = b.v, b.v = a.v` swaps.
fn evaluate_updates(
    ctx: &ExecutionContext<'_>,
    items: &[UpdateItem],
    record: &Record,
) -> ExecResult<Vec<PendingUpdate>> {
    let mut pending = Vec::with_capacity(items.len());
    for item in items {
        let update = match item {
            UpdateItem::SetProperty { target, key, value } => {
                let Some(target) = entity(&ctx.eval(target, record)?)? else {
                    continue;
                };
                PendingUpdate::Set(target, key.clone(), ctx.eval(value, record)?)
            }
            UpdateItem::RemoveProperty { target, key } => {
                let Some(target) = entity(&ctx.eval(target, record)?)? else {
                    continue;
                };
                PendingUpdate::Set(target, key.clone(), Value::Null)
            }
            UpdateItem::ReplaceProperties { target, value } => {
                let Some(target) = entity(&ctx.eval(target, record)?)? else {
                    continue;
                };
                PendingUpdate::Replace(target, map_entries(ctx, ctx.eval(value, record)?)?)
            }
            UpdateItem::MergeProperties { target, value } => {
                let Some(target) = entity(&ctx.eval(target, record)?)? else {
                    continue;
                };
                PendingUpdate::Merge(target, map_entries(ctx, ctx.eval(value, record)?)?)
            }
            UpdateItem::AddLabels { target, labels } => match node_target(ctx, target, record)? {
                Some(id) => PendingUpdate::AddLabels(id, labels.clone()),
                None => continue,
            },
            UpdateItem::RemoveLabels { target, labels } => match node_target(ctx, target, record)? {
                Some(id) => PendingUpdate::RemoveLabels(id, labels.clone()),
                None => continue,
            },
        };
        pending.push(update);
    }
    Ok(pending)
}

fn exists(ctx: &ExecutionContext<'_>, target: Entity) -> bool {
    match target {
        Entity::Node(id) => ctx.graph().get_node(id).is_some(),
        Entity::Edge(id) => ctx.graph().get_edge(id).is_some(),
    }
}

/// Set one property; null removes it.
fn set_property(ctx: &mut ExecutionContext<'_>, target: Entity, key: &str, value: Value) -> ExecResult<()> {
    let graph = ctx.graph_mut()?;
    let removing = value.is_null();
    let attr = if removing {
        match graph.schema().attribute_id(key) {
            Some(attr) => attr,
            None => return Ok(()),
        }
    } else {
        graph.intern_attribute(key)?
    };
    let old = match target {
        Entity::Node(id) => graph.set_node_property(id, attr, value)?,
        Entity::Edge(id) => graph.set_edge_property(id, attr, value)?,
    };
    if !removing {
        ctx.stats.properties_set += 1;
    } else if old.is_some() {
        ctx.stats.properties_removed += 1;
    }
    Ok(())
}

fn current_keys(ctx: &ExecutionContext<'_>, target: Entity) -> Vec<String> {
    let graph = ctx.graph();
    let attrs: Vec<_> = match target {
        Entity::Node(id) => graph
            .get_node(id)
            .map(|r| r.properties.keys().collect())
            .unwrap_or_default(),
        Entity::Edge(id) => graph
            .get_edge(id)
            .map(|r| r.properties.keys().collect())
            .unwrap_or_default(),
    };
    let names = graph.schema().attributes();
    attrs
        .into_iter()
        .filter_map(|a| names.get(a as usize).cloned())
        .collect()
}

fn apply_updates(ctx: &mut ExecutionContext<'_>, updates: Vec<PendingUpdate>) -> ExecResult<()> {
    for update in updates {
        match update {
            // entities deleted earlier in the query are left alone
            PendingUpdate::Set(target, _, _)
            | PendingUpdate::Replace(target, _)
            | PendingUpdate::Merge(target, _)
                if !exists(ctx, target) => {}
            PendingUpdate::Set(target, key, value) => set_property(ctx, target, &key, value)?,
            PendingUpdate::Replace(target, entries) => {
                for key in current_keys(ctx, target) {
                    if !entries.iter().any(|(k, v)| *k == key && !v.is_null()) {
                        set_property(ctx, target, &key, Value::Null)?;
                    }
                }
                for (key, value) in entries {
                    if !value.is_null() {
                        set_property(ctx, target, &key, value)?;
                    }
                }
            }
            PendingUpdate::Merge(target, entries) => {
                for (key, value) in entries {
                    set_property(ctx, target, &key, value)?;
                }
            }
            PendingUpdate::AddLabels(id, labels) => {
                if !exists(ctx, Entity::Node(id)) {
                    continue;
                }
                let graph = ctx.graph_mut()?;
                let mut added = 0;
                for name in &labels {
                    let label = graph.intern_label(name)?;
                    if graph.add_label(id, label)? {
                        added += 1;
                    }
                }
                ctx.stats.labels_added += added;
            }
            PendingUpdate::RemoveLabels(id, labels) => {
                if !exists(ctx, Entity::Node(id)) {
                    continue;
                }
                let graph = ctx.graph_mut()?;
                let mut removed = 0;
                for name in &labels {
                    let Some(label) = graph.schema().label_id(name) else {
                        continue;
                    };
                    if graph.remove_label(id, label)? {
                        removed += 1;
                    }
                }
                ctx.stats.labels_removed += removed;
            }
        }
    }
    Ok(())
}

/// Drain `input`, charging the buffered records to the query budget.
fn drain(
    input: &mut dyn Operator,
    ctx: &mut ExecutionContext<'_>,
    charge: &mut MemoryCharge,
) -> ExecResult<Vec<Record>> {
    let mut records = Vec::new();
    while let Some(record) = input.next(ctx)? {
        charge.add(&ctx.budget, record_size(&record))?;
        records.push(record);
    }
    Ok(records)
}

pub struct CreateOp {
    input: Box<dyn Operator>,
    spec: CreateSpec,
    output: Option<VecDeque<Record>>,
    charge: MemoryCharge,
}

impl CreateOp {
    pub fn new(input: Box<dyn Operator>, spec: CreateSpec) -> Self {
        Self {
            input,
            spec,
            output: None,
            charge: MemoryCharge::default(),
        }
    }
}

impl Operator for CreateOp {
    fn name(&self) -> &'static str {
        "Create"
    }

    fn inputs(&self) -> Vec<&dyn Operator> {
        vec![self.input.as_ref()]
    }

    fn inputs_mut(&mut self) -> Vec<&mut dyn Operator> {
        vec![self.input.as_mut()]
    }

    fn next(&mut self, ctx: &mut ExecutionContext<'_>) -> ExecResult<Option<Record>> {
        if self.output.is_none() {
            let mut records = drain(self.input.as_mut(), ctx, &mut self.charge)?;
            for record in &mut records {
                create_entities(ctx, &self.spec, record)?;
            }
            ctx.graph_mut()?.flush()?;
            self.charge.release(&ctx.budget);
            self.output = Some(records.into());
        }
        Ok(self.output.as_mut().and_then(VecDeque::pop_front))
    }

    fn rewind(&mut self) {
        self.output = None;
    }
}

pub struct UpdateOp {
    input: Box<dyn Operator>,
    items: Vec<UpdateItem>,
    output: Option<VecDeque<Record>>,
    charge: MemoryCharge,
}

impl UpdateOp {
    pub fn new(input: Box<dyn Operator>, items: Vec<UpdateItem>) -> Self {
        Self {
            input,
            items,
            output: None,
            charge: MemoryCharge::default(),
        }
    }
}

impl Operator for UpdateOp {
    fn name(&self) -> &'static str {
        "Update"
    }

    fn inputs(&self) -> Vec<&dyn Operator> {
        vec![self.input.as_ref()]
    }

    fn inputs_mut(&mut self) -> Vec<&mut dyn Operator> {
        vec![self.input.as_mut()]
    }

    fn next(&mut self, ctx: &mut ExecutionContext<'_>) -> ExecResult<Option<Record>> {
        if self.output.is_none() {
            let records = drain(self.input.as_mut(), ctx, &mut self.charge)?;
            let mut batch = Vec::with_capacity(records.len());
            for record in &records {
                batch.push(evaluate_updates(ctx, &self.items, record)?);
            }
            for updates in batch {
                apply_updates(ctx, updates)?;
            }
            ctx.graph_mut()?.flush()?;
            self.charge.release(&ctx.budget);
            self.output = Some(records.into());
        }
        Ok(self.output.as_mut().and_then(VecDeque::pop_front))
    }

    fn rewind(&mut self) {
        self.output = None;
    }
}

/// Deletes nodes, edges and every entity of a path. Node deletion cascades
/// to incident edges.
pub struct DeleteOp {
    input: Box<dyn Operator>,
    targets: Vec<Expr>,
    output: Option<VecDeque<Record>>,
    charge: MemoryCharge,
}

impl DeleteOp {
    pub fn new(input: Box<dyn Operator>, targets: Vec<Expr>) -> Self {
        Self {
            input,
            targets,
            output: None,
            charge: MemoryCharge::default(),
        }
    }

    fn collect_targets(
        value: Value,
        nodes: &mut BTreeSet<NodeId>,
        edges: &mut BTreeSet<EdgeId>,
    ) -> ExecResult<()> {
        match value {
            Value::Null => {}
            Value::Node(n) => {
                nodes.insert(n.id);
            }
            Value::Edge(e) => {
                edges.insert(e.id);
            }
            Value::Path(p) => {
                nodes.extend(p.nodes.iter().map(|n| n.id));
                edges.extend(p.edges.iter().map(|e| e.id));
            }
            other => {
                return Err(ExecutionError::type_mismatch(
                    "Node, Relationship or Path",
                    other.type_name(),
                ))
            }
        }
        Ok(())
    }
}

impl Operator for DeleteOp {
    fn name(&self) -> &'static str {
        "Delete"
    }

    fn inputs(&self) -> Vec<&dyn Operator> {
        vec![self.input.as_ref()]
    }

    fn inputs_mut(&mut self) -> Vec<&mut dyn Operator> {
        vec![self.input.as_mut()]
    }

    fn next(&mut self, ctx: &mut ExecutionContext<'_>) -> ExecResult<Option<Record>> {
        if self.output.is_none() {
            let records = drain(self.input.as_mut(), ctx, &mut self.charge)?;
            let mut nodes = BTreeSet::new();
            let mut edges = BTreeSet::new();
            for record in &records {
                for target in &self.targets {
                    Self::collect_targets(ctx.eval(target, record)?, &mut nodes, &mut edges)?;
                }
            }
            let graph = ctx.graph_mut()?;
            let mut deleted_edges = 0u64;
            let mut deleted_nodes = 0u64;
            for edge in edges {
                if graph.delete_edge(edge) {
                    deleted_edges += 1;
                }
            }
            for node in nodes {
                if let Some(cascaded) = graph.delete_node(node) {
                    deleted_nodes += 1;
                    deleted_edges += cascaded as u64;
                }
            }
            graph.flush()?;
            ctx.stats.nodes_deleted += deleted_nodes;
            ctx.stats.relationships_deleted += deleted_edges;
            self.charge.release(&ctx.budget);
            self.output = Some(records.into());
        }
        Ok(self.output.as_mut().and_then(VecDeque::pop_front))
    }

    fn rewind(&mut self) {
        self.output = None;
    }
}

/// Match-or-create, per outer record. The matcher is an inner plan rooted
/// at an `Argument` leaf that replays the outer record.
pub struct MergeOp {
    outer: Box<dyn Operator>,
    matcher: Box<dyn Operator>,
    spec: MergeSpec,
    pending: VecDeque<Record>,
}

impl MergeOp {
    pub fn new(outer: Box<dyn Operator>, matcher: Box<dyn Operator>, spec: MergeSpec) -> Self {
        Self {
            outer,
            matcher,
            spec,
            pending: VecDeque::new(),
        }
    }

    fn merge(&mut self, ctx: &mut ExecutionContext<'_>, outer: Record) -> ExecResult<()> {
        ctx.set_argument(self.spec.argument, outer.clone());
        self.matcher.reset();
        let mut matches = Vec::new();
        while let Some(record) = self.matcher.next(ctx)? {
            matches.push(record);
        }

        if matches.is_empty() {
            let mut record = outer;
            create_entities(ctx, &self.spec.create, &mut record)?;
            let updates = evaluate_updates(ctx, &self.spec.on_create, &record)?;
            apply_updates(ctx, updates)?;
            ctx.graph_mut()?.flush()?;
            self.pending.push_back(record);
            return Ok(());
        }

        if !self.spec.on_match.is_empty() {
            let mut batch = Vec::with_capacity(matches.len());
            for record in &matches {
                batch.push(evaluate_updates(ctx, &self.spec.on_match, record)?);
            }
            for updates in batch {
                apply_updates(ctx, updates)?;
            }
            ctx.graph_mut()?.flush()?;
        }
        self.pending.extend(matches);
        Ok(())
    }
}

impl Operator for MergeOp {
    fn name(&self) -> &'static str {
        "Merge"
    }

    fn inputs(&self) -> Vec<&dyn Operator> {
        vec![self.outer.as_ref(), self.matcher.as_ref()]
    }

    fn inputs_mut(&mut self) -> Vec<&mut dyn Operator> {
        vec![self.outer.as_mut(), self.matcher.as_mut()]
    }

    fn next(&mut self, ctx: &mut ExecutionContext<'_>) -> ExecResult<Option<Record>> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Ok(Some(record));
            }
            match self.outer.next(ctx)? {
                Some(outer) => self.merge(ctx, outer)?,
                None => return Ok(None),
            }
        }
    }

    fn rewind(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::operators::{collect, ArgumentOp, FilterOp, NodeScanOp, OnceOp, UnwindOp};
    use crate::exec::{GraphAccess, MemoryBudget, QueryStatistics};
    use crate::plan::logical::{EdgeCreate, NodeCreate, NodeScan};
    use crate::storage::Graph;
    use std::collections::HashMap;

    fn run(g: &mut Graph, op: &mut dyn Operator) -> (Vec<Record>, QueryStatistics) {
        let mut ctx = ExecutionContext::new(GraphAccess::Write(g), HashMap::new(), MemoryBudget::unlimited());
        op.open(&mut ctx).unwrap();
        let rows = collect(op, &mut ctx).unwrap();
        (rows, ctx.stats)
    }

    fn node(slot: usize, label: &str, props: Option<Expr>) -> NodeCreate {
        NodeCreate {
            slot,
            labels: vec![label.to_string()],
            properties: props,
        }
    }

    fn v_map(v: Expr) -> Option<Expr> {
        Some(Expr::Map(vec![("v".to_string(), v)]))
    }

    fn scan(label: &str) -> Box<dyn Operator> {
        Box::new(NodeScanOp::new(
            NodeScan {
                slot: 0,
                label: Some(label.to_string()),
                extra_labels: Vec::new(),
                text: String::new(),
            },
            Box::new(OnceOp::new()),
        ))
    }

    #[test]
    fn test_create_nodes_and_edge() {
        let mut g = Graph::new("g");
        let spec = CreateSpec {
            nodes: vec![
                node(0, "L", v_map(Expr::constant(1i64))),
                node(1, "L", v_map(Expr::constant(Value::Null))),
            ],
            edges: vec![EdgeCreate {
                slot: 2,
                relation: "R".into(),
                source: 0,
                target: 1,
                properties: None,
            }],
            paths: Vec::new(),
        };
        let mut op = CreateOp::new(Box::new(OnceOp::new()), spec);
        let (rows, stats) = run(&mut g, &mut op);
        assert_eq!(rows.len(), 1);
        assert_eq!(stats.nodes_created, 2);
        assert_eq!(stats.relationships_created, 1);
        assert_eq!(stats.properties_set, 1);
        assert_eq!(stats.labels_added, 1);
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn test_update_set_and_remove() {
        let mut g = Graph::new("g");
        let mut create = CreateOp::new(
            Box::new(OnceOp::new()),
            CreateSpec {
                nodes: vec![node(0, "L", v_map(Expr::constant(1i64)))],
                ..Default::default()
            },
        );
        run(&mut g, &mut create);

        let items = vec![
            UpdateItem::SetProperty {
                target: Expr::Slot(0),
                key: "w".into(),
                value: Expr::constant(2i64),
            },
            UpdateItem::RemoveProperty {
                target: Expr::Slot(0),
                key: "v".into(),
            },
            UpdateItem::AddLabels {
                target: Expr::Slot(0),
                labels: vec!["M".into(), "L".into()],
            },
        ];
        let mut op = UpdateOp::new(scan("L"), items);
        let (_, stats) = run(&mut g, &mut op);
        assert_eq!(stats.properties_set, 1);
        assert_eq!(stats.properties_removed, 1);
        assert_eq!(stats.labels_added, 1);

        let mut op = UpdateOp::new(
            scan("M"),
            vec![UpdateItem::ReplaceProperties {
                target: Expr::Slot(0),
                value: Expr::constant(1i64),
            }],
        );
        let mut ctx = ExecutionContext::new(GraphAccess::Write(&mut g), HashMap::new(), MemoryBudget::unlimited());
        op.open(&mut ctx).unwrap();
        let err = collect(&mut op, &mut ctx).unwrap_err();
        assert!(err.to_string().contains("expected a map"));
    }

    #[test]
    fn test_delete_cascades() {
        let mut g = Graph::new("g");
        let spec = CreateSpec {
            nodes: vec![node(0, "A", None), node(1, "B", None)],
            edges: vec![EdgeCreate {
                slot: 2,
                relation: "R".into(),
                source: 0,
                target: 1,
                properties: None,
            }],
            paths: Vec::new(),
        };
        run(&mut g, &mut CreateOp::new(Box::new(OnceOp::new()), spec));
        let mut op = DeleteOp::new(scan("A"), vec![Expr::Slot(0)]);
        let (_, stats) = run(&mut g, &mut op);
        assert_eq!(stats.nodes_deleted, 1);
        assert_eq!(stats.relationships_deleted, 1);
        assert_eq!(g.node_count(), 1);
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn test_merge_creates_once_per_distinct_value() {
        let mut g = Graph::new("g");
        // UNWIND [1, 1, 2] AS x MERGE (n:N {v: x})
        let outer = UnwindOp::new(Box::new(OnceOp::new()), Expr::constant(vec![1i64, 1, 2]), 0);
        let matcher = NodeScanOp::new(
            NodeScan {
                slot: 1,
                label: Some("N".into()),
                extra_labels: Vec::new(),
                text: String::new(),
            },
            Box::new(ArgumentOp::new(0)),
        );
        let matcher = FilterOp::new(
            Box::new(matcher),
            Expr::binary(
                crate::ast::BinaryOperator::Equal,
                Expr::Property(Box::new(Expr::Slot(1)), "v".into()),
                Expr::Slot(0),
            ),
        );
        let spec = MergeSpec {
            argument: 0,
            create: CreateSpec {
                nodes: vec![node(1, "N", v_map(Expr::Slot(0)))],
                ..Default::default()
            },
            on_match: vec![UpdateItem::SetProperty {
                target: Expr::Slot(1),
                key: "seen".into(),
                value: Expr::constant(true),
            }],
            on_create: Vec::new(),
        };
        let mut op = MergeOp::new(Box::new(outer), Box::new(matcher), spec);
        let (rows, stats) = run(&mut g, &mut op);
        assert_eq!(rows.len(), 3);
        assert_eq!(stats.nodes_created, 2);
        assert_eq!(stats.properties_set, 3);
        assert_eq!(g.node_count(), 2);
    }
}
