// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Traversal operators
//!
//! Each operator extends its input records along relationships. The edge
//! values they bind keep the stored orientation regardless of the
//! direction the pattern was traversed in.

use std::collections::{HashMap, VecDeque};

use crate::ast::Direction;
use crate::exec::context::ExecutionContext;
use crate::exec::error::ExecResult;
use crate::exec::eval::{neighbours, node_has_labels, resolve_relations};
use crate::exec::operators::Operator;
use crate::exec::{set_slot, slot_value, Record};
use crate::plan::expr::Expr;
use crate::plan::logical::{AllShortestPaths, Traverse, VarLenTraverse};
use crate::storage::{AttributeId, EdgeId, EdgeValue, Graph, NodeId, NodeValue, PathValue, RelationId, Value};

/// Node id held in `slot`; `None` for null or non-node values.
fn bound_node(record: &Record, slot: usize) -> Option<NodeId> {
    slot_value(record, slot).as_node_id()
}

/// Per-record equality constraints on every traversed edge
struct EdgeFilter {
    constraints: Vec<(Option<AttributeId>, Value)>,
}

impl EdgeFilter {
    fn new(ctx: &ExecutionContext<'_>, properties: &[(String, Expr)], record: &Record) -> ExecResult<Self> {
        let schema = ctx.graph().schema();
        let constraints = properties
            .iter()
            .map(|(key, expr)| Ok((schema.attribute_id(key), ctx.eval(expr, record)?)))
            .collect::<ExecResult<_>>()?;
        Ok(Self { constraints })
    }

    fn admits(&self, graph: &Graph, edge: EdgeId) -> bool {
        self.constraints.iter().all(|(attr, expected)| {
            attr.and_then(|a| graph.edge_property(edge, a))
                .map(|actual| actual.equals(expected) == Some(true))
                .unwrap_or(false)
        })
    }
}

/// One hop from a bound node. In expand-into mode both endpoints are
/// bound and the relation matrices are probed for edges between them.
pub struct TraverseOp {
    spec: Traverse,
    into: bool,
    input: Box<dyn Operator>,
    pending: VecDeque<Record>,
}

impl TraverseOp {
    pub fn new(spec: Traverse, into: bool, input: Box<dyn Operator>) -> Self {
        Self {
            spec,
            into,
            input,
            pending: VecDeque::new(),
        }
    }

    fn expand(&mut self, graph: &Graph, record: Record) {
        let src = match bound_node(&record, self.spec.from) {
            Some(src) => src,
            None => return,
        };
        let relations = match resolve_relations(graph, &self.spec.relations) {
            Some(relations) => relations,
            None => return,
        };
        let relations = relations.as_deref();
        let hops: Vec<(EdgeValue, NodeId)> = if self.into {
            let dst = match bound_node(&record, self.spec.to) {
                Some(dst) => dst,
                None => return,
            };
            let mut hops: Vec<(EdgeValue, NodeId)> = Vec::new();
            if matches!(self.spec.direction, Direction::Outgoing | Direction::Both) {
                for e in graph.edges_between(src, dst, relations) {
                    hops.push((EdgeValue::reference(e, src, dst), dst));
                }
            }
            if matches!(self.spec.direction, Direction::Incoming | Direction::Both) {
                for e in graph.edges_between(dst, src, relations) {
                    if self.spec.direction == Direction::Both && src == dst {
                        continue;
                    }
                    hops.push((EdgeValue::reference(e, dst, src), dst));
                }
            }
            hops
        } else {
            neighbours(graph, src, relations, self.spec.direction)
        };
        for (edge, dst) in hops {
            if !self.spec.to_labels.is_empty()
                && !node_has_labels(graph, &NodeValue::reference(dst), &self.spec.to_labels)
            {
                continue;
            }
            let mut out = record.clone();
            set_slot(&mut out, self.spec.edge, Value::Edge(edge));
            if !self.into {
                set_slot(&mut out, self.spec.to, Value::Node(NodeValue::reference(dst)));
            }
            self.pending.push_back(out);
        }
    }
}

impl Operator for TraverseOp {
    fn name(&self) -> &'static str {
        if self.into {
            "Expand Into"
        } else {
            "Conditional Traverse"
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
            if let Some(record) = self.pending.pop_front() {
                return Ok(Some(record));
            }
            match self.input.next(ctx)? {
                Some(record) => self.expand(ctx.graph(), record),
                None => return Ok(None),
            }
        }
    }

    fn rewind(&mut self) {
        self.pending.clear();
    }
}

/// Edge-unique walk being extended by the variable-length traversal
struct Walk {
    nodes: Vec<NodeId>,
    edges: Vec<EdgeValue>,
}

impl Walk {
    fn uses(&self, edge: EdgeId) -> bool {
        self.edges.iter().any(|e| e.id == edge)
    }

    fn path(&self, reversed: bool) -> PathValue {
        let mut nodes: Vec<NodeValue> = self.nodes.iter().map(|n| NodeValue::reference(*n)).collect();
        let mut edges = self.edges.clone();
        if reversed {
            nodes.reverse();
            edges.reverse();
        }
        PathValue { nodes, edges }
    }
}

/// `[*min..max]` traversal. Every emitted walk uses each edge at most once.
pub struct VarLenTraverseOp {
    spec: VarLenTraverse,
    input: Box<dyn Operator>,
    pending: VecDeque<Record>,
}

impl VarLenTraverseOp {
    pub fn new(spec: VarLenTraverse, input: Box<dyn Operator>) -> Self {
        Self {
            spec,
            input,
            pending: VecDeque::new(),
        }
    }

    fn expand(&mut self, ctx: &ExecutionContext<'_>, record: Record) -> ExecResult<()> {
        let graph = ctx.graph();
        let src = match bound_node(&record, self.spec.from) {
            Some(src) => src,
            None => return Ok(()),
        };
        let target = if self.spec.into {
            match bound_node(&record, self.spec.to) {
                Some(dst) => Some(dst),
                None => return Ok(()),
            }
        } else {
            None
        };
        // outer `None`: an unknown type, so only the zero-hop walk can match
        let relations = match resolve_relations(graph, &self.spec.relations) {
            Some(relations) => Some(relations),
            None if self.spec.min_hops == 0 => None,
            None => return Ok(()),
        };
        let filter = EdgeFilter::new(ctx, &self.spec.edge_properties, &record)?;

        let mut stack = vec![Walk {
            nodes: vec![src],
            edges: Vec::new(),
        }];
        while let Some(walk) = stack.pop() {
            let depth = walk.edges.len() as u64;
            let end = walk.nodes[walk.nodes.len() - 1];
            if depth >= self.spec.min_hops && self.accepts(graph, end, target) {
                self.emit(&record, &walk, end);
            }
            if self.spec.max_hops.map(|m| depth >= m).unwrap_or(false) {
                continue;
            }
            let Some(relations) = relations.as_ref() else {
                continue;
            };
            let mut steps = neighbours(graph, end, relations.as_deref(), self.spec.direction);
            // popped in reverse, so the walk order follows adjacency order
            steps.reverse();
            for (edge, next) in steps {
                if walk.uses(edge.id) || !filter.admits(graph, edge.id) {
                    continue;
                }
                let mut nodes = walk.nodes.clone();
                nodes.push(next);
                let mut edges = walk.edges.clone();
                edges.push(edge);
                stack.push(Walk { nodes, edges });
            }
        }
        Ok(())
    }

    fn accepts(&self, graph: &Graph, end: NodeId, target: Option<NodeId>) -> bool {
        if let Some(target) = target {
            return end == target;
        }
        self.spec.to_labels.is_empty()
            || node_has_labels(graph, &NodeValue::reference(end), &self.spec.to_labels)
    }

    fn emit(&mut self, record: &Record, walk: &Walk, end: NodeId) {
        let mut out = record.clone();
        if !self.spec.into {
            set_slot(&mut out, self.spec.to, Value::Node(NodeValue::reference(end)));
        }
        let path = walk.path(self.spec.reversed);
        if let Some(slot) = self.spec.edges {
            let edges = path.edges.iter().cloned().map(Value::Edge).collect();
            set_slot(&mut out, slot, Value::List(edges));
        }
        if let Some(slot) = self.spec.path {
            set_slot(&mut out, slot, Value::Path(path));
        }
        self.pending.push_back(out);
    }
}

impl Operator for VarLenTraverseOp {
    fn name(&self) -> &'static str {
        "Conditional Variable Length Traverse"
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
            match self.input.next(ctx)? {
                Some(record) => self.expand(ctx, record)?,
                None => return Ok(None),
            }
        }
    }

    fn rewind(&mut self) {
        self.pending.clear();
    }
}

/// Every minimum-length path between two bound nodes
pub struct AllShortestPathsOp {
    spec: AllShortestPaths,
    input: Box<dyn Operator>,
    pending: VecDeque<Record>,
}

type Parents = HashMap<NodeId, Vec<(EdgeValue, NodeId)>>;

impl AllShortestPathsOp {
    pub fn new(spec: AllShortestPaths, input: Box<dyn Operator>) -> Self {
        Self {
            spec,
            input,
            pending: VecDeque::new(),
        }
    }

    fn expand(&mut self, ctx: &ExecutionContext<'_>, record: Record) -> ExecResult<()> {
        let graph = ctx.graph();
        let (src, dst) = match (bound_node(&record, self.spec.from), bound_node(&record, self.spec.to)) {
            (Some(s), Some(d)) => (s, d),
            _ => return Ok(()),
        };
        let relations = match resolve_relations(graph, &self.spec.relations) {
            Some(relations) => relations,
            None => return Ok(()),
        };
        let filter = EdgeFilter::new(ctx, &self.spec.edge_properties, &record)?;

        let paths = if src == dst && self.spec.min_hops == 0 {
            vec![PathValue::single(NodeValue::reference(src))]
        } else if src != dst && self.spec.min_hops <= 1 {
            self.layered(graph, src, dst, relations.as_deref(), &filter)
        } else {
            self.deepening(graph, src, dst, relations.as_deref(), &filter)
        };

        for path in paths {
            let mut out = record.clone();
            if let Some(slot) = self.spec.edges {
                let edges = path.edges.iter().cloned().map(Value::Edge).collect();
                set_slot(&mut out, slot, Value::List(edges));
            }
            set_slot(&mut out, self.spec.path, Value::Path(path));
            self.pending.push_back(out);
        }
        Ok(())
    }

    /// Breadth-first layers from `src`, keeping every parent that reaches a
    /// node at its first-seen depth.
    fn layered(
        &self,
        graph: &Graph,
        src: NodeId,
        dst: NodeId,
        relations: Option<&[RelationId]>,
        filter: &EdgeFilter,
    ) -> Vec<PathValue> {
        let mut depth_of: HashMap<NodeId, u64> = HashMap::from([(src, 0)]);
        let mut parents: Parents = HashMap::new();
        let mut layer = vec![src];
        let mut depth = 0u64;
        while !layer.is_empty() && !depth_of.contains_key(&dst) {
            if self.spec.max_hops.map(|m| depth >= m).unwrap_or(false) {
                break;
            }
            let mut next_layer = Vec::new();
            for node in layer {
                for (edge, next) in neighbours(graph, node, relations, self.spec.direction) {
                    if !filter.admits(graph, edge.id) {
                        continue;
                    }
                    match depth_of.get(&next) {
                        None => {
                            depth_of.insert(next, depth + 1);
                            next_layer.push(next);
                            parents.entry(next).or_default().push((edge, node));
                        }
                        Some(d) if *d == depth + 1 => {
                            parents.entry(next).or_default().push((edge, node));
                        }
                        Some(_) => {}
                    }
                }
            }
            layer = next_layer;
            depth += 1;
        }
        if !depth_of.contains_key(&dst) {
            return Vec::new();
        }
        let mut out = Vec::new();
        unwind_parents(&parents, src, dst, &mut Vec::new(), &mut out);
        out
    }

    /// Iterative deepening over edge-unique walks; used when the shortest
    /// path must be at least `min_hops` long or closes a cycle.
    fn deepening(
        &self,
        graph: &Graph,
        src: NodeId,
        dst: NodeId,
        relations: Option<&[RelationId]>,
        filter: &EdgeFilter,
    ) -> Vec<PathValue> {
        let limit = self.spec.max_hops.unwrap_or(graph.edge_count() as u64);
        let mut depth = self.spec.min_hops.max(1);
        while depth <= limit {
            let mut found = Vec::new();
            let mut walk = Walk {
                nodes: vec![src],
                edges: Vec::new(),
            };
            self.walks_of_length(graph, dst, relations, filter, depth, &mut walk, &mut found);
            if !found.is_empty() {
                return found;
            }
            depth += 1;
        }
        Vec::new()
    }

    #[allow(clippy::too_many_arguments)]
    fn walks_of_length(
        &self,
        graph: &Graph,
        dst: NodeId,
        relations: Option<&[RelationId]>,
        filter: &EdgeFilter,
        remaining: u64,
        walk: &mut Walk,
        found: &mut Vec<PathValue>,
    ) {
        let end = walk.nodes[walk.nodes.len() - 1];
        if remaining == 0 {
            if end == dst {
                found.push(walk.path(false));
            }
            return;
        }
        for (edge, next) in neighbours(graph, end, relations, self.spec.direction) {
            if walk.uses(edge.id) || !filter.admits(graph, edge.id) {
                continue;
            }
            walk.nodes.push(next);
            walk.edges.push(edge);
            self.walks_of_length(graph, dst, relations, filter, remaining - 1, walk, found);
            walk.nodes.pop();
            walk.edges.pop();
        }
    }
}

/// Enumerate the parent DAG from `node` back to `src`.
fn unwind_parents(
    parents: &Parents,
    src: NodeId,
    node: NodeId,
    suffix: &mut Vec<(EdgeValue, NodeId)>,
    out: &mut Vec<PathValue>,
) {
    if node == src {
        let mut path = PathValue::single(NodeValue::reference(src));
        for (edge, n) in suffix.iter().rev() {
            path.edges.push(edge.clone());
            path.nodes.push(NodeValue::reference(*n));
        }
        out.push(path);
        return;
    }
    if let Some(options) = parents.get(&node) {
        for (edge, prev) in options {
            suffix.push((edge.clone(), node));
            unwind_parents(parents, src, *prev, suffix, out);
            suffix.pop();
        }
    }
}

impl Operator for AllShortestPathsOp {
    fn name(&self) -> &'static str {
        "All Shortest Paths"
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
            match self.input.next(ctx)? {
                Some(record) => self.expand(ctx, record)?,
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
    use crate::exec::operators::{collect, NodeScanOp, OnceOp};
    use crate::exec::{GraphAccess, MemoryBudget};
    use crate::plan::logical::NodeScan;
    use crate::storage::PropertyMap;

    /// v0 -> v1 -> v2 -> v3, v0 -> v4 -> v3, v1 -> v3
    fn diamond() -> Graph {
        let mut g = Graph::new("g");
        let e = g.intern_relation("E").unwrap();
        let ids: Vec<NodeId> = (0..5)
            .map(|_| g.create_node(&[], PropertyMap::new()).unwrap())
            .collect();
        for (a, b) in [(0, 1), (1, 2), (2, 3), (0, 4), (4, 3), (1, 3)] {
            g.create_edge(e, ids[a], ids[b], PropertyMap::new()).unwrap();
        }
        g.commit().unwrap();
        g
    }

    fn seed(node: NodeId, other: Option<NodeId>) -> Box<dyn Operator> {
        struct Fixed(Option<Record>);
        impl Operator for Fixed {
            fn name(&self) -> &'static str {
                "Fixed"
            }
            fn inputs(&self) -> Vec<&dyn Operator> {
                Vec::new()
            }
            fn inputs_mut(&mut self) -> Vec<&mut dyn Operator> {
                Vec::new()
            }
            fn next(&mut self, _: &mut ExecutionContext<'_>) -> ExecResult<Option<Record>> {
                Ok(self.0.take())
            }
        }
        let mut record = vec![Value::Node(NodeValue::reference(node))];
        if let Some(other) = other {
            record.push(Value::Null);
            record.push(Value::Node(NodeValue::reference(other)));
        }
        Box::new(Fixed(Some(record)))
    }

    fn run(g: &Graph, op: &mut dyn Operator) -> Vec<Record> {
        let mut ctx = ExecutionContext::new(GraphAccess::Read(g), HashMap::new(), MemoryBudget::unlimited());
        op.open(&mut ctx).unwrap();
        collect(op, &mut ctx).unwrap()
    }

    fn hop(direction: Direction) -> Traverse {
        Traverse {
            from: 0,
            edge: 1,
            to: 2,
            relations: vec!["E".into()],
            direction,
            to_labels: Vec::new(),
            text: String::new(),
        }
    }

    #[test]
    fn test_traverse_directions() {
        let g = diamond();
        let mut out = TraverseOp::new(hop(Direction::Outgoing), false, seed(1, None));
        assert_eq!(run(&g, &mut out).len(), 2);
        let mut inc = TraverseOp::new(hop(Direction::Incoming), false, seed(3, None));
        assert_eq!(run(&g, &mut inc).len(), 3);
        let mut both = TraverseOp::new(hop(Direction::Both), false, seed(1, None));
        let rows = run(&g, &mut both);
        assert_eq!(rows.len(), 3);
        // edges keep their stored orientation
        let incoming = rows
            .iter()
            .filter_map(|r| r[1].as_edge())
            .find(|e| e.dst == 1)
            .unwrap();
        assert_eq!(incoming.src, 0);
    }

    #[test]
    fn test_expand_into() {
        let g = diamond();
        let mut into = TraverseOp::new(hop(Direction::Outgoing), true, seed(1, Some(3)));
        assert_eq!(run(&g, &mut into).len(), 1);
        let mut none = TraverseOp::new(hop(Direction::Outgoing), true, seed(3, Some(1)));
        assert!(run(&g, &mut none).is_empty());
        let mut reverse = TraverseOp::new(hop(Direction::Incoming), true, seed(3, Some(1)));
        assert_eq!(run(&g, &mut reverse).len(), 1);
    }

    fn var_len(min: u64, max: Option<u64>) -> VarLenTraverse {
        VarLenTraverse {
            from: 0,
            to: 2,
            into: false,
            edges: None,
            path: Some(3),
            relations: Vec::new(),
            direction: Direction::Outgoing,
            min_hops: min,
            max_hops: max,
            edge_properties: Vec::new(),
            to_labels: Vec::new(),
            reversed: false,
            text: String::new(),
        }
    }

    #[test]
    fn test_var_len_bounds() {
        let g = diamond();
        // from v0: 1 hop -> v1, v4; 2 hops -> v2, v3 (via v1), v3 (via v4)
        let mut op = VarLenTraverseOp::new(var_len(1, Some(2)), seed(0, None));
        assert_eq!(run(&g, &mut op).len(), 5);
        let mut op = VarLenTraverseOp::new(var_len(0, Some(0)), seed(0, None));
        let rows = run(&g, &mut op);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][2].as_node_id(), Some(0));
    }

    #[test]
    fn test_var_len_unknown_type_only_matches_zero_hops() {
        let g = diamond();
        let mut spec = var_len(0, None);
        spec.relations = vec!["Missing".into()];
        let rows = run(&g, &mut VarLenTraverseOp::new(spec.clone(), seed(0, None)));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][2].as_node_id(), Some(0));

        spec.min_hops = 1;
        assert!(run(&g, &mut VarLenTraverseOp::new(spec, seed(0, None))).is_empty());

        // no type list walks every relationship
        let rows = run(&g, &mut VarLenTraverseOp::new(var_len(0, None), seed(0, None)));
        assert_eq!(rows.len(), 7);
    }

    #[test]
    fn test_var_len_reversed_path_order() {
        let g = diamond();
        let mut spec = var_len(2, Some(2));
        spec.direction = Direction::Incoming;
        spec.reversed = true;
        let mut op = VarLenTraverseOp::new(spec, seed(2, None));
        let rows = run(&g, &mut op);
        assert_eq!(rows.len(), 1);
        match &rows[0][3] {
            Value::Path(p) => {
                assert_eq!(p.nodes.first().map(|n| n.id), Some(0));
                assert_eq!(p.nodes.last().map(|n| n.id), Some(2));
            }
            other => panic!("expected path, got {:?}", other),
        }
    }

    #[test]
    fn test_all_shortest_paths() {
        let g = diamond();
        let spec = AllShortestPaths {
            from: 0,
            to: 2,
            path: 3,
            edges: None,
            relations: Vec::new(),
            direction: Direction::Outgoing,
            min_hops: 1,
            max_hops: None,
            edge_properties: Vec::new(),
            text: String::new(),
        };
        let mut op = AllShortestPathsOp::new(spec.clone(), seed(0, Some(3)));
        let rows = run(&g, &mut op);
        assert_eq!(rows.len(), 2);
        for row in &rows {
            match &row[3] {
                Value::Path(p) => assert_eq!(p.len(), 2),
                other => panic!("expected path, got {:?}", other),
            }
        }

        let mut longer = spec;
        longer.min_hops = 3;
        let mut op = AllShortestPathsOp::new(longer, seed(0, Some(3)));
        assert_eq!(run(&g, &mut op).len(), 1);
    }

    #[test]
    fn test_scan_then_traverse_pipeline() {
        let g = diamond();
        let scan = NodeScanOp::new(
            NodeScan {
                slot: 0,
                label: None,
                extra_labels: Vec::new(),
                text: String::new(),
            },
            Box::new(OnceOp::new()),
        );
        let mut op = TraverseOp::new(hop(Direction::Outgoing), false, Box::new(scan));
        assert_eq!(run(&g, &mut op).len(), 6);
    }
}
