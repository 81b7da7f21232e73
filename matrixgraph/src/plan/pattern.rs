// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! `MATCH` planning
//!
//! A match clause is split into connected components. Each component is
//! planned from a single start node chosen by a fixed ranking (already
//! bound, index lookup, equality filter, label, range filter, anything)
//! and grown one relationship at a time. Filters and named paths are
//! placed as soon as every slot they read is bound. Components that share
//! no bound variable with the incoming stream are joined to it with a
//! value hash join when an equality conjunct links the two sides, and with
//! a cartesian product otherwise.

use std::collections::{BTreeSet, HashMap, HashSet};

use petgraph::unionfind::UnionFind;

use crate::ast::{
    BinaryOperator, Direction, Expression, MatchClause, NodePattern, PathKind, PathPattern,
    RelationshipPattern,
};
use crate::exec::{ExecResult, ExecutionError};
use crate::plan::compile::{comprehension_key, pattern_key, ExprCompiler};
use crate::plan::expr::{Expr, PathPart};
use crate::plan::logical::{
    AllShortestPaths, IndexPredicate, IndexScan, LogicalOp, LogicalPlan, NodeScan, Traverse,
    VarLenTraverse,
};
use crate::plan::planner::{Planner, Stream};
use crate::plan::scope::VarKind;
use crate::storage::EntityKind;

struct PatternNode {
    slot: usize,
    labels: Vec<String>,
    /// Bound by an earlier clause
    bound: bool,
}

enum EdgeShape {
    Single {
        slot: usize,
    },
    VarLen {
        edges: Option<usize>,
        segment: Option<usize>,
    },
    AllShortest {
        edges: Option<usize>,
        path: usize,
    },
}

struct PatternEdge<'q> {
    left: usize,
    right: usize,
    rel: &'q RelationshipPattern,
    shape: EdgeShape,
    planned: bool,
}

struct Conjunct {
    expr: Expr,
    slots: BTreeSet<usize>,
    placed: bool,
}

struct PathBuild {
    slot: usize,
    parts: Vec<PathPart>,
    built: bool,
}

impl PathBuild {
    fn slots(&self) -> BTreeSet<usize> {
        Expr::BuildPath(self.parts.clone()).slots()
    }
}

/// Slots of one pattern's entities, in pattern order
#[derive(Debug, Clone, Default)]
pub(crate) struct PatternSlots {
    pub nodes: Vec<usize>,
    /// Slot of each single-hop relationship
    pub edges: Vec<Option<usize>>,
    pub path: Option<usize>,
}

/// Everything one match clause binds, before any operator is placed
#[derive(Default)]
struct MatchGraph<'q> {
    slots: Vec<PatternSlots>,
    nodes: Vec<PatternNode>,
    edges: Vec<PatternEdge<'q>>,
    paths: Vec<PathBuild>,
    /// Inline property maps, `(slot, map)`, compiled once all names exist
    inline: Vec<(usize, &'q Expression)>,
    /// Equalities tying a re-used relationship variable to its new slot
    rebinds: Vec<(usize, usize)>,
}

/// Comparison of a single entity property against another expression,
/// normalised so the property is on the left.
struct AttributeComparison<'e> {
    slot: usize,
    key: &'e str,
    op: BinaryOperator,
    rhs: &'e Expr,
}

fn flip_comparison(op: BinaryOperator) -> Option<BinaryOperator> {
    Some(match op {
        BinaryOperator::Equal => BinaryOperator::Equal,
        BinaryOperator::LessThan => BinaryOperator::GreaterThan,
        BinaryOperator::LessEqual => BinaryOperator::GreaterEqual,
        BinaryOperator::GreaterThan => BinaryOperator::LessThan,
        BinaryOperator::GreaterEqual => BinaryOperator::LessEqual,
        _ => return None,
    })
}

/// `slot.key` when `expr` reads a property of a record slot
fn slot_property(expr: &Expr) -> Option<(usize, &str)> {
    match expr {
        Expr::Property(base, key) => match base.as_ref() {
            Expr::Slot(slot) => Some((*slot, key.as_str())),
            _ => None,
        },
        _ => None,
    }
}

fn attribute_comparison(expr: &Expr) -> Option<AttributeComparison<'_>> {
    let Expr::Binary(op, lhs, rhs) = expr else {
        return None;
    };
    let is_lookup = matches!(
        op,
        BinaryOperator::Equal
            | BinaryOperator::LessThan
            | BinaryOperator::LessEqual
            | BinaryOperator::GreaterThan
            | BinaryOperator::GreaterEqual
            | BinaryOperator::StartsWith
    );
    if !is_lookup {
        return None;
    }
    if let Some((slot, key)) = slot_property(lhs) {
        if !rhs.slots().contains(&slot) {
            return Some(AttributeComparison {
                slot,
                key,
                op: *op,
                rhs,
            });
        }
    }
    if let (Some((slot, key)), Some(op)) = (slot_property(rhs), flip_comparison(*op)) {
        if !lhs.slots().contains(&slot) {
            return Some(AttributeComparison {
                slot,
                key,
                op,
                rhs: lhs,
            });
        }
    }
    None
}

/// Split a predicate on its top-level `AND`s.
pub(crate) fn split_conjuncts(expression: &Expression) -> Vec<&Expression> {
    match expression {
        Expression::Binary(BinaryOperator::And, l, r) => {
            let mut out = split_conjuncts(l);
            out.extend(split_conjuncts(r));
            out
        }
        other => vec![other],
    }
}

fn has_pattern(expression: &Expression) -> bool {
    expression.any(&|e| {
        matches!(e, Expression::Pattern(p) if p.kind == PathKind::Normal)
            || matches!(e, Expression::PatternComprehension { .. })
    })
}

fn flip(direction: Direction) -> Direction {
    match direction {
        Direction::Outgoing => Direction::Incoming,
        Direction::Incoming => Direction::Outgoing,
        Direction::Both => Direction::Both,
    }
}

fn hops(rel: &RelationshipPattern) -> (u64, Option<u64>) {
    match rel.range {
        Some(range) => (range.min.unwrap_or(1), range.max),
        None => (1, Some(1)),
    }
}

fn inline_map(expression: &Expression) -> ExecResult<&[(String, Expression)]> {
    match expression {
        Expression::Map(entries) => Ok(entries),
        _ => Err(ExecutionError::syntax(
            "Encountered unhandled type in inlined properties.",
        )),
    }
}

impl<'g> Planner<'g> {
    pub(crate) fn plan_match(&mut self, stream: &mut Stream, clause: &MatchClause) -> ExecResult<()> {
        if !clause.optional {
            return self
                .plan_patterns(stream, &clause.patterns, clause.where_clause.as_ref())
                .map(|_| ());
        }
        let argument = self.next_argument();
        let mut inner = stream.branch(LogicalPlan::leaf(LogicalOp::Argument { id: argument }));
        let before = inner.scope.width();
        self.plan_patterns(&mut inner, &clause.patterns, clause.where_clause.as_ref())?;
        let inner_plan = inner
            .plan
            .ok_or_else(|| ExecutionError::Internal("empty optional match plan".to_string()))?;
        let op = LogicalOp::Apply {
            argument,
            optional: true,
            inner_slots: (before..inner.scope.width()).collect(),
        };
        stream.plan = Some(LogicalPlan::apply(op, stream.plan.take(), inner_plan));
        // null-extended rows carry no labels
        stream.scope = inner.scope;
        Ok(())
    }

    /// Plan every pattern expression and pattern comprehension nested in
    /// `expressions` as a rollup over the stream. Returns the slot of each,
    /// by rollup key.
    pub(crate) fn plan_rollups(
        &mut self,
        stream: &mut Stream,
        expressions: &[&Expression],
    ) -> ExecResult<HashMap<String, usize>> {
        let mut found: Vec<&Expression> = Vec::new();
        // planned inside their comprehension's own rollup
        let mut nested: Vec<&Expression> = Vec::new();
        for expression in expressions {
            expression.walk(&mut |e| match e {
                Expression::Pattern(p) if p.kind == PathKind::Normal => found.push(e),
                Expression::PatternComprehension {
                    predicate,
                    projection,
                    ..
                } => {
                    found.push(e);
                    if let Some(p) = predicate {
                        p.walk(&mut |inner| nested.push(inner));
                    }
                    projection.walk(&mut |inner| nested.push(inner));
                }
                _ => {}
            });
        }
        found.retain(|e| !nested.iter().any(|n| std::ptr::eq(*n, *e)));

        let mut rollups = HashMap::new();
        for expression in found {
            match expression {
                Expression::Pattern(pattern) => {
                    let key = pattern_key(pattern);
                    if !rollups.contains_key(&key) {
                        let slot = self.plan_pattern_rollup(stream, pattern)?;
                        rollups.insert(key, slot);
                    }
                }
                Expression::PatternComprehension {
                    pattern,
                    predicate,
                    projection,
                } => {
                    let key = comprehension_key(expression);
                    if !rollups.contains_key(&key) {
                        let slot =
                            self.plan_comprehension(stream, pattern, predicate.as_deref(), projection)?;
                        rollups.insert(key, slot);
                    }
                }
                _ => {}
            }
        }
        Ok(rollups)
    }

    /// Rollup of the paths matching `pattern` for each record
    fn plan_pattern_rollup(&mut self, stream: &mut Stream, pattern: &PathPattern) -> ExecResult<usize> {
        let slot = stream.scope.hidden(VarKind::Value);
        let argument = self.next_argument();
        let mut inner = stream.branch(LogicalPlan::leaf(LogicalOp::Argument { id: argument }));
        let path_name = format!("@rollup_{}", slot);
        let mut named = pattern.clone();
        named.variable = Some(path_name.clone());
        self.plan_patterns(&mut inner, std::slice::from_ref(&named), None)?;
        let path_slot = inner
            .scope
            .lookup(&path_name)
            .ok_or_else(|| ExecutionError::Internal("rollup path not bound".to_string()))?;
        let inner_plan = inner
            .plan
            .ok_or_else(|| ExecutionError::Internal("empty rollup plan".to_string()))?;
        let op = LogicalOp::RollupApply {
            argument,
            collect: Expr::Slot(path_slot),
            slot,
        };
        stream.plan = Some(LogicalPlan::apply(op, stream.plan.take(), inner_plan));
        Ok(slot)
    }

    /// Rollup of `projection` over every match of `pattern` for each record
    fn plan_comprehension(
        &mut self,
        stream: &mut Stream,
        pattern: &PathPattern,
        predicate: Option<&Expression>,
        projection: &Expression,
    ) -> ExecResult<usize> {
        let slot = stream.scope.hidden(VarKind::Value);
        let argument = self.next_argument();
        let mut inner = stream.branch(LogicalPlan::leaf(LogicalOp::Argument { id: argument }));
        self.plan_patterns(&mut inner, std::slice::from_ref(pattern), predicate)?;
        let nested = self.plan_rollups(&mut inner, &[projection])?;
        let collect = ExprCompiler::new(&inner.scope)
            .with_rollups(&nested)
            .compile(projection)?;
        let inner_plan = inner
            .plan
            .ok_or_else(|| ExecutionError::Internal("empty rollup plan".to_string()))?;
        let op = LogicalOp::RollupApply {
            argument,
            collect,
            slot,
        };
        stream.plan = Some(LogicalPlan::apply(op, stream.plan.take(), inner_plan));
        Ok(slot)
    }

    pub(crate) fn plan_patterns(
        &mut self,
        stream: &mut Stream,
        patterns: &[PathPattern],
        where_clause: Option<&Expression>,
    ) -> ExecResult<Vec<PatternSlots>> {
        let before = stream.scope.width();
        let graph = self.declare_patterns(stream, patterns)?;

        // conjuncts: inline properties, rebinds, then WHERE
        let mut conjuncts = Vec::new();
        let mut deferred = Vec::new();
        {
            let mut compiler = ExprCompiler::new(&stream.scope);
            for (slot, map) in &graph.inline {
                for (key, value) in inline_map(map)? {
                    let expr = Expr::binary(
                        BinaryOperator::Equal,
                        Expr::Property(Box::new(Expr::Slot(*slot)), key.clone()),
                        compiler.compile(value)?,
                    );
                    conjuncts.push(expr);
                }
            }
            for (hidden, named) in &graph.rebinds {
                conjuncts.push(Expr::binary(
                    BinaryOperator::Equal,
                    Expr::Slot(*hidden),
                    Expr::Slot(*named),
                ));
            }
            if let Some(predicate) = where_clause {
                for part in split_conjuncts(predicate) {
                    if has_pattern(part) {
                        deferred.push(part);
                    } else {
                        conjuncts.push(compiler.predicate(part)?);
                    }
                }
            }
        }
        let mut conjuncts: Vec<Conjunct> = conjuncts
            .into_iter()
            .map(|expr| Conjunct {
                slots: expr.slots(),
                expr,
                placed: false,
            })
            .collect();
        let MatchGraph {
            slots,
            nodes,
            mut edges,
            mut paths,
            ..
        } = graph;

        let mut bound: HashSet<usize> = (0..before).collect();
        if stream.plan.is_some() {
            place(&mut stream.plan, &bound, &mut conjuncts, &mut paths, |_| true);
        }

        for component in components(&nodes, &edges) {
            let start = component
                .iter()
                .copied()
                .find(|n| nodes[*n].bound)
                .map(|n| (n, 0u8, None))
                .unwrap_or_else(|| self.choose_start(stream, &nodes, &component, &conjuncts, &bound));
            let (start, _, index) = start;

            if nodes[start].bound {
                let slot = nodes[start].slot;
                let missing = stream.missing_labels(slot, &nodes[start].labels);
                if !missing.is_empty() {
                    stream.push(LogicalOp::Filter(Expr::HasLabels(Box::new(Expr::Slot(slot)), missing)));
                }
                stream.enforce(slot, &nodes[start].labels);
                let mut plan = stream.plan.take();
                self.grow(stream, &mut plan, &nodes, &mut edges, &mut conjuncts, &mut paths, &mut bound, |_| true)?;
                stream.plan = plan;
                continue;
            }

            // standalone component, joined to the stream afterwards
            let slot = nodes[start].slot;
            let text = stream.node_text(slot, &nodes[start].labels);
            let leaf = match index {
                Some(scan) => LogicalOp::IndexScan(IndexScan { text, ..scan }),
                None => {
                    let mut labels = nodes[start].labels.clone().into_iter();
                    let spec = NodeScan {
                        slot,
                        label: labels.next(),
                        extra_labels: labels.collect(),
                        text,
                    };
                    if spec.label.is_some() {
                        LogicalOp::LabelScan(spec)
                    } else {
                        LogicalOp::AllNodeScan(spec)
                    }
                }
            };
            stream.enforce(slot, &nodes[start].labels);
            let mut plan = Some(LogicalPlan::leaf(leaf));
            let mut own: HashSet<usize> = HashSet::from([slot]);
            self.grow(
                stream,
                &mut plan,
                &nodes,
                &mut edges,
                &mut conjuncts,
                &mut paths,
                &mut own,
                |_| true,
            )?;
            let component_plan =
                plan.ok_or_else(|| ExecutionError::Internal("empty component plan".to_string()))?;
            let mut right_slots: Vec<usize> = own.iter().copied().collect();
            right_slots.sort_unstable();

            stream.plan = Some(match stream.plan.take() {
                None => component_plan,
                Some(left) => match take_join_key(&mut conjuncts, &bound, &own) {
                    Some((left_key, right_key)) => LogicalPlan::binary(
                        LogicalOp::ValueHashJoin {
                            left_key,
                            right_key,
                            right_slots,
                        },
                        left,
                        component_plan,
                    ),
                    None => LogicalPlan::binary(
                        LogicalOp::CartesianProduct { right_slots },
                        left,
                        component_plan,
                    ),
                },
            });
            bound.extend(own);
            place(&mut stream.plan, &bound, &mut conjuncts, &mut paths, |_| true);
        }

        // allShortestPaths need both endpoints bound
        for i in 0..edges.len() {
            let EdgeShape::AllShortest { edges: edge_list, path } = edges[i].shape else {
                continue;
            };
            let edge = &edges[i];
            let (from, to) = (nodes[edge.left].slot, nodes[edge.right].slot);
            let (min_hops, max_hops) = hops(edge.rel);
            let text = format!(
                "{}{}{}",
                stream.node_text(from, &[]),
                stream.edge_text(None, edge.rel, edge.rel.direction),
                stream.node_text(to, &[]),
            );
            let op = LogicalOp::AllShortestPaths(AllShortestPaths {
                from,
                to,
                path,
                edges: edge_list,
                relations: edge.rel.types.clone(),
                direction: edge.rel.direction,
                min_hops,
                max_hops,
                edge_properties: self.edge_properties(stream, edge.rel)?,
                text,
            });
            edges[i].planned = true;
            stream.push(op);
            bound.insert(path);
            bound.extend(edge_list);
            place(&mut stream.plan, &bound, &mut conjuncts, &mut paths, |_| true);
        }

        if conjuncts.iter().any(|c| !c.placed) || paths.iter().any(|p| !p.built) {
            return Err(ExecutionError::Internal(
                "match clause left unresolved predicates".to_string(),
            ));
        }

        if !deferred.is_empty() {
            let rollups = self.plan_rollups(stream, &deferred)?;
            let mut compiler = ExprCompiler::new(&stream.scope).with_rollups(&rollups);
            let predicates = deferred
                .iter()
                .map(|e| compiler.predicate(e))
                .collect::<ExecResult<Vec<_>>>()?;
            if let Some(predicate) = Expr::conjunction(predicates) {
                stream.push(LogicalOp::Filter(predicate));
            }
        }
        Ok(slots)
    }

    /// Declare every variable of the clause and collect its entities.
    fn declare_patterns<'q>(
        &self,
        stream: &mut Stream,
        patterns: &'q [PathPattern],
    ) -> ExecResult<MatchGraph<'q>> {
        let before = stream.scope.width();
        let mut graph = MatchGraph::default();
        let mut node_index: HashMap<usize, usize> = HashMap::new();
        let mut clause_relationships: HashSet<&str> = HashSet::new();

        for pattern in patterns {
            if pattern.kind == PathKind::ShortestPath {
                return Err(ExecutionError::syntax(
                    "RedisGraph currently only supports shortestPath in WITH or RETURN clauses",
                ));
            }
            if pattern.kind == PathKind::AllShortestPaths && pattern.steps.len() != 1 {
                return Err(ExecutionError::syntax(
                    "allShortestPaths requires a pattern of exactly one relationship",
                ));
            }

            let mut node_slots = Vec::with_capacity(pattern.steps.len() + 1);
            for node in pattern.nodes() {
                let index = declare_node(stream, &mut graph, &mut node_index, node, before)?;
                node_slots.push(index);
            }

            let mut entity_slots = PatternSlots {
                nodes: node_slots.iter().map(|n| graph.nodes[*n].slot).collect(),
                ..Default::default()
            };
            let mut parts = vec![PathPart::Node(graph.nodes[node_slots[0]].slot)];
            for (i, step) in pattern.steps.iter().enumerate() {
                let rel = &step.relationship;
                if let Some(name) = rel.variable.as_deref() {
                    if !clause_relationships.insert(name) {
                        return Err(ExecutionError::syntax(format!(
                            "Relationship variable '{}' may not be referenced in multiple patterns",
                            name
                        )));
                    }
                }
                let shape = if pattern.kind == PathKind::AllShortestPaths {
                    let path = match pattern.variable.as_deref() {
                        Some(name) => declare_fresh(stream, name, VarKind::Path)?,
                        None => stream.scope.hidden(VarKind::Path),
                    };
                    let edges = match rel.variable.as_deref() {
                        Some(name) => Some(declare_fresh(stream, name, VarKind::Value)?),
                        None => None,
                    };
                    EdgeShape::AllShortest { edges, path }
                } else if rel.range.is_some() {
                    let edges = match rel.variable.as_deref() {
                        Some(name) => Some(declare_fresh(stream, name, VarKind::Value)?),
                        None => None,
                    };
                    let segment = pattern
                        .variable
                        .as_ref()
                        .map(|_| stream.scope.hidden(VarKind::Path));
                    if let Some(segment) = segment {
                        parts.push(PathPart::Segment(segment));
                    }
                    EdgeShape::VarLen { edges, segment }
                } else {
                    let slot = match rel.variable.as_deref() {
                        Some(name) => match stream.scope.lookup(name) {
                            Some(existing) if existing < before => {
                                if stream.scope.kind(existing) == Some(VarKind::Node) {
                                    return Err(ExecutionError::syntax(format!(
                                        "The alias '{}' was specified for both a node and a relationship.",
                                        name
                                    )));
                                }
                                let hidden = stream.scope.hidden(VarKind::Edge);
                                graph.rebinds.push((hidden, existing));
                                hidden
                            }
                            Some(_) => {
                                return Err(ExecutionError::syntax(format!(
                                    "The alias '{}' was specified for both a node and a relationship.",
                                    name
                                )))
                            }
                            None => stream.scope.declare(name, VarKind::Edge),
                        },
                        None => stream.scope.hidden(VarKind::Edge),
                    };
                    parts.push(PathPart::Hop {
                        edge: slot,
                        node: graph.nodes[node_slots[i + 1]].slot,
                    });
                    if let Some(map) = &rel.properties {
                        graph.inline.push((slot, map));
                    }
                    EdgeShape::Single { slot }
                };
                entity_slots.edges.push(match shape {
                    EdgeShape::Single { slot } => Some(slot),
                    _ => None,
                });
                graph.edges.push(PatternEdge {
                    left: node_slots[i],
                    right: node_slots[i + 1],
                    rel,
                    shape,
                    planned: false,
                });
            }

            if pattern.kind == PathKind::Normal {
                if let Some(name) = pattern.variable.as_deref() {
                    let slot = declare_fresh(stream, name, VarKind::Path)?;
                    entity_slots.path = Some(slot);
                    graph.paths.push(PathBuild {
                        slot,
                        parts,
                        built: false,
                    });
                }
            }
            graph.slots.push(entity_slots);
        }
        Ok(graph)
    }

    /// Rank the candidate start nodes of an unbound component; ties go to
    /// the leftmost node.
    fn choose_start(
        &self,
        stream: &Stream,
        nodes: &[PatternNode],
        component: &[usize],
        conjuncts: &[Conjunct],
        bound: &HashSet<usize>,
    ) -> (usize, u8, Option<IndexScan>) {
        let mut best: Option<(usize, u8, Option<IndexScan>)> = None;
        for &n in component {
            let node = &nodes[n];
            let comparisons: Vec<AttributeComparison<'_>> = conjuncts
                .iter()
                .filter(|c| !c.placed)
                .filter_map(|c| attribute_comparison(&c.expr))
                .filter(|c| c.slot == node.slot)
                .filter(|c| c.rhs.slots().iter().all(|s| bound.contains(s)))
                .collect();
            let (rank, index) = if let Some(scan) = self.index_scan(stream, node, &comparisons) {
                (1, Some(scan))
            } else if comparisons.iter().any(|c| c.op == BinaryOperator::Equal) {
                (2, None)
            } else if !node.labels.is_empty() {
                (3, None)
            } else if !comparisons.is_empty() {
                (4, None)
            } else {
                (5, None)
            };
            if best.as_ref().map(|b| rank < b.1).unwrap_or(true) {
                best = Some((n, rank, index));
            }
        }
        best.unwrap_or((component[0], 5, None))
    }

    /// Index lookup for `node`, when one of its labels has an operational
    /// exact index over a compared attribute.
    fn index_scan(
        &self,
        stream: &Stream,
        node: &PatternNode,
        comparisons: &[AttributeComparison<'_>],
    ) -> Option<IndexScan> {
        let schema = self.graph.schema();
        let indexes = self.graph.indexes();
        for label in &node.labels {
            let Some(label_id) = schema.label_id(label) else {
                continue;
            };
            for candidate in comparisons.iter().filter(|c| c.rhs.is_runtime_constant()) {
                let Some(attr) = schema.attribute_id(candidate.key) else {
                    continue;
                };
                if indexes.operational_exact(EntityKind::Node, label_id, attr).is_none() {
                    continue;
                }
                let same_key: Vec<&AttributeComparison<'_>> = comparisons
                    .iter()
                    .filter(|c| c.key == candidate.key && c.rhs.is_runtime_constant())
                    .collect();
                let predicate = if let Some(eq) = same_key.iter().find(|c| c.op == BinaryOperator::Equal) {
                    IndexPredicate::Equal(eq.rhs.clone())
                } else if let Some(prefix) = same_key.iter().find(|c| c.op == BinaryOperator::StartsWith) {
                    IndexPredicate::Prefix(prefix.rhs.clone())
                } else {
                    let mut lower = None;
                    let mut upper = None;
                    for c in &same_key {
                        match c.op {
                            BinaryOperator::GreaterThan => lower = Some((c.rhs.clone(), false)),
                            BinaryOperator::GreaterEqual => lower = Some((c.rhs.clone(), true)),
                            BinaryOperator::LessThan => upper = Some((c.rhs.clone(), false)),
                            BinaryOperator::LessEqual => upper = Some((c.rhs.clone(), true)),
                            _ => {}
                        }
                    }
                    IndexPredicate::Range { lower, upper }
                };
                return Some(IndexScan {
                    slot: node.slot,
                    label: label.clone(),
                    attribute: candidate.key.to_string(),
                    predicate,
                    extra_labels: node.labels.iter().filter(|l| *l != label).cloned().collect(),
                    text: stream.node_text(node.slot, &node.labels),
                });
            }
        }
        None
    }

    /// Traverse every unplanned relationship reachable from `bound`,
    /// placing filters and paths after each hop.
    #[allow(clippy::too_many_arguments)]
    fn grow(
        &self,
        stream: &mut Stream,
        plan: &mut Option<LogicalPlan>,
        nodes: &[PatternNode],
        edges: &mut [PatternEdge<'_>],
        conjuncts: &mut [Conjunct],
        paths: &mut [PathBuild],
        bound: &mut HashSet<usize>,
        eligible: impl Fn(&Conjunct) -> bool + Copy,
    ) -> ExecResult<()> {
        place(plan, bound, conjuncts, paths, eligible);
        loop {
            let next = edges.iter().position(|e| {
                !e.planned
                    && !matches!(e.shape, EdgeShape::AllShortest { .. })
                    && (bound.contains(&nodes[e.left].slot) || bound.contains(&nodes[e.right].slot))
            });
            let Some(i) = next else {
                return Ok(());
            };
            let edge = &edges[i];
            let left = &nodes[edge.left];
            let right = &nodes[edge.right];
            let reversed = !bound.contains(&left.slot);
            let (from, to) = if reversed { (right, left) } else { (left, right) };
            let direction = if reversed {
                flip(edge.rel.direction)
            } else {
                edge.rel.direction
            };
            let into = bound.contains(&to.slot);
            let to_labels = stream.missing_labels(to.slot, &to.labels);
            let from_text = stream.node_text(from.slot, &[]);
            let to_text = stream.node_text(to.slot, &to_labels);

            let op = match edge.shape {
                EdgeShape::Single { slot } => {
                    let spec = Traverse {
                        from: from.slot,
                        edge: slot,
                        to: to.slot,
                        relations: edge.rel.types.clone(),
                        direction,
                        to_labels,
                        text: format!(
                            "{}{}{}",
                            from_text,
                            stream.edge_text(Some(slot), edge.rel, direction),
                            to_text
                        ),
                    };
                    bound.insert(slot);
                    if into {
                        LogicalOp::ExpandInto(spec)
                    } else {
                        LogicalOp::Traverse(spec)
                    }
                }
                EdgeShape::VarLen { edges: list, segment } => {
                    let (min_hops, max_hops) = hops(edge.rel);
                    bound.extend(list);
                    bound.extend(segment);
                    LogicalOp::VarLenTraverse(VarLenTraverse {
                        from: from.slot,
                        to: to.slot,
                        into,
                        edges: list,
                        path: segment,
                        relations: edge.rel.types.clone(),
                        direction,
                        min_hops,
                        max_hops,
                        edge_properties: self.edge_properties(stream, edge.rel)?,
                        to_labels,
                        reversed,
                        text: format!(
                            "{}{}{}",
                            from_text,
                            stream.edge_text(list, edge.rel, direction),
                            to_text
                        ),
                    })
                }
                EdgeShape::AllShortest { .. } => {
                    return Err(ExecutionError::Internal(
                        "allShortestPaths traversed as a plain hop".to_string(),
                    ))
                }
            };
            let to_slot = to.slot;
            let to_all_labels = to.labels.clone();
            edges[i].planned = true;
            *plan = Some(LogicalPlan::over(op, plan.take()));
            bound.insert(to_slot);
            stream.enforce(to_slot, &to_all_labels);
            place(plan, bound, conjuncts, paths, eligible);
        }
    }

    fn edge_properties(&self, stream: &Stream, rel: &RelationshipPattern) -> ExecResult<Vec<(String, Expr)>> {
        let Some(map) = &rel.properties else {
            return Ok(Vec::new());
        };
        let mut compiler = ExprCompiler::new(&stream.scope);
        inline_map(map)?
            .iter()
            .map(|(k, v)| Ok((k.clone(), compiler.compile(v)?)))
            .collect()
    }
}

fn declare_fresh(stream: &mut Stream, name: &str, kind: VarKind) -> ExecResult<usize> {
    if stream.scope.lookup(name).is_some() {
        return Err(ExecutionError::syntax(format!(
            "The bound variable '{}' can't be redeclared in a MATCH clause",
            name
        )));
    }
    Ok(stream.scope.declare(name, kind))
}

fn declare_node<'q>(
    stream: &mut Stream,
    graph: &mut MatchGraph<'q>,
    node_index: &mut HashMap<usize, usize>,
    node: &'q NodePattern,
    before: usize,
) -> ExecResult<usize> {
    let slot = match node.variable.as_deref() {
        Some(name) => match stream.scope.lookup(name) {
            Some(slot) => {
                if matches!(stream.scope.kind(slot), Some(VarKind::Edge) | Some(VarKind::Path)) {
                    return Err(ExecutionError::syntax(format!(
                        "The alias '{}' was specified for both a node and a relationship.",
                        name
                    )));
                }
                slot
            }
            None => stream.scope.declare(name, VarKind::Node),
        },
        None => stream.scope.hidden(VarKind::Node),
    };
    let index = *node_index.entry(slot).or_insert_with(|| {
        graph.nodes.push(PatternNode {
            slot,
            labels: Vec::new(),
            bound: slot < before,
        });
        graph.nodes.len() - 1
    });
    for label in &node.labels {
        if !graph.nodes[index].labels.contains(label) {
            graph.nodes[index].labels.push(label.clone());
        }
    }
    if let Some(map) = &node.properties {
        graph.inline.push((slot, map));
    }
    Ok(index)
}

/// Connected components of the clause, ordered by their leftmost node.
/// allShortestPaths relationships do not connect their endpoints.
fn components(nodes: &[PatternNode], edges: &[PatternEdge<'_>]) -> Vec<Vec<usize>> {
    let mut sets = UnionFind::<usize>::new(nodes.len());
    for edge in edges {
        if !matches!(edge.shape, EdgeShape::AllShortest { .. }) {
            sets.union(edge.left, edge.right);
        }
    }
    let mut groups: Vec<(usize, Vec<usize>)> = Vec::new();
    for n in 0..nodes.len() {
        let root = sets.find(n);
        match groups.iter_mut().find(|(r, _)| *r == root) {
            Some((_, members)) => members.push(n),
            None => groups.push((root, vec![n])),
        }
    }
    groups.into_iter().map(|(_, members)| members).collect()
}

/// Place every named path and filter that has become resolvable.
fn place(
    plan: &mut Option<LogicalPlan>,
    bound: &HashSet<usize>,
    conjuncts: &mut [Conjunct],
    paths: &mut [PathBuild],
    eligible: impl Fn(&Conjunct) -> bool,
) {
    let mut ready = bound.clone();
    let mut extends = Vec::new();
    for path in paths.iter_mut().filter(|p| !p.built) {
        if path.slots().iter().all(|s| ready.contains(s)) {
            path.built = true;
            ready.insert(path.slot);
            extends.push((path.slot, Expr::BuildPath(path.parts.clone())));
        }
    }
    if !extends.is_empty() {
        *plan = Some(LogicalPlan::over(LogicalOp::Extend(extends), plan.take()));
    }

    let mut predicates = Vec::new();
    for conjunct in conjuncts.iter_mut().filter(|c| !c.placed) {
        if eligible(conjunct) && conjunct.slots.iter().all(|s| ready.contains(s)) {
            conjunct.placed = true;
            predicates.push(conjunct.expr.clone());
        }
    }
    if let Some(predicate) = Expr::conjunction(predicates) {
        *plan = Some(LogicalPlan::over(LogicalOp::Filter(predicate), plan.take()));
    }
}

/// An unplaced `lhs = rhs` conjunct with one side over the stream and the
/// other over the component.
fn take_join_key(
    conjuncts: &mut [Conjunct],
    stream: &HashSet<usize>,
    component: &HashSet<usize>,
) -> Option<(Expr, Expr)> {
    let within = |e: &Expr, side: &HashSet<usize>| {
        let slots = e.slots();
        !slots.is_empty() && slots.iter().all(|s| side.contains(s))
    };
    for conjunct in conjuncts.iter_mut().filter(|c| !c.placed) {
        let Expr::Binary(BinaryOperator::Equal, lhs, rhs) = &conjunct.expr else {
            continue;
        };
        let keys = if within(lhs, stream) && within(rhs, component) {
            Some((lhs.as_ref().clone(), rhs.as_ref().clone()))
        } else if within(rhs, stream) && within(lhs, component) {
            Some((rhs.as_ref().clone(), lhs.as_ref().clone()))
        } else {
            None
        };
        if keys.is_some() {
            conjunct.placed = true;
            return keys;
        }
    }
    None
}
