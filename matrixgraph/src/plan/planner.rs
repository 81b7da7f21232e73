// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Query planner
//!
//! Turns a parsed document into a [`PlannedStatement`]. Clauses are planned
//! left to right over a [`Stream`]: the operator tree built so far plus the
//! scope describing the records it produces. `WITH` and `RETURN` start a
//! fresh scope holding only their projected columns.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::ast::{
    Clause, CallClause, CreateClause, DeleteClause, Direction, Document, Expression, HopRange,
    MergeClause, NodePattern, PathKind, Projection, ProjectionItem, Query, RelationshipPattern,
    RemoveItem, SetItem, SingleQuery, Statement, UnwindClause,
};
use crate::exec::{ExecResult, ExecutionError};
use crate::functions::registry;
use crate::plan::compile::{aggregate_key, contains_aggregate, is_aggregate_call, ExprCompiler};
use crate::plan::expr::{Expr, PathPart};
use crate::plan::logical::{
    AggregateCall, CreateSpec, EdgeCreate, LogicalOp, LogicalPlan, MergeSpec, NodeCreate,
    PlannedStatement, QueryPlan, SortKey, UpdateItem,
};
use crate::plan::scope::{Scope, VarKind};
use crate::procedures::procedures;
use crate::storage::Graph;

/// Plan a parsed document against the current state of `graph`. The
/// graph is consulted for its operational indexes only.
pub fn plan_document(document: &Document, graph: &Graph) -> ExecResult<PlannedStatement> {
    let parameters = {
        let empty = Scope::new();
        let mut compiler = ExprCompiler::new(&empty);
        document
            .parameters
            .iter()
            .map(|(name, e)| Ok((name.clone(), compiler.compile(e)?)))
            .collect::<ExecResult<Vec<_>>>()?
    };
    match &document.statement {
        Statement::CreateIndex(index) => Ok(PlannedStatement::CreateIndex(index.clone())),
        Statement::DropIndex(index) => Ok(PlannedStatement::DropIndex(index.clone())),
        Statement::Query(query) => {
            let mut planner = Planner::new(graph);
            let (root, columns) = planner.plan_query(query)?;
            log::debug!(
                "planned query on '{}': {} column(s), write={}",
                graph.name(),
                columns.len(),
                root.is_write()
            );
            Ok(PlannedStatement::Query(QueryPlan {
                root,
                columns,
                parameters,
            }))
        }
    }
}

/// Operator tree under construction and the scope of its records
#[derive(Debug, Clone, Default)]
pub(crate) struct Stream {
    pub plan: Option<LogicalPlan>,
    pub scope: Scope,
    /// Labels already verified for node slots
    pub enforced: HashMap<usize, BTreeSet<String>>,
}

impl Stream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a subplan at `leaf` that sees everything this stream binds
    pub fn branch(&self, leaf: LogicalPlan) -> Stream {
        Stream {
            plan: Some(leaf),
            scope: self.scope.clone(),
            enforced: self.enforced.clone(),
        }
    }

    pub fn push(&mut self, op: LogicalOp) {
        self.plan = Some(LogicalPlan::over(op, self.plan.take()));
    }

    pub fn missing_labels(&self, slot: usize, labels: &[String]) -> Vec<String> {
        let known = self.enforced.get(&slot);
        labels
            .iter()
            .filter(|l| !known.map(|k| k.contains(*l)).unwrap_or(false))
            .cloned()
            .collect()
    }

    pub fn enforce(&mut self, slot: usize, labels: &[String]) {
        if labels.is_empty() {
            return;
        }
        self.enforced
            .entry(slot)
            .or_default()
            .extend(labels.iter().cloned());
    }

    fn display_name(&self, slot: usize) -> &str {
        if self.scope.is_hidden(slot) {
            ""
        } else {
            self.scope.name(slot).unwrap_or("")
        }
    }

    pub fn node_text(&self, slot: usize, labels: &[String]) -> String {
        let labels: String = labels.iter().map(|l| format!(":{}", l)).collect();
        format!("({}{})", self.display_name(slot), labels)
    }

    pub fn edge_text(&self, slot: Option<usize>, rel: &RelationshipPattern, direction: Direction) -> String {
        let name = slot.map(|s| self.display_name(s)).unwrap_or("");
        let types = if rel.types.is_empty() {
            String::new()
        } else {
            format!(":{}", rel.types.join("|"))
        };
        let range = match rel.range {
            None => String::new(),
            Some(HopRange { min, max }) => match (min, max) {
                (None, None) => "*".to_string(),
                (Some(min), Some(max)) if min == max => format!("*{}", min),
                (min, max) => format!(
                    "*{}..{}",
                    min.map(|m| m.to_string()).unwrap_or_default(),
                    max.map(|m| m.to_string()).unwrap_or_default()
                ),
            },
        };
        let body = format!("[{}{}{}]", name, types, range);
        match direction {
            Direction::Outgoing => format!("-{}->", body),
            Direction::Incoming => format!("<-{}-", body),
            Direction::Both => format!("-{}-", body),
        }
    }
}

pub(crate) struct Planner<'g> {
    pub(crate) graph: &'g Graph,
    next_argument: usize,
}

fn item_kind(scope: &Scope, expression: &Expression) -> VarKind {
    match expression {
        Expression::Variable(name) => scope
            .lookup(name)
            .and_then(|slot| scope.kind(slot))
            .unwrap_or(VarKind::Value),
        _ => VarKind::Value,
    }
}

fn variable_slot(scope: &Scope, name: &str) -> ExecResult<Expr> {
    scope
        .lookup(name)
        .map(Expr::Slot)
        .ok_or_else(|| ExecutionError::UnknownIdentifier(name.to_string()))
}

/// `SKIP`/`LIMIT` counts: literals and parameters only
fn count_expression(expression: &Option<Expression>) -> ExecResult<Option<Expr>> {
    let empty = Scope::new();
    expression
        .as_ref()
        .map(|e| ExprCompiler::new(&empty).compile(e))
        .transpose()
}

fn check_new_relationship(rel: &RelationshipPattern, clause: &str) -> ExecResult<()> {
    if rel.range.is_some() {
        return Err(ExecutionError::syntax(format!(
            "Variable length relationships cannot be used in {}",
            clause
        )));
    }
    if rel.types.len() != 1 {
        return Err(ExecutionError::syntax(format!(
            "Exactly one relationship type must be specified for {}",
            clause
        )));
    }
    Ok(())
}

fn endpoints(direction: Direction, left: usize, right: usize) -> (usize, usize) {
    match direction {
        Direction::Incoming => (right, left),
        _ => (left, right),
    }
}

fn compile_properties(
    compiler: &mut ExprCompiler<'_>,
    properties: &Option<Expression>,
) -> ExecResult<Option<Expr>> {
    properties.as_ref().map(|p| compiler.compile(p)).transpose()
}

fn compile_set_items(
    scope: &Scope,
    rollups: &HashMap<String, usize>,
    items: &[SetItem],
) -> ExecResult<Vec<UpdateItem>> {
    let mut compiler = ExprCompiler::new(scope).with_rollups(rollups);
    items
        .iter()
        .map(|item| {
            Ok(match item {
                SetItem::Property { target, key, value } => UpdateItem::SetProperty {
                    target: compiler.compile(target)?,
                    key: key.clone(),
                    value: compiler.compile(value)?,
                },
                SetItem::Replace { variable, value } => UpdateItem::ReplaceProperties {
                    target: variable_slot(scope, variable)?,
                    value: compiler.compile(value)?,
                },
                SetItem::Update { variable, value } => UpdateItem::MergeProperties {
                    target: variable_slot(scope, variable)?,
                    value: compiler.compile(value)?,
                },
                SetItem::Labels { variable, labels } => UpdateItem::AddLabels {
                    target: variable_slot(scope, variable)?,
                    labels: labels.clone(),
                },
            })
        })
        .collect()
}

impl<'g> Planner<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        Self {
            graph,
            next_argument: 0,
        }
    }

    pub(crate) fn next_argument(&mut self) -> usize {
        let id = self.next_argument;
        self.next_argument += 1;
        id
    }

    fn plan_query(&mut self, query: &Query) -> ExecResult<(LogicalPlan, Vec<String>)> {
        let (first, columns) = self.plan_single(&query.first)?;
        let Some(head) = query.unions.first() else {
            return Ok((LogicalPlan::unary(LogicalOp::Results, first), columns));
        };
        if query.unions.iter().any(|u| u.all != head.all) {
            return Err(ExecutionError::syntax(
                "Invalid combination of UNION and UNION ALL.",
            ));
        }
        let mut branches = vec![first];
        for part in &query.unions {
            let (branch, branch_columns) = self.plan_single(&part.query)?;
            if branch_columns != columns {
                return Err(ExecutionError::UnionColumnMismatch);
            }
            branches.push(branch);
        }
        let mut root = LogicalPlan {
            op: LogicalOp::Union,
            children: branches,
        };
        if !head.all {
            root = LogicalPlan::unary(
                LogicalOp::Distinct {
                    width: columns.len(),
                },
                root,
            );
        }
        Ok((LogicalPlan::unary(LogicalOp::Results, root), columns))
    }

    fn plan_single(&mut self, query: &SingleQuery) -> ExecResult<(LogicalPlan, Vec<String>)> {
        let mut stream = Stream::new();
        let mut columns = Vec::new();
        let last = query.clauses.len().saturating_sub(1);
        for (i, clause) in query.clauses.iter().enumerate() {
            match clause {
                Clause::Match(m) => self.plan_match(&mut stream, m)?,
                Clause::Unwind(u) => self.plan_unwind(&mut stream, u)?,
                Clause::With(p) => {
                    self.plan_projection(&mut stream, p, false)?;
                }
                Clause::Return(p) => {
                    if i != last {
                        return Err(ExecutionError::syntax(
                            "RETURN can only be used at the end of the query",
                        ));
                    }
                    columns = self.plan_projection(&mut stream, p, true)?;
                }
                Clause::Create(c) => self.plan_create(&mut stream, c)?,
                Clause::Merge(m) => self.plan_merge(&mut stream, m)?,
                Clause::Set(items) => self.plan_set(&mut stream, items)?,
                Clause::Remove(items) => self.plan_remove(&mut stream, items)?,
                Clause::Delete(d) => self.plan_delete(&mut stream, d)?,
                Clause::Call(c) => {
                    if let Some(yielded) = self.plan_call(&mut stream, c, i == last)? {
                        columns = yielded;
                    }
                }
            }
        }
        match query.clauses.last() {
            None => return Err(ExecutionError::syntax("empty query")),
            Some(clause @ (Clause::Match(_) | Clause::With(_) | Clause::Unwind(_))) => {
                return Err(ExecutionError::syntax(format!(
                    "Query cannot conclude with {} (must be RETURN or an update clause)",
                    clause.name()
                )))
            }
            Some(_) => {}
        }
        let plan = stream
            .plan
            .ok_or_else(|| ExecutionError::Internal("query produced no operators".to_string()))?;
        Ok((plan, columns))
    }

    fn plan_unwind(&mut self, stream: &mut Stream, clause: &UnwindClause) -> ExecResult<()> {
        if stream.scope.lookup(&clause.alias).is_some() {
            return Err(ExecutionError::syntax(format!(
                "Variable `{}` already declared",
                clause.alias
            )));
        }
        let rollups = self.plan_rollups(stream, &[&clause.expression])?;
        let expression = ExprCompiler::new(&stream.scope)
            .with_rollups(&rollups)
            .compile(&clause.expression)?;
        let slot = stream.scope.declare(&clause.alias, VarKind::Value);
        stream.push(LogicalOp::Unwind { expression, slot });
        Ok(())
    }

    /// Plan `WITH`/`RETURN`; returns the projected column names.
    fn plan_projection(
        &mut self,
        stream: &mut Stream,
        projection: &Projection,
        is_return: bool,
    ) -> ExecResult<Vec<String>> {
        let mut items: Vec<ProjectionItem> = Vec::new();
        if projection.star {
            let names = stream.scope.visible_names();
            if names.is_empty() {
                return Err(ExecutionError::NoVariablesInScope);
            }
            for name in names {
                items.push(ProjectionItem {
                    expression: Expression::variable(&name),
                    alias: None,
                    text: name,
                    span: (0, 0),
                });
            }
        }
        if !is_return {
            for item in &projection.items {
                if item.alias.is_none() && !matches!(item.expression, Expression::Variable(_)) {
                    return Err(ExecutionError::syntax(
                        "Expression in WITH must be aliased (use AS)",
                    ));
                }
            }
        }
        items.extend(projection.items.iter().cloned());
        let columns: Vec<String> = items.iter().map(|i| i.column_name().to_string()).collect();
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(ExecutionError::syntax(format!(
                    "Multiple result columns with the same name are not supported: '{}'",
                    column
                )));
            }
        }

        let order: Vec<&Expression> = projection.order_by.iter().map(|s| &s.expression).collect();
        let mut roots: Vec<&Expression> = items.iter().map(|i| &i.expression).collect();
        roots.extend(order.iter().copied());
        let rollups = self.plan_rollups(stream, &roots)?;

        let (values, sort_values) = if roots.iter().any(|e| contains_aggregate(e)) {
            self.plan_aggregation(stream, &items, &columns, &order, &rollups)?
        } else {
            let mut compiler = ExprCompiler::new(&stream.scope)
                .with_rollups(&rollups)
                .allow_shortest_paths();
            let values = items
                .iter()
                .map(|i| compiler.compile(&i.expression))
                .collect::<ExecResult<Vec<_>>>()?;
            let aliases: HashMap<String, Expr> =
                columns.iter().cloned().zip(values.iter().cloned()).collect();
            let mut compiler = ExprCompiler::new(&stream.scope)
                .with_rollups(&rollups)
                .with_aliases(&aliases)
                .allow_shortest_paths();
            let sort_values = order
                .iter()
                .map(|e| compiler.compile(e))
                .collect::<ExecResult<Vec<_>>>()?;
            (values, sort_values)
        };

        // scope after the projection, before its operators are pushed
        let mut scope = Scope::new();
        let mut enforced = HashMap::new();
        for (item, column) in items.iter().zip(&columns) {
            let slot = scope.declare(column, item_kind(&stream.scope, &item.expression));
            if let Expression::Variable(name) = &item.expression {
                if let Some(labels) = stream.scope.lookup(name).and_then(|old| stream.enforced.get(&old)) {
                    enforced.insert(slot, labels.clone());
                }
            }
        }

        let width = values.len();
        let mut projected = values;
        projected.extend(sort_values);
        stream.push(LogicalOp::Project(projected));
        if projection.distinct {
            stream.push(LogicalOp::Distinct { width });
        }
        let skip = count_expression(&projection.skip)?;
        let limit = count_expression(&projection.limit)?;
        if !projection.order_by.is_empty() {
            let keys = projection
                .order_by
                .iter()
                .enumerate()
                .map(|(i, s)| SortKey {
                    slot: width + i,
                    descending: s.descending,
                })
                .collect();
            stream.push(LogicalOp::Sort {
                keys,
                width,
                skip: skip.clone(),
                limit: limit.clone(),
            });
        }
        if let Some(skip) = skip {
            stream.push(LogicalOp::Skip(skip));
        }
        if let Some(limit) = limit {
            stream.push(LogicalOp::Limit(limit));
        }
        stream.scope = scope;
        stream.enforced = enforced;

        if let Some(predicate) = &projection.where_clause {
            let rollups = self.plan_rollups(stream, &[predicate])?;
            let predicate = ExprCompiler::new(&stream.scope)
                .with_rollups(&rollups)
                .predicate(predicate)?;
            stream.push(LogicalOp::Filter(predicate));
        }
        Ok(columns)
    }

    /// Push the aggregate operator and compile the projection over its
    /// output: grouping keys first, then one slot per aggregate call.
    fn plan_aggregation(
        &mut self,
        stream: &mut Stream,
        items: &[ProjectionItem],
        columns: &[String],
        order: &[&Expression],
        rollups: &HashMap<String, usize>,
    ) -> ExecResult<(Vec<Expr>, Vec<Expr>)> {
        let grouping: Vec<usize> = (0..items.len())
            .filter(|i| !contains_aggregate(&items[*i].expression))
            .collect();

        let mut calls: Vec<&Expression> = Vec::new();
        let mut call_keys = HashSet::new();
        let sources = grouping_complement(items, &grouping).chain(order.iter().copied());
        for source in sources {
            source.walk(&mut |e| {
                if is_aggregate_call(e) && call_keys.insert(aggregate_key(e)) {
                    calls.push(e);
                }
            });
        }

        let mut keys = Vec::with_capacity(grouping.len());
        let mut aggregates = Vec::with_capacity(calls.len());
        {
            let mut compiler = ExprCompiler::new(&stream.scope)
                .with_rollups(rollups)
                .allow_shortest_paths();
            for i in &grouping {
                keys.push(compiler.compile(&items[*i].expression)?);
            }
            for call in &calls {
                let (name, arguments, distinct) = match call {
                    Expression::FunctionCall {
                        name,
                        distinct,
                        arguments,
                    } => (name.as_str(), arguments.as_slice(), *distinct),
                    _ => ("count", &[][..], false),
                };
                if arguments.iter().any(contains_aggregate) {
                    return Err(ExecutionError::syntax(
                        "Can't use aggregate functions inside of aggregate functions.",
                    ));
                }
                let function = registry()
                    .get_aggregate(name)
                    .ok_or_else(|| ExecutionError::UnknownFunction(name.to_string()))?;
                if matches!(call, Expression::FunctionCall { .. }) {
                    function.arity().check(function.name(), arguments.len())?;
                }
                aggregates.push(AggregateCall {
                    function,
                    arguments: arguments
                        .iter()
                        .map(|a| compiler.compile(a))
                        .collect::<ExecResult<Vec<_>>>()?,
                    distinct,
                });
            }
        }

        let width = keys.len();
        let mut post = Scope::new();
        let mut substitutions = HashMap::new();
        for (slot, i) in grouping.iter().enumerate() {
            post.declare(&columns[*i], item_kind(&stream.scope, &items[*i].expression));
            substitutions.insert(aggregate_key(&items[*i].expression), slot);
        }
        for (j, call) in calls.iter().enumerate() {
            post.hidden(VarKind::Value);
            substitutions.insert(aggregate_key(call), width + j);
        }
        stream.push(LogicalOp::Aggregate {
            keys,
            aggregates,
            width,
        });

        let mut compiler = ExprCompiler::new(&post)
            .with_aggregates(&substitutions)
            .allow_shortest_paths();
        let values = items
            .iter()
            .map(|i| compiler.compile(&i.expression))
            .collect::<ExecResult<Vec<_>>>()?;
        let aliases: HashMap<String, Expr> =
            columns.iter().cloned().zip(values.iter().cloned()).collect();
        let mut compiler = ExprCompiler::new(&post)
            .with_aggregates(&substitutions)
            .with_aliases(&aliases)
            .allow_shortest_paths();
        let sort_values = order
            .iter()
            .map(|e| compiler.compile(e))
            .collect::<ExecResult<Vec<_>>>()?;
        Ok((values, sort_values))
    }

    fn plan_create(&mut self, stream: &mut Stream, clause: &CreateClause) -> ExecResult<()> {
        let mut nodes: Vec<(usize, &NodePattern)> = Vec::new();
        let mut edges: Vec<(usize, &RelationshipPattern, usize, usize)> = Vec::new();
        let mut paths = Vec::new();

        for pattern in &clause.patterns {
            if pattern.kind != PathKind::Normal {
                return Err(ExecutionError::syntax("Shortest paths cannot be used in CREATE"));
            }
            let mut slots = Vec::with_capacity(pattern.steps.len() + 1);
            for node in pattern.nodes() {
                let slot = match node.variable.as_deref() {
                    Some(name) => match stream.scope.lookup(name) {
                        Some(slot) => {
                            if !node.labels.is_empty() || node.properties.is_some() {
                                return Err(ExecutionError::syntax(format!(
                                    "The bound variable '{}' can't be redeclared in a CREATE clause",
                                    name
                                )));
                            }
                            slot
                        }
                        None => {
                            let slot = stream.scope.declare(name, VarKind::Node);
                            nodes.push((slot, node));
                            slot
                        }
                    },
                    None => {
                        let slot = stream.scope.hidden(VarKind::Node);
                        nodes.push((slot, node));
                        slot
                    }
                };
                slots.push(slot);
            }

            let mut parts = vec![PathPart::Node(slots[0])];
            for (i, step) in pattern.steps.iter().enumerate() {
                let rel = &step.relationship;
                check_new_relationship(rel, "CREATE")?;
                if rel.direction == Direction::Both {
                    return Err(ExecutionError::syntax(
                        "Only directed relationships are supported in CREATE",
                    ));
                }
                let slot = match rel.variable.as_deref() {
                    Some(name) if stream.scope.lookup(name).is_some() => {
                        return Err(ExecutionError::syntax(format!(
                            "The bound variable '{}' can't be redeclared in a CREATE clause",
                            name
                        )))
                    }
                    Some(name) => stream.scope.declare(name, VarKind::Edge),
                    None => stream.scope.hidden(VarKind::Edge),
                };
                let (source, target) = endpoints(rel.direction, slots[i], slots[i + 1]);
                edges.push((slot, rel, source, target));
                parts.push(PathPart::Hop {
                    edge: slot,
                    node: slots[i + 1],
                });
            }
            if let Some(name) = pattern.variable.as_deref() {
                if stream.scope.lookup(name).is_some() {
                    return Err(ExecutionError::syntax(format!(
                        "The bound variable '{}' can't be redeclared in a CREATE clause",
                        name
                    )));
                }
                paths.push((stream.scope.declare(name, VarKind::Path), parts));
            }
        }

        let spec = {
            let mut compiler = ExprCompiler::new(&stream.scope);
            let mut spec = CreateSpec {
                paths,
                ..Default::default()
            };
            for (slot, node) in &nodes {
                spec.nodes.push(NodeCreate {
                    slot: *slot,
                    labels: node.labels.clone(),
                    properties: compile_properties(&mut compiler, &node.properties)?,
                });
            }
            for (slot, rel, source, target) in &edges {
                spec.edges.push(EdgeCreate {
                    slot: *slot,
                    relation: rel.types[0].clone(),
                    source: *source,
                    target: *target,
                    properties: compile_properties(&mut compiler, &rel.properties)?,
                });
            }
            spec
        };
        for (slot, node) in &nodes {
            stream.enforce(*slot, &node.labels);
        }
        stream.push(LogicalOp::Create(spec));
        Ok(())
    }

    fn plan_merge(&mut self, stream: &mut Stream, clause: &MergeClause) -> ExecResult<()> {
        let pattern = &clause.pattern;
        if pattern.kind != PathKind::Normal {
            return Err(ExecutionError::syntax("Shortest paths cannot be used in MERGE"));
        }
        for node in pattern.nodes() {
            let bound = node
                .variable
                .as_deref()
                .filter(|name| stream.scope.lookup(name).is_some());
            if let Some(name) = bound {
                if !node.labels.is_empty() || node.properties.is_some() {
                    return Err(ExecutionError::syntax(format!(
                        "The bound variable '{}' can't be redeclared in a MERGE clause",
                        name
                    )));
                }
            }
        }
        for rel in pattern.relationships() {
            check_new_relationship(rel, "MERGE")?;
            if let Some(name) = rel.variable.as_deref() {
                if stream.scope.lookup(name).is_some() {
                    return Err(ExecutionError::syntax(format!(
                        "The bound variable '{}' can't be redeclared in a MERGE clause",
                        name
                    )));
                }
            }
        }

        let before = stream.scope.width();
        let argument = self.next_argument();
        let mut inner = stream.branch(LogicalPlan::leaf(LogicalOp::Argument { id: argument }));
        let slots = self
            .plan_patterns(&mut inner, std::slice::from_ref(pattern), None)?
            .into_iter()
            .next()
            .unwrap_or_default();
        let matcher = inner
            .plan
            .take()
            .ok_or_else(|| ExecutionError::Internal("empty merge pattern plan".to_string()))?;

        let create = {
            let mut compiler = ExprCompiler::new(&inner.scope);
            let mut create = CreateSpec::default();
            let mut seen = HashSet::new();
            for (node, slot) in pattern.nodes().zip(&slots.nodes) {
                if *slot < before || !seen.insert(*slot) {
                    continue;
                }
                create.nodes.push(NodeCreate {
                    slot: *slot,
                    labels: node.labels.clone(),
                    properties: compile_properties(&mut compiler, &node.properties)?,
                });
            }
            let mut parts = vec![PathPart::Node(slots.nodes[0])];
            for (i, step) in pattern.steps.iter().enumerate() {
                let rel = &step.relationship;
                let slot = slots.edges.get(i).copied().flatten().ok_or_else(|| {
                    ExecutionError::Internal("merge relationship without a slot".to_string())
                })?;
                let (source, target) = endpoints(rel.direction, slots.nodes[i], slots.nodes[i + 1]);
                create.edges.push(EdgeCreate {
                    slot,
                    relation: rel.types[0].clone(),
                    source,
                    target,
                    properties: compile_properties(&mut compiler, &rel.properties)?,
                });
                parts.push(PathPart::Hop {
                    edge: slot,
                    node: slots.nodes[i + 1],
                });
            }
            if let Some(path) = slots.path {
                create.paths.push((path, parts));
            }
            create
        };

        stream.scope = inner.scope;
        stream.enforced = inner.enforced;
        let no_rollups = HashMap::new();
        let on_match = compile_set_items(&stream.scope, &no_rollups, &clause.on_match)?;
        let on_create = compile_set_items(&stream.scope, &no_rollups, &clause.on_create)?;
        let op = LogicalOp::Merge(MergeSpec {
            argument,
            create,
            on_match,
            on_create,
        });
        stream.plan = Some(LogicalPlan::apply(op, stream.plan.take(), matcher));
        Ok(())
    }

    fn plan_set(&mut self, stream: &mut Stream, items: &[SetItem]) -> ExecResult<()> {
        let mut values: Vec<&Expression> = Vec::new();
        for item in items {
            match item {
                SetItem::Property { target, value, .. } => {
                    values.push(target);
                    values.push(value);
                }
                SetItem::Replace { value, .. } | SetItem::Update { value, .. } => values.push(value),
                SetItem::Labels { .. } => {}
            }
        }
        let rollups = self.plan_rollups(stream, &values)?;
        let updates = compile_set_items(&stream.scope, &rollups, items)?;
        stream.push(LogicalOp::Update(updates));
        Ok(())
    }

    fn plan_remove(&mut self, stream: &mut Stream, items: &[RemoveItem]) -> ExecResult<()> {
        let mut updates = Vec::with_capacity(items.len());
        {
            let mut compiler = ExprCompiler::new(&stream.scope);
            for item in items {
                updates.push(match item {
                    RemoveItem::Property { target, key } => UpdateItem::RemoveProperty {
                        target: compiler.compile(target)?,
                        key: key.clone(),
                    },
                    RemoveItem::Labels { variable, labels } => UpdateItem::RemoveLabels {
                        target: variable_slot(&stream.scope, variable)?,
                        labels: labels.clone(),
                    },
                });
            }
        }
        for item in items {
            if let RemoveItem::Labels { variable, labels } = item {
                if let Some(known) = stream
                    .scope
                    .lookup(variable)
                    .and_then(|slot| stream.enforced.get_mut(&slot))
                {
                    known.retain(|l| !labels.contains(l));
                }
            }
        }
        stream.push(LogicalOp::Update(updates));
        Ok(())
    }

    fn plan_delete(&mut self, stream: &mut Stream, clause: &DeleteClause) -> ExecResult<()> {
        let mut compiler = ExprCompiler::new(&stream.scope);
        let targets = clause
            .expressions
            .iter()
            .map(|e| compiler.compile(e))
            .collect::<ExecResult<Vec<_>>>()?;
        stream.push(LogicalOp::Delete(targets));
        Ok(())
    }

    /// Plan `CALL`; a call ending the query returns its yielded columns.
    fn plan_call(
        &mut self,
        stream: &mut Stream,
        call: &CallClause,
        last: bool,
    ) -> ExecResult<Option<Vec<String>>> {
        let procedure = procedures()
            .get(&call.procedure)
            .ok_or_else(|| ExecutionError::UnknownProcedure(call.procedure.clone()))?;
        procedure.check_arity(call.arguments.len())?;
        let arguments = {
            let mut compiler = ExprCompiler::new(&stream.scope);
            call.arguments
                .iter()
                .map(|a| compiler.compile(a))
                .collect::<ExecResult<Vec<_>>>()?
        };

        let outputs = procedure.outputs();
        let selected: Vec<(usize, String)> = match &call.yields {
            None => outputs
                .iter()
                .enumerate()
                .map(|(i, name)| (i, name.to_string()))
                .collect(),
            Some(items) => items
                .iter()
                .map(|item| {
                    outputs
                        .iter()
                        .position(|o| *o == item.name)
                        .map(|i| (i, item.output_name().to_string()))
                        .ok_or_else(|| {
                            ExecutionError::syntax(format!(
                                "Procedure `{}` does not yield output `{}`",
                                procedure.name(),
                                item.name
                            ))
                        })
                })
                .collect::<ExecResult<_>>()?,
        };

        let mut bindings = Vec::with_capacity(selected.len());
        let mut columns = Vec::with_capacity(selected.len());
        for (index, name) in selected {
            if stream.scope.lookup(&name).is_some() {
                return Err(ExecutionError::syntax(format!(
                    "Variable `{}` already declared",
                    name
                )));
            }
            bindings.push((index, stream.scope.declare(&name, VarKind::Value)));
            columns.push(name);
        }
        stream.push(LogicalOp::ProcedureCall {
            procedure,
            arguments,
            outputs: bindings.clone(),
        });

        if let Some(predicate) = &call.where_clause {
            let rollups = self.plan_rollups(stream, &[predicate])?;
            let predicate = ExprCompiler::new(&stream.scope)
                .with_rollups(&rollups)
                .predicate(predicate)?;
            stream.push(LogicalOp::Filter(predicate));
        }
        if !last {
            return Ok(None);
        }
        stream.push(LogicalOp::Project(
            bindings.iter().map(|(_, slot)| Expr::Slot(*slot)).collect(),
        ));
        Ok(Some(columns))
    }
}

/// Items that are not grouping keys
fn grouping_complement<'a>(
    items: &'a [ProjectionItem],
    grouping: &'a [usize],
) -> impl Iterator<Item = &'a Expression> + 'a {
    items
        .iter()
        .enumerate()
        .filter(move |(i, _)| !grouping.contains(i))
        .map(|(_, item)| &item.expression)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parse_query;
    use crate::exec::ErrorKind;

    fn plan(query: &str) -> ExecResult<PlannedStatement> {
        let graph = Graph::new("g");
        plan_document(&parse_query(query).unwrap(), &graph)
    }

    fn root(query: &str) -> (LogicalPlan, Vec<String>) {
        match plan(query).unwrap() {
            PlannedStatement::Query(q) => (q.root, q.columns),
            other => panic!("unexpected {:?}", other),
        }
    }

    fn error(query: &str) -> String {
        plan(query).unwrap_err().to_string()
    }

    #[test]
    fn test_return_columns_and_operators() {
        let (plan, columns) = root("MATCH (n:L) RETURN n.name AS name, n ORDER BY name LIMIT 3");
        assert_eq!(columns, vec!["name", "n"]);
        assert_eq!(plan.count("Sort"), 1);
        assert_eq!(plan.count("Limit"), 1);
        assert_eq!(plan.count("Node By Label Scan"), 1);
    }

    #[test]
    fn test_aggregation_groups_by_plain_items() {
        let (plan, columns) = root("UNWIND [1, 2, 2] AS x RETURN x, count(*) AS c ORDER BY c DESC");
        assert_eq!(columns, vec!["x", "c"]);
        assert_eq!(plan.count("Aggregate"), 1);
        let err = error("RETURN count(sum(1))");
        assert!(err.starts_with("Can't use aggregate functions inside of aggregate functions"));
    }

    #[test]
    fn test_with_requires_alias() {
        let err = error("MATCH (n) WITH n.v RETURN 1");
        assert!(err.contains("must be aliased"));
        assert!(plan("MATCH (n) WITH n, n.v AS v RETURN v").is_ok());
    }

    #[test]
    fn test_star_requires_variables() {
        let err = plan("RETURN *").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoVariablesInScope);
        let (_, columns) = root("UNWIND [1] AS b UNWIND [2] AS a RETURN *");
        assert_eq!(columns, vec!["a", "b"]);
    }

    #[test]
    fn test_union_rules() {
        let err = error("RETURN 1 AS x UNION RETURN 2 AS x UNION ALL RETURN 3 AS x");
        assert!(err.starts_with("Invalid combination"));
        let err = error("RETURN 1 AS x UNION RETURN 2 AS y");
        assert!(err.contains("must have the same column names"));
        let (plan, _) = root("RETURN 1 AS x UNION RETURN 2 AS x");
        assert_eq!(plan.count("Distinct"), 1);
        let (plan, _) = root("RETURN 1 AS x UNION ALL RETURN 2 AS x");
        assert_eq!(plan.count("Distinct"), 0);
    }

    #[test]
    fn test_create_validation() {
        assert!(error("MATCH (a) CREATE (a:L)").contains("can't be redeclared"));
        assert!(error("CREATE (a)-[:R]-(b)").starts_with("Only directed relationships"));
        assert!(error("CREATE (a)-[:R|S]->(b)").starts_with("Exactly one relationship type"));
        let (plan, columns) = root("CREATE (a:L {v: 1})-[:R]->(b)");
        assert!(columns.is_empty());
        assert!(plan.is_write());
    }

    #[test]
    fn test_merge_plans_matcher_and_creator() {
        let (plan, _) = root("MERGE (n:L {v: 1}) ON CREATE SET n.created = true RETURN n");
        assert_eq!(plan.count("Merge"), 1);
        assert_eq!(plan.count("Argument"), 1);
        let err = error("MATCH (a) MERGE (a:L)");
        assert!(err.contains("can't be redeclared"));
    }

    #[test]
    fn test_unknown_names() {
        assert!(error("RETURN x").ends_with("not defined"));
        assert!(error("RETURN nosuchfn(1)").starts_with("Unknown function"));
        assert_eq!(plan("CALL db.nothing()").unwrap_err().kind(), ErrorKind::UnknownFunction);
        assert!(error("UNWIND [1] AS x UNWIND [2] AS x RETURN x").contains("already declared"));
    }

    #[test]
    fn test_query_cannot_end_with_match() {
        assert!(error("MATCH (n)").contains("cannot conclude with MATCH"));
    }

    #[test]
    fn test_standalone_call_yields_columns() {
        let (_, columns) = root("CALL db.labels()");
        assert_eq!(columns, vec!["label"]);
        let (_, columns) = root("CALL db.labels() YIELD label AS l");
        assert_eq!(columns, vec!["l"]);
    }

    #[test]
    fn test_index_statements_pass_through() {
        assert!(matches!(
            plan("CREATE INDEX ON :L(v)").unwrap(),
            PlannedStatement::CreateIndex(_)
        ));
    }
}
