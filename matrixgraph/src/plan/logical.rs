// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Logical query plan representation
//!
//! A logical plan is an immutable operator tree with every variable already
//! resolved to a record slot. It is what the plan cache stores; each
//! execution builds fresh physical operators from it.

use std::sync::Arc;

use crate::ast::{Direction, IndexStatement};
use crate::functions::AggregateFunction;
use crate::plan::expr::{Expr, PathPart};
use crate::procedures::Procedure;

/// Logical query plan tree
#[derive(Debug, Clone)]
pub struct LogicalPlan {
    pub op: LogicalOp,
    /// Operator inputs; binary operators list the outer/left side first
    pub children: Vec<LogicalPlan>,
}

impl LogicalPlan {
    pub fn leaf(op: LogicalOp) -> Self {
        Self {
            op,
            children: Vec::new(),
        }
    }

    pub fn unary(op: LogicalOp, child: LogicalPlan) -> Self {
        Self {
            op,
            children: vec![child],
        }
    }

    /// Operator over an optional input; a missing input behaves as a single
    /// empty record.
    pub fn over(op: LogicalOp, child: Option<LogicalPlan>) -> Self {
        Self {
            op,
            children: child.into_iter().collect(),
        }
    }

    /// Operator running `inner` once per record of `outer`
    pub fn apply(op: LogicalOp, outer: Option<LogicalPlan>, inner: LogicalPlan) -> Self {
        Self {
            op,
            children: outer.into_iter().chain(std::iter::once(inner)).collect(),
        }
    }

    pub fn binary(op: LogicalOp, left: LogicalPlan, right: LogicalPlan) -> Self {
        Self {
            op,
            children: vec![left, right],
        }
    }

    /// Whether any operator in the tree mutates the graph
    pub fn is_write(&self) -> bool {
        self.op.is_write() || self.children.iter().any(LogicalPlan::is_write)
    }

    /// Number of operators with the given display name
    pub fn count(&self, name: &str) -> usize {
        usize::from(self.op.name() == name)
            + self.children.iter().map(|c| c.count(name)).sum::<usize>()
    }
}

/// Node scan by label, or over every node when `label` is `None`
#[derive(Debug, Clone)]
pub struct NodeScan {
    pub slot: usize,
    pub label: Option<String>,
    /// Further labels the scanned node must carry
    pub extra_labels: Vec<String>,
    pub text: String,
}

#[derive(Debug, Clone)]
pub enum IndexPredicate {
    Equal(Expr),
    Range {
        lower: Option<(Expr, bool)>,
        upper: Option<(Expr, bool)>,
    },
    Prefix(Expr),
}

#[derive(Debug, Clone)]
pub struct IndexScan {
    pub slot: usize,
    pub label: String,
    pub attribute: String,
    pub predicate: IndexPredicate,
    pub extra_labels: Vec<String>,
    pub text: String,
}

/// One hop from a bound node
#[derive(Debug, Clone)]
pub struct Traverse {
    pub from: usize,
    pub edge: usize,
    pub to: usize,
    pub relations: Vec<String>,
    /// Direction relative to the traversal, `from` towards `to`
    pub direction: Direction,
    /// Labels checked on the destination
    pub to_labels: Vec<String>,
    pub text: String,
}

/// `[*min..max]` hop from a bound node
#[derive(Debug, Clone)]
pub struct VarLenTraverse {
    pub from: usize,
    pub to: usize,
    /// Whether `to` is already bound and must be reached exactly
    pub into: bool,
    /// Slot receiving the list of traversed edges
    pub edges: Option<usize>,
    /// Slot receiving the traversed path in pattern order
    pub path: Option<usize>,
    pub relations: Vec<String>,
    pub direction: Direction,
    pub min_hops: u64,
    pub max_hops: Option<u64>,
    /// Equality constraints every traversed edge must satisfy
    pub edge_properties: Vec<(String, Expr)>,
    pub to_labels: Vec<String>,
    /// The traversal runs right-to-left relative to the pattern
    pub reversed: bool,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct AllShortestPaths {
    pub from: usize,
    pub to: usize,
    pub path: usize,
    pub edges: Option<usize>,
    pub relations: Vec<String>,
    pub direction: Direction,
    pub min_hops: u64,
    pub max_hops: Option<u64>,
    pub edge_properties: Vec<(String, Expr)>,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct AggregateCall {
    pub function: Arc<dyn AggregateFunction>,
    pub arguments: Vec<Expr>,
    pub distinct: bool,
}

#[derive(Debug, Clone)]
pub struct SortKey {
    pub slot: usize,
    pub descending: bool,
}

#[derive(Debug, Clone)]
pub struct NodeCreate {
    pub slot: usize,
    pub labels: Vec<String>,
    pub properties: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct EdgeCreate {
    pub slot: usize,
    pub relation: String,
    pub source: usize,
    pub target: usize,
    pub properties: Option<Expr>,
}

/// Entities a `CREATE` or the creating branch of a `MERGE` allocates
#[derive(Debug, Clone, Default)]
pub struct CreateSpec {
    pub nodes: Vec<NodeCreate>,
    pub edges: Vec<EdgeCreate>,
    pub paths: Vec<(usize, Vec<PathPart>)>,
}

#[derive(Debug, Clone)]
pub enum UpdateItem {
    SetProperty {
        target: Expr,
        key: String,
        value: Expr,
    },
    /// `n = map`
    ReplaceProperties { target: Expr, value: Expr },
    /// `n += map`
    MergeProperties { target: Expr, value: Expr },
    AddLabels { target: Expr, labels: Vec<String> },
    RemoveProperty { target: Expr, key: String },
    RemoveLabels { target: Expr, labels: Vec<String> },
}

#[derive(Debug, Clone)]
pub struct MergeSpec {
    pub argument: usize,
    pub create: CreateSpec,
    pub on_match: Vec<UpdateItem>,
    pub on_create: Vec<UpdateItem>,
}

#[derive(Debug, Clone)]
pub enum LogicalOp {
    Results,
    AllNodeScan(NodeScan),
    LabelScan(NodeScan),
    IndexScan(IndexScan),
    Traverse(Traverse),
    VarLenTraverse(VarLenTraverse),
    ExpandInto(Traverse),
    AllShortestPaths(AllShortestPaths),
    CartesianProduct {
        right_slots: Vec<usize>,
    },
    ValueHashJoin {
        left_key: Expr,
        right_key: Expr,
        right_slots: Vec<usize>,
    },
    /// Runs the inner plan per outer record; optional null-extends
    Apply {
        argument: usize,
        optional: bool,
        inner_slots: Vec<usize>,
    },
    RollupApply {
        argument: usize,
        collect: Expr,
        slot: usize,
    },
    /// Leaf of an inner plan; emits the record its apply injected
    Argument {
        id: usize,
    },
    Filter(Expr),
    /// Assign extra slots on the incoming record
    Extend(Vec<(usize, Expr)>),
    /// Emit a fresh record of the given expressions
    Project(Vec<Expr>),
    Aggregate {
        keys: Vec<Expr>,
        aggregates: Vec<AggregateCall>,
        width: usize,
    },
    Sort {
        keys: Vec<SortKey>,
        /// Columns kept after sorting; the rest are sort-only keys
        width: usize,
        skip: Option<Expr>,
        limit: Option<Expr>,
    },
    Skip(Expr),
    Limit(Expr),
    Distinct {
        width: usize,
    },
    Union,
    Unwind {
        expression: Expr,
        slot: usize,
    },
    Create(CreateSpec),
    Merge(MergeSpec),
    Update(Vec<UpdateItem>),
    Delete(Vec<Expr>),
    ProcedureCall {
        procedure: Arc<dyn Procedure>,
        arguments: Vec<Expr>,
        /// `(output index, slot)` pairs
        outputs: Vec<(usize, usize)>,
    },
}

impl LogicalOp {
    /// Operator name as printed by `EXPLAIN` and `PROFILE`
    pub fn name(&self) -> &'static str {
        match self {
            LogicalOp::Results => "Results",
            LogicalOp::AllNodeScan(_) => "All Node Scan",
            LogicalOp::LabelScan(_) => "Node By Label Scan",
            LogicalOp::IndexScan(_) => "Node By Index Scan",
            LogicalOp::Traverse(_) => "Conditional Traverse",
            LogicalOp::VarLenTraverse(_) => "Conditional Variable Length Traverse",
            LogicalOp::ExpandInto(_) => "Expand Into",
            LogicalOp::AllShortestPaths(_) => "All Shortest Paths",
            LogicalOp::CartesianProduct { .. } => "Cartesian Product",
            LogicalOp::ValueHashJoin { .. } => "Value Hash Join",
            LogicalOp::Apply { optional: true, .. } => "Optional",
            LogicalOp::Apply { .. } => "Apply",
            LogicalOp::RollupApply { .. } => "Rollup Apply",
            LogicalOp::Argument { .. } => "Argument",
            LogicalOp::Filter(_) => "Filter",
            LogicalOp::Extend(_) => "Project",
            LogicalOp::Project(_) => "Project",
            LogicalOp::Aggregate { .. } => "Aggregate",
            LogicalOp::Sort { .. } => "Sort",
            LogicalOp::Skip(_) => "Skip",
            LogicalOp::Limit(_) => "Limit",
            LogicalOp::Distinct { .. } => "Distinct",
            LogicalOp::Union => "Union",
            LogicalOp::Unwind { .. } => "Unwind",
            LogicalOp::Create(_) => "Create",
            LogicalOp::Merge(_) => "Merge",
            LogicalOp::Update(_) => "Update",
            LogicalOp::Delete(_) => "Delete",
            LogicalOp::ProcedureCall { .. } => "ProcedureCall",
        }
    }

    /// Pattern text printed after the name, for operators that have one
    pub fn describe(&self) -> Option<String> {
        match self {
            LogicalOp::AllNodeScan(s) | LogicalOp::LabelScan(s) => Some(s.text.clone()),
            LogicalOp::IndexScan(s) => Some(s.text.clone()),
            LogicalOp::Traverse(t) | LogicalOp::ExpandInto(t) => Some(t.text.clone()),
            LogicalOp::VarLenTraverse(t) => Some(t.text.clone()),
            LogicalOp::AllShortestPaths(t) => Some(t.text.clone()),
            LogicalOp::ProcedureCall { procedure, .. } => Some(procedure.name().to_string()),
            _ => None,
        }
    }

    pub fn is_write(&self) -> bool {
        match self {
            LogicalOp::Create(_) | LogicalOp::Merge(_) | LogicalOp::Update(_) | LogicalOp::Delete(_) => true,
            LogicalOp::ProcedureCall { procedure, .. } => procedure.is_write(),
            _ => false,
        }
    }
}

/// Planned form of one request
#[derive(Debug, Clone)]
pub enum PlannedStatement {
    Query(QueryPlan),
    CreateIndex(IndexStatement),
    DropIndex(IndexStatement),
}

impl PlannedStatement {
    pub fn is_write(&self) -> bool {
        match self {
            PlannedStatement::Query(q) => q.root.is_write(),
            _ => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub root: LogicalPlan,
    pub columns: Vec<String>,
    /// `CYPHER name=value` parameters, evaluated before execution
    pub parameters: Vec<(String, Expr)>,
}
