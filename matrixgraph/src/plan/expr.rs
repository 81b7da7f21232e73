// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Compiled expressions
//!
//! The planner resolves every variable of an AST expression to a record
//! slot (or, inside comprehensions, to a local) and every function name to
//! its implementation. Pattern expressions have already been planned as
//! rollup subplans by then and appear here as slot reads.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::ast::{BinaryOperator, Direction, QuantifierKind};
use crate::functions::Function;
use crate::storage::Value;

#[derive(Debug, Clone)]
pub enum Expr {
    Constant(Value),
    Parameter(String),
    Slot(usize),
    /// Comprehension variable, by nesting depth
    Local(usize),
    Property(Box<Expr>, String),
    List(Vec<Expr>),
    Map(Vec<(String, Expr)>),
    Not(Box<Expr>),
    Negate(Box<Expr>),
    Binary(BinaryOperator, Box<Expr>, Box<Expr>),
    IsNull {
        operand: Box<Expr>,
        negated: bool,
    },
    HasLabels(Box<Expr>, Vec<String>),
    Call {
        function: Arc<dyn Function>,
        arguments: Vec<Expr>,
    },
    Case {
        operand: Option<Box<Expr>>,
        branches: Vec<(Expr, Expr)>,
        default: Option<Box<Expr>>,
    },
    Comprehension {
        local: usize,
        list: Box<Expr>,
        predicate: Option<Box<Expr>>,
        projection: Option<Box<Expr>>,
    },
    Quantifier {
        kind: QuantifierKind,
        local: usize,
        list: Box<Expr>,
        predicate: Box<Expr>,
    },
    Subscript(Box<Expr>, Box<Expr>),
    Slice {
        list: Box<Expr>,
        from: Option<Box<Expr>>,
        to: Option<Box<Expr>>,
    },
    ShortestPath(Box<ShortestPathSpec>),
    BuildPath(Vec<PathPart>),
    /// True when the operand is a non-empty list; pattern predicates
    NonEmpty(Box<Expr>),
}

/// Single shortest path between two bound nodes, found by BFS
#[derive(Debug, Clone)]
pub struct ShortestPathSpec {
    pub source: Expr,
    pub target: Expr,
    pub relations: Vec<String>,
    pub direction: Direction,
    pub min_hops: u64,
    pub max_hops: Option<u64>,
}

/// Piece of a named path, in pattern order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathPart {
    Node(usize),
    Hop { edge: usize, node: usize },
    /// Variable-length segment stored as a path value
    Segment(usize),
}

impl Expr {
    pub fn constant(value: impl Into<Value>) -> Self {
        Expr::Constant(value.into())
    }

    pub fn binary(op: BinaryOperator, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    /// Conjunction of `parts`; `None` when empty
    pub fn conjunction(parts: Vec<Expr>) -> Option<Expr> {
        parts
            .into_iter()
            .reduce(|acc, e| Expr::binary(BinaryOperator::And, acc, e))
    }

    /// Record slots this expression reads
    pub fn slots(&self) -> BTreeSet<usize> {
        let mut out = BTreeSet::new();
        self.collect_slots(&mut out);
        out
    }

    fn collect_slots(&self, out: &mut BTreeSet<usize>) {
        match self {
            Expr::Slot(s) => {
                out.insert(*s);
            }
            Expr::Constant(_) | Expr::Parameter(_) | Expr::Local(_) => {}
            Expr::Property(e, _)
            | Expr::Not(e)
            | Expr::Negate(e)
            | Expr::HasLabels(e, _)
            | Expr::NonEmpty(e)
            | Expr::IsNull { operand: e, .. } => e.collect_slots(out),
            Expr::List(items) => items.iter().for_each(|e| e.collect_slots(out)),
            Expr::Map(entries) => entries.iter().for_each(|(_, e)| e.collect_slots(out)),
            Expr::Binary(_, l, r) | Expr::Subscript(l, r) => {
                l.collect_slots(out);
                r.collect_slots(out);
            }
            Expr::Call { arguments, .. } => arguments.iter().for_each(|e| e.collect_slots(out)),
            Expr::Case {
                operand,
                branches,
                default,
            } => {
                for e in operand.iter().chain(default.iter()) {
                    e.collect_slots(out);
                }
                for (w, t) in branches {
                    w.collect_slots(out);
                    t.collect_slots(out);
                }
            }
            Expr::Comprehension {
                list,
                predicate,
                projection,
                ..
            } => {
                list.collect_slots(out);
                for e in predicate.iter().chain(projection.iter()) {
                    e.collect_slots(out);
                }
            }
            Expr::Quantifier {
                list, predicate, ..
            } => {
                list.collect_slots(out);
                predicate.collect_slots(out);
            }
            Expr::Slice { list, from, to } => {
                list.collect_slots(out);
                for e in from.iter().chain(to.iter()) {
                    e.collect_slots(out);
                }
            }
            Expr::ShortestPath(spec) => {
                spec.source.collect_slots(out);
                spec.target.collect_slots(out);
            }
            Expr::BuildPath(parts) => {
                for part in parts {
                    match part {
                        PathPart::Node(s) | PathPart::Segment(s) => {
                            out.insert(*s);
                        }
                        PathPart::Hop { edge, node } => {
                            out.insert(*edge);
                            out.insert(*node);
                        }
                    }
                }
            }
        }
    }

    /// Known before execution starts: a literal or a query parameter
    pub fn is_runtime_constant(&self) -> bool {
        matches!(self, Expr::Constant(_) | Expr::Parameter(_))
    }
}
