// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! AST expression compilation
//!
//! Resolves variables to slots, functions to their implementations, and
//! aggregate calls and pattern expressions to the slots the planner
//! reserved for their results.

use std::collections::HashMap;

use crate::ast::{BinaryOperator, Expression, PathKind, PathPattern, UnaryOperator};
use crate::exec::{ExecResult, ExecutionError};
use crate::functions::registry;
use crate::plan::expr::{Expr, ShortestPathSpec};
use crate::plan::scope::{Scope, VarKind};

/// Key identifying an aggregate call among the items of one projection
pub(crate) fn aggregate_key(expression: &Expression) -> String {
    format!("{:?}", expression)
}

/// Key identifying a pattern expression planned as a rollup
pub(crate) fn pattern_key(pattern: &PathPattern) -> String {
    format!("{:?}", pattern)
}

/// Key identifying a pattern comprehension planned as a rollup
pub(crate) fn comprehension_key(expression: &Expression) -> String {
    format!("{:?}", expression)
}

pub(crate) fn is_aggregate_call(expression: &Expression) -> bool {
    match expression {
        Expression::CountStar => true,
        Expression::FunctionCall { name, .. } => registry().is_aggregate(name),
        _ => false,
    }
}

pub(crate) fn contains_aggregate(expression: &Expression) -> bool {
    expression.any(&is_aggregate_call)
}

pub(crate) struct ExprCompiler<'a> {
    scope: &'a Scope,
    locals: Vec<String>,
    rollups: Option<&'a HashMap<String, usize>>,
    aggregates: Option<&'a HashMap<String, usize>>,
    aliases: Option<&'a HashMap<String, Expr>>,
    shortest_paths: bool,
}

impl<'a> ExprCompiler<'a> {
    pub fn new(scope: &'a Scope) -> Self {
        Self {
            scope,
            locals: Vec::new(),
            rollups: None,
            aggregates: None,
            aliases: None,
            shortest_paths: false,
        }
    }

    pub fn with_rollups(mut self, rollups: &'a HashMap<String, usize>) -> Self {
        self.rollups = Some(rollups);
        self
    }

    /// Aggregate calls, and after grouping the grouping keys, resolve to
    /// the given slots.
    pub fn with_aggregates(mut self, aggregates: &'a HashMap<String, usize>) -> Self {
        self.aggregates = Some(aggregates);
        self
    }

    /// Projection aliases, visible to `ORDER BY`; they shadow the scope.
    pub fn with_aliases(mut self, aliases: &'a HashMap<String, Expr>) -> Self {
        self.aliases = Some(aliases);
        self
    }

    /// `shortestPath(...)` is allowed; only in `WITH` and `RETURN`.
    pub fn allow_shortest_paths(mut self) -> Self {
        self.shortest_paths = true;
        self
    }

    /// Compile an expression used as a condition; a bare pattern tests for
    /// existence.
    pub fn predicate(&mut self, expression: &Expression) -> ExecResult<Expr> {
        match expression {
            Expression::Pattern(pattern) if pattern.kind == PathKind::Normal => {
                Ok(Expr::NonEmpty(Box::new(self.rollup(pattern)?)))
            }
            other => self.compile(other),
        }
    }

    pub fn compile(&mut self, expression: &Expression) -> ExecResult<Expr> {
        if let Some(aggregates) = self.aggregates {
            if !matches!(expression, Expression::Literal(_) | Expression::Parameter(_)) {
                if let Some(slot) = aggregates.get(&aggregate_key(expression)) {
                    return Ok(Expr::Slot(*slot));
                }
            }
        }
        Ok(match expression {
            Expression::Literal(v) => Expr::Constant(v.clone()),
            Expression::Parameter(name) => Expr::Parameter(name.clone()),
            Expression::Variable(name) => self.variable(name)?,
            Expression::Property(base, key) => Expr::Property(Box::new(self.compile(base)?), key.clone()),
            Expression::List(items) => Expr::List(self.compile_all(items)?),
            Expression::Map(entries) => Expr::Map(
                entries
                    .iter()
                    .map(|(k, e)| Ok((k.clone(), self.compile(e)?)))
                    .collect::<ExecResult<_>>()?,
            ),
            Expression::Unary(UnaryOperator::Not, e) => Expr::Not(Box::new(self.predicate(e)?)),
            Expression::Unary(UnaryOperator::Negate, e) => Expr::Negate(Box::new(self.compile(e)?)),
            Expression::Unary(UnaryOperator::Plus, e) => self.compile(e)?,
            Expression::Binary(op, l, r) => {
                let logical = matches!(op, BinaryOperator::And | BinaryOperator::Or | BinaryOperator::Xor);
                let (l, r) = if logical {
                    (self.predicate(l)?, self.predicate(r)?)
                } else {
                    (self.compile(l)?, self.compile(r)?)
                };
                Expr::binary(*op, l, r)
            }
            Expression::IsNull { expression, negated } => Expr::IsNull {
                operand: Box::new(self.compile(expression)?),
                negated: *negated,
            },
            Expression::HasLabels(e, labels) => Expr::HasLabels(Box::new(self.compile(e)?), labels.clone()),
            Expression::CountStar => self.aggregate(expression, "count")?,
            Expression::FunctionCall { name, arguments, .. } => {
                if registry().is_aggregate(name) {
                    return self.aggregate(expression, name);
                }
                if name.eq_ignore_ascii_case("exists") && arguments.len() == 1 {
                    if let Expression::Pattern(p) = &arguments[0] {
                        return self.predicate(&Expression::Pattern(p.clone()));
                    }
                }
                let function = registry()
                    .get(name)
                    .ok_or_else(|| ExecutionError::UnknownFunction(name.clone()))?;
                function.arity().check(function.name(), arguments.len())?;
                Expr::Call {
                    function,
                    arguments: self.compile_all(arguments)?,
                }
            }
            Expression::Case(case) => Expr::Case {
                operand: match &case.operand {
                    Some(o) => Some(Box::new(self.compile(o)?)),
                    None => None,
                },
                branches: case
                    .branches
                    .iter()
                    .map(|(w, t)| {
                        let w = if case.operand.is_some() {
                            self.compile(w)?
                        } else {
                            self.predicate(w)?
                        };
                        Ok((w, self.compile(t)?))
                    })
                    .collect::<ExecResult<_>>()?,
                default: match &case.default {
                    Some(d) => Some(Box::new(self.compile(d)?)),
                    None => None,
                },
            },
            Expression::ListComprehension {
                variable,
                list,
                predicate,
                projection,
            } => {
                let list = Box::new(self.compile(list)?);
                let local = self.push_local(variable);
                let predicate = match predicate {
                    Some(p) => Some(Box::new(self.predicate(p)?)),
                    None => None,
                };
                let projection = match projection {
                    Some(p) => Some(Box::new(self.compile(p)?)),
                    None => None,
                };
                self.locals.pop();
                Expr::Comprehension {
                    local,
                    list,
                    predicate,
                    projection,
                }
            }
            Expression::Quantifier {
                kind,
                variable,
                list,
                predicate,
            } => {
                let list = Box::new(self.compile(list)?);
                let local = self.push_local(variable);
                let predicate = Box::new(self.predicate(predicate)?);
                self.locals.pop();
                Expr::Quantifier {
                    kind: *kind,
                    local,
                    list,
                    predicate,
                }
            }
            Expression::Subscript(base, index) => {
                Expr::Subscript(Box::new(self.compile(base)?), Box::new(self.compile(index)?))
            }
            Expression::Slice { expression, from, to } => Expr::Slice {
                list: Box::new(self.compile(expression)?),
                from: match from {
                    Some(f) => Some(Box::new(self.compile(f)?)),
                    None => None,
                },
                to: match to {
                    Some(t) => Some(Box::new(self.compile(t)?)),
                    None => None,
                },
            },
            Expression::Pattern(pattern) => match pattern.kind {
                PathKind::Normal => self.rollup(pattern)?,
                PathKind::ShortestPath => self.shortest_path(pattern)?,
                PathKind::AllShortestPaths => {
                    return Err(ExecutionError::syntax(
                        "allShortestPaths is only supported in MATCH clauses",
                    ))
                }
            },
            Expression::PatternComprehension { .. } => self
                .rollups
                .and_then(|r| r.get(&comprehension_key(expression)))
                .map(|slot| Expr::Slot(*slot))
                .ok_or_else(|| ExecutionError::Internal("pattern comprehension was not planned".to_string()))?,
        })
    }

    fn compile_all(&mut self, items: &[Expression]) -> ExecResult<Vec<Expr>> {
        items.iter().map(|e| self.compile(e)).collect()
    }

    fn push_local(&mut self, name: &str) -> usize {
        self.locals.push(name.to_string());
        self.locals.len() - 1
    }

    fn variable(&self, name: &str) -> ExecResult<Expr> {
        if let Some(depth) = self.locals.iter().rposition(|l| l == name) {
            return Ok(Expr::Local(depth));
        }
        if let Some(aliased) = self.aliases.and_then(|a| a.get(name)) {
            return Ok(aliased.clone());
        }
        self.scope
            .lookup(name)
            .map(Expr::Slot)
            .ok_or_else(|| ExecutionError::UnknownIdentifier(name.to_string()))
    }

    fn aggregate(&self, expression: &Expression, name: &str) -> ExecResult<Expr> {
        self.aggregates
            .and_then(|a| a.get(&aggregate_key(expression)))
            .map(|slot| Expr::Slot(*slot))
            .ok_or_else(|| ExecutionError::syntax(format!("Invalid use of aggregating function '{}'", name)))
    }

    fn rollup(&self, pattern: &PathPattern) -> ExecResult<Expr> {
        self.rollups
            .and_then(|r| r.get(&pattern_key(pattern)))
            .map(|slot| Expr::Slot(*slot))
            .ok_or_else(|| ExecutionError::Internal("pattern expression was not planned".to_string()))
    }

    fn shortest_path(&self, pattern: &PathPattern) -> ExecResult<Expr> {
        if !self.shortest_paths {
            return Err(ExecutionError::syntax(
                "RedisGraph currently only supports shortestPath in WITH or RETURN clauses",
            ));
        }
        let [step] = pattern.steps.as_slice() else {
            return Err(ExecutionError::syntax(
                "shortestPath requires a pattern of exactly one relationship",
            ));
        };
        let endpoint = |name: &Option<String>| -> ExecResult<Expr> {
            let slot = name
                .as_deref()
                .and_then(|n| self.scope.lookup(n))
                .filter(|slot| self.scope.kind(*slot) == Some(VarKind::Node))
                .ok_or_else(|| {
                    ExecutionError::syntax("A shortestPath requires bound nodes")
                })?;
            Ok(Expr::Slot(slot))
        };
        let rel = &step.relationship;
        let range = rel.range.unwrap_or(crate::ast::HopRange {
            min: Some(1),
            max: Some(1),
        });
        let min_hops = range.min.unwrap_or(1);
        if min_hops > 1 {
            return Err(ExecutionError::syntax(
                "shortestPath does not support a minimal length different from 0 or 1",
            ));
        }
        Ok(Expr::ShortestPath(Box::new(ShortestPathSpec {
            source: endpoint(&pattern.start.variable)?,
            target: endpoint(&step.node.variable)?,
            relations: rel.types.clone(),
            direction: rel.direction,
            min_hops,
            max_hops: range.max,
        })))
    }
}
