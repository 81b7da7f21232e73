// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Expression evaluator
//!
//! Boolean operators use three-valued logic with null as unknown.
//! Arithmetic promotes integers to floats when either operand is a float;
//! integer division and modulo by zero fail, float division by zero follows
//! IEEE-754. Reading a missing property yields null, while structurally
//! wrong operands fail with a type mismatch.

use std::cmp::Ordering;
use std::collections::{HashSet, VecDeque};

use regex::Regex;

use crate::ast::{BinaryOperator, Direction, QuantifierKind};
use crate::exec::context::ExecutionContext;
use crate::exec::error::{ExecResult, ExecutionError};
use crate::exec::{slot_value, Record};
use crate::functions::FunctionContext;
use crate::plan::expr::{Expr, PathPart, ShortestPathSpec};
use crate::storage::{EdgeValue, Graph, NodeId, NodeValue, PathValue, RelationId, Value};

pub struct Evaluator<'c, 'g> {
    ctx: &'c ExecutionContext<'g>,
    locals: Vec<Value>,
}

impl<'c, 'g> Evaluator<'c, 'g> {
    pub fn new(ctx: &'c ExecutionContext<'g>) -> Self {
        Self {
            ctx,
            locals: Vec::new(),
        }
    }

    fn graph(&self) -> &'c Graph {
        self.ctx.graph()
    }

    pub fn eval(&mut self, expr: &Expr, record: &Record) -> ExecResult<Value> {
        match expr {
            Expr::Constant(v) => Ok(v.clone()),
            Expr::Parameter(name) => self
                .ctx
                .parameters
                .get(name)
                .cloned()
                .ok_or_else(|| ExecutionError::Argument(format!("Missing parameters: ${}", name))),
            Expr::Slot(s) => Ok(slot_value(record, *s).clone()),
            Expr::Local(i) => Ok(self.locals.get(*i).cloned().unwrap_or(Value::Null)),
            Expr::Property(base, key) => {
                let base = self.eval(base, record)?;
                property(self.graph(), &base, key)
            }
            Expr::List(items) => Ok(Value::List(
                items
                    .iter()
                    .map(|e| self.eval(e, record))
                    .collect::<ExecResult<_>>()?,
            )),
            Expr::Map(entries) => {
                let mut out: Vec<(String, Value)> = Vec::with_capacity(entries.len());
                for (k, e) in entries {
                    let v = self.eval(e, record)?;
                    match out.iter_mut().find(|(existing, _)| existing == k) {
                        Some(slot) => slot.1 = v,
                        None => out.push((k.clone(), v)),
                    }
                }
                Ok(Value::Map(out))
            }
            Expr::Not(e) => Ok(match truth(&self.eval(e, record)?)? {
                Some(b) => Value::Boolean(!b),
                None => Value::Null,
            }),
            Expr::Negate(e) => match self.eval(e, record)? {
                Value::Null => Ok(Value::Null),
                Value::Integer(i) => Ok(Value::Integer(i.wrapping_neg())),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => Err(mismatch("Integer, Float, or Null", &other)),
            },
            Expr::Binary(op, lhs, rhs) => self.binary(*op, lhs, rhs, record),
            Expr::IsNull { operand, negated } => {
                let is_null = self.eval(operand, record)?.is_null();
                Ok(Value::Boolean(is_null != *negated))
            }
            Expr::HasLabels(e, labels) => match self.eval(e, record)? {
                Value::Null => Ok(Value::Null),
                Value::Node(n) => Ok(Value::Boolean(node_has_labels(self.graph(), &n, labels))),
                other => Err(mismatch("Node or Null", &other)),
            },
            Expr::Call { function, arguments } => {
                let args = arguments
                    .iter()
                    .map(|e| self.eval(e, record))
                    .collect::<ExecResult<Vec<_>>>()?;
                let call = FunctionContext::new(args, self.graph())
                    .with_headroom(self.ctx.memory_headroom());
                Ok(function.execute(&call)?)
            }
            Expr::Case {
                operand,
                branches,
                default,
            } => {
                let subject = match operand {
                    Some(e) => Some(self.eval(e, record)?),
                    None => None,
                };
                for (when, then) in branches {
                    let when = self.eval(when, record)?;
                    let hit = match &subject {
                        Some(s) => s.equals(&when) == Some(true),
                        None => matches!(when, Value::Boolean(true)),
                    };
                    if hit {
                        return self.eval(then, record);
                    }
                }
                match default {
                    Some(e) => self.eval(e, record),
                    None => Ok(Value::Null),
                }
            }
            Expr::Comprehension {
                local,
                list,
                predicate,
                projection,
            } => {
                let items = match self.eval(list, record)? {
                    Value::Null => return Ok(Value::Null),
                    Value::List(items) => items,
                    other => return Err(mismatch("List or Null", &other)),
                };
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    self.bind_local(*local, item.clone());
                    if let Some(p) = predicate {
                        if !matches!(self.eval(p, record)?, Value::Boolean(true)) {
                            continue;
                        }
                    }
                    out.push(match projection {
                        Some(p) => self.eval(p, record)?,
                        None => item,
                    });
                }
                self.locals.truncate(*local);
                Ok(Value::List(out))
            }
            Expr::Quantifier {
                kind,
                local,
                list,
                predicate,
            } => {
                let items = match self.eval(list, record)? {
                    Value::Null => return Ok(Value::Null),
                    Value::List(items) => items,
                    other => return Err(mismatch("List or Null", &other)),
                };
                let (mut trues, mut falses, mut unknowns) = (0usize, 0usize, 0usize);
                for item in items {
                    self.bind_local(*local, item);
                    match truth(&self.eval(predicate, record)?)? {
                        Some(true) => trues += 1,
                        Some(false) => falses += 1,
                        None => unknowns += 1,
                    }
                }
                self.locals.truncate(*local);
                Ok(quantify(*kind, trues, falses, unknowns))
            }
            Expr::Subscript(base, index) => {
                let base = self.eval(base, record)?;
                let index = self.eval(index, record)?;
                subscript(self.graph(), base, index)
            }
            Expr::Slice { list, from, to } => {
                let items = match self.eval(list, record)? {
                    Value::Null => return Ok(Value::Null),
                    Value::List(items) => items,
                    other => return Err(mismatch("List or Null", &other)),
                };
                let bound = |this: &mut Self, e: &Option<Box<Expr>>| -> ExecResult<Option<Option<i64>>> {
                    match e {
                        None => Ok(Some(None)),
                        Some(e) => match this.eval(e, record)? {
                            Value::Null => Ok(None),
                            Value::Integer(i) => Ok(Some(Some(i))),
                            other => Err(mismatch("Integer", &other)),
                        },
                    }
                };
                let (Some(from), Some(to)) = (bound(self, from)?, bound(self, to)?) else {
                    return Ok(Value::Null);
                };
                let len = items.len() as i64;
                let resolve = |i: i64| if i < 0 { (len + i).max(0) } else { i.min(len) };
                let start = from.map(resolve).unwrap_or(0);
                let end = to.map(resolve).unwrap_or(len);
                if start >= end {
                    return Ok(Value::List(Vec::new()));
                }
                Ok(Value::List(items[start as usize..end as usize].to_vec()))
            }
            Expr::ShortestPath(spec) => self.shortest_path(spec, record),
            Expr::BuildPath(parts) => build_path(parts, record),
            Expr::NonEmpty(e) => Ok(Value::Boolean(match self.eval(e, record)? {
                Value::List(items) => !items.is_empty(),
                Value::Null => false,
                _ => true,
            })),
        }
    }

    fn bind_local(&mut self, local: usize, value: Value) {
        if self.locals.len() <= local {
            self.locals.resize(local + 1, Value::Null);
        }
        self.locals[local] = value;
    }

    fn binary(&mut self, op: BinaryOperator, lhs: &Expr, rhs: &Expr, record: &Record) -> ExecResult<Value> {
        match op {
            BinaryOperator::And => {
                let l = truth(&self.eval(lhs, record)?)?;
                if l == Some(false) {
                    return Ok(Value::Boolean(false));
                }
                let r = truth(&self.eval(rhs, record)?)?;
                Ok(match (l, r) {
                    (_, Some(false)) => Value::Boolean(false),
                    (Some(true), Some(true)) => Value::Boolean(true),
                    _ => Value::Null,
                })
            }
            BinaryOperator::Or => {
                let l = truth(&self.eval(lhs, record)?)?;
                if l == Some(true) {
                    return Ok(Value::Boolean(true));
                }
                let r = truth(&self.eval(rhs, record)?)?;
                Ok(match (l, r) {
                    (_, Some(true)) => Value::Boolean(true),
                    (Some(false), Some(false)) => Value::Boolean(false),
                    _ => Value::Null,
                })
            }
            BinaryOperator::Xor => {
                let l = truth(&self.eval(lhs, record)?)?;
                let r = truth(&self.eval(rhs, record)?)?;
                Ok(match (l, r) {
                    (Some(a), Some(b)) => Value::Boolean(a != b),
                    _ => Value::Null,
                })
            }
            _ => {
                let l = self.eval(lhs, record)?;
                let r = self.eval(rhs, record)?;
                apply_binary(op, l, r)
            }
        }
    }

    fn shortest_path(&mut self, spec: &ShortestPathSpec, record: &Record) -> ExecResult<Value> {
        let source = self.eval(&spec.source, record)?;
        let target = self.eval(&spec.target, record)?;
        let (Some(src), Some(dst)) = (source.as_node_id(), target.as_node_id()) else {
            return Ok(Value::Null);
        };
        let graph = self.graph();
        let relations = match resolve_relations(graph, &spec.relations) {
            Some(r) => r,
            None => return Ok(Value::Null),
        };
        Ok(bfs_path(graph, src, dst, relations.as_deref(), spec.direction, spec.min_hops, spec.max_hops)
            .map(Value::Path)
            .unwrap_or(Value::Null))
    }
}

fn mismatch(expected: &str, actual: &Value) -> ExecutionError {
    ExecutionError::type_mismatch(expected, actual.type_name())
}

/// Boolean view of a value: `None` for null.
fn truth(value: &Value) -> ExecResult<Option<bool>> {
    match value {
        Value::Boolean(b) => Ok(Some(*b)),
        Value::Null => Ok(None),
        other => Err(mismatch("Boolean or Null", other)),
    }
}

fn quantify(kind: QuantifierKind, trues: usize, falses: usize, unknowns: usize) -> Value {
    match kind {
        QuantifierKind::All if falses > 0 => Value::Boolean(false),
        QuantifierKind::Any | QuantifierKind::None if trues > 0 => {
            Value::Boolean(kind == QuantifierKind::Any)
        }
        QuantifierKind::Single if trues > 1 => Value::Boolean(false),
        _ if unknowns > 0 => Value::Null,
        QuantifierKind::All => Value::Boolean(true),
        QuantifierKind::Any => Value::Boolean(false),
        QuantifierKind::None => Value::Boolean(true),
        QuantifierKind::Single => Value::Boolean(trues == 1),
    }
}

/// Property `key` of a node, edge, map or point.
pub(crate) fn property(graph: &Graph, base: &Value, key: &str) -> ExecResult<Value> {
    let attr = graph.schema().attribute_id(key);
    Ok(match base {
        Value::Null => Value::Null,
        Value::Node(n) => match graph.get_node(n.id) {
            Some(_) => attr
                .and_then(|a| graph.node_property(n.id, a))
                .cloned()
                .unwrap_or(Value::Null),
            None => n.property(key).cloned().unwrap_or(Value::Null),
        },
        Value::Edge(e) => match graph.get_edge(e.id) {
            Some(_) => attr
                .and_then(|a| graph.edge_property(e.id, a))
                .cloned()
                .unwrap_or(Value::Null),
            None => e.property(key).cloned().unwrap_or(Value::Null),
        },
        Value::Map(_) => base.map_get(key).cloned().unwrap_or(Value::Null),
        Value::Point(p) => match key {
            "latitude" => Value::Float(p.latitude),
            "longitude" => Value::Float(p.longitude),
            _ => Value::Null,
        },
        other => return Err(mismatch("Map, Node, Edge, Point, or Null", other)),
    })
}

pub(crate) fn node_has_labels(graph: &Graph, node: &NodeValue, labels: &[String]) -> bool {
    let schema = graph.schema();
    labels.iter().all(|name| match schema.label_id(name) {
        Some(label) => graph.node_has_label(node.id, label),
        None => false,
    })
}

fn subscript(graph: &Graph, base: Value, index: Value) -> ExecResult<Value> {
    match (base, index) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::List(items), Value::Integer(i)) => {
            let len = items.len() as i64;
            let i = if i < 0 { len + i } else { i };
            Ok(if (0..len).contains(&i) {
                items[i as usize].clone()
            } else {
                Value::Null
            })
        }
        (Value::List(_), other) => Err(mismatch("Integer", &other)),
        (base @ (Value::Map(_) | Value::Node(_) | Value::Edge(_)), Value::String(key)) => {
            property(graph, &base, &key)
        }
        (Value::Map(_) | Value::Node(_) | Value::Edge(_), other) => Err(mismatch("String", &other)),
        (other, _) => Err(mismatch("List, Map, Node, Edge, or Null", &other)),
    }
}

/// Apply a non-logical binary operator to evaluated operands.
pub(crate) fn apply_binary(op: BinaryOperator, l: Value, r: Value) -> ExecResult<Value> {
    use BinaryOperator::*;
    match op {
        Equal => Ok(tri(l.equals(&r))),
        NotEqual => Ok(tri(l.equals(&r).map(|b| !b))),
        LessThan => Ok(tri(l.compare(&r).map(|o| o == Ordering::Less))),
        LessEqual => Ok(tri(l.compare(&r).map(|o| o != Ordering::Greater))),
        GreaterThan => Ok(tri(l.compare(&r).map(|o| o == Ordering::Greater))),
        GreaterEqual => Ok(tri(l.compare(&r).map(|o| o != Ordering::Less))),
        Add => add(l, r),
        Subtract | Multiply | Divide | Modulo | Power => arithmetic(op, l, r),
        In => membership(l, r),
        StartsWith | EndsWith | Contains => match (&l, &r) {
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (Value::String(a), Value::String(b)) => Ok(Value::Boolean(match op {
                StartsWith => a.starts_with(b.as_str()),
                EndsWith => a.ends_with(b.as_str()),
                _ => a.contains(b.as_str()),
            })),
            (Value::String(_), other) | (other, _) => Err(mismatch("String or Null", other)),
        },
        RegexMatch => match (&l, &r) {
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (Value::String(text), Value::String(pattern)) => {
                let re = Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| {
                    ExecutionError::Argument(format!("Invalid regular expression: {}", e))
                })?;
                Ok(Value::Boolean(re.is_match(text)))
            }
            (Value::String(_), other) | (other, _) => Err(mismatch("String or Null", other)),
        },
        And | Or | Xor => {
            let (a, b) = (truth(&l)?, truth(&r)?);
            Ok(match (op, a, b) {
                (And, Some(false), _) | (And, _, Some(false)) => Value::Boolean(false),
                (Or, Some(true), _) | (Or, _, Some(true)) => Value::Boolean(true),
                (_, Some(a), Some(b)) => Value::Boolean(match op {
                    And => a && b,
                    Or => a || b,
                    _ => a != b,
                }),
                _ => Value::Null,
            })
        }
    }
}

fn tri(result: Option<bool>) -> Value {
    result.map(Value::Boolean).unwrap_or(Value::Null)
}

fn add(l: Value, r: Value) -> ExecResult<Value> {
    match (l, r) {
        (Value::List(mut a), Value::List(b)) => {
            a.extend(b);
            Ok(Value::List(a))
        }
        (Value::List(mut a), other) => {
            a.push(other);
            Ok(Value::List(a))
        }
        (other, Value::List(mut b)) => {
            b.insert(0, other);
            Ok(Value::List(b))
        }
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
        (Value::String(a), other @ (Value::Integer(_) | Value::Float(_) | Value::Boolean(_))) => {
            Ok(Value::String(format!("{}{}", a, other)))
        }
        (other @ (Value::Integer(_) | Value::Float(_) | Value::Boolean(_)), Value::String(b)) => {
            Ok(Value::String(format!("{}{}", other, b)))
        }
        (l, r) => arithmetic(BinaryOperator::Add, l, r),
    }
}

fn arithmetic(op: BinaryOperator, l: Value, r: Value) -> ExecResult<Value> {
    use BinaryOperator::*;
    match (&l, &r) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Integer(a), Value::Integer(b)) => {
            let (a, b) = (*a, *b);
            match op {
                Add => Ok(Value::Integer(a.wrapping_add(b))),
                Subtract => Ok(Value::Integer(a.wrapping_sub(b))),
                Multiply => Ok(Value::Integer(a.wrapping_mul(b))),
                Divide if b == 0 => Err(ExecutionError::DivisionByZero),
                Divide => Ok(Value::Integer(a.wrapping_div(b))),
                Modulo if b == 0 => Err(ExecutionError::DivisionByZero),
                Modulo => Ok(Value::Integer(a.wrapping_rem(b))),
                _ => Ok(Value::Float((a as f64).powf(b as f64))),
            }
        }
        _ => {
            let a = l.as_f64().ok_or_else(|| mismatch("Integer, Float, or Null", &l))?;
            let b = r.as_f64().ok_or_else(|| mismatch("Integer, Float, or Null", &r))?;
            Ok(Value::Float(match op {
                Add => a + b,
                Subtract => a - b,
                Multiply => a * b,
                Divide => a / b,
                Modulo => a % b,
                _ => a.powf(b),
            }))
        }
    }
}

fn membership(needle: Value, haystack: Value) -> ExecResult<Value> {
    let items = match haystack {
        Value::Null => return Ok(Value::Null),
        Value::List(items) => items,
        other => return Err(mismatch("List or Null", &other)),
    };
    let mut unknown = false;
    for item in &items {
        match needle.equals(item) {
            Some(true) => return Ok(Value::Boolean(true)),
            Some(false) => {}
            None => unknown = true,
        }
    }
    Ok(if unknown {
        Value::Null
    } else {
        Value::Boolean(false)
    })
}

fn build_path(parts: &[PathPart], record: &Record) -> ExecResult<Value> {
    let mut path = PathValue::default();
    for part in parts {
        match *part {
            PathPart::Node(slot) => match slot_value(record, slot) {
                Value::Node(n) => path.nodes.push(n.clone()),
                Value::Null => return Ok(Value::Null),
                other => return Err(mismatch("Node", other)),
            },
            PathPart::Hop { edge, node } => {
                let e = match slot_value(record, edge) {
                    Value::Edge(e) => e.clone(),
                    Value::Null => return Ok(Value::Null),
                    other => return Err(mismatch("Edge", other)),
                };
                let n = match slot_value(record, node) {
                    Value::Node(n) => n.clone(),
                    Value::Null => return Ok(Value::Null),
                    other => return Err(mismatch("Node", other)),
                };
                path.edges.push(e);
                path.nodes.push(n);
            }
            PathPart::Segment(slot) => match slot_value(record, slot) {
                Value::Path(segment) => path.extend(segment),
                Value::Null => return Ok(Value::Null),
                other => return Err(mismatch("Path", other)),
            },
        }
    }
    Ok(Value::Path(path))
}

/// Relation ids for a type list: `Some(None)` means every type, plain
/// `None` means a named type does not exist, so nothing can match.
pub(crate) fn resolve_relations(graph: &Graph, names: &[String]) -> Option<Option<Vec<RelationId>>> {
    if names.is_empty() {
        return Some(None);
    }
    let ids: Vec<RelationId> = names
        .iter()
        .filter_map(|n| graph.schema().relation_id(n))
        .collect();
    if ids.is_empty() {
        None
    } else {
        Some(Some(ids))
    }
}

/// Neighbours of `node` along `direction`, as `(edge, neighbour)` pairs
/// with each edge oriented as stored.
pub(crate) fn neighbours(
    graph: &Graph,
    node: NodeId,
    relations: Option<&[RelationId]>,
    direction: Direction,
) -> Vec<(EdgeValue, NodeId)> {
    let mut out = Vec::new();
    if matches!(direction, Direction::Outgoing | Direction::Both) {
        for (edge, dst) in graph.outgoing(node, relations) {
            out.push((EdgeValue::reference(edge, node, dst), dst));
        }
    }
    if matches!(direction, Direction::Incoming | Direction::Both) {
        for (edge, src) in graph.incoming(node, relations) {
            // an undirected self-loop was already reached as outgoing
            if direction == Direction::Both && src == node {
                continue;
            }
            out.push((EdgeValue::reference(edge, src, node), src));
        }
    }
    out
}

/// Breadth-first single shortest path from `src` to `dst`.
pub(crate) fn bfs_path(
    graph: &Graph,
    src: NodeId,
    dst: NodeId,
    relations: Option<&[RelationId]>,
    direction: Direction,
    min_hops: u64,
    max_hops: Option<u64>,
) -> Option<PathValue> {
    if src == dst && min_hops == 0 {
        return Some(PathValue::single(NodeValue::reference(src)));
    }
    let mut parent: std::collections::HashMap<NodeId, (EdgeValue, NodeId)> = Default::default();
    let mut seen: HashSet<NodeId> = HashSet::from([src]);
    let mut frontier: VecDeque<(NodeId, u64)> = VecDeque::from([(src, 0)]);
    while let Some((node, depth)) = frontier.pop_front() {
        if max_hops.map(|m| depth >= m).unwrap_or(false) {
            continue;
        }
        for (edge, next) in neighbours(graph, node, relations, direction) {
            if next == dst {
                let mut nodes = vec![NodeValue::reference(dst)];
                let mut edges = vec![edge];
                let mut cursor = node;
                while cursor != src {
                    let (e, prev) = parent.get(&cursor)?.clone();
                    nodes.push(NodeValue::reference(cursor));
                    edges.push(e);
                    cursor = prev;
                }
                nodes.push(NodeValue::reference(src));
                nodes.reverse();
                edges.reverse();
                return Some(PathValue { nodes, edges });
            }
            if seen.insert(next) {
                parent.insert(next, (edge, node));
                frontier.push_back((next, depth + 1));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::context::GraphAccess;
    use crate::exec::memory_budget::MemoryBudget;
    use crate::functions::registry;
    use crate::storage::PropertyMap;
    use std::collections::HashMap;

    fn eval_on(graph: &Graph, expr: &Expr) -> ExecResult<Value> {
        let ctx = ExecutionContext::new(GraphAccess::Read(graph), HashMap::new(), MemoryBudget::unlimited());
        ctx.eval(expr, &Vec::new())
    }

    fn c(v: impl Into<Value>) -> Expr {
        Expr::constant(v)
    }

    fn bin(op: BinaryOperator, l: Expr, r: Expr) -> Expr {
        Expr::binary(op, l, r)
    }

    #[test]
    fn test_three_valued_logic() {
        let g = Graph::new("g");
        let null = || Expr::Constant(Value::Null);
        use BinaryOperator::*;
        assert_eq!(eval_on(&g, &bin(And, c(false), null())).unwrap(), Value::Boolean(false));
        assert!(eval_on(&g, &bin(And, c(true), null())).unwrap().is_null());
        assert_eq!(eval_on(&g, &bin(Or, null(), c(true))).unwrap(), Value::Boolean(true));
        assert!(eval_on(&g, &bin(Or, c(false), null())).unwrap().is_null());
        assert!(eval_on(&g, &bin(Xor, c(true), null())).unwrap().is_null());
        assert_eq!(eval_on(&g, &bin(Xor, c(true), c(false))).unwrap(), Value::Boolean(true));
        assert!(eval_on(&g, &Expr::Not(Box::new(null()))).unwrap().is_null());
    }

    #[test]
    fn test_nan_comparisons() {
        let g = Graph::new("g");
        let nan = || c(f64::NAN);
        use BinaryOperator::*;
        assert_eq!(eval_on(&g, &bin(Equal, nan(), nan())).unwrap(), Value::Boolean(false));
        assert_eq!(eval_on(&g, &bin(NotEqual, nan(), nan())).unwrap(), Value::Boolean(true));
        assert!(eval_on(&g, &bin(LessThan, nan(), c(1.0))).unwrap().is_null());
        assert!(eval_on(&g, &bin(GreaterEqual, c(1i64), nan())).unwrap().is_null());
    }

    #[test]
    fn test_division() {
        let g = Graph::new("g");
        use BinaryOperator::*;
        let err = eval_on(&g, &bin(Divide, c(1i64), c(0i64))).unwrap_err();
        assert!(matches!(err, ExecutionError::DivisionByZero));
        assert!(eval_on(&g, &bin(Modulo, c(1i64), c(0i64))).is_err());
        match eval_on(&g, &bin(Divide, c(1.0), c(0.0))).unwrap() {
            Value::Float(f) => assert!(f.is_infinite() && f > 0.0),
            other => panic!("unexpected {:?}", other),
        }
        match eval_on(&g, &bin(Divide, c(0.0), c(0.0))).unwrap() {
            Value::Float(f) => assert!(f.is_nan()),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(eval_on(&g, &bin(Divide, c(7i64), c(2i64))).unwrap(), Value::Integer(3));
        assert_eq!(eval_on(&g, &bin(Add, c(1i64), c(0.5))).unwrap(), Value::Float(1.5));
    }

    #[test]
    fn test_list_addition() {
        let g = Graph::new("g");
        let list = || Expr::List(vec![c(1i64), c(2i64)]);
        assert_eq!(
            eval_on(&g, &bin(BinaryOperator::Add, list(), c(3i64))).unwrap(),
            Value::from(vec![1i64, 2, 3])
        );
        assert_eq!(
            eval_on(&g, &bin(BinaryOperator::Add, c(0i64), list())).unwrap(),
            Value::from(vec![0i64, 1, 2])
        );
        assert_eq!(
            eval_on(&g, &bin(BinaryOperator::Add, list(), list())).unwrap(),
            Value::from(vec![1i64, 2, 1, 2])
        );
    }

    #[test]
    fn test_add_complex_type_mismatch() {
        let g = Graph::new("g");
        let node = Expr::Constant(Value::Node(NodeValue::reference(0)));
        let err = eval_on(&g, &bin(BinaryOperator::Add, node, c(1i64))).unwrap_err();
        assert!(err.to_string().starts_with("Type mismatch"));
    }

    #[test]
    fn test_in_with_nulls() {
        let g = Graph::new("g");
        let list = Expr::List(vec![c(1i64), Expr::Constant(Value::Null)]);
        assert_eq!(
            eval_on(&g, &bin(BinaryOperator::In, c(1i64), list.clone())).unwrap(),
            Value::Boolean(true)
        );
        assert!(eval_on(&g, &bin(BinaryOperator::In, c(2i64), list)).unwrap().is_null());
        assert_eq!(
            eval_on(&g, &bin(BinaryOperator::In, c(2i64), Expr::List(vec![]))).unwrap(),
            Value::Boolean(false)
        );
    }

    #[test]
    fn test_regex_is_full_match() {
        let g = Graph::new("g");
        use BinaryOperator::RegexMatch;
        assert_eq!(eval_on(&g, &bin(RegexMatch, c("abc"), c("a.c"))).unwrap(), Value::Boolean(true));
        assert_eq!(eval_on(&g, &bin(RegexMatch, c("abcd"), c("a.c"))).unwrap(), Value::Boolean(false));
    }

    #[test]
    fn test_comprehension_and_quantifiers() {
        let g = Graph::new("g");
        let list = Box::new(Expr::List(vec![c(1i64), c(2i64), c(3i64)]));
        let gt1 = Box::new(bin(BinaryOperator::GreaterThan, Expr::Local(0), c(1i64)));
        let comp = Expr::Comprehension {
            local: 0,
            list: list.clone(),
            predicate: Some(gt1.clone()),
            projection: Some(Box::new(bin(BinaryOperator::Multiply, Expr::Local(0), c(10i64)))),
        };
        assert_eq!(eval_on(&g, &comp).unwrap(), Value::from(vec![20i64, 30]));
        let any = Expr::Quantifier {
            kind: QuantifierKind::Any,
            local: 0,
            list: list.clone(),
            predicate: gt1.clone(),
        };
        assert_eq!(eval_on(&g, &any).unwrap(), Value::Boolean(true));
        let single = Expr::Quantifier {
            kind: QuantifierKind::Single,
            local: 0,
            list,
            predicate: gt1,
        };
        assert_eq!(eval_on(&g, &single).unwrap(), Value::Boolean(false));
    }

    #[test]
    fn test_subscript_and_slice() {
        let g = Graph::new("g");
        let list = || Box::new(Expr::List(vec![c(1i64), c(2i64), c(3i64)]));
        assert_eq!(
            eval_on(&g, &Expr::Subscript(list(), Box::new(c(-1i64)))).unwrap(),
            Value::Integer(3)
        );
        assert!(eval_on(&g, &Expr::Subscript(list(), Box::new(c(5i64)))).unwrap().is_null());
        let slice = Expr::Slice {
            list: list(),
            from: Some(Box::new(c(1i64))),
            to: None,
        };
        assert_eq!(eval_on(&g, &slice).unwrap(), Value::from(vec![2i64, 3]));
        let tail = Expr::Slice {
            list: list(),
            from: Some(Box::new(c(-2i64))),
            to: Some(Box::new(c(-1i64))),
        };
        assert_eq!(eval_on(&g, &tail).unwrap(), Value::from(vec![2i64]));
    }

    #[test]
    fn test_properties_and_functions() {
        let mut g = Graph::new("g");
        let v = g.intern_attribute("v").unwrap();
        let mut props = PropertyMap::new();
        props.set(v, Value::Integer(4));
        let id = g.create_node(&[], props).unwrap();
        g.flush().unwrap();
        let node = Box::new(Expr::Constant(Value::Node(NodeValue::reference(id))));
        assert_eq!(eval_on(&g, &Expr::Property(node.clone(), "v".into())).unwrap(), Value::Integer(4));
        assert!(eval_on(&g, &Expr::Property(node, "missing".into())).unwrap().is_null());
        let err = eval_on(&g, &Expr::Property(Box::new(c(1i64)), "v".into())).unwrap_err();
        assert!(err.to_string().starts_with("Type mismatch"));
        let call = Expr::Call {
            function: registry().get("toUpper").unwrap(),
            arguments: vec![c("ab")],
        };
        assert_eq!(eval_on(&g, &call).unwrap(), Value::from("AB"));
    }

    #[test]
    fn test_bfs_path() {
        let mut g = Graph::new("g");
        let e = g.intern_relation("E").unwrap();
        let ids: Vec<NodeId> = (0..4).map(|_| g.create_node(&[], PropertyMap::new()).unwrap()).collect();
        g.create_edge(e, ids[0], ids[1], PropertyMap::new()).unwrap();
        g.create_edge(e, ids[1], ids[2], PropertyMap::new()).unwrap();
        g.create_edge(e, ids[0], ids[2], PropertyMap::new()).unwrap();
        g.flush().unwrap();
        let path = bfs_path(&g, ids[0], ids[2], None, Direction::Outgoing, 1, None).unwrap();
        assert_eq!(path.len(), 1);
        assert!(bfs_path(&g, ids[2], ids[0], None, Direction::Outgoing, 1, None).is_none());
        assert_eq!(
            bfs_path(&g, ids[2], ids[0], None, Direction::Both, 1, None).map(|p| p.len()),
            Some(1)
        );
        assert!(bfs_path(&g, ids[0], ids[3], None, Direction::Both, 1, None).is_none());
    }
}
