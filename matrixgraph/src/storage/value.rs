// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Runtime value representation
//!
//! `Value` is the tagged union every expression, record slot and property
//! evaluates to. Two comparison families live here:
//!
//! - [`Value::total_cmp`] is the total order used by `ORDER BY`, `DISTINCT`,
//!   grouping and index keys. It backs the `Ord`/`Eq`/`Hash` impls.
//! - [`Value::equals`] and [`Value::compare`] implement query-language
//!   comparison with three-valued results (`None` means unknown).

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use super::types::{EdgeId, NodeId};

/// Geographic point (WGS-84 degrees)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub latitude: f64,
    pub longitude: f64,
}

/// Node as seen by queries and results.
///
/// Inside the executor only `id` is meaningful; labels and properties are
/// materialized when a result set is produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeValue {
    pub id: NodeId,
    pub labels: Vec<String>,
    pub properties: Vec<(String, Value)>,
}

impl NodeValue {
    pub fn reference(id: NodeId) -> Self {
        Self {
            id,
            labels: Vec::new(),
            properties: Vec::new(),
        }
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }
}

/// Edge as seen by queries and results. Endpoints are always populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeValue {
    pub id: EdgeId,
    pub rel_type: String,
    pub src: NodeId,
    pub dst: NodeId,
    pub properties: Vec<(String, Value)>,
}

impl EdgeValue {
    pub fn reference(id: EdgeId, src: NodeId, dst: NodeId) -> Self {
        Self {
            id,
            rel_type: String::new(),
            src,
            dst,
            properties: Vec::new(),
        }
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }
}

/// Alternating node/edge sequence; `nodes.len() == edges.len() + 1` unless empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathValue {
    pub nodes: Vec<NodeValue>,
    pub edges: Vec<EdgeValue>,
}

impl PathValue {
    pub fn single(node: NodeValue) -> Self {
        Self {
            nodes: vec![node],
            edges: Vec::new(),
        }
    }

    /// Number of hops
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Append `other`, whose first node must be this path's last node.
    pub fn extend(&mut self, other: &PathValue) {
        if self.nodes.is_empty() {
            self.nodes = other.nodes.clone();
            self.edges = other.edges.clone();
            return;
        }
        self.edges.extend(other.edges.iter().cloned());
        self.nodes.extend(other.nodes.iter().skip(1).cloned());
    }
}

/// Query-time value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    /// Insertion-ordered map with unique keys
    Map(Vec<(String, Value)>),
    Point(Point),
    Node(NodeValue),
    Edge(EdgeValue),
    Path(PathValue),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_node_id(&self) -> Option<NodeId> {
        match self {
            Value::Node(n) => Some(n.id),
            _ => None,
        }
    }

    pub fn as_edge(&self) -> Option<&EdgeValue> {
        match self {
            Value::Edge(e) => Some(e),
            _ => None,
        }
    }

    /// Name used in `Type mismatch` messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Boolean(_) => "Boolean",
            Value::Integer(_) => "Integer",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
            Value::Point(_) => "Point",
            Value::Node(_) => "Node",
            Value::Edge(_) => "Edge",
            Value::Path(_) => "Path",
        }
    }

    pub fn map_get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Whether the value may be stored as an entity property.
    pub fn is_valid_property(&self) -> bool {
        match self {
            Value::Boolean(_)
            | Value::Integer(_)
            | Value::Float(_)
            | Value::String(_)
            | Value::Point(_) => true,
            Value::List(items) => items
                .iter()
                .all(|v| !v.is_null() && v.is_valid_property()),
            _ => false,
        }
    }

    /// Rough heap footprint, used for per-query memory accounting.
    pub fn estimated_size(&self) -> usize {
        let base = std::mem::size_of::<Value>();
        match self {
            Value::String(s) => base + s.len(),
            Value::List(items) => base + items.iter().map(Value::estimated_size).sum::<usize>(),
            Value::Map(entries) => {
                base + entries
                    .iter()
                    .map(|(k, v)| k.len() + v.estimated_size())
                    .sum::<usize>()
            }
            Value::Node(n) => base + n.labels.len() * 16 + n.properties.len() * 32,
            Value::Edge(e) => base + e.properties.len() * 32,
            Value::Path(p) => base + (p.nodes.len() + p.edges.len()) * base,
            _ => base,
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::String(_) => 0,
            Value::Boolean(_) => 1,
            Value::Integer(_) | Value::Float(_) => 2,
            Value::Point(_) => 3,
            Value::Node(_) => 4,
            Value::Edge(_) => 5,
            Value::Path(_) => 6,
            Value::List(_) => 7,
            Value::Map(_) => 8,
            Value::Null => 9,
        }
    }

    /// Total order: strings < booleans < numerics < spatial < entities < lists < maps < null.
    ///
    /// Within numerics NaN sorts after every other number and equals itself.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        let (ra, rb) = (self.type_rank(), other.type_rank());
        if ra != rb {
            return ra.cmp(&rb);
        }
        match (self, other) {
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                numeric_total_cmp(a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN))
            }
            (Value::Point(a), Value::Point(b)) => numeric_total_cmp(a.latitude, b.latitude)
                .then_with(|| numeric_total_cmp(a.longitude, b.longitude)),
            (Value::Node(a), Value::Node(b)) => a.id.cmp(&b.id),
            (Value::Edge(a), Value::Edge(b)) => a.id.cmp(&b.id),
            (Value::Path(a), Value::Path(b)) => {
                let ka: Vec<u64> = a.nodes.iter().map(|n| n.id).collect();
                let kb: Vec<u64> = b.nodes.iter().map(|n| n.id).collect();
                ka.cmp(&kb).then_with(|| {
                    let ea: Vec<u64> = a.edges.iter().map(|e| e.id).collect();
                    let eb: Vec<u64> = b.edges.iter().map(|e| e.id).collect();
                    ea.cmp(&eb)
                })
            }
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.total_cmp(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Map(a), Value::Map(b)) => {
                let mut sa: Vec<&(String, Value)> = a.iter().collect();
                let mut sb: Vec<&(String, Value)> = b.iter().collect();
                sa.sort_by(|x, y| x.0.cmp(&y.0));
                sb.sort_by(|x, y| x.0.cmp(&y.0));
                sa.len().cmp(&sb.len()).then_with(|| {
                    for ((ka, va), (kb, vb)) in sa.iter().map(|e| (&e.0, &e.1)).zip(sb.iter().map(|e| (&e.0, &e.1))) {
                        let ord = ka.cmp(kb).then_with(|| va.total_cmp(vb));
                        if ord != Ordering::Equal {
                            return ord;
                        }
                    }
                    Ordering::Equal
                })
            }
            _ => Ordering::Equal,
        }
    }

    /// Equality with three-valued logic. `None` is unknown.
    pub fn equals(&self, other: &Value) -> Option<bool> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Integer(a), Value::Integer(b)) => Some(a == b),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                Some(a.as_f64().unwrap_or(f64::NAN) == b.as_f64().unwrap_or(f64::NAN))
            }
            (Value::String(a), Value::String(b)) => Some(a == b),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a == b),
            (Value::Point(a), Value::Point(b)) => Some(a == b),
            (Value::Node(a), Value::Node(b)) => Some(a.id == b.id),
            (Value::Edge(a), Value::Edge(b)) => Some(a.id == b.id),
            (Value::Path(_), Value::Path(_)) => Some(self.total_cmp(other) == Ordering::Equal),
            (Value::List(a), Value::List(b)) => {
                if a.len() != b.len() {
                    return Some(false);
                }
                let mut unknown = false;
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.equals(y) {
                        Some(false) => return Some(false),
                        None => unknown = true,
                        Some(true) => {}
                    }
                }
                if unknown {
                    None
                } else {
                    Some(true)
                }
            }
            (Value::Map(a), Value::Map(b)) => {
                if a.len() != b.len() {
                    return Some(false);
                }
                let mut unknown = false;
                for (k, v) in a {
                    match other.map_get(k) {
                        None => return Some(false),
                        Some(w) => match v.equals(w) {
                            Some(false) => return Some(false),
                            None => unknown = true,
                            Some(true) => {}
                        },
                    }
                }
                if unknown {
                    None
                } else {
                    Some(true)
                }
            }
            _ => Some(false),
        }
    }

    /// Ordering comparison for `<`, `<=`, `>`, `>=`. `None` when the operands
    /// are incomparable, either is null, or a NaN is involved.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (a, b) if a.is_numeric() && b.is_numeric() => a
                .as_f64()
                .unwrap_or(f64::NAN)
                .partial_cmp(&b.as_f64().unwrap_or(f64::NAN)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare(y)? {
                        Ordering::Equal => {}
                        ord => return Some(ord),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => None,
        }
    }
}

fn numeric_total_cmp(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.total_cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        self.total_cmp(other)
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_rank().hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(b) => b.hash(state),
            Value::Integer(i) => hash_number(*i as f64, state),
            Value::Float(f) => hash_number(*f, state),
            Value::String(s) => s.hash(state),
            Value::List(items) => {
                items.len().hash(state);
                for item in items {
                    item.hash(state);
                }
            }
            Value::Map(entries) => {
                // order-independent
                let mut keys: Vec<&String> = entries.iter().map(|(k, _)| k).collect();
                keys.sort();
                keys.hash(state);
            }
            Value::Point(p) => {
                hash_number(p.latitude, state);
                hash_number(p.longitude, state);
            }
            Value::Node(n) => n.id.hash(state),
            Value::Edge(e) => e.id.hash(state),
            Value::Path(p) => {
                for n in &p.nodes {
                    n.id.hash(state);
                }
            }
        }
    }
}

fn hash_number<H: Hasher>(f: f64, state: &mut H) {
    let canonical = if f.is_nan() {
        f64::NAN.to_bits()
    } else if f == 0.0 {
        0u64
    } else {
        f.to_bits()
    };
    canonical.hash(state);
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        if f > 0.0 {
            "inf".to_string()
        } else {
            "-inf".to_string()
        }
    } else {
        format!("{:?}", f)
    }
}

fn write_properties(f: &mut fmt::Formatter<'_>, properties: &[(String, Value)]) -> fmt::Result {
    if properties.is_empty() {
        return Ok(());
    }
    write!(f, " {{")?;
    for (i, (k, v)) in properties.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}: {}", k, v.literal())?;
    }
    write!(f, "}}")
}

impl Value {
    /// Literal rendering: strings quoted, everything else as `Display`.
    pub fn literal(&self) -> String {
        match self {
            Value::String(s) => format!("'{}'", s),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for NodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for label in &self.labels {
            write!(f, ":{}", label)?;
        }
        write_properties(f, &self.properties)?;
        write!(f, ")")
    }
}

impl fmt::Display for EdgeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[:{}", self.rel_type)?;
        write_properties(f, &self.properties)?;
        write!(f, "]")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", format_float(*x)),
            Value::String(s) => write!(f, "{}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item.literal())?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v.literal())?;
                }
                write!(f, "}}")
            }
            Value::Point(p) => write!(
                f,
                "point({{latitude: {}, longitude: {}}})",
                format_float(p.latitude),
                format_float(p.longitude)
            ),
            Value::Node(n) => write!(f, "{}", n),
            Value::Edge(e) => write!(f, "{}", e),
            Value::Path(p) => {
                write!(f, "<")?;
                for (i, node) in p.nodes.iter().enumerate() {
                    if i > 0 {
                        if let Some(edge) = p.edges.get(i - 1) {
                            write!(f, "-{}->", edge)?;
                        }
                    }
                    write!(f, "{}", node)?;
                }
                write!(f, ">")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl Value {
    /// Convert a JSON document into a value. Objects become maps in key order.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// JSON rendering used by result printers. Non-finite floats become null.
    pub fn to_json(&self) -> serde_json::Value {
        fn properties(entries: &[(String, Value)]) -> serde_json::Value {
            serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            )
        }
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Integer(i) => serde_json::json!(i),
            Value::Float(x) => serde_json::Number::from_f64(*x)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(entries) => properties(entries),
            Value::Point(p) => serde_json::json!({
                "latitude": p.latitude,
                "longitude": p.longitude,
            }),
            Value::Node(n) => serde_json::json!({
                "type": "node",
                "id": n.id,
                "labels": n.labels,
                "properties": properties(&n.properties),
            }),
            Value::Edge(e) => serde_json::json!({
                "type": "relationship",
                "id": e.id,
                "relationshipType": e.rel_type,
                "src": e.src,
                "dst": e.dst,
                "properties": properties(&e.properties),
            }),
            Value::Path(p) => serde_json::json!({
                "nodes": p.nodes.iter().map(|n| Value::Node(n.clone()).to_json()).collect::<Vec<_>>(),
                "edges": p.edges.iter().map(|e| Value::Edge(e.clone()).to_json()).collect::<Vec<_>>(),
            }),
        }
    }
}
