// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Abstract Syntax Tree (AST) structures for the query language

use serde::{Deserialize, Serialize};

use crate::storage::types::EntityKind;
use crate::storage::value::Value;

/// A parsed request: optional `CYPHER k=v ...` parameters plus a statement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub parameters: Vec<(String, Expression)>,
    pub statement: Statement,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Statement {
    Query(Query),
    CreateIndex(IndexStatement),
    DropIndex(IndexStatement),
}

/// `CREATE INDEX ON :L(p)` and the `FOR` forms
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexStatement {
    pub entity: EntityKind,
    pub label: String,
    pub properties: Vec<String>,
}

/// One or more single queries joined by `UNION [ALL]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub first: SingleQuery,
    pub unions: Vec<UnionPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnionPart {
    pub all: bool,
    pub query: SingleQuery,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleQuery {
    pub clauses: Vec<Clause>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Clause {
    Match(MatchClause),
    Unwind(UnwindClause),
    With(Projection),
    Return(Projection),
    Create(CreateClause),
    Merge(MergeClause),
    Set(Vec<SetItem>),
    Remove(Vec<RemoveItem>),
    Delete(DeleteClause),
    Call(CallClause),
}

impl Clause {
    pub fn name(&self) -> &'static str {
        match self {
            Clause::Match(m) if m.optional => "OPTIONAL MATCH",
            Clause::Match(_) => "MATCH",
            Clause::Unwind(_) => "UNWIND",
            Clause::With(_) => "WITH",
            Clause::Return(_) => "RETURN",
            Clause::Create(_) => "CREATE",
            Clause::Merge(_) => "MERGE",
            Clause::Set(_) => "SET",
            Clause::Remove(_) => "REMOVE",
            Clause::Delete(_) => "DELETE",
            Clause::Call(_) => "CALL",
        }
    }

    /// Whether the clause mutates the graph on its own
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Clause::Create(_)
                | Clause::Merge(_)
                | Clause::Set(_)
                | Clause::Remove(_)
                | Clause::Delete(_)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchClause {
    pub optional: bool,
    pub patterns: Vec<PathPattern>,
    pub where_clause: Option<Expression>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnwindClause {
    pub expression: Expression,
    pub alias: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateClause {
    pub patterns: Vec<PathPattern>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeClause {
    pub pattern: PathPattern,
    pub on_create: Vec<SetItem>,
    pub on_match: Vec<SetItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteClause {
    pub detach: bool,
    pub expressions: Vec<Expression>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallClause {
    pub procedure: String,
    pub arguments: Vec<Expression>,
    /// `None` when the call has no `YIELD`
    pub yields: Option<Vec<YieldItem>>,
    pub where_clause: Option<Expression>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YieldItem {
    pub name: String,
    pub alias: Option<String>,
}

impl YieldItem {
    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// Body of `WITH` and `RETURN`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Projection {
    pub distinct: bool,
    /// `*` was given; expands to every variable in scope
    pub star: bool,
    pub items: Vec<ProjectionItem>,
    pub order_by: Vec<SortItem>,
    pub skip: Option<Expression>,
    pub limit: Option<Expression>,
    /// Only for `WITH`
    pub where_clause: Option<Expression>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionItem {
    pub expression: Expression,
    pub alias: Option<String>,
    /// Source text of the expression, used as the default column name
    pub text: String,
    /// Token distances from the end of input, resolved to `text` after parsing
    #[serde(skip)]
    pub(crate) span: (usize, usize),
}

impl ProjectionItem {
    pub fn column_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.text)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortItem {
    pub expression: Expression,
    pub descending: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SetItem {
    /// `n.p = expr`
    Property {
        target: Expression,
        key: String,
        value: Expression,
    },
    /// `n = map`
    Replace { variable: String, value: Expression },
    /// `n += map`
    Update { variable: String, value: Expression },
    /// `n:A:B`
    Labels { variable: String, labels: Vec<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RemoveItem {
    Property { target: Expression, key: String },
    Labels { variable: String, labels: Vec<String> },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PathKind {
    Normal,
    ShortestPath,
    AllShortestPaths,
}

/// `p = (a)-[r]->(b)...`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathPattern {
    pub variable: Option<String>,
    pub kind: PathKind,
    pub start: NodePattern,
    pub steps: Vec<PatternStep>,
}

impl PathPattern {
    /// Visit the inline property maps of every node and relationship.
    pub fn walk_properties<'a>(&'a self, visit: &mut dyn FnMut(&'a Expression)) {
        for node in self.nodes() {
            if let Some(p) = &node.properties {
                p.walk(visit);
            }
        }
        for rel in self.relationships() {
            if let Some(p) = &rel.properties {
                p.walk(visit);
            }
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodePattern> {
        std::iter::once(&self.start).chain(self.steps.iter().map(|s| &s.node))
    }

    pub fn relationships(&self) -> impl Iterator<Item = &RelationshipPattern> {
        self.steps.iter().map(|s| &s.relationship)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternStep {
    pub relationship: RelationshipPattern,
    pub node: NodePattern,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodePattern {
    pub variable: Option<String>,
    pub labels: Vec<String>,
    pub properties: Option<Expression>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Direction {
    /// `-[]->`
    Outgoing,
    /// `<-[]-`
    Incoming,
    /// `-[]-`
    Both,
}

/// `*min..max`; a missing bound is open
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct HopRange {
    pub min: Option<u64>,
    pub max: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipPattern {
    pub variable: Option<String>,
    pub types: Vec<String>,
    pub direction: Direction,
    pub range: Option<HopRange>,
    pub properties: Option<Expression>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BinaryOperator {
    Or,
    Xor,
    And,
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
    In,
    StartsWith,
    EndsWith,
    Contains,
    RegexMatch,
}

impl BinaryOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Or => "OR",
            BinaryOperator::Xor => "XOR",
            BinaryOperator::And => "AND",
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "<>",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterEqual => ">=",
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Power => "^",
            BinaryOperator::In => "IN",
            BinaryOperator::StartsWith => "STARTS WITH",
            BinaryOperator::EndsWith => "ENDS WITH",
            BinaryOperator::Contains => "CONTAINS",
            BinaryOperator::RegexMatch => "=~",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Equal
                | BinaryOperator::NotEqual
                | BinaryOperator::LessThan
                | BinaryOperator::LessEqual
                | BinaryOperator::GreaterThan
                | BinaryOperator::GreaterEqual
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Negate,
    Plus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum QuantifierKind {
    All,
    Any,
    None,
    Single,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseExpression {
    pub operand: Option<Box<Expression>>,
    pub branches: Vec<(Expression, Expression)>,
    pub default: Option<Box<Expression>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expression {
    Literal(Value),
    Parameter(String),
    Variable(String),
    Property(Box<Expression>, String),
    List(Vec<Expression>),
    Map(Vec<(String, Expression)>),
    Unary(UnaryOperator, Box<Expression>),
    Binary(BinaryOperator, Box<Expression>, Box<Expression>),
    IsNull {
        expression: Box<Expression>,
        negated: bool,
    },
    /// `n:A:B` used as a predicate
    HasLabels(Box<Expression>, Vec<String>),
    FunctionCall {
        name: String,
        distinct: bool,
        arguments: Vec<Expression>,
    },
    CountStar,
    Case(CaseExpression),
    ListComprehension {
        variable: String,
        list: Box<Expression>,
        predicate: Option<Box<Expression>>,
        projection: Option<Box<Expression>>,
    },
    Quantifier {
        kind: QuantifierKind,
        variable: String,
        list: Box<Expression>,
        predicate: Box<Expression>,
    },
    Subscript(Box<Expression>, Box<Expression>),
    Slice {
        expression: Box<Expression>,
        from: Option<Box<Expression>>,
        to: Option<Box<Expression>>,
    },
    /// Pattern used as an expression: `(a)-->()` or `shortestPath(...)`
    Pattern(Box<PathPattern>),
    /// `[p = (a)-->(b) WHERE pred | projection]`
    PatternComprehension {
        pattern: Box<PathPattern>,
        predicate: Option<Box<Expression>>,
        projection: Box<Expression>,
    },
}

impl Expression {
    pub fn variable(name: &str) -> Self {
        Expression::Variable(name.to_string())
    }

    /// Visit this expression and every nested sub-expression, parents first.
    /// Pattern property maps are included.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Expression)) {
        visit(self);
        match self {
            Expression::Literal(_)
            | Expression::Parameter(_)
            | Expression::Variable(_)
            | Expression::CountStar => {}
            Expression::Property(e, _)
            | Expression::Unary(_, e)
            | Expression::HasLabels(e, _)
            | Expression::IsNull { expression: e, .. } => e.walk(visit),
            Expression::List(items) => items.iter().for_each(|e| e.walk(visit)),
            Expression::Map(entries) => entries.iter().for_each(|(_, e)| e.walk(visit)),
            Expression::Binary(_, l, r) | Expression::Subscript(l, r) => {
                l.walk(visit);
                r.walk(visit);
            }
            Expression::FunctionCall { arguments, .. } => {
                arguments.iter().for_each(|e| e.walk(visit))
            }
            Expression::Case(case) => {
                if let Some(op) = &case.operand {
                    op.walk(visit);
                }
                for (w, t) in &case.branches {
                    w.walk(visit);
                    t.walk(visit);
                }
                if let Some(d) = &case.default {
                    d.walk(visit);
                }
            }
            Expression::ListComprehension {
                list,
                predicate,
                projection,
                ..
            } => {
                list.walk(visit);
                if let Some(p) = predicate {
                    p.walk(visit);
                }
                if let Some(p) = projection {
                    p.walk(visit);
                }
            }
            Expression::Quantifier {
                list, predicate, ..
            } => {
                list.walk(visit);
                predicate.walk(visit);
            }
            Expression::Slice {
                expression,
                from,
                to,
            } => {
                expression.walk(visit);
                if let Some(f) = from {
                    f.walk(visit);
                }
                if let Some(t) = to {
                    t.walk(visit);
                }
            }
            Expression::Pattern(pattern) => pattern.walk_properties(visit),
            Expression::PatternComprehension {
                pattern,
                predicate,
                projection,
            } => {
                pattern.walk_properties(visit);
                if let Some(p) = predicate {
                    p.walk(visit);
                }
                projection.walk(visit);
            }
        }
    }

    /// Whether any sub-expression satisfies `pred`
    pub fn any(&self, pred: &dyn Fn(&Expression) -> bool) -> bool {
        let mut found = false;
        self.walk(&mut |e| {
            if !found && pred(e) {
                found = true;
            }
        });
        found
    }
}
