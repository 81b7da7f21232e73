// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Parser for the query language
//!
//! Token-level parser built with nom combinators over the lexer's token
//! slice. Clause keywords are followed by `cut` so that a malformed clause
//! reports the position where it actually went wrong instead of the start of
//! the clause.

use nom::{
    branch::alt,
    combinator::{cut, map, opt, value, verify},
    error::ErrorKind,
    multi::{many0, many1, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};
use std::mem::discriminant;
use thiserror::Error;

use super::ast::*;
use super::lexer::{tokenize, Token, TokenStream};
use crate::storage::types::EntityKind;
use crate::storage::value::Value;

/// Parser errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParserError {
    #[error("empty query")]
    EmptyQuery,

    #[error("Invalid input '{found}': errored at offset {offset}")]
    InvalidInput { found: String, offset: usize },

    #[error("Invalid numeric value '{text}' at offset {offset}")]
    InvalidNumber { text: String, offset: usize },

    #[error("Invalid input: unterminated literal starting at offset {offset}")]
    Unterminated { offset: usize },
}

impl ParserError {
    /// Byte offset of the error in the query text
    pub fn offset(&self) -> Option<usize> {
        match self {
            ParserError::EmptyQuery => None,
            ParserError::InvalidInput { offset, .. }
            | ParserError::InvalidNumber { offset, .. }
            | ParserError::Unterminated { offset } => Some(*offset),
        }
    }
}

type PResult<'a, T> = IResult<&'a [Token], T>;

/// Parse a full request, including the optional `CYPHER` parameter prefix.
pub fn parse_query(input: &str) -> Result<Document, ParserError> {
    let stream = tokenize(input)?;
    if stream.is_empty() {
        return Err(ParserError::EmptyQuery);
    }

    match document(&stream.tokens) {
        Ok((rest, mut doc)) => {
            if !matches!(rest.first(), Some(Token::EOF) | None) {
                return Err(invalid_input(&stream, rest));
            }
            if let Statement::Query(query) = &mut doc.statement {
                resolve_projection_text(query, input, &stream);
            }
            Ok(doc)
        }
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            if e.code == ErrorKind::Verify {
                if let Some(Token::Integer(n)) = e.input.first() {
                    return Err(ParserError::InvalidNumber {
                        text: n.to_string(),
                        offset: stream.offset_of_remaining(e.input.len()),
                    });
                }
            }
            Err(invalid_input(&stream, e.input))
        }
        Err(nom::Err::Incomplete(_)) => Err(ParserError::InvalidInput {
            found: Token::EOF.describe(),
            offset: input.len(),
        }),
    }
}

fn invalid_input(stream: &TokenStream, remaining: &[Token]) -> ParserError {
    ParserError::InvalidInput {
        found: remaining
            .first()
            .map(Token::describe)
            .unwrap_or_else(|| Token::EOF.describe()),
        offset: stream.offset_of_remaining(remaining.len()),
    }
}

/// Fill the source text of every projection item from its token span.
fn resolve_projection_text(query: &mut Query, input: &str, stream: &TokenStream) {
    let total = stream.tokens.len();
    let queries = std::iter::once(&mut query.first).chain(query.unions.iter_mut().map(|u| &mut u.query));
    for single in queries {
        for clause in &mut single.clauses {
            let projection = match clause {
                Clause::With(p) | Clause::Return(p) => p,
                _ => continue,
            };
            for item in &mut projection.items {
                let (from_end_start, from_end_stop) = item.span;
                let first = total - from_end_start;
                let last = total - from_end_stop;
                if last > first && last <= total {
                    let start = stream.offsets[first];
                    let end = stream.ends[last - 1];
                    item.text = input[start..end].trim().to_string();
                }
            }
        }
    }
}

// ============================================================================
// Token helpers
// ============================================================================

fn fail<T>(tokens: &[Token]) -> PResult<'_, T> {
    Err(nom::Err::Error(nom::error::Error::new(tokens, ErrorKind::Tag)))
}

/// Parse a specific token, comparing variants only
fn expect_token(expected: Token) -> impl Fn(&[Token]) -> IResult<&[Token], Token> {
    move |tokens: &[Token]| match tokens.first() {
        Some(token) if discriminant(token) == discriminant(&expected) => {
            Ok((&tokens[1..], token.clone()))
        }
        _ => fail(tokens),
    }
}

fn identifier(tokens: &[Token]) -> PResult<'_, String> {
    match tokens.first() {
        Some(Token::Identifier(name)) => Ok((&tokens[1..], name.clone())),
        _ => fail(tokens),
    }
}

/// Identifier or keyword, for labels, property keys and map keys
fn symbolic_name(tokens: &[Token]) -> PResult<'_, String> {
    match tokens.first() {
        Some(Token::Identifier(name)) => Ok((&tokens[1..], name.clone())),
        Some(token) => match token.keyword_text() {
            Some(text) => Ok((&tokens[1..], text.to_string())),
            None => fail(tokens),
        },
        None => fail(tokens),
    }
}

/// Identifier matching `name` case-insensitively (function-like keywords)
fn named(name: &'static str) -> impl Fn(&[Token]) -> IResult<&[Token], ()> {
    move |tokens: &[Token]| match tokens.first() {
        Some(Token::Identifier(id)) if id.eq_ignore_ascii_case(name) => Ok((&tokens[1..], ())),
        _ => fail(tokens),
    }
}

fn unsigned_integer(tokens: &[Token]) -> PResult<'_, u64> {
    match tokens.first() {
        Some(Token::Integer(n)) => Ok((&tokens[1..], *n)),
        _ => fail(tokens),
    }
}

fn parameter(tokens: &[Token]) -> PResult<'_, String> {
    match tokens.first() {
        Some(Token::Parameter(name)) => Ok((&tokens[1..], name.clone())),
        _ => fail(tokens),
    }
}

// ============================================================================
// Documents and statements
// ============================================================================

fn document(tokens: &[Token]) -> PResult<'_, Document> {
    map(
        tuple((
            opt(preceded(
                expect_token(Token::Cypher),
                cut(many0(cypher_parameter)),
            )),
            statement,
            opt(expect_token(Token::Semicolon)),
        )),
        |(parameters, statement, _)| Document {
            parameters: parameters.unwrap_or_default(),
            statement,
        },
    )(tokens)
}

fn cypher_parameter(tokens: &[Token]) -> PResult<'_, (String, Expression)> {
    map(
        tuple((symbolic_name, expect_token(Token::Equal), cut(expression))),
        |(name, _, value)| (name, value),
    )(tokens)
}

fn statement(tokens: &[Token]) -> PResult<'_, Statement> {
    alt((
        map(
            preceded(
                pair(expect_token(Token::Create), expect_token(Token::Index)),
                cut(index_target),
            ),
            Statement::CreateIndex,
        ),
        map(
            preceded(
                pair(expect_token(Token::Drop), expect_token(Token::Index)),
                cut(index_target),
            ),
            Statement::DropIndex,
        ),
        map(query, Statement::Query),
    ))(tokens)
}

fn index_target(tokens: &[Token]) -> PResult<'_, IndexStatement> {
    alt((index_on_label, index_for_node, index_for_relationship))(tokens)
}

fn property_list(tokens: &[Token]) -> PResult<'_, Vec<String>> {
    delimited(
        expect_token(Token::LeftParen),
        separated_list1(expect_token(Token::Comma), symbolic_name),
        expect_token(Token::RightParen),
    )(tokens)
}

/// `(n.a, n.b)`
fn qualified_property_list(tokens: &[Token]) -> PResult<'_, Vec<String>> {
    delimited(
        expect_token(Token::LeftParen),
        separated_list1(
            expect_token(Token::Comma),
            preceded(pair(identifier, expect_token(Token::Dot)), symbolic_name),
        ),
        expect_token(Token::RightParen),
    )(tokens)
}

/// `ON :Label(a, b)`
fn index_on_label(tokens: &[Token]) -> PResult<'_, IndexStatement> {
    map(
        tuple((
            expect_token(Token::On),
            expect_token(Token::Colon),
            symbolic_name,
            property_list,
        )),
        |(_, _, label, properties)| IndexStatement {
            entity: EntityKind::Node,
            label,
            properties,
        },
    )(tokens)
}

/// `FOR (n:Label) ON (n.a)`
fn index_for_node(tokens: &[Token]) -> PResult<'_, IndexStatement> {
    map(
        tuple((
            expect_token(Token::For),
            expect_token(Token::LeftParen),
            opt(identifier),
            expect_token(Token::Colon),
            symbolic_name,
            expect_token(Token::RightParen),
            expect_token(Token::On),
            qualified_property_list,
        )),
        |(_, _, _, _, label, _, _, properties)| IndexStatement {
            entity: EntityKind::Node,
            label,
            properties,
        },
    )(tokens)
}

/// `FOR ()-[r:TYPE]-() ON (r.a)`
fn index_for_relationship(tokens: &[Token]) -> PResult<'_, IndexStatement> {
    let (rest, _) = expect_token(Token::For)(tokens)?;
    let (rest, _) = node_pattern(rest)?;
    let (after_rel, relationship) = relationship_pattern(rest)?;
    if relationship.types.len() != 1 {
        return fail(rest);
    }
    let (rest, _) = node_pattern(after_rel)?;
    let (rest, _) = expect_token(Token::On)(rest)?;
    let (rest, properties) = qualified_property_list(rest)?;
    Ok((
        rest,
        IndexStatement {
            entity: EntityKind::Edge,
            label: relationship.types[0].clone(),
            properties,
        },
    ))
}

// ============================================================================
// Queries and clauses
// ============================================================================

fn query(tokens: &[Token]) -> PResult<'_, Query> {
    map(
        pair(single_query, many0(union_part)),
        |(first, unions)| Query { first, unions },
    )(tokens)
}

fn union_part(tokens: &[Token]) -> PResult<'_, UnionPart> {
    map(
        tuple((
            expect_token(Token::Union),
            opt(expect_token(Token::All)),
            cut(single_query),
        )),
        |(_, all, query)| UnionPart {
            all: all.is_some(),
            query,
        },
    )(tokens)
}

fn single_query(tokens: &[Token]) -> PResult<'_, SingleQuery> {
    map(many1(clause), |clauses| SingleQuery { clauses })(tokens)
}

fn clause(tokens: &[Token]) -> PResult<'_, Clause> {
    alt((
        map(match_clause, Clause::Match),
        map(unwind_clause, Clause::Unwind),
        map(
            preceded(expect_token(Token::With), cut(|t| projection_body(t, true))),
            Clause::With,
        ),
        map(
            preceded(expect_token(Token::Return), cut(|t| projection_body(t, false))),
            Clause::Return,
        ),
        map(create_clause, Clause::Create),
        map(merge_clause, Clause::Merge),
        map(
            preceded(expect_token(Token::Set), cut(set_items)),
            Clause::Set,
        ),
        map(
            preceded(
                expect_token(Token::Remove),
                cut(separated_list1(expect_token(Token::Comma), remove_item)),
            ),
            Clause::Remove,
        ),
        map(delete_clause, Clause::Delete),
        map(call_clause, Clause::Call),
    ))(tokens)
}

fn match_clause(tokens: &[Token]) -> PResult<'_, MatchClause> {
    map(
        tuple((
            opt(expect_token(Token::Optional)),
            expect_token(Token::Match),
            cut(separated_list1(expect_token(Token::Comma), path_pattern)),
            opt(preceded(expect_token(Token::Where), cut(expression))),
        )),
        |(optional, _, patterns, where_clause)| MatchClause {
            optional: optional.is_some(),
            patterns,
            where_clause,
        },
    )(tokens)
}

fn unwind_clause(tokens: &[Token]) -> PResult<'_, UnwindClause> {
    map(
        tuple((
            expect_token(Token::Unwind),
            cut(expression),
            cut(expect_token(Token::As)),
            cut(identifier),
        )),
        |(_, expression, _, alias)| UnwindClause { expression, alias },
    )(tokens)
}

fn create_clause(tokens: &[Token]) -> PResult<'_, CreateClause> {
    map(
        preceded(
            expect_token(Token::Create),
            cut(separated_list1(expect_token(Token::Comma), path_pattern)),
        ),
        |patterns| CreateClause { patterns },
    )(tokens)
}

fn merge_clause(tokens: &[Token]) -> PResult<'_, MergeClause> {
    let (mut rest, pattern) =
        preceded(expect_token(Token::Merge), cut(path_pattern))(tokens)?;
    let mut clause = MergeClause {
        pattern,
        on_create: Vec::new(),
        on_match: Vec::new(),
    };
    loop {
        let (next, action) = opt(tuple((
            expect_token(Token::On),
            cut(alt((
                value(true, expect_token(Token::Create)),
                value(false, expect_token(Token::Match)),
            ))),
            cut(expect_token(Token::Set)),
            cut(set_items),
        )))(rest)?;
        match action {
            Some((_, true, _, items)) => clause.on_create.extend(items),
            Some((_, false, _, items)) => clause.on_match.extend(items),
            None => break,
        }
        rest = next;
    }
    Ok((rest, clause))
}

fn delete_clause(tokens: &[Token]) -> PResult<'_, DeleteClause> {
    map(
        tuple((
            opt(expect_token(Token::Detach)),
            expect_token(Token::Delete),
            cut(separated_list1(expect_token(Token::Comma), expression)),
        )),
        |(detach, _, expressions)| DeleteClause {
            detach: detach.is_some(),
            expressions,
        },
    )(tokens)
}

fn call_clause(tokens: &[Token]) -> PResult<'_, CallClause> {
    map(
        tuple((
            expect_token(Token::Call),
            cut(separated_list1(expect_token(Token::Dot), symbolic_name)),
            cut(delimited(
                expect_token(Token::LeftParen),
                separated_list0(expect_token(Token::Comma), expression),
                expect_token(Token::RightParen),
            )),
            opt(pair(
                preceded(
                    expect_token(Token::Yield),
                    cut(separated_list1(expect_token(Token::Comma), yield_item)),
                ),
                opt(preceded(expect_token(Token::Where), cut(expression))),
            )),
        )),
        |(_, name, arguments, yields)| {
            let (yields, where_clause) = match yields {
                Some((items, filter)) => (Some(items), filter),
                None => (None, None),
            };
            CallClause {
                procedure: name.join("."),
                arguments,
                yields,
                where_clause,
            }
        },
    )(tokens)
}

fn yield_item(tokens: &[Token]) -> PResult<'_, YieldItem> {
    map(
        pair(
            symbolic_name,
            opt(preceded(expect_token(Token::As), cut(identifier))),
        ),
        |(name, alias)| YieldItem { name, alias },
    )(tokens)
}

fn set_items(tokens: &[Token]) -> PResult<'_, Vec<SetItem>> {
    separated_list1(expect_token(Token::Comma), set_item)(tokens)
}

/// Fold `n.a.b` into a target expression and the final key
fn property_path(variable: String, mut keys: Vec<String>) -> (Expression, String) {
    let key = keys.pop().unwrap_or_default();
    let target = keys
        .into_iter()
        .fold(Expression::Variable(variable), |e, k| {
            Expression::Property(Box::new(e), k)
        });
    (target, key)
}

fn set_item(tokens: &[Token]) -> PResult<'_, SetItem> {
    alt((
        map(
            tuple((
                identifier,
                many1(preceded(expect_token(Token::Dot), symbolic_name)),
                expect_token(Token::Equal),
                cut(expression),
            )),
            |(variable, keys, _, value)| {
                let (target, key) = property_path(variable, keys);
                SetItem::Property { target, key, value }
            },
        ),
        map(
            tuple((identifier, expect_token(Token::Equal), cut(expression))),
            |(variable, _, value)| SetItem::Replace { variable, value },
        ),
        map(
            tuple((identifier, expect_token(Token::PlusEqual), cut(expression))),
            |(variable, _, value)| SetItem::Update { variable, value },
        ),
        map(pair(identifier, label_list), |(variable, labels)| {
            SetItem::Labels { variable, labels }
        }),
    ))(tokens)
}

fn remove_item(tokens: &[Token]) -> PResult<'_, RemoveItem> {
    alt((
        map(
            pair(
                identifier,
                many1(preceded(expect_token(Token::Dot), symbolic_name)),
            ),
            |(variable, keys)| {
                let (target, key) = property_path(variable, keys);
                RemoveItem::Property { target, key }
            },
        ),
        map(pair(identifier, label_list), |(variable, labels)| {
            RemoveItem::Labels { variable, labels }
        }),
    ))(tokens)
}

fn label_list(tokens: &[Token]) -> PResult<'_, Vec<String>> {
    many1(preceded(expect_token(Token::Colon), symbolic_name))(tokens)
}

/// Items, ordering and paging shared by `WITH` and `RETURN`
fn projection_body(tokens: &[Token], allow_where: bool) -> PResult<'_, Projection> {
    let (rest, distinct) = opt(expect_token(Token::Distinct))(tokens)?;
    let (rest, (star, items)) = alt((
        map(
            preceded(
                expect_token(Token::Star),
                opt(preceded(
                    expect_token(Token::Comma),
                    separated_list1(expect_token(Token::Comma), projection_item),
                )),
            ),
            |items| (true, items.unwrap_or_default()),
        ),
        map(
            separated_list1(expect_token(Token::Comma), projection_item),
            |items| (false, items),
        ),
    ))(rest)?;
    let (rest, order_by) = opt(preceded(
        pair(expect_token(Token::Order), cut(expect_token(Token::By))),
        cut(separated_list1(expect_token(Token::Comma), sort_item)),
    ))(rest)?;
    let (rest, skip) = opt(preceded(expect_token(Token::Skip), cut(expression)))(rest)?;
    let (rest, limit) = opt(preceded(expect_token(Token::Limit), cut(expression)))(rest)?;
    let (rest, where_clause) = if allow_where {
        opt(preceded(expect_token(Token::Where), cut(expression)))(rest)?
    } else {
        (rest, None)
    };
    Ok((
        rest,
        Projection {
            distinct: distinct.is_some(),
            star,
            items,
            order_by: order_by.unwrap_or_default(),
            skip,
            limit,
            where_clause,
        },
    ))
}

fn projection_item(tokens: &[Token]) -> PResult<'_, ProjectionItem> {
    let (rest, expression) = expression(tokens)?;
    let span = (tokens.len(), rest.len());
    let (rest, alias) = opt(preceded(expect_token(Token::As), cut(symbolic_name)))(rest)?;
    Ok((
        rest,
        ProjectionItem {
            expression,
            alias,
            text: String::new(),
            span,
        },
    ))
}

fn sort_item(tokens: &[Token]) -> PResult<'_, SortItem> {
    map(
        pair(
            expression,
            opt(alt((
                value(false, expect_token(Token::Asc)),
                value(true, expect_token(Token::Desc)),
            ))),
        ),
        |(expression, descending)| SortItem {
            expression,
            descending: descending.unwrap_or(false),
        },
    )(tokens)
}

// ============================================================================
// Patterns
// ============================================================================

fn path_pattern(tokens: &[Token]) -> PResult<'_, PathPattern> {
    let (rest, variable) = opt(terminated(identifier, expect_token(Token::Equal)))(tokens)?;
    let (rest, mut pattern) = alt((shortest_path_pattern, plain_path))(rest)?;
    pattern.variable = variable;
    Ok((rest, pattern))
}

fn plain_path(tokens: &[Token]) -> PResult<'_, PathPattern> {
    map(pattern_chain, |(start, steps)| PathPattern {
        variable: None,
        kind: PathKind::Normal,
        start,
        steps,
    })(tokens)
}

/// `shortestPath((a)-[*]->(b))` and `allShortestPaths(...)`
fn shortest_path_pattern(tokens: &[Token]) -> PResult<'_, PathPattern> {
    map(
        tuple((
            alt((
                value(PathKind::ShortestPath, named("shortestPath")),
                value(PathKind::AllShortestPaths, named("allShortestPaths")),
            )),
            expect_token(Token::LeftParen),
            cut(pattern_chain),
            cut(expect_token(Token::RightParen)),
        )),
        |(kind, _, (start, steps), _)| PathPattern {
            variable: None,
            kind,
            start,
            steps,
        },
    )(tokens)
}

fn pattern_chain(tokens: &[Token]) -> PResult<'_, (NodePattern, Vec<PatternStep>)> {
    pair(
        node_pattern,
        many0(map(
            pair(relationship_pattern, node_pattern),
            |(relationship, node)| PatternStep { relationship, node },
        )),
    )(tokens)
}

fn properties(tokens: &[Token]) -> PResult<'_, Expression> {
    alt((
        map(map_literal, Expression::Map),
        map(parameter, Expression::Parameter),
    ))(tokens)
}

fn node_pattern(tokens: &[Token]) -> PResult<'_, NodePattern> {
    map(
        delimited(
            expect_token(Token::LeftParen),
            tuple((
                opt(identifier),
                many0(preceded(expect_token(Token::Colon), symbolic_name)),
                opt(properties),
            )),
            expect_token(Token::RightParen),
        ),
        |(variable, labels, properties)| NodePattern {
            variable,
            labels,
            properties,
        },
    )(tokens)
}

fn relationship_pattern(tokens: &[Token]) -> PResult<'_, RelationshipPattern> {
    let (rest, left_arrow) = alt((
        value(true, expect_token(Token::ArrowLeft)),
        value(false, expect_token(Token::Minus)),
    ))(tokens)?;
    let (rest, detail) = opt(delimited(
        expect_token(Token::LeftBracket),
        cut(relationship_detail),
        cut(expect_token(Token::RightBracket)),
    ))(rest)?;
    let (rest, right_arrow) = alt((
        value(true, expect_token(Token::Arrow)),
        value(false, expect_token(Token::Minus)),
    ))(rest)?;

    let direction = match (left_arrow, right_arrow) {
        (true, false) => Direction::Incoming,
        (false, true) => Direction::Outgoing,
        _ => Direction::Both,
    };
    let (variable, types, range, properties) = detail.unwrap_or((None, Vec::new(), None, None));
    Ok((
        rest,
        RelationshipPattern {
            variable,
            types,
            direction,
            range,
            properties,
        },
    ))
}

type RelationshipDetail = (
    Option<String>,
    Vec<String>,
    Option<HopRange>,
    Option<Expression>,
);

fn relationship_detail(tokens: &[Token]) -> PResult<'_, RelationshipDetail> {
    map(
        tuple((
            opt(identifier),
            opt(preceded(
                expect_token(Token::Colon),
                separated_list1(
                    pair(expect_token(Token::Pipe), opt(expect_token(Token::Colon))),
                    symbolic_name,
                ),
            )),
            opt(hop_range),
            opt(properties),
        )),
        |(variable, types, range, properties)| {
            (variable, types.unwrap_or_default(), range, properties)
        },
    )(tokens)
}

/// `*`, `*n`, `*min..`, `*..max`, `*min..max`
fn hop_range(tokens: &[Token]) -> PResult<'_, HopRange> {
    map(
        preceded(
            expect_token(Token::Star),
            opt(alt((
                map(
                    tuple((
                        opt(unsigned_integer),
                        expect_token(Token::DoubleDot),
                        opt(unsigned_integer),
                    )),
                    |(min, _, max)| HopRange { min, max },
                ),
                map(unsigned_integer, |n| HopRange {
                    min: Some(n),
                    max: Some(n),
                }),
            ))),
        ),
        |range| range.unwrap_or(HopRange { min: None, max: None }),
    )(tokens)
}

// ============================================================================
// Expressions
// ============================================================================

pub(crate) fn expression(tokens: &[Token]) -> PResult<'_, Expression> {
    or_expression(tokens)
}

fn binary(op: BinaryOperator, lhs: Expression, rhs: Expression) -> Expression {
    Expression::Binary(op, Box::new(lhs), Box::new(rhs))
}

/// Left-associative chain of `operand (op operand)*`
fn binary_chain<'a>(
    tokens: &'a [Token],
    operand: fn(&[Token]) -> PResult<'_, Expression>,
    operator: fn(&Token) -> Option<BinaryOperator>,
) -> PResult<'a, Expression> {
    let (mut rest, mut lhs) = operand(tokens)?;
    while let Some(op) = rest.first().and_then(operator) {
        let (next, rhs) = operand(&rest[1..])?;
        lhs = binary(op, lhs, rhs);
        rest = next;
    }
    Ok((rest, lhs))
}

fn or_expression(tokens: &[Token]) -> PResult<'_, Expression> {
    binary_chain(tokens, xor_expression, |t| {
        matches!(t, Token::Or).then_some(BinaryOperator::Or)
    })
}

fn xor_expression(tokens: &[Token]) -> PResult<'_, Expression> {
    binary_chain(tokens, and_expression, |t| {
        matches!(t, Token::Xor).then_some(BinaryOperator::Xor)
    })
}

fn and_expression(tokens: &[Token]) -> PResult<'_, Expression> {
    binary_chain(tokens, not_expression, |t| {
        matches!(t, Token::And).then_some(BinaryOperator::And)
    })
}

fn not_expression(tokens: &[Token]) -> PResult<'_, Expression> {
    match tokens.first() {
        Some(Token::Not) => map(cut(not_expression), |e| {
            Expression::Unary(UnaryOperator::Not, Box::new(e))
        })(&tokens[1..]),
        _ => comparison(tokens),
    }
}

fn comparison_operator(token: &Token) -> Option<BinaryOperator> {
    match token {
        Token::Equal => Some(BinaryOperator::Equal),
        Token::NotEqual => Some(BinaryOperator::NotEqual),
        Token::LessThan => Some(BinaryOperator::LessThan),
        Token::LessEqual => Some(BinaryOperator::LessEqual),
        Token::GreaterThan => Some(BinaryOperator::GreaterThan),
        Token::GreaterEqual => Some(BinaryOperator::GreaterEqual),
        _ => None,
    }
}

/// `a < b <= c` means `a < b AND b <= c`
fn comparison(tokens: &[Token]) -> PResult<'_, Expression> {
    let (mut rest, first) = predicate_expression(tokens)?;
    let mut operands = vec![first];
    let mut operators = Vec::new();
    while let Some(op) = rest.first().and_then(comparison_operator) {
        let (next, rhs) = predicate_expression(&rest[1..])?;
        operators.push(op);
        operands.push(rhs);
        rest = next;
    }
    if operators.is_empty() {
        return Ok((rest, operands.remove(0)));
    }
    let mut result: Option<Expression> = None;
    for (i, op) in operators.into_iter().enumerate() {
        let link = binary(op, operands[i].clone(), operands[i + 1].clone());
        result = Some(match result {
            Some(acc) => binary(BinaryOperator::And, acc, link),
            None => link,
        });
    }
    match result {
        Some(expr) => Ok((rest, expr)),
        None => fail(tokens),
    }
}

/// `IN`, `STARTS WITH`, `ENDS WITH`, `CONTAINS`, `=~` and `IS [NOT] NULL`
fn predicate_expression(tokens: &[Token]) -> PResult<'_, Expression> {
    let (mut rest, mut lhs) = additive(tokens)?;
    loop {
        let (op, operand_start) = match (rest.first(), rest.get(1)) {
            (Some(Token::In), _) => (BinaryOperator::In, 1),
            (Some(Token::Starts), Some(Token::With)) => (BinaryOperator::StartsWith, 2),
            (Some(Token::Ends), Some(Token::With)) => (BinaryOperator::EndsWith, 2),
            (Some(Token::Contains), _) => (BinaryOperator::Contains, 1),
            (Some(Token::RegexMatch), _) => (BinaryOperator::RegexMatch, 1),
            (Some(Token::Is), _) => {
                let (next, (_, negated, _)) = tuple((
                    expect_token(Token::Is),
                    opt(expect_token(Token::Not)),
                    cut(expect_token(Token::Null)),
                ))(rest)?;
                lhs = Expression::IsNull {
                    expression: Box::new(lhs),
                    negated: negated.is_some(),
                };
                rest = next;
                continue;
            }
            _ => break,
        };
        let (next, rhs) = cut(additive)(&rest[operand_start..])?;
        lhs = binary(op, lhs, rhs);
        rest = next;
    }
    Ok((rest, lhs))
}

fn additive(tokens: &[Token]) -> PResult<'_, Expression> {
    binary_chain(tokens, multiplicative, |t| match t {
        Token::Plus => Some(BinaryOperator::Add),
        Token::Minus => Some(BinaryOperator::Subtract),
        _ => None,
    })
}

fn multiplicative(tokens: &[Token]) -> PResult<'_, Expression> {
    binary_chain(tokens, power, |t| match t {
        Token::Star => Some(BinaryOperator::Multiply),
        Token::Slash => Some(BinaryOperator::Divide),
        Token::Percent => Some(BinaryOperator::Modulo),
        _ => None,
    })
}

fn power(tokens: &[Token]) -> PResult<'_, Expression> {
    binary_chain(tokens, unary, |t| {
        matches!(t, Token::Caret).then_some(BinaryOperator::Power)
    })
}

fn unary(tokens: &[Token]) -> PResult<'_, Expression> {
    match (tokens.first(), tokens.get(1)) {
        // Negative literals fold here so that i64::MIN is expressible
        (Some(Token::Minus), Some(Token::Integer(n))) => {
            let value = if *n == i64::MAX as u64 + 1 {
                i64::MIN
            } else if *n <= i64::MAX as u64 {
                -(*n as i64)
            } else {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    &tokens[1..],
                    ErrorKind::Verify,
                )));
            };
            postfix_from(&tokens[2..], Expression::Literal(Value::Integer(value)))
        }
        (Some(Token::Minus), Some(Token::Float(f))) => {
            postfix_from(&tokens[2..], Expression::Literal(Value::Float(-*f)))
        }
        (Some(Token::Minus), _) => map(cut(unary), |e| {
            Expression::Unary(UnaryOperator::Negate, Box::new(e))
        })(&tokens[1..]),
        (Some(Token::Plus), _) => map(cut(unary), |e| {
            Expression::Unary(UnaryOperator::Plus, Box::new(e))
        })(&tokens[1..]),
        _ => postfix(tokens),
    }
}

fn postfix(tokens: &[Token]) -> PResult<'_, Expression> {
    let (rest, atom) = atom(tokens)?;
    postfix_from(rest, atom)
}

/// Property access, subscripts, slices and label predicates
fn postfix_from(tokens: &[Token], mut expr: Expression) -> PResult<'_, Expression> {
    let mut rest = tokens;
    loop {
        match rest.first() {
            Some(Token::Dot) => {
                let (next, key) = cut(symbolic_name)(&rest[1..])?;
                expr = Expression::Property(Box::new(expr), key);
                rest = next;
            }
            Some(Token::LeftBracket) => {
                let (next, (from, range, to)) = delimited(
                    expect_token(Token::LeftBracket),
                    cut(tuple((
                        opt(expression),
                        opt(expect_token(Token::DoubleDot)),
                        opt(expression),
                    ))),
                    cut(expect_token(Token::RightBracket)),
                )(rest)?;
                expr = match (from, range, to) {
                    (Some(index), None, None) => {
                        Expression::Subscript(Box::new(expr), Box::new(index))
                    }
                    (from, Some(_), to) => Expression::Slice {
                        expression: Box::new(expr),
                        from: from.map(Box::new),
                        to: to.map(Box::new),
                    },
                    _ => return Err(nom::Err::Failure(nom::error::Error::new(
                        &rest[1..],
                        ErrorKind::Tag,
                    ))),
                };
                rest = next;
            }
            Some(Token::Colon) => {
                let (next, labels) = label_list(rest)?;
                expr = Expression::HasLabels(Box::new(expr), labels);
                rest = next;
            }
            _ => break,
        }
    }
    Ok((rest, expr))
}

fn atom(tokens: &[Token]) -> PResult<'_, Expression> {
    alt((
        literal,
        map(parameter, Expression::Parameter),
        count_star,
        case_expression,
        quantifier,
        map(shortest_path_pattern, |p| Expression::Pattern(Box::new(p))),
        pattern_comprehension,
        list_comprehension,
        map(list_literal, Expression::List),
        map(map_literal, Expression::Map),
        function_call,
        pattern_expression,
        delimited(
            expect_token(Token::LeftParen),
            expression,
            expect_token(Token::RightParen),
        ),
        map(identifier, Expression::Variable),
    ))(tokens)
}

fn literal(tokens: &[Token]) -> PResult<'_, Expression> {
    let value = match tokens.first() {
        Some(Token::Integer(n)) => match i64::try_from(*n) {
            Ok(n) => Value::Integer(n),
            Err(_) => {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    tokens,
                    ErrorKind::Verify,
                )))
            }
        },
        Some(Token::Float(f)) => Value::Float(*f),
        Some(Token::String(s)) => Value::String(s.clone()),
        Some(Token::True) => Value::Boolean(true),
        Some(Token::False) => Value::Boolean(false),
        Some(Token::Null) => Value::Null,
        _ => return fail(tokens),
    };
    Ok((&tokens[1..], Expression::Literal(value)))
}

fn count_star(tokens: &[Token]) -> PResult<'_, Expression> {
    value(
        Expression::CountStar,
        tuple((
            named("count"),
            expect_token(Token::LeftParen),
            expect_token(Token::Star),
            cut(expect_token(Token::RightParen)),
        )),
    )(tokens)
}

fn case_expression(tokens: &[Token]) -> PResult<'_, Expression> {
    map(
        tuple((
            expect_token(Token::Case),
            cut(opt(expression)),
            cut(many1(tuple((
                expect_token(Token::When),
                expression,
                expect_token(Token::Then),
                expression,
            )))),
            opt(preceded(expect_token(Token::Else), cut(expression))),
            cut(expect_token(Token::End)),
        )),
        |(_, operand, branches, default, _)| {
            Expression::Case(CaseExpression {
                operand: operand.map(Box::new),
                branches: branches
                    .into_iter()
                    .map(|(_, when, _, then)| (when, then))
                    .collect(),
                default: default.map(Box::new),
            })
        },
    )(tokens)
}

/// `all(x IN list WHERE pred)` and the `any`, `none`, `single` forms
fn quantifier(tokens: &[Token]) -> PResult<'_, Expression> {
    map(
        tuple((
            alt((
                value(QuantifierKind::All, expect_token(Token::All)),
                value(QuantifierKind::Any, named("any")),
                value(QuantifierKind::None, named("none")),
                value(QuantifierKind::Single, named("single")),
            )),
            expect_token(Token::LeftParen),
            identifier,
            expect_token(Token::In),
            cut(expression),
            cut(expect_token(Token::Where)),
            cut(expression),
            cut(expect_token(Token::RightParen)),
        )),
        |(kind, _, variable, _, list, _, predicate, _)| Expression::Quantifier {
            kind,
            variable,
            list: Box::new(list),
            predicate: Box::new(predicate),
        },
    )(tokens)
}

/// `[x IN list WHERE pred | projection]`
fn list_comprehension(tokens: &[Token]) -> PResult<'_, Expression> {
    map(
        tuple((
            expect_token(Token::LeftBracket),
            identifier,
            expect_token(Token::In),
            cut(expression),
            opt(preceded(expect_token(Token::Where), cut(expression))),
            opt(preceded(expect_token(Token::Pipe), cut(expression))),
            cut(expect_token(Token::RightBracket)),
        )),
        |(_, variable, _, list, predicate, projection, _)| Expression::ListComprehension {
            variable,
            list: Box::new(list),
            predicate: predicate.map(Box::new),
            projection: projection.map(Box::new),
        },
    )(tokens)
}

/// `[p = (a)-->(b) WHERE pred | projection]`; without the `|` the
/// brackets are a list literal holding a pattern expression.
fn pattern_comprehension(tokens: &[Token]) -> PResult<'_, Expression> {
    map(
        tuple((
            expect_token(Token::LeftBracket),
            opt(terminated(identifier, expect_token(Token::Equal))),
            verify(plain_path, |p: &PathPattern| !p.steps.is_empty()),
            opt(preceded(expect_token(Token::Where), cut(expression))),
            preceded(expect_token(Token::Pipe), cut(expression)),
            cut(expect_token(Token::RightBracket)),
        )),
        |(_, variable, mut pattern, predicate, projection, _)| {
            pattern.variable = variable;
            Expression::PatternComprehension {
                pattern: Box::new(pattern),
                predicate: predicate.map(Box::new),
                projection: Box::new(projection),
            }
        },
    )(tokens)
}

fn list_literal(tokens: &[Token]) -> PResult<'_, Vec<Expression>> {
    delimited(
        expect_token(Token::LeftBracket),
        separated_list0(expect_token(Token::Comma), expression),
        cut(expect_token(Token::RightBracket)),
    )(tokens)
}

fn map_literal(tokens: &[Token]) -> PResult<'_, Vec<(String, Expression)>> {
    delimited(
        expect_token(Token::LeftBrace),
        cut(separated_list0(
            expect_token(Token::Comma),
            map(
                tuple((symbolic_name, expect_token(Token::Colon), expression)),
                |(key, _, value)| (key, value),
            ),
        )),
        cut(expect_token(Token::RightBrace)),
    )(tokens)
}

fn function_call(tokens: &[Token]) -> PResult<'_, Expression> {
    map(
        tuple((
            separated_list1(expect_token(Token::Dot), identifier),
            expect_token(Token::LeftParen),
            opt(expect_token(Token::Distinct)),
            cut(separated_list0(expect_token(Token::Comma), expression)),
            cut(expect_token(Token::RightParen)),
        )),
        |(name, _, distinct, arguments, _)| Expression::FunctionCall {
            name: name.join("."),
            distinct: distinct.is_some(),
            arguments,
        },
    )(tokens)
}

/// A relationship pattern in expression position, e.g. `(a)-[:R]->()`
fn pattern_expression(tokens: &[Token]) -> PResult<'_, Expression> {
    map(
        verify(plain_path, |p: &PathPattern| !p.steps.is_empty()),
        |p| Expression::Pattern(Box::new(p)),
    )(tokens)
}
