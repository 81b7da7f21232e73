// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Lexer for the query language
//!
//! Produces a flat token stream with the byte offset of every token. Words
//! are lexed as identifiers first and then looked up in the keyword table,
//! so keyword matching is case-insensitive and always respects word
//! boundaries. Whitespace and comments (`// ...`, `/* ... */`) are dropped.
//!
//! Every token parser must either consume input or fail; the main loop
//! rejects a parser that returns without advancing.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while, take_while1},
    character::complete::{char, digit1, one_of},
    combinator::{map, opt, recognize},
    sequence::{pair, preceded, tuple},
    IResult,
};

use super::parser::ParserError;

/// Token types for the query language
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    Match,
    Optional,
    Where,
    Return,
    With,
    Distinct,
    Order,
    By,
    Asc,
    Desc,
    Skip,
    Limit,
    Unwind,
    As,
    Create,
    Merge,
    On,
    Set,
    Delete,
    Detach,
    Remove,
    Call,
    Yield,
    Union,
    All,
    And,
    Or,
    Xor,
    Not,
    In,
    Starts,
    Ends,
    Contains,
    Is,
    Null,
    True,
    False,
    Case,
    When,
    Then,
    Else,
    End,
    Index,
    Drop,
    For,
    Cypher,

    // Literals
    Integer(u64),
    Float(f64),
    String(String),
    Identifier(String),
    Parameter(String),

    // Operators
    Plus,
    PlusEqual,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    RegexMatch,
    Arrow,
    ArrowLeft,

    // Delimiters
    Dot,
    DoubleDot,
    Comma,
    Colon,
    Semicolon,
    Pipe,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,

    Whitespace,
    Comment,

    EOF,
}

const KEYWORDS: &[(&str, Token)] = &[
    ("MATCH", Token::Match),
    ("OPTIONAL", Token::Optional),
    ("WHERE", Token::Where),
    ("RETURN", Token::Return),
    ("WITH", Token::With),
    ("DISTINCT", Token::Distinct),
    ("ORDER", Token::Order),
    ("BY", Token::By),
    ("ASC", Token::Asc),
    ("ASCENDING", Token::Asc),
    ("DESC", Token::Desc),
    ("DESCENDING", Token::Desc),
    ("SKIP", Token::Skip),
    ("LIMIT", Token::Limit),
    ("UNWIND", Token::Unwind),
    ("AS", Token::As),
    ("CREATE", Token::Create),
    ("MERGE", Token::Merge),
    ("ON", Token::On),
    ("SET", Token::Set),
    ("DELETE", Token::Delete),
    ("DETACH", Token::Detach),
    ("REMOVE", Token::Remove),
    ("CALL", Token::Call),
    ("YIELD", Token::Yield),
    ("UNION", Token::Union),
    ("ALL", Token::All),
    ("AND", Token::And),
    ("OR", Token::Or),
    ("XOR", Token::Xor),
    ("NOT", Token::Not),
    ("IN", Token::In),
    ("STARTS", Token::Starts),
    ("ENDS", Token::Ends),
    ("CONTAINS", Token::Contains),
    ("IS", Token::Is),
    ("NULL", Token::Null),
    ("TRUE", Token::True),
    ("FALSE", Token::False),
    ("CASE", Token::Case),
    ("WHEN", Token::When),
    ("THEN", Token::Then),
    ("ELSE", Token::Else),
    ("END", Token::End),
    ("INDEX", Token::Index),
    ("DROP", Token::Drop),
    ("FOR", Token::For),
    ("CYPHER", Token::Cypher),
];

impl Token {
    /// Source spelling of a keyword token, for use as a symbolic name
    /// (`n.count`, `:Order`).
    pub fn keyword_text(&self) -> Option<&'static str> {
        KEYWORDS
            .iter()
            .find(|(_, t)| t == self)
            .map(|(text, _)| *text)
    }

    /// Short rendering used in error messages
    pub fn describe(&self) -> String {
        if let Some(k) = self.keyword_text() {
            return k.to_string();
        }
        match self {
            Token::Integer(n) => n.to_string(),
            Token::Float(f) => f.to_string(),
            Token::String(s) => format!("'{}'", s),
            Token::Identifier(s) => s.clone(),
            Token::Parameter(s) => format!("${}", s),
            Token::Plus => "+".into(),
            Token::PlusEqual => "+=".into(),
            Token::Minus => "-".into(),
            Token::Star => "*".into(),
            Token::Slash => "/".into(),
            Token::Percent => "%".into(),
            Token::Caret => "^".into(),
            Token::Equal => "=".into(),
            Token::NotEqual => "<>".into(),
            Token::LessThan => "<".into(),
            Token::LessEqual => "<=".into(),
            Token::GreaterThan => ">".into(),
            Token::GreaterEqual => ">=".into(),
            Token::RegexMatch => "=~".into(),
            Token::Arrow => "->".into(),
            Token::ArrowLeft => "<-".into(),
            Token::Dot => ".".into(),
            Token::DoubleDot => "..".into(),
            Token::Comma => ",".into(),
            Token::Colon => ":".into(),
            Token::Semicolon => ";".into(),
            Token::Pipe => "|".into(),
            Token::LeftParen => "(".into(),
            Token::RightParen => ")".into(),
            Token::LeftBracket => "[".into(),
            Token::RightBracket => "]".into(),
            Token::LeftBrace => "{".into(),
            Token::RightBrace => "}".into(),
            Token::EOF => "end of input".into(),
            _ => format!("{:?}", self),
        }
    }
}

fn keyword(word: &str) -> Option<Token> {
    KEYWORDS
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(word))
        .map(|(_, t)| t.clone())
}

/// Lexed token with its source position
#[derive(Debug, Clone, PartialEq)]
pub struct TokenStream {
    pub tokens: Vec<Token>,
    /// Byte offset of each token; `EOF` sits at the input length
    pub offsets: Vec<usize>,
    /// Byte offset one past the end of each token
    pub ends: Vec<usize>,
}

impl TokenStream {
    /// Byte offset of the token `remaining` tokens before the end.
    pub fn offset_of_remaining(&self, remaining: usize) -> usize {
        let index = self.tokens.len().saturating_sub(remaining);
        self.offsets.get(index).copied().unwrap_or_else(|| {
            self.offsets.last().copied().unwrap_or(0)
        })
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.tokens.as_slice(), [] | [Token::EOF])
    }
}

/// Raw lexeme before numeric validation
enum Lexeme<'a> {
    Token(Token),
    Number(&'a str),
    Word(&'a str),
}

fn whitespace(input: &str) -> IResult<&str, Lexeme<'_>> {
    map(take_while1(|c: char| c.is_whitespace()), |_| {
        Lexeme::Token(Token::Whitespace)
    })(input)
}

fn comment(input: &str) -> IResult<&str, Lexeme<'_>> {
    map(
        alt((
            recognize(pair(tag("//"), take_while(|c| c != '\n'))),
            recognize(tuple((tag("/*"), take_until("*/"), tag("*/")))),
        )),
        |_| Lexeme::Token(Token::Comment),
    )(input)
}

/// Digits with optional fraction and exponent. A dot must be followed by a
/// digit so that `1..3` lexes as a range.
fn number(input: &str) -> IResult<&str, Lexeme<'_>> {
    map(
        recognize(tuple((
            digit1,
            opt(pair(char('.'), digit1)),
            opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
            take_while(|c: char| c.is_alphanumeric() || c == '_'),
        ))),
        Lexeme::Number,
    )(input)
}

fn word(input: &str) -> IResult<&str, Lexeme<'_>> {
    map(
        recognize(pair(
            take_while1(|c: char| c.is_alphabetic() || c == '_'),
            take_while(|c: char| c.is_alphanumeric() || c == '_'),
        )),
        Lexeme::Word,
    )(input)
}

fn parameter(input: &str) -> IResult<&str, Lexeme<'_>> {
    map(
        preceded(
            char('$'),
            take_while1(|c: char| c.is_alphanumeric() || c == '_'),
        ),
        |name: &str| Lexeme::Token(Token::Parameter(name.to_string())),
    )(input)
}

/// Quoted string with backslash escapes
fn quoted(quote: char) -> impl Fn(&str) -> IResult<&str, String> {
    move |input: &str| {
        let (rest, _) = char(quote)(input)?;
        let mut out = String::new();
        let mut chars = rest.char_indices();
        while let Some((i, c)) = chars.next() {
            if c == quote {
                return Ok((&rest[i + c.len_utf8()..], out));
            }
            if c == '\\' {
                match chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, 'r')) => out.push('\r'),
                    Some((_, '0')) => out.push('\0'),
                    Some((_, other)) => out.push(other),
                    None => break,
                }
            } else {
                out.push(c);
            }
        }
        Err(nom::Err::Failure(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Char,
        )))
    }
}

fn string_literal(input: &str) -> IResult<&str, Lexeme<'_>> {
    map(alt((quoted('\''), quoted('"'))), |s| {
        Lexeme::Token(Token::String(s))
    })(input)
}

/// `` `any name` `` with doubled backticks as escape
fn backtick_identifier(input: &str) -> IResult<&str, Lexeme<'_>> {
    let (rest, _) = char('`')(input)?;
    let mut out = String::new();
    let mut pos = 0;
    let bytes = rest.as_bytes();
    while pos < bytes.len() {
        if bytes[pos] == b'`' {
            if bytes.get(pos + 1) == Some(&b'`') {
                out.push('`');
                pos += 2;
                continue;
            }
            return Ok((
                &rest[pos + 1..],
                Lexeme::Token(Token::Identifier(out)),
            ));
        }
        let ch = rest[pos..].chars().next().unwrap_or('`');
        out.push(ch);
        pos += ch.len_utf8();
    }
    Err(nom::Err::Failure(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}

/// Operators and delimiters; multi-character forms first.
fn simple_patterns(input: &str) -> IResult<&str, Lexeme<'_>> {
    const PATTERNS: &[(&str, Token)] = &[
        ("<>", Token::NotEqual),
        ("!=", Token::NotEqual),
        ("<=", Token::LessEqual),
        (">=", Token::GreaterEqual),
        ("=~", Token::RegexMatch),
        ("+=", Token::PlusEqual),
        ("->", Token::Arrow),
        ("<-", Token::ArrowLeft),
        ("..", Token::DoubleDot),
        ("+", Token::Plus),
        ("-", Token::Minus),
        ("*", Token::Star),
        ("/", Token::Slash),
        ("%", Token::Percent),
        ("^", Token::Caret),
        ("=", Token::Equal),
        ("<", Token::LessThan),
        (">", Token::GreaterThan),
        (".", Token::Dot),
        (",", Token::Comma),
        (":", Token::Colon),
        (";", Token::Semicolon),
        ("|", Token::Pipe),
        ("(", Token::LeftParen),
        (")", Token::RightParen),
        ("[", Token::LeftBracket),
        ("]", Token::RightBracket),
        ("{", Token::LeftBrace),
        ("}", Token::RightBrace),
    ];
    for (pattern, token) in PATTERNS {
        if let Some(rest) = input.strip_prefix(pattern) {
            return Ok((rest, Lexeme::Token(token.clone())));
        }
    }
    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Tag,
    )))
}

fn lexeme(input: &str) -> IResult<&str, Lexeme<'_>> {
    alt((
        whitespace,
        comment,
        string_literal,
        backtick_identifier,
        parameter,
        number,
        word,
        simple_patterns,
    ))(input)
}

fn numeric_token(text: &str, offset: usize) -> Result<Token, ParserError> {
    let invalid = || ParserError::InvalidNumber {
        text: text.to_string(),
        offset,
    };
    if text.chars().all(|c| c.is_ascii_digit()) {
        return text.parse::<u64>().map(Token::Integer).map_err(|_| invalid());
    }
    let f: f64 = text.parse().map_err(|_| invalid())?;
    if f.is_finite() {
        Ok(Token::Float(f))
    } else {
        Err(invalid())
    }
}

fn word_token(text: &str) -> Token {
    if text == "NaN" {
        return Token::Float(f64::NAN);
    }
    if text.eq_ignore_ascii_case("inf") || text.eq_ignore_ascii_case("infinity") {
        return Token::Float(f64::INFINITY);
    }
    keyword(text).unwrap_or_else(|| Token::Identifier(text.to_string()))
}

/// Tokenize `input`, appending a trailing `EOF`.
pub fn tokenize(input: &str) -> Result<TokenStream, ParserError> {
    let mut remaining = input;
    let mut tokens = Vec::new();
    let mut offsets = Vec::new();
    let mut ends = Vec::new();

    while !remaining.is_empty() {
        let offset = input.len() - remaining.len();
        let (next, lexeme) = match lexeme(remaining) {
            Ok(ok) => ok,
            Err(nom::Err::Failure(_)) => {
                return Err(ParserError::Unterminated { offset });
            }
            Err(_) => {
                let found = remaining.chars().next().unwrap_or(' ').to_string();
                return Err(ParserError::InvalidInput { found, offset });
            }
        };
        if next.len() == remaining.len() {
            return Err(ParserError::InvalidInput {
                found: remaining.chars().take(1).collect(),
                offset,
            });
        }
        let token = match lexeme {
            Lexeme::Token(Token::Whitespace) | Lexeme::Token(Token::Comment) => None,
            Lexeme::Token(t) => Some(t),
            Lexeme::Number(text) => Some(numeric_token(text, offset)?),
            Lexeme::Word(text) if matches!(tokens.last(), Some(Token::Dot)) => {
                Some(Token::Identifier(text.to_string()))
            }
            Lexeme::Word(text) => Some(word_token(text)),
        };
        if let Some(token) = token {
            tokens.push(token);
            offsets.push(offset);
            ends.push(input.len() - next.len());
        }
        remaining = next;
    }
    tokens.push(Token::EOF);
    offsets.push(input.len());
    ends.push(input.len());
    Ok(TokenStream {
        tokens,
        offsets,
        ends,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Vec<Token> {
        tokenize(input).unwrap().tokens
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        assert_eq!(
            lex("match (n) Return n"),
            vec![
                Token::Match,
                Token::LeftParen,
                Token::Identifier("n".into()),
                Token::RightParen,
                Token::Return,
                Token::Identifier("n".into()),
                Token::EOF
            ]
        );
        assert_eq!(lex("matches")[0], Token::Identifier("matches".into()));
    }

    #[test]
    fn test_range_is_not_a_float() {
        assert_eq!(
            lex("*1..3"),
            vec![
                Token::Star,
                Token::Integer(1),
                Token::DoubleDot,
                Token::Integer(3),
                Token::EOF
            ]
        );
        assert_eq!(lex("1.5e2")[0], Token::Float(150.0));
    }

    #[test]
    fn test_special_floats() {
        assert!(matches!(lex("NaN")[0], Token::Float(f) if f.is_nan()));
        assert_eq!(lex("Inf")[0], Token::Float(f64::INFINITY));
        assert_eq!(lex("Infinity")[0], Token::Float(f64::INFINITY));
    }

    #[test]
    fn test_relationship_arrows() {
        assert_eq!(
            lex("<-[]-->"),
            vec![
                Token::ArrowLeft,
                Token::LeftBracket,
                Token::RightBracket,
                Token::Minus,
                Token::Arrow,
                Token::EOF
            ]
        );
    }

    #[test]
    fn test_strings_and_escapes() {
        assert_eq!(lex(r#"'it\'s'"#)[0], Token::String("it's".into()));
        assert_eq!(lex(r#""a\nb""#)[0], Token::String("a\nb".into()));
        assert_eq!(lex("`weird name`")[0], Token::Identifier("weird name".into()));
    }

    #[test]
    fn test_comments_and_offsets() {
        let stream = tokenize("RETURN /* c */ 1 // tail").unwrap();
        assert_eq!(stream.tokens, vec![Token::Return, Token::Integer(1), Token::EOF]);
        assert_eq!(stream.offsets, vec![0, 15, 24]);
    }

    #[test]
    fn test_invalid_numeric_value() {
        let err = tokenize("RETURN 12abc").unwrap_err();
        assert!(err.to_string().starts_with("Invalid numeric value"));
        assert_eq!(err.offset(), Some(7));
        let err = tokenize("RETURN 99999999999999999999999").unwrap_err();
        assert!(err.to_string().starts_with("Invalid numeric value"));
    }

    #[test]
    fn test_unterminated_string() {
        assert!(matches!(
            tokenize("RETURN 'abc").unwrap_err(),
            ParserError::Unterminated { offset: 7 }
        ));
    }

    #[test]
    fn test_word_after_dot_is_never_a_keyword() {
        assert_eq!(
            lex("db.idx.fulltext.drop"),
            vec![
                Token::Identifier("db".into()),
                Token::Dot,
                Token::Identifier("idx".into()),
                Token::Dot,
                Token::Identifier("fulltext".into()),
                Token::Dot,
                Token::Identifier("drop".into()),
                Token::EOF
            ]
        );
    }

    #[test]
    fn test_parameters() {
        assert_eq!(lex("$name")[0], Token::Parameter("name".into()));
    }
}
