// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Query language front end: lexer, AST and parser

#[allow(clippy::module_inception)]
pub mod ast;
pub mod lexer;
pub mod parser;

pub use ast::*;
pub use parser::{parse_query, ParserError};
