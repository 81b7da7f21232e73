// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Execution error types

use std::fmt;
use thiserror::Error;

use crate::ast::ParserError;
use crate::functions::FunctionError;
use crate::storage::indexes::IndexError;
use crate::storage::{GraphError, StorageError};

/// Coarse classification of every error a query can end with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Parse,
    TypeMismatch,
    UnknownIdentifier,
    UnknownFunction,
    Schema,
    ConstraintViolation,
    DivisionByZero,
    Argument,
    MemoryLimitExceeded,
    Timeout,
    QueueFull,
    ReadOnlyViolation,
    IndexNotFound,
    IndexExists,
    NoVariablesInScope,
    UnionColumnMismatch,
    Syntax,
    EmptyKey,
    Config,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Execution errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error(transparent)]
    Parse(#[from] ParserError),

    #[error("Type mismatch: expected {expected} but was {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("'{0}' not defined")]
    UnknownIdentifier(String),

    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    #[error("Procedure '{0}' is not registered")]
    UnknownProcedure(String),

    #[error("{0}")]
    Schema(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("{0}")]
    Argument(String),

    #[error("Queries's mem consumption exceeded capacity (limit {limit} bytes, requested {requested} bytes)")]
    MemoryLimitExceeded { limit: usize, requested: usize },

    #[error("Query timed out")]
    Timeout,

    #[error("Max pending queries exceeded")]
    QueueFull,

    #[error("graph.RO_QUERY is to be executed only on read-only queries")]
    ReadOnlyViolation,

    #[error("RETURN * is not allowed when there are no variables in scope")]
    NoVariablesInScope,

    #[error("All sub queries in an UNION must have the same column names.")]
    UnionColumnMismatch,

    #[error("{0}")]
    Syntax(String),

    #[error("Invalid graph operation on empty key")]
    EmptyKey,

    #[error("{0}")]
    Config(String),

    #[error("{0}")]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Function(#[from] FunctionError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExecutionError {
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        ExecutionError::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        ExecutionError::Syntax(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecutionError::Parse(_) => ErrorKind::Parse,
            ExecutionError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            ExecutionError::UnknownIdentifier(_) => ErrorKind::UnknownIdentifier,
            ExecutionError::UnknownFunction(_) | ExecutionError::UnknownProcedure(_) => {
                ErrorKind::UnknownFunction
            }
            ExecutionError::Schema(_) => ErrorKind::Schema,
            ExecutionError::DivisionByZero => ErrorKind::DivisionByZero,
            ExecutionError::Argument(_) => ErrorKind::Argument,
            ExecutionError::MemoryLimitExceeded { .. } => ErrorKind::MemoryLimitExceeded,
            ExecutionError::Timeout => ErrorKind::Timeout,
            ExecutionError::QueueFull => ErrorKind::QueueFull,
            ExecutionError::ReadOnlyViolation => ErrorKind::ReadOnlyViolation,
            ExecutionError::NoVariablesInScope => ErrorKind::NoVariablesInScope,
            ExecutionError::UnionColumnMismatch => ErrorKind::UnionColumnMismatch,
            ExecutionError::Syntax(_) => ErrorKind::Syntax,
            ExecutionError::EmptyKey => ErrorKind::EmptyKey,
            ExecutionError::Config(_) => ErrorKind::Config,
            ExecutionError::Internal(_) => ErrorKind::Internal,
            ExecutionError::Function(e) => match e {
                FunctionError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
                FunctionError::Arity { .. } => ErrorKind::Syntax,
                FunctionError::Argument(_) => ErrorKind::Argument,
                FunctionError::DivisionByZero => ErrorKind::DivisionByZero,
                FunctionError::MemoryLimit { .. } => ErrorKind::MemoryLimitExceeded,
            },
            ExecutionError::Storage(e) => match e {
                StorageError::Graph(GraphError::InvalidPropertyValue(_)) => ErrorKind::TypeMismatch,
                StorageError::Graph(GraphError::SchemaFull(_)) => ErrorKind::Schema,
                StorageError::Index(IndexError::AlreadyExists(_)) => ErrorKind::IndexExists,
                StorageError::Index(IndexError::NotFound(_)) => ErrorKind::IndexNotFound,
                StorageError::Index(IndexError::InvalidConfiguration(_)) => ErrorKind::Argument,
                StorageError::ConstraintViolation(_) => ErrorKind::ConstraintViolation,
                StorageError::InvalidConstraint(_) => ErrorKind::Schema,
                _ => ErrorKind::Internal,
            },
        }
    }
}

pub type ExecResult<T> = Result<T, ExecutionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pinned_prefixes() {
        assert!(ExecutionError::type_mismatch("Integer", "String")
            .to_string()
            .starts_with("Type mismatch"));
        assert!(ExecutionError::UnknownFunction("foo".into())
            .to_string()
            .starts_with("Unknown function"));
        assert!(ExecutionError::MemoryLimitExceeded { limit: 1, requested: 2 }
            .to_string()
            .starts_with("Queries's mem consumption exceeded capacity"));
        assert_eq!(
            ExecutionError::EmptyKey.to_string(),
            "Invalid graph operation on empty key"
        );
        assert!(ExecutionError::UnknownIdentifier("x".into())
            .to_string()
            .contains("not defined"));
    }

    #[test]
    fn test_kinds_of_wrapped_errors() {
        let err: ExecutionError = StorageError::Index(IndexError::AlreadyExists("p".into())).into();
        assert_eq!(err.kind(), ErrorKind::IndexExists);
        let err: ExecutionError = StorageError::ConstraintViolation("dup".into()).into();
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
        let err: ExecutionError = ParserError::EmptyQuery.into();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert_eq!(err.to_string(), "empty query");
        let err: ExecutionError = FunctionError::DivisionByZero.into();
        assert_eq!(err.kind(), ErrorKind::DivisionByZero);
    }
}
