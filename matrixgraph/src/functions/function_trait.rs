// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Generic function trait for query execution
//!
//! Scalar functions implement [`Function`]; aggregates implement
//! [`AggregateFunction`] and hand out one [`Accumulator`] per group.

use crate::storage::{Graph, Value};

/// Error type for function execution
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FunctionError {
    #[error("Type mismatch: expected {expected} but was {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("Received {actual} arguments to function '{name}', expected {expected}")]
    Arity {
        name: String,
        expected: String,
        actual: usize,
    },

    #[error("{0}")]
    Argument(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Queries's mem consumption exceeded capacity (requested {requested} bytes)")]
    MemoryLimit { requested: usize },
}

impl FunctionError {
    pub fn type_mismatch(expected: &str, actual: &Value) -> Self {
        FunctionError::TypeMismatch {
            expected: expected.to_string(),
            actual: actual.type_name().to_string(),
        }
    }
}

/// Result type for function execution
pub type FunctionResult<T> = Result<T, FunctionError>;

/// Function execution context
pub struct FunctionContext<'a> {
    /// Evaluated arguments
    pub arguments: Vec<Value>,
    /// Graph the query runs against
    pub graph: &'a Graph,
    /// Bytes the query may still allocate; `None` when unlimited
    pub memory_headroom: Option<usize>,
}

impl<'a> FunctionContext<'a> {
    pub fn new(arguments: Vec<Value>, graph: &'a Graph) -> Self {
        Self {
            arguments,
            graph,
            memory_headroom: None,
        }
    }

    pub fn with_headroom(mut self, headroom: Option<usize>) -> Self {
        self.memory_headroom = headroom;
        self
    }

    /// Fail when a result of `bytes` would not fit in the query's budget
    pub fn reserve(&self, bytes: usize) -> FunctionResult<()> {
        match self.memory_headroom {
            Some(headroom) if bytes > headroom => Err(FunctionError::MemoryLimit { requested: bytes }),
            _ => Ok(()),
        }
    }

    /// Argument by position; missing optional arguments read as null
    pub fn arg(&self, index: usize) -> &Value {
        static NULL: Value = Value::Null;
        self.arguments.get(index).unwrap_or(&NULL)
    }

    pub fn argument_count(&self) -> usize {
        self.arguments.len()
    }

    /// Whether any argument is null
    pub fn any_null(&self) -> bool {
        self.arguments.iter().any(Value::is_null)
    }
}

/// Accepted argument counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    /// `None` for variadic functions
    pub max: Option<usize>,
}

impl Arity {
    pub const fn exactly(n: usize) -> Self {
        Self { min: n, max: Some(n) }
    }

    pub const fn between(min: usize, max: usize) -> Self {
        Self {
            min,
            max: Some(max),
        }
    }

    pub const fn at_least(min: usize) -> Self {
        Self { min, max: None }
    }

    /// Validate a call site
    pub fn check(&self, name: &str, actual: usize) -> FunctionResult<()> {
        let expected = if actual < self.min {
            if self.max == Some(self.min) {
                self.min.to_string()
            } else {
                format!("at least {}", self.min)
            }
        } else {
            match self.max {
                Some(max) if actual > max => {
                    if max == self.min {
                        max.to_string()
                    } else {
                        format!("at most {}", max)
                    }
                }
                _ => return Ok(()),
            }
        };
        Err(FunctionError::Arity {
            name: name.to_string(),
            expected,
            actual,
        })
    }
}

/// Core trait for scalar functions
pub trait Function: Send + Sync + std::fmt::Debug {
    /// Canonical name, as printed in plans
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn arity(&self) -> Arity;

    /// Execute the function with the given context
    fn execute(&self, context: &FunctionContext) -> FunctionResult<Value>;

    /// Whether two calls with equal arguments always return equal values
    fn is_deterministic(&self) -> bool {
        true
    }
}

/// Signature of a stateless built-in
pub type ScalarBody = fn(&FunctionContext) -> FunctionResult<Value>;

/// Stateless built-in backed by a plain function pointer
#[derive(Debug)]
pub struct BuiltinFunction {
    name: &'static str,
    description: &'static str,
    arity: Arity,
    body: ScalarBody,
    deterministic: bool,
}

impl BuiltinFunction {
    pub const fn new(
        name: &'static str,
        description: &'static str,
        arity: Arity,
        body: ScalarBody,
    ) -> Self {
        Self {
            name,
            description,
            arity,
            body,
            deterministic: true,
        }
    }

    pub const fn volatile(mut self) -> Self {
        self.deterministic = false;
        self
    }
}

impl Function for BuiltinFunction {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn arity(&self) -> Arity {
        self.arity
    }

    fn execute(&self, context: &FunctionContext) -> FunctionResult<Value> {
        (self.body)(context)
    }

    fn is_deterministic(&self) -> bool {
        self.deterministic
    }
}

// ==============================================================================
// ARGUMENT HELPERS
// ==============================================================================

pub(crate) fn string_arg(value: &Value) -> FunctionResult<Option<&str>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        other => Err(FunctionError::type_mismatch("String or Null", other)),
    }
}

pub(crate) fn integer_arg(value: &Value) -> FunctionResult<Option<i64>> {
    match value {
        Value::Null => Ok(None),
        Value::Integer(i) => Ok(Some(*i)),
        other => Err(FunctionError::type_mismatch("Integer or Null", other)),
    }
}

pub(crate) fn number_arg(value: &Value) -> FunctionResult<Option<f64>> {
    match value {
        Value::Null => Ok(None),
        Value::Integer(i) => Ok(Some(*i as f64)),
        Value::Float(f) => Ok(Some(*f)),
        other => Err(FunctionError::type_mismatch("Integer, Float, or Null", other)),
    }
}

pub(crate) fn list_arg(value: &Value) -> FunctionResult<Option<&[Value]>> {
    match value {
        Value::Null => Ok(None),
        Value::List(items) => Ok(Some(items)),
        other => Err(FunctionError::type_mismatch("List or Null", other)),
    }
}

/// Per-group running state of an aggregate
pub trait Accumulator: Send {
    /// Fold one row's evaluated arguments
    fn update(&mut self, arguments: &[Value]) -> FunctionResult<()>;

    /// Final value; called once
    fn finish(&mut self) -> FunctionResult<Value>;

    /// Approximate retained bytes, for memory accounting
    fn retained_bytes(&self) -> usize {
        0
    }
}

/// Aggregating function such as `count` or `collect`
pub trait AggregateFunction: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    fn arity(&self) -> Arity;

    fn accumulator(&self) -> Box<dyn Accumulator>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arity_messages() {
        assert!(Arity::exactly(1).check("abs", 1).is_ok());
        let err = Arity::exactly(1).check("abs", 2).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Received 2 arguments to function 'abs', expected 1"
        );
        let err = Arity::between(2, 3).check("substring", 1).unwrap_err();
        assert!(err.to_string().ends_with("expected at least 2"));
        let err = Arity::between(2, 3).check("substring", 4).unwrap_err();
        assert!(err.to_string().ends_with("expected at most 3"));
        assert!(Arity::at_least(1).check("coalesce", 10).is_ok());
    }

    #[test]
    fn test_argument_helpers() {
        assert_eq!(string_arg(&Value::from("a")).unwrap(), Some("a"));
        assert_eq!(string_arg(&Value::Null).unwrap(), None);
        assert!(integer_arg(&Value::Float(1.0)).is_err());
        assert_eq!(number_arg(&Value::Integer(2)).unwrap(), Some(2.0));
        let err = list_arg(&Value::Integer(1)).unwrap_err();
        assert_eq!(err.to_string(), "Type mismatch: expected List or Null but was Integer");
    }

    #[test]
    fn test_type_mismatch_message() {
        let err = FunctionError::type_mismatch("Integer", &Value::from("x"));
        assert_eq!(err.to_string(), "Type mismatch: expected Integer but was String");
    }
}
