// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Null handling functions: coalesce, exists

use super::function_trait::{Arity, BuiltinFunction, FunctionContext, FunctionResult};
use crate::storage::Value;

pub(crate) fn functions() -> Vec<BuiltinFunction> {
    vec![
        BuiltinFunction::new("coalesce", "First non-null argument", Arity::at_least(1), coalesce),
        BuiltinFunction::new("exists", "Whether the argument is not null", Arity::exactly(1), exists),
    ]
}

fn coalesce(context: &FunctionContext) -> FunctionResult<Value> {
    Ok(context
        .arguments
        .iter()
        .find(|v| !v.is_null())
        .cloned()
        .unwrap_or(Value::Null))
}

fn exists(context: &FunctionContext) -> FunctionResult<Value> {
    Ok(Value::Boolean(!context.arg(0).is_null()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Graph;

    #[test]
    fn test_coalesce() {
        let graph = Graph::new("g");
        let ctx = FunctionContext::new(vec![Value::Null, Value::Integer(2), Value::Integer(3)], &graph);
        assert_eq!(coalesce(&ctx).unwrap(), Value::Integer(2));
        let ctx = FunctionContext::new(vec![Value::Null], &graph);
        assert!(coalesce(&ctx).unwrap().is_null());
    }

    #[test]
    fn test_exists() {
        let graph = Graph::new("g");
        assert_eq!(
            exists(&FunctionContext::new(vec![Value::Null], &graph)).unwrap(),
            Value::Boolean(false)
        );
        assert_eq!(
            exists(&FunctionContext::new(vec![Value::Integer(0)], &graph)).unwrap(),
            Value::Boolean(true)
        );
    }
}
