// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! List functions: size, head, last, tail, range, reverse

use super::function_trait::{
    integer_arg, list_arg, Arity, BuiltinFunction, FunctionContext, FunctionError, FunctionResult,
};
use crate::storage::Value;

pub(crate) fn functions() -> Vec<BuiltinFunction> {
    vec![
        BuiltinFunction::new("size", "Number of elements of a list or characters of a string", Arity::exactly(1), size),
        BuiltinFunction::new("head", "First element of a list", Arity::exactly(1), head),
        BuiltinFunction::new("last", "Last element of a list", Arity::exactly(1), last),
        BuiltinFunction::new("tail", "Every element but the first", Arity::exactly(1), tail),
        BuiltinFunction::new("range", "Integers from start to end inclusive", Arity::between(2, 3), range),
        BuiltinFunction::new("reverse", "Reverses a list or a string", Arity::exactly(1), reverse),
    ]
}

fn size(context: &FunctionContext) -> FunctionResult<Value> {
    match context.arg(0) {
        Value::Null => Ok(Value::Null),
        Value::List(items) => Ok(Value::Integer(items.len() as i64)),
        Value::String(s) => Ok(Value::Integer(s.chars().count() as i64)),
        other => Err(FunctionError::type_mismatch("List, String, or Null", other)),
    }
}

fn head(context: &FunctionContext) -> FunctionResult<Value> {
    Ok(list_arg(context.arg(0))?
        .and_then(|items| items.first().cloned())
        .unwrap_or(Value::Null))
}

fn last(context: &FunctionContext) -> FunctionResult<Value> {
    Ok(list_arg(context.arg(0))?
        .and_then(|items| items.last().cloned())
        .unwrap_or(Value::Null))
}

fn tail(context: &FunctionContext) -> FunctionResult<Value> {
    Ok(match list_arg(context.arg(0))? {
        Some(items) => Value::List(items.iter().skip(1).cloned().collect()),
        None => Value::Null,
    })
}

fn range(context: &FunctionContext) -> FunctionResult<Value> {
    let required = |v: &Value| -> FunctionResult<i64> {
        integer_arg(v)?.ok_or_else(|| FunctionError::type_mismatch("Integer", v))
    };
    let start = required(context.arg(0))?;
    let end = required(context.arg(1))?;
    let step = if context.argument_count() > 2 {
        required(context.arg(2))?
    } else {
        1
    };
    if step == 0 {
        return Err(FunctionError::Argument(
            "ArgumentError: step argument to range() can't be 0".to_string(),
        ));
    }

    let span = (end as i128 - start as i128) / step as i128;
    let count = if span < 0 { 0 } else { span as u128 + 1 };
    let bytes = count.saturating_mul(std::mem::size_of::<Value>() as u128);
    context.reserve(usize::try_from(bytes).unwrap_or(usize::MAX))?;

    let mut out = Vec::with_capacity(count.min(1 << 20) as usize);
    let mut current = start as i128;
    for _ in 0..count {
        out.push(Value::Integer(current as i64));
        current += step as i128;
    }
    Ok(Value::List(out))
}

fn reverse(context: &FunctionContext) -> FunctionResult<Value> {
    match context.arg(0) {
        Value::Null => Ok(Value::Null),
        Value::List(items) => Ok(Value::List(items.iter().rev().cloned().collect())),
        Value::String(s) => Ok(Value::String(s.chars().rev().collect())),
        other => Err(FunctionError::type_mismatch("List, String, or Null", other)),
    }
}
