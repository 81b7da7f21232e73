// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! String function implementations
//!
//! - toUpper / toLower: case conversion
//! - trim / lTrim / rTrim: whitespace removal
//! - left / right / substring: character-based extraction
//! - replace / split: substitution and tokenizing
//! - toString: scalar to string conversion
//!
//! Every function returns null when its subject is null.

use super::function_trait::{
    integer_arg, string_arg, Arity, BuiltinFunction, FunctionContext, FunctionError,
    FunctionResult,
};
use crate::storage::Value;

pub(crate) fn functions() -> Vec<BuiltinFunction> {
    vec![
        BuiltinFunction::new("toUpper", "Converts a string to uppercase", Arity::exactly(1), to_upper),
        BuiltinFunction::new("toLower", "Converts a string to lowercase", Arity::exactly(1), to_lower),
        BuiltinFunction::new("trim", "Removes leading and trailing whitespace", Arity::exactly(1), trim),
        BuiltinFunction::new("lTrim", "Removes leading whitespace", Arity::exactly(1), ltrim),
        BuiltinFunction::new("rTrim", "Removes trailing whitespace", Arity::exactly(1), rtrim),
        BuiltinFunction::new("left", "Leftmost characters of a string", Arity::exactly(2), left),
        BuiltinFunction::new("right", "Rightmost characters of a string", Arity::exactly(2), right),
        BuiltinFunction::new("substring", "Extracts a substring", Arity::between(2, 3), substring),
        BuiltinFunction::new("replace", "Replaces every occurrence of a substring", Arity::exactly(3), replace),
        BuiltinFunction::new("split", "Splits a string on a delimiter", Arity::exactly(2), split),
        BuiltinFunction::new("toString", "Converts a scalar to its string form", Arity::exactly(1), to_string),
    ]
}

fn map_string(context: &FunctionContext, f: impl Fn(&str) -> String) -> FunctionResult<Value> {
    Ok(match string_arg(context.arg(0))? {
        Some(s) => Value::String(f(s)),
        None => Value::Null,
    })
}

fn to_upper(context: &FunctionContext) -> FunctionResult<Value> {
    map_string(context, str::to_uppercase)
}

fn to_lower(context: &FunctionContext) -> FunctionResult<Value> {
    map_string(context, str::to_lowercase)
}

fn trim(context: &FunctionContext) -> FunctionResult<Value> {
    map_string(context, |s| s.trim().to_string())
}

fn ltrim(context: &FunctionContext) -> FunctionResult<Value> {
    map_string(context, |s| s.trim_start().to_string())
}

fn rtrim(context: &FunctionContext) -> FunctionResult<Value> {
    map_string(context, |s| s.trim_end().to_string())
}

fn length_arg(value: &Value, what: &str) -> FunctionResult<usize> {
    match integer_arg(value)? {
        Some(n) if n >= 0 => Ok(n as usize),
        Some(_) => Err(FunctionError::Argument(format!(
            "{} must be a non-negative integer",
            what
        ))),
        None => Err(FunctionError::Argument(format!("{} must not be null", what))),
    }
}

fn left(context: &FunctionContext) -> FunctionResult<Value> {
    let Some(s) = string_arg(context.arg(0))? else {
        return Ok(Value::Null);
    };
    let n = length_arg(context.arg(1), "length")?;
    Ok(Value::String(s.chars().take(n).collect()))
}

fn right(context: &FunctionContext) -> FunctionResult<Value> {
    let Some(s) = string_arg(context.arg(0))? else {
        return Ok(Value::Null);
    };
    let n = length_arg(context.arg(1), "length")?;
    let total = s.chars().count();
    Ok(Value::String(s.chars().skip(total.saturating_sub(n)).collect()))
}

fn substring(context: &FunctionContext) -> FunctionResult<Value> {
    let Some(s) = string_arg(context.arg(0))? else {
        return Ok(Value::Null);
    };
    let start = length_arg(context.arg(1), "start")?;
    let chars = s.chars().skip(start);
    let out: String = if context.argument_count() > 2 {
        let len = length_arg(context.arg(2), "length")?;
        chars.take(len).collect()
    } else {
        chars.collect()
    };
    Ok(Value::String(out))
}

fn replace(context: &FunctionContext) -> FunctionResult<Value> {
    let subject = string_arg(context.arg(0))?;
    let search = string_arg(context.arg(1))?;
    let replacement = string_arg(context.arg(2))?;
    Ok(match (subject, search, replacement) {
        (Some(s), Some(from), Some(to)) => Value::String(s.replace(from, to)),
        _ => Value::Null,
    })
}

fn split(context: &FunctionContext) -> FunctionResult<Value> {
    let subject = string_arg(context.arg(0))?;
    let delimiter = string_arg(context.arg(1))?;
    let (Some(s), Some(delimiter)) = (subject, delimiter) else {
        return Ok(Value::Null);
    };
    let parts: Vec<Value> = if delimiter.is_empty() {
        s.chars().map(|c| Value::String(c.to_string())).collect()
    } else {
        s.split(delimiter).map(Value::from).collect()
    };
    Ok(Value::List(parts))
}

fn to_string(context: &FunctionContext) -> FunctionResult<Value> {
    match context.arg(0) {
        Value::Null => Ok(Value::Null),
        Value::String(s) => Ok(Value::String(s.clone())),
        v @ (Value::Integer(_) | Value::Float(_) | Value::Boolean(_) | Value::Point(_)) => {
            Ok(Value::String(v.to_string()))
        }
        other => Err(FunctionError::type_mismatch(
            "Integer, Float, String, Boolean, Point, or Null",
            other,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Graph;

    fn call(f: fn(&FunctionContext) -> FunctionResult<Value>, args: Vec<Value>) -> FunctionResult<Value> {
        let graph = Graph::new("g");
        let ctx = FunctionContext::new(args, &graph);
        f(&ctx)
    }

    #[test]
    fn test_case_and_trim() {
        assert_eq!(call(to_upper, vec!["abc".into()]).unwrap(), Value::from("ABC"));
        assert_eq!(call(to_lower, vec!["AbC".into()]).unwrap(), Value::from("abc"));
        assert_eq!(call(trim, vec!["  x ".into()]).unwrap(), Value::from("x"));
        assert_eq!(call(ltrim, vec!["  x ".into()]).unwrap(), Value::from("x "));
        assert_eq!(call(rtrim, vec!["  x ".into()]).unwrap(), Value::from("  x"));
        assert!(call(to_upper, vec![Value::Null]).unwrap().is_null());
    }

    #[test]
    fn test_non_string_is_type_mismatch() {
        let err = call(to_upper, vec![Value::Integer(1)]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Type mismatch: expected String or Null but was Integer"
        );
    }

    #[test]
    fn test_extraction() {
        assert_eq!(
            call(left, vec!["hello".into(), Value::Integer(2)]).unwrap(),
            Value::from("he")
        );
        assert_eq!(
            call(right, vec!["hello".into(), Value::Integer(3)]).unwrap(),
            Value::from("llo")
        );
        assert_eq!(
            call(right, vec!["hi".into(), Value::Integer(10)]).unwrap(),
            Value::from("hi")
        );
        assert_eq!(
            call(substring, vec!["hello".into(), Value::Integer(1), Value::Integer(3)]).unwrap(),
            Value::from("ell")
        );
        assert_eq!(
            call(substring, vec!["hello".into(), Value::Integer(2)]).unwrap(),
            Value::from("llo")
        );
        assert!(matches!(
            call(substring, vec!["hello".into(), Value::Integer(-1)]),
            Err(FunctionError::Argument(_))
        ));
    }

    #[test]
    fn test_replace_and_split() {
        assert_eq!(
            call(replace, vec!["a-b-c".into(), "-".into(), "+".into()]).unwrap(),
            Value::from("a+b+c")
        );
        assert_eq!(
            call(split, vec!["a,b,,c".into(), ",".into()]).unwrap(),
            Value::from(vec!["a", "b", "", "c"])
        );
        assert_eq!(
            call(split, vec!["ab".into(), "".into()]).unwrap(),
            Value::from(vec!["a", "b"])
        );
        assert!(call(split, vec![Value::Null, ",".into()]).unwrap().is_null());
    }

    #[test]
    fn test_to_string() {
        assert_eq!(call(to_string, vec![Value::Integer(7)]).unwrap(), Value::from("7"));
        assert_eq!(call(to_string, vec![Value::Boolean(true)]).unwrap(), Value::from("true"));
        assert!(call(to_string, vec![Value::List(vec![])]).is_err());
    }
}
