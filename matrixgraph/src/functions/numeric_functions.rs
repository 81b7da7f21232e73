// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Numeric and mathematical functions
//!
//! Integer inputs stay integers where the result is integral (`abs`, `ceil`,
//! `floor`, `round`, `sign`); transcendental functions always return floats.

use super::function_trait::{
    number_arg, Arity, BuiltinFunction, FunctionContext, FunctionError, FunctionResult,
};
use crate::storage::Value;

pub(crate) fn functions() -> Vec<BuiltinFunction> {
    vec![
        BuiltinFunction::new("abs", "Absolute value", Arity::exactly(1), abs),
        BuiltinFunction::new("ceil", "Smallest integral value not less than the input", Arity::exactly(1), ceil),
        BuiltinFunction::new("floor", "Largest integral value not greater than the input", Arity::exactly(1), floor),
        BuiltinFunction::new("round", "Nearest integral value, halves away from zero", Arity::exactly(1), round),
        BuiltinFunction::new("sign", "Signum of a number", Arity::exactly(1), sign),
        BuiltinFunction::new("sqrt", "Square root", Arity::exactly(1), sqrt),
        BuiltinFunction::new("exp", "e raised to the input", Arity::exactly(1), exp),
        BuiltinFunction::new("log", "Natural logarithm", Arity::exactly(1), log),
        BuiltinFunction::new("log10", "Base 10 logarithm", Arity::exactly(1), log10),
        BuiltinFunction::new("pi", "The constant pi", Arity::exactly(0), pi),
        BuiltinFunction::new("e", "Euler's number", Arity::exactly(0), e),
        BuiltinFunction::new("rand", "Uniform random float in [0, 1)", Arity::exactly(0), rand).volatile(),
        BuiltinFunction::new("toInteger", "Converts a value to an integer", Arity::exactly(1), to_integer),
        BuiltinFunction::new("toFloat", "Converts a value to a float", Arity::exactly(1), to_float),
    ]
}

/// Apply separate integer and float rules, passing null through
fn numeric(
    context: &FunctionContext,
    on_integer: impl Fn(i64) -> Value,
    on_float: impl Fn(f64) -> Value,
) -> FunctionResult<Value> {
    match context.arg(0) {
        Value::Null => Ok(Value::Null),
        Value::Integer(i) => Ok(on_integer(*i)),
        Value::Float(f) => Ok(on_float(*f)),
        other => Err(FunctionError::type_mismatch("Integer, Float, or Null", other)),
    }
}

fn float_of(context: &FunctionContext, f: impl Fn(f64) -> f64) -> FunctionResult<Value> {
    Ok(number_arg(context.arg(0))?
        .map(|x| Value::Float(f(x)))
        .unwrap_or(Value::Null))
}

fn abs(context: &FunctionContext) -> FunctionResult<Value> {
    numeric(context, |i| Value::Integer(i.wrapping_abs()), |f| Value::Float(f.abs()))
}

fn ceil(context: &FunctionContext) -> FunctionResult<Value> {
    numeric(context, Value::Integer, |f| Value::Float(f.ceil()))
}

fn floor(context: &FunctionContext) -> FunctionResult<Value> {
    numeric(context, Value::Integer, |f| Value::Float(f.floor()))
}

fn round(context: &FunctionContext) -> FunctionResult<Value> {
    numeric(context, Value::Integer, |f| Value::Float(f.round()))
}

fn sign(context: &FunctionContext) -> FunctionResult<Value> {
    numeric(
        context,
        |i| Value::Integer(i.signum()),
        |f| {
            Value::Integer(if f > 0.0 {
                1
            } else if f < 0.0 {
                -1
            } else {
                0
            })
        },
    )
}

fn sqrt(context: &FunctionContext) -> FunctionResult<Value> {
    float_of(context, f64::sqrt)
}

fn exp(context: &FunctionContext) -> FunctionResult<Value> {
    float_of(context, f64::exp)
}

fn log(context: &FunctionContext) -> FunctionResult<Value> {
    float_of(context, f64::ln)
}

fn log10(context: &FunctionContext) -> FunctionResult<Value> {
    float_of(context, f64::log10)
}

fn pi(_: &FunctionContext) -> FunctionResult<Value> {
    Ok(Value::Float(std::f64::consts::PI))
}

fn e(_: &FunctionContext) -> FunctionResult<Value> {
    Ok(Value::Float(std::f64::consts::E))
}

fn rand(_: &FunctionContext) -> FunctionResult<Value> {
    Ok(Value::Float(fastrand::f64()))
}

fn to_integer(context: &FunctionContext) -> FunctionResult<Value> {
    match context.arg(0) {
        Value::Null => Ok(Value::Null),
        Value::Integer(i) => Ok(Value::Integer(*i)),
        Value::Float(f) if f.is_finite() => Ok(Value::Integer(f.trunc() as i64)),
        Value::Float(_) => Ok(Value::Null),
        Value::Boolean(b) => Ok(Value::Integer(i64::from(*b))),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                return Ok(Value::Integer(i));
            }
            Ok(match s.parse::<f64>() {
                Ok(f) if f.is_finite() => Value::Integer(f.trunc() as i64),
                _ => Value::Null,
            })
        }
        other => Err(FunctionError::type_mismatch(
            "Boolean, Integer, Float, String, or Null",
            other,
        )),
    }
}

fn to_float(context: &FunctionContext) -> FunctionResult<Value> {
    match context.arg(0) {
        Value::Null => Ok(Value::Null),
        Value::Integer(i) => Ok(Value::Float(*i as f64)),
        Value::Float(f) => Ok(Value::Float(*f)),
        Value::String(s) => Ok(s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .unwrap_or(Value::Null)),
        other => Err(FunctionError::type_mismatch(
            "Integer, Float, String, or Null",
            other,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Graph;

    fn call(f: fn(&FunctionContext) -> FunctionResult<Value>, arg: Value) -> FunctionResult<Value> {
        let graph = Graph::new("g");
        f(&FunctionContext::new(vec![arg], &graph))
    }

    #[test]
    fn test_integer_preserving() {
        assert_eq!(call(abs, Value::Integer(-3)).unwrap(), Value::Integer(3));
        assert_eq!(call(ceil, Value::Integer(4)).unwrap(), Value::Integer(4));
        assert_eq!(call(ceil, Value::Float(1.2)).unwrap(), Value::Float(2.0));
        assert_eq!(call(floor, Value::Float(-1.2)).unwrap(), Value::Float(-2.0));
        assert_eq!(call(round, Value::Float(2.5)).unwrap(), Value::Float(3.0));
        assert_eq!(call(sign, Value::Float(-0.5)).unwrap(), Value::Integer(-1));
        assert_eq!(call(sign, Value::Integer(0)).unwrap(), Value::Integer(0));
    }

    #[test]
    fn test_abs_of_min_integer_wraps() {
        assert_eq!(call(abs, Value::Integer(i64::MIN)).unwrap(), Value::Integer(i64::MIN));
        assert_eq!(call(abs, Value::Integer(-i64::MAX)).unwrap(), Value::Integer(i64::MAX));
    }

    #[test]
    fn test_transcendental() {
        assert_eq!(call(sqrt, Value::Integer(16)).unwrap(), Value::Float(4.0));
        assert!(matches!(call(sqrt, Value::Integer(-1)).unwrap(), Value::Float(f) if f.is_nan()));
        assert_eq!(call(log10, Value::Integer(1000)).unwrap(), Value::Float(3.0));
        assert!(call(exp, Value::Null).unwrap().is_null());
        assert!(call(log, Value::from("x")).is_err());
    }

    #[test]
    fn test_conversions() {
        assert_eq!(call(to_integer, Value::from("42")).unwrap(), Value::Integer(42));
        assert_eq!(call(to_integer, Value::from("4.7")).unwrap(), Value::Integer(4));
        assert_eq!(call(to_integer, Value::Float(-2.9)).unwrap(), Value::Integer(-2));
        assert!(call(to_integer, Value::from("abc")).unwrap().is_null());
        assert_eq!(call(to_float, Value::Integer(3)).unwrap(), Value::Float(3.0));
        assert_eq!(call(to_float, Value::from("1.5")).unwrap(), Value::Float(1.5));
        assert!(call(to_float, Value::List(vec![])).is_err());
    }

    #[test]
    fn test_rand_in_unit_interval() {
        let graph = Graph::new("g");
        let ctx = FunctionContext::new(vec![], &graph);
        for _ in 0..100 {
            let v = rand(&ctx).unwrap().as_f64().unwrap();
            assert!((0.0..1.0).contains(&v));
        }
    }
}
