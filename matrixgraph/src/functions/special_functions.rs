// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Special functions: timestamp, spatial points, boolean conversion

use super::function_trait::{
    Arity, BuiltinFunction, FunctionContext, FunctionError, FunctionResult,
};
use crate::storage::{Point, Value};

/// Mean earth radius used by `distance`, in meters
const EARTH_RADIUS_METERS: f64 = 6_378_140.0;

pub(crate) fn functions() -> Vec<BuiltinFunction> {
    vec![
        BuiltinFunction::new("timestamp", "Milliseconds since the Unix epoch", Arity::exactly(0), timestamp).volatile(),
        BuiltinFunction::new("point", "Geographic point from a latitude/longitude map", Arity::exactly(1), point),
        BuiltinFunction::new("distance", "Great-circle distance between two points in meters", Arity::exactly(2), distance),
        BuiltinFunction::new("toBoolean", "Converts a value to a boolean", Arity::exactly(1), to_boolean),
    ]
}

fn timestamp(_: &FunctionContext) -> FunctionResult<Value> {
    Ok(Value::Integer(chrono::Utc::now().timestamp_millis()))
}

fn coordinate(map: &Value, key: &str) -> FunctionResult<f64> {
    match map.map_get(key) {
        Some(v) => v
            .as_f64()
            .ok_or_else(|| FunctionError::type_mismatch("Integer or Float", v)),
        None => Err(FunctionError::Argument(format!(
            "A point map must contain a '{}' key",
            key
        ))),
    }
}

fn point(context: &FunctionContext) -> FunctionResult<Value> {
    let map = match context.arg(0) {
        Value::Null => return Ok(Value::Null),
        m @ Value::Map(_) => m,
        other => return Err(FunctionError::type_mismatch("Map or Null", other)),
    };
    let latitude = coordinate(map, "latitude")?;
    let longitude = coordinate(map, "longitude")?;
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return Err(FunctionError::Argument(
            "latitude must be in [-90, 90] and longitude in [-180, 180]".to_string(),
        ));
    }
    Ok(Value::Point(Point {
        latitude,
        longitude,
    }))
}

fn distance(context: &FunctionContext) -> FunctionResult<Value> {
    let as_point = |v: &Value| -> FunctionResult<Option<Point>> {
        match v {
            Value::Null => Ok(None),
            Value::Point(p) => Ok(Some(*p)),
            other => Err(FunctionError::type_mismatch("Point or Null", other)),
        }
    };
    let (Some(a), Some(b)) = (as_point(context.arg(0))?, as_point(context.arg(1))?) else {
        return Ok(Value::Null);
    };
    let (lat1, lat2) = (a.latitude.to_radians(), b.latitude.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.longitude - a.longitude).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    Ok(Value::Float(EARTH_RADIUS_METERS * c))
}

fn to_boolean(context: &FunctionContext) -> FunctionResult<Value> {
    match context.arg(0) {
        Value::Null => Ok(Value::Null),
        Value::Boolean(b) => Ok(Value::Boolean(*b)),
        Value::Integer(i) => Ok(Value::Boolean(*i != 0)),
        Value::String(s) => Ok(match s.trim().to_ascii_lowercase().as_str() {
            "true" => Value::Boolean(true),
            "false" => Value::Boolean(false),
            _ => Value::Null,
        }),
        other => Err(FunctionError::type_mismatch(
            "Boolean, Integer, String, or Null",
            other,
        )),
    }
}
