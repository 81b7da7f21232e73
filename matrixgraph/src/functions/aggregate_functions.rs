// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Aggregate function implementations
//!
//! Each aggregate hands out one accumulator per group. Nulls are skipped by
//! every aggregate except `count(*)`. Empty groups finish with:
//! count 0, sum 0, avg null, min/max null, stDev/stDevP 0, collect [],
//! percentileCont/percentileDisc null.

use super::function_trait::{
    number_arg, Accumulator, AggregateFunction, Arity, FunctionError, FunctionResult,
};
use crate::storage::Value;

pub(crate) fn functions() -> Vec<Box<dyn AggregateFunction>> {
    vec![
        Box::new(CountFunction),
        Box::new(SumFunction),
        Box::new(AvgFunction),
        Box::new(ExtremumFunction { max: false }),
        Box::new(ExtremumFunction { max: true }),
        Box::new(CollectFunction),
        Box::new(StdDevFunction { population: false }),
        Box::new(StdDevFunction { population: true }),
        Box::new(PercentileFunction { continuous: true }),
        Box::new(PercentileFunction { continuous: false }),
    ]
}

// ==============================================================================
// COUNT
// ==============================================================================

/// `count(expr)` counts non-null values; called with no arguments it backs
/// `count(*)` and counts rows.
#[derive(Debug)]
pub struct CountFunction;

#[derive(Default)]
struct CountAccumulator {
    count: i64,
}

impl Accumulator for CountAccumulator {
    fn update(&mut self, arguments: &[Value]) -> FunctionResult<()> {
        if arguments.first().map_or(true, |v| !v.is_null()) {
            self.count += 1;
        }
        Ok(())
    }

    fn finish(&mut self) -> FunctionResult<Value> {
        Ok(Value::Integer(self.count))
    }
}

impl AggregateFunction for CountFunction {
    fn name(&self) -> &str {
        "count"
    }

    fn arity(&self) -> Arity {
        Arity::between(0, 1)
    }

    fn accumulator(&self) -> Box<dyn Accumulator> {
        Box::<CountAccumulator>::default()
    }
}

// ==============================================================================
// SUM
// ==============================================================================

#[derive(Debug)]
pub struct SumFunction;

/// Integer until the first float arrives
enum SumAccumulator {
    Integer(i64),
    Float(f64),
}

impl Accumulator for SumAccumulator {
    fn update(&mut self, arguments: &[Value]) -> FunctionResult<()> {
        let value = arguments.first().unwrap_or(&Value::Null);
        if value.is_null() {
            return Ok(());
        }
        match self {
            SumAccumulator::Integer(total) => match value {
                Value::Integer(i) => *total = total.wrapping_add(*i),
                Value::Float(f) => {
                    let promoted = *total as f64 + f;
                    *self = SumAccumulator::Float(promoted);
                }
                other => return Err(FunctionError::type_mismatch("Integer, Float, or Null", other)),
            },
            SumAccumulator::Float(total) => *total += number_arg(value)?.unwrap_or(0.0),
        }
        Ok(())
    }

    fn finish(&mut self) -> FunctionResult<Value> {
        Ok(match self {
            SumAccumulator::Integer(i) => Value::Integer(*i),
            SumAccumulator::Float(f) => Value::Float(*f),
        })
    }
}

impl AggregateFunction for SumFunction {
    fn name(&self) -> &str {
        "sum"
    }

    fn arity(&self) -> Arity {
        Arity::exactly(1)
    }

    fn accumulator(&self) -> Box<dyn Accumulator> {
        Box::new(SumAccumulator::Integer(0))
    }
}

// ==============================================================================
// AVG
// ==============================================================================

#[derive(Debug)]
pub struct AvgFunction;

/// Running mean, updated incrementally so large inputs do not overflow
#[derive(Default)]
struct AvgAccumulator {
    mean: f64,
    count: u64,
}

impl Accumulator for AvgAccumulator {
    fn update(&mut self, arguments: &[Value]) -> FunctionResult<()> {
        if let Some(x) = number_arg(arguments.first().unwrap_or(&Value::Null))? {
            self.count += 1;
            self.mean += (x - self.mean) / self.count as f64;
        }
        Ok(())
    }

    fn finish(&mut self) -> FunctionResult<Value> {
        Ok(if self.count == 0 {
            Value::Null
        } else {
            Value::Float(self.mean)
        })
    }
}

impl AggregateFunction for AvgFunction {
    fn name(&self) -> &str {
        "avg"
    }

    fn arity(&self) -> Arity {
        Arity::exactly(1)
    }

    fn accumulator(&self) -> Box<dyn Accumulator> {
        Box::<AvgAccumulator>::default()
    }
}

// ==============================================================================
// MIN / MAX
// ==============================================================================

#[derive(Debug)]
pub struct ExtremumFunction {
    max: bool,
}

struct ExtremumAccumulator {
    max: bool,
    best: Option<Value>,
}

impl Accumulator for ExtremumAccumulator {
    fn update(&mut self, arguments: &[Value]) -> FunctionResult<()> {
        let Some(value) = arguments.first().filter(|v| !v.is_null()) else {
            return Ok(());
        };
        let replace = match &self.best {
            None => true,
            Some(best) => {
                let ord = value.total_cmp(best);
                if self.max {
                    ord.is_gt()
                } else {
                    ord.is_lt()
                }
            }
        };
        if replace {
            self.best = Some(value.clone());
        }
        Ok(())
    }

    fn finish(&mut self) -> FunctionResult<Value> {
        Ok(self.best.take().unwrap_or(Value::Null))
    }

    fn retained_bytes(&self) -> usize {
        self.best.as_ref().map_or(0, Value::estimated_size)
    }
}

impl AggregateFunction for ExtremumFunction {
    fn name(&self) -> &str {
        if self.max {
            "max"
        } else {
            "min"
        }
    }

    fn arity(&self) -> Arity {
        Arity::exactly(1)
    }

    fn accumulator(&self) -> Box<dyn Accumulator> {
        Box::new(ExtremumAccumulator {
            max: self.max,
            best: None,
        })
    }
}

// ==============================================================================
// COLLECT
// ==============================================================================

#[derive(Debug)]
pub struct CollectFunction;

#[derive(Default)]
struct CollectAccumulator {
    items: Vec<Value>,
    bytes: usize,
}

impl Accumulator for CollectAccumulator {
    fn update(&mut self, arguments: &[Value]) -> FunctionResult<()> {
        if let Some(value) = arguments.first().filter(|v| !v.is_null()) {
            self.bytes += value.estimated_size();
            self.items.push(value.clone());
        }
        Ok(())
    }

    fn finish(&mut self) -> FunctionResult<Value> {
        Ok(Value::List(std::mem::take(&mut self.items)))
    }

    fn retained_bytes(&self) -> usize {
        self.bytes
    }
}

impl AggregateFunction for CollectFunction {
    fn name(&self) -> &str {
        "collect"
    }

    fn arity(&self) -> Arity {
        Arity::exactly(1)
    }

    fn accumulator(&self) -> Box<dyn Accumulator> {
        Box::<CollectAccumulator>::default()
    }
}

// ==============================================================================
// STDEV / STDEVP
// ==============================================================================

#[derive(Debug)]
pub struct StdDevFunction {
    population: bool,
}

/// Welford's online variance
struct StdDevAccumulator {
    population: bool,
    count: u64,
    mean: f64,
    m2: f64,
}

impl Accumulator for StdDevAccumulator {
    fn update(&mut self, arguments: &[Value]) -> FunctionResult<()> {
        if let Some(x) = number_arg(arguments.first().unwrap_or(&Value::Null))? {
            self.count += 1;
            let delta = x - self.mean;
            self.mean += delta / self.count as f64;
            self.m2 += delta * (x - self.mean);
        }
        Ok(())
    }

    fn finish(&mut self) -> FunctionResult<Value> {
        let denominator = if self.population {
            self.count
        } else {
            self.count.saturating_sub(1)
        };
        if denominator == 0 {
            return Ok(Value::Float(0.0));
        }
        Ok(Value::Float((self.m2 / denominator as f64).sqrt()))
    }
}

impl AggregateFunction for StdDevFunction {
    fn name(&self) -> &str {
        if self.population {
            "stDevP"
        } else {
            "stDev"
        }
    }

    fn arity(&self) -> Arity {
        Arity::exactly(1)
    }

    fn accumulator(&self) -> Box<dyn Accumulator> {
        Box::new(StdDevAccumulator {
            population: self.population,
            count: 0,
            mean: 0.0,
            m2: 0.0,
        })
    }
}

// ==============================================================================
// PERCENTILECONT / PERCENTILEDISC
// ==============================================================================

#[derive(Debug)]
pub struct PercentileFunction {
    continuous: bool,
}

struct PercentileAccumulator {
    continuous: bool,
    values: Vec<f64>,
    percentile: Option<f64>,
}

fn percentile_arg(value: &Value) -> FunctionResult<f64> {
    match number_arg(value) {
        Ok(Some(p)) if (0.0..=1.0).contains(&p) => Ok(p),
        _ => Err(FunctionError::Argument(
            "ArgumentError: percentile must be a number in the range 0.0 to 1.0".to_string(),
        )),
    }
}

impl Accumulator for PercentileAccumulator {
    fn update(&mut self, arguments: &[Value]) -> FunctionResult<()> {
        let p = percentile_arg(arguments.get(1).unwrap_or(&Value::Null))?;
        self.percentile = Some(p);
        if let Some(x) = number_arg(arguments.first().unwrap_or(&Value::Null))? {
            self.values.push(x);
        }
        Ok(())
    }

    fn finish(&mut self) -> FunctionResult<Value> {
        let Some(p) = self.percentile else {
            return Ok(Value::Null);
        };
        if self.values.is_empty() {
            return Ok(Value::Null);
        }
        let values = &mut self.values;
        values.sort_by(f64::total_cmp);
        let n = values.len();
        if self.continuous {
            let position = p * (n - 1) as f64;
            let lower = position.floor() as usize;
            let upper = position.ceil() as usize;
            let fraction = position - lower as f64;
            let value = values[lower] + (values[upper] - values[lower]) * fraction;
            Ok(Value::Float(value))
        } else {
            let index = if p > 0.0 {
                ((p * n as f64).ceil() as usize).saturating_sub(1)
            } else {
                0
            };
            Ok(Value::Float(values[index.min(n - 1)]))
        }
    }

    fn retained_bytes(&self) -> usize {
        self.values.len() * std::mem::size_of::<f64>()
    }
}

impl AggregateFunction for PercentileFunction {
    fn name(&self) -> &str {
        if self.continuous {
            "percentileCont"
        } else {
            "percentileDisc"
        }
    }

    fn arity(&self) -> Arity {
        Arity::exactly(2)
    }

    fn accumulator(&self) -> Box<dyn Accumulator> {
        Box::new(PercentileAccumulator {
            continuous: self.continuous,
            values: Vec::new(),
            percentile: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(f: &dyn AggregateFunction, rows: &[Vec<Value>]) -> FunctionResult<Value> {
        let mut acc = f.accumulator();
        for row in rows {
            acc.update(row)?;
        }
        acc.finish()
    }

    fn single(values: &[Value]) -> Vec<Vec<Value>> {
        values.iter().map(|v| vec![v.clone()]).collect()
    }

    #[test]
    fn test_empty_group_defaults() {
        let expected = [
            ("count", Value::Integer(0)),
            ("sum", Value::Integer(0)),
            ("avg", Value::Null),
            ("min", Value::Null),
            ("max", Value::Null),
            ("collect", Value::List(vec![])),
            ("stDev", Value::Float(0.0)),
            ("stDevP", Value::Float(0.0)),
            ("percentileCont", Value::Null),
            ("percentileDisc", Value::Null),
        ];
        let all = functions();
        for (name, value) in expected {
            let f = all.iter().find(|f| f.name() == name).unwrap();
            assert_eq!(run(f.as_ref(), &[]).unwrap(), value, "{}", name);
        }
    }

    #[test]
    fn test_count_skips_nulls_unless_star() {
        let rows = single(&[Value::Integer(1), Value::Null, Value::Integer(3)]);
        assert_eq!(run(&CountFunction, &rows).unwrap(), Value::Integer(2));
        let star: Vec<Vec<Value>> = vec![vec![], vec![], vec![]];
        assert_eq!(run(&CountFunction, &star).unwrap(), Value::Integer(3));
    }

    #[test]
    fn test_sum_promotes_to_float() {
        let ints = single(&[Value::Integer(1), Value::Integer(2)]);
        assert_eq!(run(&SumFunction, &ints).unwrap(), Value::Integer(3));
        let mixed = single(&[Value::Integer(1), Value::Float(0.5), Value::Integer(2)]);
        assert_eq!(run(&SumFunction, &mixed).unwrap(), Value::Float(3.5));
        let bad = single(&[Value::from("x")]);
        assert!(matches!(
            run(&SumFunction, &bad),
            Err(FunctionError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_avg_min_max() {
        let rows = single(&[Value::Integer(2), Value::Null, Value::Integer(4), Value::Integer(9)]);
        assert_eq!(run(&AvgFunction, &rows).unwrap(), Value::Float(5.0));
        assert_eq!(
            run(&ExtremumFunction { max: false }, &rows).unwrap(),
            Value::Integer(2)
        );
        assert_eq!(
            run(&ExtremumFunction { max: true }, &rows).unwrap(),
            Value::Integer(9)
        );
    }

    #[test]
    fn test_stdev() {
        let rows = single(&[
            Value::Integer(2),
            Value::Integer(4),
            Value::Integer(4),
            Value::Integer(4),
            Value::Integer(5),
            Value::Integer(5),
            Value::Integer(7),
            Value::Integer(9),
        ]);
        let population = run(&StdDevFunction { population: true }, &rows)
            .unwrap()
            .as_f64()
            .unwrap();
        assert!((population - 2.0).abs() < 1e-9);
        let sample = run(&StdDevFunction { population: false }, &rows)
            .unwrap()
            .as_f64()
            .unwrap();
        assert!((sample - 2.138089935).abs() < 1e-6);
        let one = single(&[Value::Integer(3)]);
        assert_eq!(
            run(&StdDevFunction { population: false }, &one).unwrap(),
            Value::Float(0.0)
        );
    }

    #[test]
    fn test_percentiles() {
        let rows: Vec<Vec<Value>> = [10, 20, 30, 40]
            .iter()
            .map(|v| vec![Value::Integer(*v), Value::Float(0.5)])
            .collect();
        assert_eq!(
            run(&PercentileFunction { continuous: true }, &rows).unwrap(),
            Value::Float(25.0)
        );
        assert_eq!(
            run(&PercentileFunction { continuous: false }, &rows).unwrap(),
            Value::Float(20.0)
        );
        let bad = vec![vec![Value::Integer(1), Value::Float(1.5)]];
        assert!(matches!(
            run(&PercentileFunction { continuous: true }, &bad),
            Err(FunctionError::Argument(_))
        ));
    }

    #[test]
    fn test_collect_skips_nulls() {
        let rows = single(&[Value::Integer(1), Value::Null, Value::from("a")]);
        assert_eq!(
            run(&CollectFunction, &rows).unwrap(),
            Value::List(vec![Value::Integer(1), Value::from("a")])
        );
    }
}
