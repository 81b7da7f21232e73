// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Function execution system for query processing
//!
//! Scalar functions implement [`Function`] and aggregates implement
//! [`AggregateFunction`]; both are registered once in the process-wide
//! [`FunctionRegistry`]. Lookups are case-insensitive.

mod aggregate_functions;
mod function_trait;
mod graph_functions;
mod list_functions;
mod null_functions;
mod numeric_functions;
mod special_functions;
mod string_functions;

pub use function_trait::{
    Accumulator, AggregateFunction, Arity, BuiltinFunction, Function, FunctionContext,
    FunctionError, FunctionResult,
};

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;

/// Registry of all available functions
#[derive(Debug)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn Function>>,
    aggregates: HashMap<String, Arc<dyn AggregateFunction>>,
}

impl FunctionRegistry {
    /// Create a registry holding every built-in
    pub fn new() -> Self {
        let mut registry = Self {
            functions: HashMap::new(),
            aggregates: HashMap::new(),
        };

        let scalars = string_functions::functions()
            .into_iter()
            .chain(numeric_functions::functions())
            .chain(list_functions::functions())
            .chain(graph_functions::functions())
            .chain(null_functions::functions())
            .chain(special_functions::functions());
        for function in scalars {
            registry.register(Arc::new(function));
        }
        for aggregate in aggregate_functions::functions() {
            registry.register_aggregate(Arc::from(aggregate));
        }
        registry
    }

    pub fn register(&mut self, function: Arc<dyn Function>) {
        self.functions
            .insert(function.name().to_lowercase(), function);
    }

    pub fn register_aggregate(&mut self, function: Arc<dyn AggregateFunction>) {
        self.aggregates
            .insert(function.name().to_lowercase(), function);
    }

    /// Look up a scalar function
    pub fn get(&self, name: &str) -> Option<Arc<dyn Function>> {
        self.functions.get(&name.to_lowercase()).cloned()
    }

    /// Look up an aggregate function
    pub fn get_aggregate(&self, name: &str) -> Option<Arc<dyn AggregateFunction>> {
        self.aggregates.get(&name.to_lowercase()).cloned()
    }

    pub fn is_aggregate(&self, name: &str) -> bool {
        self.aggregates.contains_key(&name.to_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        let key = name.to_lowercase();
        self.functions.contains_key(&key) || self.aggregates.contains_key(&key)
    }

    /// Registered names, sorted
    pub fn function_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .functions
            .values()
            .map(|f| f.name().to_string())
            .chain(self.aggregates.values().map(|f| f.name().to_string()))
            .collect();
        names.sort();
        names
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static REGISTRY: Lazy<FunctionRegistry> = Lazy::new(FunctionRegistry::new);

/// The process-wide registry
pub fn registry() -> &'static FunctionRegistry {
    &REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_lookup() {
        let r = registry();
        assert!(r.get("toUpper").is_some());
        assert!(r.get("TOUPPER").is_some());
        assert!(r.get("tolower").is_some());
        assert!(r.get("nosuch").is_none());
    }

    #[test]
    fn test_aggregates_are_separate() {
        let r = registry();
        assert!(r.is_aggregate("COUNT"));
        assert!(r.is_aggregate("percentileDisc"));
        assert!(!r.is_aggregate("size"));
        assert!(r.get("count").is_none());
        assert!(r.get_aggregate("stdevp").is_some());
    }

    #[test]
    fn test_every_listed_builtin_is_registered() {
        let r = registry();
        for name in [
            "id", "labels", "type", "properties", "keys", "startNode", "endNode", "hasLabels",
            "exists", "coalesce", "size", "length", "nodes", "relationships", "head", "last",
            "tail", "range", "reverse", "toUpper", "toLower", "trim", "lTrim", "rTrim", "left",
            "right", "substring", "replace", "split", "toString", "toInteger", "toFloat",
            "toBoolean", "abs", "ceil", "floor", "round", "sign", "sqrt", "exp", "log", "log10",
            "rand", "pi", "e", "timestamp", "point", "distance", "indegree", "outdegree",
        ] {
            assert!(r.contains(name), "{} missing", name);
        }
        assert!(!r.get("rand").unwrap().is_deterministic());
    }
}
