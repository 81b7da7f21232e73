// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Built-in procedures reachable through `CALL`
//!
//! Every procedure declares its output columns up front so the planner can
//! bind `YIELD` items to record slots. Invocation returns one row per
//! output record, in declaration order.

mod algorithms;
mod fulltext;
mod schema;

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::exec::{ExecResult, ExecutionContext, ExecutionError};
use crate::functions::Arity;
use crate::storage::Value;

pub trait Procedure: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    fn arity(&self) -> Arity;

    /// Output column names
    fn outputs(&self) -> &[&'static str];

    /// Whether the procedure mutates the graph or its schema
    fn is_write(&self) -> bool {
        false
    }

    fn invoke(&self, ctx: &mut ExecutionContext<'_>, arguments: &[Value]) -> ExecResult<Vec<Vec<Value>>>;

    /// Validate the argument count at plan time.
    fn check_arity(&self, actual: usize) -> ExecResult<()> {
        let arity = self.arity();
        let fits = actual >= arity.min && arity.max.map(|m| actual <= m).unwrap_or(true);
        if fits {
            return Ok(());
        }
        Err(ExecutionError::syntax(format!(
            "Procedure `{}` requires {} arguments, got {}",
            self.name(),
            match arity.max {
                Some(max) if max == arity.min => max.to_string(),
                Some(max) => format!("{} to {}", arity.min, max),
                None => format!("at least {}", arity.min),
            },
            actual
        )))
    }
}

/// Signature of a built-in procedure body
pub type ProcedureBody = fn(&mut ExecutionContext<'_>, &[Value]) -> ExecResult<Vec<Vec<Value>>>;

/// Procedure backed by a plain function pointer
#[derive(Debug)]
pub struct BuiltinProcedure {
    name: &'static str,
    arity: Arity,
    outputs: &'static [&'static str],
    body: ProcedureBody,
    write: bool,
}

impl BuiltinProcedure {
    pub const fn new(
        name: &'static str,
        arity: Arity,
        outputs: &'static [&'static str],
        body: ProcedureBody,
    ) -> Self {
        Self {
            name,
            arity,
            outputs,
            body,
            write: false,
        }
    }

    pub const fn writing(mut self) -> Self {
        self.write = true;
        self
    }
}

impl Procedure for BuiltinProcedure {
    fn name(&self) -> &str {
        self.name
    }

    fn arity(&self) -> Arity {
        self.arity
    }

    fn outputs(&self) -> &[&'static str] {
        self.outputs
    }

    fn is_write(&self) -> bool {
        self.write
    }

    fn invoke(&self, ctx: &mut ExecutionContext<'_>, arguments: &[Value]) -> ExecResult<Vec<Vec<Value>>> {
        (self.body)(ctx, arguments)
    }
}

/// Registry of callable procedures, keyed by lowercase name
#[derive(Debug)]
pub struct ProcedureRegistry {
    procedures: HashMap<String, Arc<dyn Procedure>>,
}

impl ProcedureRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            procedures: HashMap::new(),
        };
        for procedure in schema::procedures()
            .into_iter()
            .chain(fulltext::procedures())
            .chain(algorithms::procedures())
        {
            registry.register(Arc::new(procedure));
        }
        registry
    }

    pub fn register(&mut self, procedure: Arc<dyn Procedure>) {
        self.procedures
            .insert(procedure.name().to_lowercase(), procedure);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Procedure>> {
        self.procedures.get(&name.to_lowercase()).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .procedures
            .values()
            .map(|p| p.name().to_string())
            .collect();
        names.sort();
        names
    }
}

impl Default for ProcedureRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static PROCEDURES: Lazy<ProcedureRegistry> = Lazy::new(ProcedureRegistry::new);

pub fn procedures() -> &'static ProcedureRegistry {
    &PROCEDURES
}

/// Name of a string argument, or a type mismatch
pub(crate) fn string_argument<'v>(procedure: &str, value: &'v Value) -> ExecResult<&'v str> {
    value.as_str().ok_or_else(|| {
        ExecutionError::type_mismatch(
            "String",
            format!("{} in a call to {}", value.type_name(), procedure),
        )
    })
}
