// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Query execution
//!
//! Physical operators form a pull pipeline over fixed-width records whose
//! slots are assigned by the planner. The [`executor`] drives a plan to
//! completion inside an [`ExecutionContext`] and packages a
//! [`QueryResult`].

pub mod context;
pub mod error;
pub mod eval;
pub mod executor;
pub mod memory_budget;
pub mod operators;
pub mod result;
pub mod streaming_topk;

pub use context::{ExecutionContext, GraphAccess};
pub use error::{ErrorKind, ExecResult, ExecutionError};
pub use memory_budget::{MemoryBudget, MemoryCharge};
pub use result::{QueryResult, QueryStatistics};

use crate::storage::Value;

/// A row flowing between operators. Slots past the end read as null.
pub type Record = Vec<Value>;

static NULL: Value = Value::Null;

/// Value held in `slot`, or null when the record is shorter.
pub(crate) fn slot_value(record: &Record, slot: usize) -> &Value {
    record.get(slot).unwrap_or(&NULL)
}

/// Store `value` in `slot`, growing the record with nulls as needed.
pub(crate) fn set_slot(record: &mut Record, slot: usize, value: Value) {
    if record.len() <= slot {
        record.resize(slot + 1, Value::Null);
    }
    record[slot] = value;
}

/// Approximate heap footprint of a record, charged by buffering operators.
pub(crate) fn record_size(record: &Record) -> usize {
    std::mem::size_of::<Record>() + record.iter().map(Value::estimated_size).sum::<usize>()
}
