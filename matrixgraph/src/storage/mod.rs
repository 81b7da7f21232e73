// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Storage layer
//!
//! In-memory graph store with matrix views, schema registry, indexes,
//! constraints and virtual-key persistence.

pub mod constraints;
pub mod data_block;
pub mod graph;
pub mod indexes;
pub mod matrix;
pub mod persistent;
pub mod schema;
pub mod types;
pub mod value;

pub use constraints::{Constraint, ConstraintDefinition, ConstraintKind, ConstraintStatus};
pub use graph::{Graph, DEFAULT_NODE_CREATION_BUFFER};
pub use schema::Schema;
pub use types::*;
pub use value::{EdgeValue, NodeValue, PathValue, Point, Value};
