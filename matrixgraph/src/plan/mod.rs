// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Query planning: scopes, expression compilation, logical plans

pub mod compile;
pub mod explain;
pub mod expr;
pub mod logical;
pub mod pattern;
pub mod planner;
pub mod scope;

pub use explain::{explain, explain_statement};
pub use expr::{Expr, PathPart};
pub use logical::{LogicalOp, LogicalPlan, PlannedStatement, QueryPlan};
pub use planner::plan_document;
pub use scope::{Scope, VarKind};
