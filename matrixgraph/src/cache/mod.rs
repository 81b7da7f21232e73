// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Caching of planned statements
//!
//! Plans are immutable logical trees, so a cached plan can be executed any
//! number of times; every execution builds fresh operators from it.

pub mod plan_cache;

pub use plan_cache::{PlanCache, PlanCacheStats, PlanStamp, DEFAULT_PLAN_CACHE_SIZE};
