// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Secondary indexes
//!
//! Two kinds are supported:
//! - exact-match indexes over one or more properties of a label or relation type
//! - full-text indexes over string properties of a label
//!
//! Index objects are shared (`Arc`) between the owning graph and the
//! background task that performs the initial population.

pub mod errors;
pub mod exact;
pub mod fulltext;
pub mod manager;
pub mod types;

pub use errors::*;
pub use exact::ExactMatchIndex;
pub use fulltext::FullTextIndex;
pub use manager::*;
pub use types::*;
