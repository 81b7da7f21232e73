// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Per-query memory budget
//!
//! Operators that buffer records (sort, aggregate, distinct, eager writes,
//! result sets) charge their buffers here and release them on close. A limit
//! of zero means unlimited.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::exec::error::ExecutionError;

#[derive(Clone)]
pub struct MemoryBudget {
    /// Maximum allowed memory in bytes; 0 disables the check
    limit: usize,

    /// Currently allocated memory
    allocated: Arc<AtomicUsize>,

    /// Peak allocated memory, reported by PROFILE
    peak: Arc<AtomicUsize>,
}

impl std::fmt::Debug for MemoryBudget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBudget")
            .field("limit", &self.limit)
            .field("allocated", &self.allocated.load(Ordering::SeqCst))
            .field("peak", &self.peak.load(Ordering::SeqCst))
            .finish()
    }
}

impl MemoryBudget {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            allocated: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0)
    }

    pub fn is_limited(&self) -> bool {
        self.limit > 0
    }

    /// Charge `bytes` against the budget.
    ///
    /// On failure nothing stays charged.
    pub fn allocate(&self, bytes: usize) -> Result<(), ExecutionError> {
        let current = self.allocated.fetch_add(bytes, Ordering::SeqCst);
        let new_total = current.saturating_add(bytes);
        self.peak.fetch_max(new_total, Ordering::SeqCst);

        if self.is_limited() && new_total > self.limit {
            self.allocated.fetch_sub(bytes, Ordering::SeqCst);
            return Err(ExecutionError::MemoryLimitExceeded {
                limit: self.limit,
                requested: new_total,
            });
        }
        Ok(())
    }

    /// Check that a transient allocation of `bytes` would fit, without
    /// keeping it charged.
    pub fn check(&self, bytes: usize) -> Result<(), ExecutionError> {
        self.allocate(bytes)?;
        self.release(bytes);
        Ok(())
    }

    pub fn release(&self, bytes: usize) {
        let _ = self
            .allocated
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_sub(bytes))
            });
    }

    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// Running charge held by one operator, released in bulk on close.
#[derive(Debug, Default)]
pub struct MemoryCharge {
    bytes: usize,
}

impl MemoryCharge {
    pub fn add(&mut self, budget: &MemoryBudget, bytes: usize) -> Result<(), ExecutionError> {
        budget.allocate(bytes)?;
        self.bytes += bytes;
        Ok(())
    }

    pub fn release(&mut self, budget: &MemoryBudget) {
        budget.release(self.bytes);
        self.bytes = 0;
    }
}
