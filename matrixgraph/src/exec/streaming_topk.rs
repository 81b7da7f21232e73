// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Streaming top-K for `ORDER BY ... LIMIT`
//!
//! Keeps only the K best records in a bounded max-heap whose root is the
//! worst record kept, instead of sorting the whole input. Ties keep arrival
//! order, so the result matches a stable full sort truncated to K.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::exec::Record;
use crate::storage::Value;

/// Compare two sort-key tuples; `descending[i]` flips key `i`.
pub fn compare_keys(a: &[Value], b: &[Value], descending: &[bool]) -> Ordering {
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let ord = x.total_cmp(y);
        let ord = if descending.get(i).copied().unwrap_or(false) {
            ord.reverse()
        } else {
            ord
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

struct RankedRecord {
    keys: Vec<Value>,
    sequence: u64,
    record: Record,
    descending: Arc<[bool]>,
}

impl Ord for RankedRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_keys(&self.keys, &other.keys, &self.descending)
            .then_with(|| self.sequence.cmp(&other.sequence))
    }
}

impl PartialOrd for RankedRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Eq for RankedRecord {}

impl PartialEq for RankedRecord {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

pub struct StreamingTopK {
    heap: BinaryHeap<RankedRecord>,
    k: usize,
    descending: Arc<[bool]>,
    processed: u64,
}

impl StreamingTopK {
    pub fn new(k: usize, descending: Vec<bool>) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(k.min(1024)),
            k,
            descending: descending.into(),
            processed: 0,
        }
    }

    /// Offer a record. Returns true when it was kept (possibly evicting
    /// the current worst one).
    pub fn add(&mut self, keys: Vec<Value>, record: Record) -> bool {
        let candidate = RankedRecord {
            keys,
            sequence: self.processed,
            record,
            descending: Arc::clone(&self.descending),
        };
        self.processed += 1;

        if self.k == 0 {
            return false;
        }
        if self.heap.len() < self.k {
            self.heap.push(candidate);
            return true;
        }
        match self.heap.peek() {
            Some(worst) if candidate < *worst => {
                self.heap.pop();
                self.heap.push(candidate);
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Number of records offered so far
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Records in sort order, best first
    pub fn into_sorted(self) -> Vec<Record> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|r| r.record)
            .collect()
    }
}
