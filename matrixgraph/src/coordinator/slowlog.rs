// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Per-graph log of the slowest distinct queries

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

/// Entries kept per graph
pub const SLOWLOG_CAPACITY: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlowlogEntry {
    pub timestamp: DateTime<Utc>,
    pub command: String,
    pub query: String,
    pub elapsed_ms: f64,
}

#[derive(Debug)]
pub struct Slowlog {
    entries: Mutex<Vec<SlowlogEntry>>,
    capacity: usize,
}

impl Default for Slowlog {
    fn default() -> Self {
        Self::new(SLOWLOG_CAPACITY)
    }
}

impl Slowlog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    /// Record one execution. A query already present keeps its maximum
    /// time; when full, a slower query replaces the fastest entry.
    pub fn record(&self, command: &str, query: &str, elapsed_ms: f64) {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries
            .iter_mut()
            .find(|e| e.command == command && e.query == query)
        {
            if elapsed_ms > existing.elapsed_ms {
                existing.elapsed_ms = elapsed_ms;
                existing.timestamp = Utc::now();
            }
            return;
        }

        let entry = SlowlogEntry {
            timestamp: Utc::now(),
            command: command.to_string(),
            query: query.to_string(),
            elapsed_ms,
        };
        if entries.len() < self.capacity {
            entries.push(entry);
            return;
        }
        let fastest = entries
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.elapsed_ms.total_cmp(&b.1.elapsed_ms))
            .map(|(i, e)| (i, e.elapsed_ms));
        if let Some((index, fastest_ms)) = fastest {
            if elapsed_ms > fastest_ms {
                log::debug!("slowlog admits '{}' ({:.3} ms)", query, elapsed_ms);
                entries[index] = entry;
            }
        }
    }

    /// Entries, slowest first
    pub fn entries(&self) -> Vec<SlowlogEntry> {
        let mut entries = self.entries.lock().clone();
        entries.sort_by(|a, b| b.elapsed_ms.total_cmp(&a.elapsed_ms));
        entries
    }

    pub fn reset(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_query_keeps_maximum() {
        let log = Slowlog::default();
        log.record("QUERY", "RETURN 1", 5.0);
        log.record("QUERY", "RETURN 1", 2.0);
        log.record("QUERY", "RETURN 1", 7.0);
        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].elapsed_ms, 7.0);
    }

    #[test]
    fn test_fastest_entry_is_evicted_when_full() {
        let log = Slowlog::new(3);
        log.record("QUERY", "a", 3.0);
        log.record("QUERY", "b", 1.0);
        log.record("QUERY", "c", 2.0);
        log.record("QUERY", "d", 0.5);
        assert_eq!(log.len(), 3);
        assert!(log.entries().iter().all(|e| e.query != "d"));

        log.record("QUERY", "e", 10.0);
        let queries: Vec<String> = log.entries().into_iter().map(|e| e.query).collect();
        assert_eq!(queries, vec!["e", "a", "c"]);
    }

    #[test]
    fn test_commands_are_distinct() {
        let log = Slowlog::default();
        log.record("QUERY", "RETURN 1", 1.0);
        log.record("RO_QUERY", "RETURN 1", 1.0);
        assert_eq!(log.len(), 2);
        log.reset();
        assert!(log.is_empty());
    }
}
