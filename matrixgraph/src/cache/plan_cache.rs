// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Query plan caching to avoid re-planning

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::plan::PlannedStatement;
use crate::storage::Graph;

/// Number of plans kept per graph unless configured otherwise
pub const DEFAULT_PLAN_CACHE_SIZE: usize = 25;

/// The parts of a graph a plan depends on. A plan is reusable only while
/// both are unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanStamp {
    pub schema_version: u64,
    pub index_epoch: u64,
}

impl PlanStamp {
    pub fn of(graph: &Graph) -> Self {
        Self {
            schema_version: graph.schema().version(),
            index_epoch: graph.indexes().epoch(),
        }
    }
}

#[derive(Debug)]
struct PlanCacheEntry {
    plan: Arc<PlannedStatement>,
    stamp: PlanStamp,
    usage_count: u64,
    last_used: Instant,
}

/// Plan cache statistics
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PlanCacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries found but planned against an older schema or index set
    pub invalidations: u64,
    pub evictions: u64,
    pub current_entries: usize,
}

impl PlanCacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct PlanCacheInner {
    entries: HashMap<String, PlanCacheEntry>,
    stats: PlanCacheStats,
}

/// Per-graph plan cache keyed by query text
#[derive(Debug)]
pub struct PlanCache {
    inner: Mutex<PlanCacheInner>,
    max_entries: usize,
}

impl Default for PlanCache {
    fn default() -> Self {
        Self::new(DEFAULT_PLAN_CACHE_SIZE)
    }
}

impl PlanCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(PlanCacheInner::default()),
            max_entries: max_entries.max(1),
        }
    }

    /// Cached plan for `query`, if one was planned under `stamp`.
    ///
    /// A stale entry is dropped and reported as a miss.
    pub fn get(&self, query: &str, stamp: PlanStamp) -> Option<Arc<PlannedStatement>> {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        match inner.entries.get_mut(query) {
            Some(entry) if entry.stamp == stamp => {
                entry.usage_count += 1;
                entry.last_used = Instant::now();
                inner.stats.hits += 1;
                log::debug!("plan cache hit ({} use(s)): {}", entry.usage_count, query);
                Some(Arc::clone(&entry.plan))
            }
            Some(_) => {
                inner.entries.remove(query);
                inner.stats.invalidations += 1;
                inner.stats.misses += 1;
                inner.stats.current_entries = inner.entries.len();
                log::debug!("plan cache entry invalidated: {}", query);
                None
            }
            None => {
                inner.stats.misses += 1;
                log::debug!("plan cache miss: {}", query);
                None
            }
        }
    }

    /// Store a plan, evicting the least recently used entry when full.
    pub fn insert(&self, query: &str, stamp: PlanStamp, plan: Arc<PlannedStatement>) {
        let mut inner = self.inner.lock();
        if !inner.entries.contains_key(query) && inner.entries.len() >= self.max_entries {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                inner.entries.remove(&oldest);
                inner.stats.evictions += 1;
            }
        }
        inner.entries.insert(
            query.to_string(),
            PlanCacheEntry {
                plan,
                stamp,
                usage_count: 0,
                last_used: Instant::now(),
            },
        );
        inner.stats.current_entries = inner.entries.len();
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.stats.current_entries = 0;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> PlanCacheStats {
        self.inner.lock().stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::IndexStatement;
    use crate::storage::EntityKind;

    fn statement() -> Arc<PlannedStatement> {
        Arc::new(PlannedStatement::CreateIndex(IndexStatement {
            entity: EntityKind::Node,
            label: "L".to_string(),
            properties: vec!["v".to_string()],
        }))
    }

    fn stamp(schema_version: u64, index_epoch: u64) -> PlanStamp {
        PlanStamp {
            schema_version,
            index_epoch,
        }
    }

    #[test]
    fn test_hit_and_miss_accounting() {
        let cache = PlanCache::new(4);
        assert!(cache.get("RETURN 1", stamp(0, 0)).is_none());
        cache.insert("RETURN 1", stamp(0, 0), statement());
        assert!(cache.get("RETURN 1", stamp(0, 0)).is_some());
        assert!(cache.get("RETURN 1", stamp(0, 0)).is_some());

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_stale_entries_are_dropped() {
        let cache = PlanCache::new(4);
        cache.insert("q", stamp(1, 0), statement());
        assert!(cache.get("q", stamp(1, 1)).is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.stats().invalidations, 1);

        cache.insert("q", stamp(1, 1), statement());
        assert!(cache.get("q", stamp(2, 1)).is_none());
    }

    #[test]
    fn test_least_recently_used_is_evicted() {
        let cache = PlanCache::new(2);
        cache.insert("a", stamp(0, 0), statement());
        std::thread::sleep(std::time::Duration::from_millis(2));
        cache.insert("b", stamp(0, 0), statement());
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(cache.get("a", stamp(0, 0)).is_some());
        cache.insert("c", stamp(0, 0), statement());

        assert_eq!(cache.len(), 2);
        assert!(cache.get("b", stamp(0, 0)).is_none());
        assert!(cache.get("a", stamp(0, 0)).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_plan_stamp_tracks_schema_and_indexes() {
        let mut graph = Graph::new("g");
        let before = PlanStamp::of(&graph);
        graph.intern_label("Person").unwrap();
        assert_ne!(PlanStamp::of(&graph), before);
    }
}
