// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Graph server
//!
//! Owns every graph key, schedules queries on a worker pool and applies
//! the readers-writer discipline per graph: read-only plans run under a
//! shared lock, anything that mutates runs under the exclusive lock.
//!
//! Index population runs on a background thread per index so that the
//! statement creating the index returns immediately.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};

use crate::ast::parse_query;
use crate::cache::{PlanCache, PlanCacheStats, PlanStamp};
use crate::coordinator::config::Config;
use crate::coordinator::slowlog::{Slowlog, SlowlogEntry};
use crate::exec::executor::{execute_read, execute_write, Execution, ExecutionRequest};
use crate::exec::{ExecResult, ExecutionError, QueryResult};
use crate::plan::{explain_statement, plan_document, PlannedStatement};
use crate::storage::indexes::IndexHandle;
use crate::storage::persistent::{load_graph, save_graph, KeyValueStore, MemoryStore};
use crate::storage::{ConstraintDefinition, ConstraintStatus, Graph, Value};

/// Entities indexed per read-lock acquisition by a population thread
pub const INDEX_POPULATION_BATCH: u64 = 10_000;

/// How a query command treats its statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    Query,
    ReadOnly,
    Profile,
    Explain,
}

impl QueryMode {
    pub fn command_name(&self) -> &'static str {
        match self {
            QueryMode::Query => "QUERY",
            QueryMode::ReadOnly => "RO_QUERY",
            QueryMode::Profile => "PROFILE",
            QueryMode::Explain => "EXPLAIN",
        }
    }
}

/// Per-request options of a query command
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub parameters: HashMap<String, Value>,
    /// Overrides the configured `TIMEOUT`, in milliseconds
    pub timeout_ms: Option<u64>,
}

impl QueryOptions {
    pub fn with_parameter(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.to_string(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// Result of one query command
#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub result: QueryResult,
    /// Operator tree; annotated with record counts and timings for PROFILE
    pub plan: Vec<String>,
}

/// One graph and the state kept alongside it
#[derive(Debug)]
pub struct GraphEntry {
    graph: RwLock<Graph>,
    plan_cache: PlanCache,
    slowlog: Slowlog,
    populations: Mutex<Vec<JoinHandle<()>>>,
}

impl GraphEntry {
    fn new(graph: Graph, cache_size: usize) -> Self {
        Self {
            graph: RwLock::new(graph),
            plan_cache: PlanCache::new(cache_size),
            slowlog: Slowlog::default(),
            populations: Mutex::new(Vec::new()),
        }
    }

    /// Shared access to the graph
    pub fn read(&self) -> RwLockReadGuard<'_, Graph> {
        self.graph.read()
    }

    pub fn plan_cache(&self) -> &PlanCache {
        &self.plan_cache
    }

    pub fn slowlog(&self) -> &Slowlog {
        &self.slowlog
    }

    /// Plan `text` against `graph`, reusing a cached plan when the schema
    /// and index set it was planned against are unchanged.
    fn plan(&self, graph: &Graph, text: &str) -> ExecResult<(Arc<PlannedStatement>, bool)> {
        let stamp = PlanStamp::of(graph);
        if let Some(plan) = self.plan_cache.get(text, stamp) {
            return Ok((plan, true));
        }
        let document = parse_query(text)?;
        let plan = Arc::new(plan_document(&document, graph)?);
        self.plan_cache.insert(text, stamp, Arc::clone(&plan));
        Ok((plan, false))
    }

    fn cancel_populations(&self) {
        for handle in self.graph.read().index_handles() {
            handle.state().cancel();
        }
    }
}

/// Releases an admission slot once the query leaves the queue
struct Admission<'a> {
    queued: &'a AtomicU64,
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        self.queued.fetch_sub(1, Ordering::AcqRel);
    }
}

/// In-process graph server
pub struct GraphServer {
    config: RwLock<Config>,
    graphs: RwLock<HashMap<String, Arc<GraphEntry>>>,
    store: Arc<dyn KeyValueStore>,
    pool: rayon::ThreadPool,
    queued: AtomicU64,
}

impl std::fmt::Debug for GraphServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphServer")
            .field("config", &*self.config.read())
            .field("graphs", &self.list())
            .finish()
    }
}

impl GraphServer {
    /// Server backed by an in-memory key/value store
    pub fn new(config: Config) -> ExecResult<Self> {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    /// Server persisting `SAVE`d graphs into `store`
    pub fn with_store(config: Config, store: Arc<dyn KeyValueStore>) -> ExecResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.thread_count.max(1) as usize)
            .thread_name(|i| format!("matrixgraph-worker-{}", i))
            .build()
            .map_err(|e| ExecutionError::Internal(format!("failed to start worker pool: {}", e)))?;
        info!(
            "graph server started with {} worker thread(s)",
            config.thread_count
        );
        Ok(Self {
            config: RwLock::new(config),
            graphs: RwLock::new(HashMap::new()),
            store,
            pool,
            queued: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> Config {
        self.config.read().clone()
    }

    /// `CONFIG GET`; `*` yields every key
    pub fn config_get(&self, key: &str) -> ExecResult<Vec<(String, u64)>> {
        let config = self.config.read();
        if key == "*" {
            return Ok(config.entries());
        }
        let value = config.get(key)?;
        Ok(vec![(key.to_ascii_uppercase(), value)])
    }

    /// `CONFIG SET`
    pub fn config_set(&self, key: &str, value: &str) -> ExecResult<()> {
        self.config.write().set(key, value)?;
        Ok(())
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Entry registered under `key`, following aliases
    pub fn graph(&self, key: &str) -> Option<Arc<GraphEntry>> {
        self.graphs.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.graphs.read().contains_key(key)
    }

    /// Entry under `key`, creating an empty graph when the key is free.
    pub fn ensure_graph(&self, key: &str) -> Arc<GraphEntry> {
        if let Some(entry) = self.graph(key) {
            return entry;
        }
        let config = self.config();
        let mut graphs = self.graphs.write();
        Arc::clone(graphs.entry(key.to_string()).or_insert_with(|| {
            info!("created graph '{}'", key);
            Arc::new(GraphEntry::new(
                Graph::with_buffer(key, config.node_creation_buffer),
                config.cache_size as usize,
            ))
        }))
    }

    fn existing(&self, key: &str) -> ExecResult<Arc<GraphEntry>> {
        self.graph(key).ok_or(ExecutionError::EmptyKey)
    }

    fn admit(&self) -> ExecResult<Admission<'_>> {
        let cap = self.config.read().max_queued_queries;
        let queued = self.queued.fetch_add(1, Ordering::AcqRel);
        let admission = Admission {
            queued: &self.queued,
        };
        if queued >= cap {
            warn!("rejecting query: {} queued, cap {}", queued, cap);
            return Err(ExecutionError::QueueFull);
        }
        Ok(admission)
    }

    /// Run a query command on the worker pool.
    pub fn query(
        &self,
        key: &str,
        text: &str,
        mode: QueryMode,
        options: QueryOptions,
    ) -> ExecResult<QueryResponse> {
        let admission = self.admit()?;
        self.pool.install(move || {
            drop(admission);
            let started = Instant::now();
            let response = self.run_query(key, text, mode, options);
            match &response {
                Ok(_) => {
                    if let (QueryMode::Query | QueryMode::ReadOnly | QueryMode::Profile, Some(entry)) =
                        (mode, self.graph(key))
                    {
                        entry.slowlog.record(
                            mode.command_name(),
                            text,
                            started.elapsed().as_secs_f64() * 1000.0,
                        );
                    }
                }
                Err(e) => debug!(
                    "{} on '{}' failed ({}): {}",
                    mode.command_name(),
                    key,
                    e.kind(),
                    e
                ),
            }
            response
        })
    }

    /// `EXPLAIN`: the plan only. A missing key is planned against an
    /// empty graph.
    pub fn explain(&self, key: &str, text: &str) -> ExecResult<Vec<String>> {
        self.query(key, text, QueryMode::Explain, QueryOptions::default())
            .map(|response| response.plan)
    }

    fn run_query(
        &self,
        key: &str,
        text: &str,
        mode: QueryMode,
        options: QueryOptions,
    ) -> ExecResult<QueryResponse> {
        let config = self.config();
        let entry = match self.graph(key) {
            Some(entry) => entry,
            None => {
                let probe = Graph::with_buffer(key, config.node_creation_buffer);
                let statement = plan_document(&parse_query(text)?, &probe)?;
                match mode {
                    QueryMode::Explain => {
                        return Ok(QueryResponse {
                            result: QueryResult::default(),
                            plan: explain_statement(&statement),
                        })
                    }
                    QueryMode::ReadOnly if statement.is_write() => {
                        return Err(ExecutionError::ReadOnlyViolation)
                    }
                    _ if !statement.is_write() => return Err(ExecutionError::EmptyKey),
                    _ => self.ensure_graph(key),
                }
            }
        };

        if mode == QueryMode::Explain {
            let graph = entry.graph.read();
            let (plan, _) = entry.plan(&graph, text)?;
            return Ok(QueryResponse {
                result: QueryResult::default(),
                plan: explain_statement(&plan),
            });
        }

        let timeout = options.timeout_ms.unwrap_or(config.timeout);
        let deadline = (timeout > 0).then(|| Instant::now() + Duration::from_millis(timeout));
        let request = ExecutionRequest::new()
            .with_parameters(options.parameters)
            .with_profile(mode == QueryMode::Profile)
            .with_deadline(deadline)
            .with_memory_limit(usize::try_from(config.query_mem_capacity).unwrap_or(usize::MAX));

        let (execution, cached) = self.execute_plan(&entry, text, mode, request)?;
        for handle in &execution.new_indexes {
            self.spawn_population(key, &entry, handle.clone());
        }
        let Execution {
            mut result, profile, ..
        } = execution;
        result.cached_execution = cached;
        Ok(QueryResponse {
            result,
            plan: profile,
        })
    }

    fn execute_plan(
        &self,
        entry: &GraphEntry,
        text: &str,
        mode: QueryMode,
        request: ExecutionRequest,
    ) -> ExecResult<(Execution, bool)> {
        {
            let graph = entry.graph.read();
            let (plan, cached) = entry.plan(&graph, text)?;
            if !plan.is_write() {
                return Ok((execute_read(&plan, &graph, request)?, cached));
            }
            if mode == QueryMode::ReadOnly {
                return Err(ExecutionError::ReadOnlyViolation);
            }
        }
        // the schema may change between the two locks, so plan again
        let mut graph = entry.graph.write();
        let (plan, cached) = entry.plan(&graph, text)?;
        Ok((execute_write(&plan, &mut graph, request)?, cached))
    }

    fn spawn_population(&self, key: &str, entry: &Arc<GraphEntry>, handle: IndexHandle) {
        let worker = Arc::clone(entry);
        let task_handle = handle.clone();
        let label = handle.definition().describe();
        info!("graph '{}': populating index {}", key, label);
        let spawned = std::thread::Builder::new()
            .name(format!("index-populate-{}", key))
            .spawn(move || populate(&worker, &task_handle, &label));
        match spawned {
            Ok(join) => {
                let mut populations = entry.populations.lock();
                populations.retain(|j| !j.is_finished());
                populations.push(join);
            }
            Err(e) => {
                warn!("failed to spawn index population thread, populating inline: {}", e);
                entry.graph.write().populate_index(&handle);
            }
        }
    }

    /// Block until every background index population on `key` finished.
    pub fn wait_for_indexes(&self, key: &str) {
        let Some(entry) = self.graph(key) else {
            return;
        };
        let joins = std::mem::take(&mut *entry.populations.lock());
        for join in joins {
            if join.join().is_err() {
                warn!("graph '{}': index population thread panicked", key);
            }
        }
    }

    /// `SLOWLOG`: slowest distinct queries, slowest first
    pub fn slowlog(&self, key: &str) -> ExecResult<Vec<SlowlogEntry>> {
        Ok(self.existing(key)?.slowlog.entries())
    }

    pub fn slowlog_reset(&self, key: &str) -> ExecResult<()> {
        self.existing(key)?.slowlog.reset();
        Ok(())
    }

    pub fn plan_cache_stats(&self, key: &str) -> ExecResult<PlanCacheStats> {
        Ok(self.existing(key)?.plan_cache.stats())
    }

    /// `ALIAS`: make `alias` another name for the graph under `key`.
    pub fn alias(&self, alias: &str, key: &str) -> ExecResult<()> {
        let mut graphs = self.graphs.write();
        let entry = graphs.get(key).cloned().ok_or(ExecutionError::EmptyKey)?;
        if graphs.contains_key(alias) {
            return Err(ExecutionError::syntax(format!(
                "Alias target '{}' already exists",
                alias
            )));
        }
        graphs.insert(alias.to_string(), entry);
        info!("aliased graph '{}' as '{}'", key, alias);
        Ok(())
    }

    /// `DELETE`: remove a key. The graph is destroyed once no other key
    /// refers to it.
    pub fn delete(&self, key: &str) -> ExecResult<()> {
        let mut graphs = self.graphs.write();
        let entry = graphs.remove(key).ok_or(ExecutionError::EmptyKey)?;
        if graphs.values().any(|other| Arc::ptr_eq(other, &entry)) {
            info!("removed key '{}'; graph still aliased", key);
            return Ok(());
        }
        drop(graphs);
        entry.cancel_populations();
        info!("deleted graph '{}'", key);
        Ok(())
    }

    /// `LIST`: every key, sorted
    pub fn list(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.graphs.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// `COPY`: serialize `src` and restore it under `dst`.
    pub fn copy(&self, src: &str, dst: &str) -> ExecResult<()> {
        if self.contains(dst) {
            return Err(ExecutionError::syntax(format!(
                "Destination key '{}' already exists",
                dst
            )));
        }
        let config = self.config();
        let max_entities = config.vkey_max_entity_count as usize;
        let scratch = MemoryStore::new();
        {
            let entry = self.existing(src)?;
            let graph = entry.graph.read();
            save_graph(&scratch, dst, &graph, max_entities)?;
        }
        let mut copy = load_graph(&scratch, dst, config.node_creation_buffer, max_entities)?;
        copy.rename(dst);
        self.install(dst, copy, false)?;
        info!("copied graph '{}' to '{}'", src, dst);
        Ok(())
    }

    /// `SAVE`: write the graph into the server's store. Returns the number
    /// of virtual-key chunks written.
    pub fn save(&self, key: &str) -> ExecResult<usize> {
        let max_entities = self.config.read().vkey_max_entity_count as usize;
        let entry = self.existing(key)?;
        let graph = entry.graph.read();
        let chunks = save_graph(self.store.as_ref(), key, &graph, max_entities)?;
        info!("saved graph '{}' in {} chunk(s)", key, chunks);
        Ok(chunks)
    }

    /// `RESTORE`: load the graph stored under `store_key` as `key`,
    /// replacing any graph currently registered there.
    pub fn restore(&self, key: &str, store_key: &str) -> ExecResult<()> {
        let config = self.config();
        let mut graph = load_graph(
            self.store.as_ref(),
            store_key,
            config.node_creation_buffer,
            config.vkey_max_entity_count as usize,
        )?;
        graph.rename(key);
        self.install(key, graph, true)?;
        info!("restored graph '{}' from '{}'", key, store_key);
        Ok(())
    }

    fn install(&self, key: &str, graph: Graph, replace: bool) -> ExecResult<()> {
        let cache_size = self.config.read().cache_size as usize;
        let mut graphs = self.graphs.write();
        if !replace && graphs.contains_key(key) {
            return Err(ExecutionError::syntax(format!("Key '{}' already exists", key)));
        }
        let previous = graphs.insert(key.to_string(), Arc::new(GraphEntry::new(graph, cache_size)));
        drop(graphs);
        if let Some(previous) = previous {
            previous.cancel_populations();
        }
        Ok(())
    }

    /// `CONSTRAINT CREATE`
    pub fn create_constraint(
        &self,
        key: &str,
        definition: ConstraintDefinition,
    ) -> ExecResult<ConstraintStatus> {
        let entry = self.ensure_graph(key);
        let mut graph = entry.graph.write();
        Ok(graph.create_constraint(definition)?)
    }

    /// `CONSTRAINT DROP`
    pub fn drop_constraint(&self, key: &str, definition: &ConstraintDefinition) -> ExecResult<()> {
        let entry = self.existing(key)?;
        let mut graph = entry.graph.write();
        graph.drop_constraint(definition)?;
        Ok(())
    }
}

impl Drop for GraphServer {
    fn drop(&mut self) {
        for entry in self.graphs.get_mut().values() {
            entry.cancel_populations();
        }
    }
}

fn populate(entry: &GraphEntry, handle: &IndexHandle, label: &str) {
    let mut next = Some(0);
    while let Some(start) = next {
        if handle.state().is_cancelled() {
            info!("index {} population cancelled", label);
            return;
        }
        next = entry
            .graph
            .read()
            .populate_index_batch(handle, start, INDEX_POPULATION_BATCH);
    }
    let mut graph = entry.graph.write();
    if handle.state().is_cancelled() {
        info!("index {} population cancelled", label);
        return;
    }
    handle.state().mark_operational();
    graph.index_became_operational();
    info!("graph '{}': index {} is operational", graph.name(), label);
}
