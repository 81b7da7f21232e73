// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Graph persistence
//!
//! Stores serialized graphs in a [`KeyValueStore`] as virtual-key chunks
//! (see [`codec`]). Loading accepts every supported encoding version and
//! rewrites older ones in the current format.

pub mod codec;
pub mod file;
pub mod memory;
pub mod traits;

pub use codec::{chunk_key, decode_graph, encode_graph, DecodedGraph, CURRENT_VERSION};
pub use file::DirectoryStore;
pub use memory::MemoryStore;
pub use traits::{KeyValueStore, StorageResult};

use log::{debug, info};

use crate::storage::graph::Graph;

/// Write `graph` under `key`, removing chunk keys left over from a larger
/// previous save. Returns the number of chunks written.
pub fn save_graph(
    store: &dyn KeyValueStore,
    key: &str,
    graph: &Graph,
    max_entities: usize,
) -> StorageResult<usize> {
    let chunks = encode_graph(graph, key, max_entities)?;
    let count = chunks.len();
    for (chunk, bytes) in &chunks {
        store.put(chunk, bytes)?;
    }
    remove_chunks_from(store, key, count)?;
    store.flush()?;
    debug!(
        "saved graph '{}' under '{}' in {} chunk(s)",
        graph.name(),
        key,
        count
    );
    Ok(count)
}

fn remove_chunks_from(store: &dyn KeyValueStore, key: &str, first: usize) -> StorageResult<()> {
    let mut index = first.max(1);
    loop {
        let stale = chunk_key(key, index);
        if !store.contains(&stale)? {
            return Ok(());
        }
        store.delete(&stale)?;
        index += 1;
    }
}

/// Load the graph stored under `key`. Older encodings are upgraded in place.
pub fn load_graph(
    store: &dyn KeyValueStore,
    key: &str,
    node_creation_buffer: u64,
    max_entities: usize,
) -> StorageResult<Graph> {
    let DecodedGraph { graph, version } = decode_graph(store, key, node_creation_buffer)?;
    if version < CURRENT_VERSION {
        info!(
            "upgrading graph '{}' from encoding v{} to v{}",
            key, version, CURRENT_VERSION
        );
        save_graph(store, key, &graph, max_entities)?;
    }
    Ok(graph)
}

/// Remove every chunk stored under `key`.
pub fn delete_graph(store: &dyn KeyValueStore, key: &str) -> StorageResult<()> {
    store.delete(key)?;
    remove_chunks_from(store, key, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::PropertyMap;

    fn graph_with_nodes(n: usize) -> Graph {
        let mut g = Graph::new("g");
        for _ in 0..n {
            g.create_node(&[], PropertyMap::new()).unwrap();
        }
        g.commit().unwrap();
        g
    }

    #[test]
    fn test_resave_removes_stale_chunks() {
        let store = MemoryStore::new();
        assert_eq!(save_graph(&store, "k", &graph_with_nodes(10), 2).unwrap(), 5);
        assert!(store.contains("k_4").unwrap());
        assert_eq!(save_graph(&store, "k", &graph_with_nodes(3), 2).unwrap(), 2);
        assert!(store.contains("k_1").unwrap());
        assert!(!store.contains("k_2").unwrap());
        assert!(!store.contains("k_4").unwrap());
    }

    #[test]
    fn test_legacy_encoding_is_upgraded() {
        let store = MemoryStore::new();
        store
            .put("old", &codec::legacy::encode_v1(&graph_with_nodes(4)))
            .unwrap();
        let graph = load_graph(&store, "old", 128, 100).unwrap();
        assert_eq!(graph.node_count(), 4);
        let again = decode_graph(&store, "old", 128).unwrap();
        assert_eq!(again.version, CURRENT_VERSION);
    }

    #[test]
    fn test_delete_graph_removes_all_chunks() {
        let store = MemoryStore::new();
        save_graph(&store, "k", &graph_with_nodes(5), 2).unwrap();
        delete_graph(&store, "k").unwrap();
        assert!(store.is_empty());
    }
}
