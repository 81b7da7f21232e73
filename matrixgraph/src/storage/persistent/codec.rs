// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Virtual-key graph encoding
//!
//! A graph is written as a sequence of chunks ("virtual keys"), each holding
//! at most `max_entities` entities. Chunk 0 lives under the master key and
//! carries the header; chunk `i` lives under `<key>_<i>`.
//!
//! Every chunk starts with the magic `MGVK` and a version byte:
//!
//! | version | layout                                                          |
//! |---------|-----------------------------------------------------------------|
//! | 3       | bincode chunk + CRC32 of the body; header has index/constraint defs |
//! | 2       | bincode chunk, no checksum, no index or constraint definitions  |
//! | 1       | one unchunked blob; properties keyed by name; compacted ids      |
//!
//! Only version 3 is written. Older versions are decoded and upgraded by
//! the caller.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::traits::{KeyValueStore, StorageResult};
use crate::storage::constraints::ConstraintDefinition;
use crate::storage::graph::Graph;
use crate::storage::indexes::IndexDefinition;
use crate::storage::schema::Schema;
use crate::storage::types::{
    EdgeId, EdgeRecord, NodeId, NodeRecord, PropertyMap, StorageError,
};
use crate::storage::value::Value;

pub const MAGIC: &[u8; 4] = b"MGVK";
pub const CURRENT_VERSION: u8 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Header {
    name: String,
    labels: Vec<String>,
    relations: Vec<String>,
    attributes: Vec<String>,
    indexes: Vec<IndexDefinition>,
    constraints: Vec<ConstraintDefinition>,
    node_count: u64,
    edge_count: u64,
    node_high_water: u64,
    edge_high_water: u64,
    chunk_keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Segment {
    Nodes(Vec<(NodeId, NodeRecord)>),
    DeletedNodes(Vec<NodeId>),
    Edges(Vec<(EdgeId, EdgeRecord)>),
    DeletedEdges(Vec<EdgeId>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Chunk {
    index: u32,
    header: Option<Header>,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HeaderV2 {
    name: String,
    labels: Vec<String>,
    relations: Vec<String>,
    attributes: Vec<String>,
    node_count: u64,
    edge_count: u64,
    chunk_keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChunkV2 {
    index: u32,
    header: Option<HeaderV2>,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NodeV1 {
    labels: Vec<String>,
    properties: Vec<(String, Value)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EdgeV1 {
    relation: String,
    src: u64,
    dst: u64,
    properties: Vec<(String, Value)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GraphV1 {
    name: String,
    nodes: Vec<NodeV1>,
    edges: Vec<EdgeV1>,
}

/// A graph read back from a store
#[derive(Debug)]
pub struct DecodedGraph {
    pub graph: Graph,
    /// Encoding version found under the master key
    pub version: u8,
}

/// Key of chunk `index` for master key `key`
pub fn chunk_key(key: &str, index: usize) -> String {
    if index == 0 {
        key.to_string()
    } else {
        format!("{}_{}", key, index)
    }
}

fn serialization_error(err: bincode::Error) -> StorageError {
    StorageError::Serialization(err.to_string())
}

fn corrupted(key: &str, reason: impl Into<String>) -> StorageError {
    StorageError::Corrupted {
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// Splits the entity stream into chunks of bounded size, grouping runs of
/// the same kind into one segment.
struct ChunkBuilder {
    max: usize,
    chunks: Vec<Vec<Segment>>,
    used: usize,
}

impl ChunkBuilder {
    fn new(max: usize) -> Self {
        Self {
            max: max.max(1),
            chunks: vec![Vec::new()],
            used: 0,
        }
    }

    fn room(&mut self) -> &mut Vec<Segment> {
        if self.used == self.max {
            self.chunks.push(Vec::new());
            self.used = 0;
        }
        self.used += 1;
        let last = self.chunks.len() - 1;
        &mut self.chunks[last]
    }

    fn push_node(&mut self, id: NodeId, record: NodeRecord) {
        let segments = self.room();
        match segments.last_mut() {
            Some(Segment::Nodes(v)) => v.push((id, record)),
            _ => segments.push(Segment::Nodes(vec![(id, record)])),
        }
    }

    fn push_deleted_node(&mut self, id: NodeId) {
        let segments = self.room();
        match segments.last_mut() {
            Some(Segment::DeletedNodes(v)) => v.push(id),
            _ => segments.push(Segment::DeletedNodes(vec![id])),
        }
    }

    fn push_edge(&mut self, id: EdgeId, record: EdgeRecord) {
        let segments = self.room();
        match segments.last_mut() {
            Some(Segment::Edges(v)) => v.push((id, record)),
            _ => segments.push(Segment::Edges(vec![(id, record)])),
        }
    }

    fn push_deleted_edge(&mut self, id: EdgeId) {
        let segments = self.room();
        match segments.last_mut() {
            Some(Segment::DeletedEdges(v)) => v.push(id),
            _ => segments.push(Segment::DeletedEdges(vec![id])),
        }
    }
}

fn chunk_segments(graph: &Graph, max_entities: usize) -> Vec<Vec<Segment>> {
    let mut builder = ChunkBuilder::new(max_entities);
    for (id, record) in graph.nodes() {
        builder.push_node(id, record.clone());
    }
    for id in graph.deleted_node_ids() {
        builder.push_deleted_node(id);
    }
    for (id, record) in graph.edges() {
        builder.push_edge(id, record.clone());
    }
    for id in graph.deleted_edge_ids() {
        builder.push_deleted_edge(id);
    }
    builder.chunks
}

fn frame(version: u8, body: &[u8], checksum: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 9);
    out.extend_from_slice(MAGIC);
    out.push(version);
    out.extend_from_slice(body);
    if checksum {
        out.extend_from_slice(&crc32fast::hash(body).to_le_bytes());
    }
    out
}

/// Encode `graph` for master key `key`. Returns `(key, bytes)` per chunk,
/// master chunk first.
pub fn encode_graph(
    graph: &Graph,
    key: &str,
    max_entities: usize,
) -> StorageResult<Vec<(String, Vec<u8>)>> {
    let chunks = chunk_segments(graph, max_entities);
    let schema = graph.schema();
    let header = Header {
        name: graph.name().to_string(),
        labels: schema.labels().to_vec(),
        relations: schema.relations().to_vec(),
        attributes: schema.attributes().to_vec(),
        indexes: graph.index_definitions(),
        constraints: graph
            .constraints()
            .iter()
            .map(|c| c.definition.clone())
            .collect(),
        node_count: graph.node_count() as u64,
        edge_count: graph.edge_count() as u64,
        node_high_water: graph.deleted_node_ids().last().map(|i| i + 1).unwrap_or(0).max(
            graph.nodes().last().map(|(i, _)| i + 1).unwrap_or(0),
        ),
        edge_high_water: graph.deleted_edge_ids().last().map(|i| i + 1).unwrap_or(0).max(
            graph.edges().last().map(|(i, _)| i + 1).unwrap_or(0),
        ),
        chunk_keys: (1..chunks.len()).map(|i| chunk_key(key, i)).collect(),
    };

    let mut out = Vec::with_capacity(chunks.len());
    for (index, segments) in chunks.into_iter().enumerate() {
        let chunk = Chunk {
            index: index as u32,
            header: (index == 0).then(|| header.clone()),
            segments,
        };
        let body = bincode::serialize(&chunk).map_err(serialization_error)?;
        out.push((chunk_key(key, index), frame(CURRENT_VERSION, &body, true)));
    }
    Ok(out)
}

fn split_frame<'a>(key: &str, bytes: &'a [u8]) -> StorageResult<(u8, &'a [u8])> {
    if bytes.len() < 5 || &bytes[..4] != MAGIC {
        return Err(corrupted(key, "missing magic"));
    }
    Ok((bytes[4], &bytes[5..]))
}

fn checked_body<'a>(key: &str, payload: &'a [u8]) -> StorageResult<&'a [u8]> {
    if payload.len() < 4 {
        return Err(corrupted(key, "truncated chunk"));
    }
    let (body, tail) = payload.split_at(payload.len() - 4);
    let mut crc = [0u8; 4];
    crc.copy_from_slice(tail);
    if crc32fast::hash(body) != u32::from_le_bytes(crc) {
        return Err(corrupted(key, "checksum mismatch"));
    }
    Ok(body)
}

fn read_chunk(store: &dyn KeyValueStore, key: &str) -> StorageResult<Vec<u8>> {
    store
        .get(key)?
        .ok_or_else(|| corrupted(key, "chunk is missing"))
}

/// Decoded chunked content, independent of the version that produced it
struct Assembled {
    labels: Vec<String>,
    relations: Vec<String>,
    attributes: Vec<String>,
    indexes: Vec<IndexDefinition>,
    constraints: Vec<ConstraintDefinition>,
    node_count: u64,
    edge_count: u64,
    high_water: Option<(u64, u64)>,
    segments: Vec<Segment>,
}

fn decode_v3(store: &dyn KeyValueStore, key: &str, payload: &[u8]) -> StorageResult<Assembled> {
    let master: Chunk =
        bincode::deserialize(checked_body(key, payload)?).map_err(serialization_error)?;
    let header = master
        .header
        .ok_or_else(|| corrupted(key, "master chunk has no header"))?;
    let mut segments = master.segments;
    for (i, chunk_key) in header.chunk_keys.iter().enumerate() {
        let bytes = read_chunk(store, chunk_key)?;
        let (version, payload) = split_frame(chunk_key, &bytes)?;
        if version != 3 {
            return Err(corrupted(chunk_key, format!("unexpected chunk version {}", version)));
        }
        let chunk: Chunk = bincode::deserialize(checked_body(chunk_key, payload)?)
            .map_err(serialization_error)?;
        if chunk.index as usize != i + 1 {
            return Err(corrupted(chunk_key, "chunk out of order"));
        }
        segments.extend(chunk.segments);
    }
    Ok(Assembled {
        labels: header.labels,
        relations: header.relations,
        attributes: header.attributes,
        indexes: header.indexes,
        constraints: header.constraints,
        node_count: header.node_count,
        edge_count: header.edge_count,
        high_water: Some((header.node_high_water, header.edge_high_water)),
        segments,
    })
}

fn decode_v2(store: &dyn KeyValueStore, key: &str, payload: &[u8]) -> StorageResult<Assembled> {
    let master: ChunkV2 = bincode::deserialize(payload).map_err(serialization_error)?;
    let header = master
        .header
        .ok_or_else(|| corrupted(key, "master chunk has no header"))?;
    let mut segments = master.segments;
    for (i, chunk_key) in header.chunk_keys.iter().enumerate() {
        let bytes = read_chunk(store, chunk_key)?;
        let (_, payload) = split_frame(chunk_key, &bytes)?;
        let chunk: ChunkV2 = bincode::deserialize(payload).map_err(serialization_error)?;
        if chunk.index as usize != i + 1 {
            return Err(corrupted(chunk_key, "chunk out of order"));
        }
        segments.extend(chunk.segments);
    }
    Ok(Assembled {
        labels: header.labels,
        relations: header.relations,
        attributes: header.attributes,
        indexes: Vec::new(),
        constraints: Vec::new(),
        node_count: header.node_count,
        edge_count: header.edge_count,
        high_water: None,
        segments,
    })
}

/// Version 1 stored names inline; re-intern them in first-seen order.
fn decode_v1(payload: &[u8]) -> StorageResult<Assembled> {
    let legacy: GraphV1 = bincode::deserialize(payload).map_err(serialization_error)?;
    let mut labels = NameTable::default();
    let mut relations = NameTable::default();
    let mut attributes = NameTable::default();

    let mut props = |pairs: Vec<(String, Value)>| {
        let mut map = PropertyMap::new();
        for (name, value) in pairs {
            map.set(attributes.intern(&name), value);
        }
        map
    };

    let nodes: Vec<(NodeId, NodeRecord)> = legacy
        .nodes
        .into_iter()
        .enumerate()
        .map(|(i, n)| {
            let record = NodeRecord {
                labels: n.labels.iter().map(|l| labels.intern(l)).collect(),
                properties: props(n.properties),
            };
            (i as NodeId, record)
        })
        .collect();
    let edges: Vec<(EdgeId, EdgeRecord)> = legacy
        .edges
        .into_iter()
        .enumerate()
        .map(|(i, e)| {
            let record = EdgeRecord {
                relation: relations.intern(&e.relation),
                src: e.src,
                dst: e.dst,
                properties: props(e.properties),
            };
            (i as EdgeId, record)
        })
        .collect();

    Ok(Assembled {
        labels: labels.names,
        relations: relations.names,
        attributes: attributes.names,
        indexes: Vec::new(),
        constraints: Vec::new(),
        node_count: nodes.len() as u64,
        edge_count: edges.len() as u64,
        high_water: None,
        segments: vec![Segment::Nodes(nodes), Segment::Edges(edges)],
    })
}

#[derive(Default)]
struct NameTable {
    names: Vec<String>,
    ids: HashMap<String, u32>,
}

impl NameTable {
    fn intern(&mut self, name: &str) -> u32 {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        let id = self.names.len() as u32;
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        id
    }
}

fn build_graph(
    key: &str,
    assembled: Assembled,
    node_creation_buffer: u64,
) -> StorageResult<Graph> {
    let schema = Schema::restore(assembled.labels, assembled.relations, assembled.attributes);
    let mut graph = Graph::from_schema(key, schema, node_creation_buffer);

    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    let (mut node_hw, mut edge_hw) = assembled.high_water.unwrap_or((0, 0));
    for segment in assembled.segments {
        match segment {
            Segment::Nodes(v) => nodes.extend(v),
            Segment::Edges(v) => edges.extend(v),
            Segment::DeletedNodes(v) => {
                node_hw = node_hw.max(v.iter().max().map(|i| i + 1).unwrap_or(0));
            }
            Segment::DeletedEdges(v) => {
                edge_hw = edge_hw.max(v.iter().max().map(|i| i + 1).unwrap_or(0));
            }
        }
    }
    if nodes.len() as u64 != assembled.node_count || edges.len() as u64 != assembled.edge_count {
        return Err(corrupted(key, "entity count does not match header"));
    }

    graph.reserve_node_slots(node_hw);
    graph.reserve_edge_slots(edge_hw);
    for (id, record) in nodes {
        graph.restore_node(id, record);
    }
    for (id, record) in edges {
        graph.restore_edge(id, record)?;
    }
    graph.finish_restore()?;

    for def in assembled.indexes {
        let handle = graph.create_index(def)?;
        graph.populate_index(&handle);
    }
    for def in assembled.constraints {
        graph.reinstate_constraint(def)?;
    }
    Ok(graph)
}

/// Decode the graph stored under `key`, in any supported version.
pub fn decode_graph(
    store: &dyn KeyValueStore,
    key: &str,
    node_creation_buffer: u64,
) -> StorageResult<DecodedGraph> {
    let bytes = store
        .get(key)?
        .ok_or_else(|| StorageError::KeyNotFound(key.to_string()))?;
    let (version, payload) = split_frame(key, &bytes)?;
    let assembled = match version {
        3 => decode_v3(store, key, payload)?,
        2 => decode_v2(store, key, payload)?,
        1 => decode_v1(payload)?,
        other => return Err(StorageError::UnsupportedVersion(other)),
    };
    let graph = build_graph(key, assembled, node_creation_buffer)?;
    Ok(DecodedGraph { graph, version })
}

/// Legacy writers, kept to produce fixtures for the upgrade path.
#[cfg(test)]
pub(crate) mod legacy {
    use super::*;

    pub fn encode_v2(graph: &Graph, key: &str, max_entities: usize) -> Vec<(String, Vec<u8>)> {
        let chunks = chunk_segments(graph, max_entities);
        let schema = graph.schema();
        let header = HeaderV2 {
            name: graph.name().to_string(),
            labels: schema.labels().to_vec(),
            relations: schema.relations().to_vec(),
            attributes: schema.attributes().to_vec(),
            node_count: graph.node_count() as u64,
            edge_count: graph.edge_count() as u64,
            chunk_keys: (1..chunks.len()).map(|i| chunk_key(key, i)).collect(),
        };
        chunks
            .into_iter()
            .enumerate()
            .map(|(index, segments)| {
                let chunk = ChunkV2 {
                    index: index as u32,
                    header: (index == 0).then(|| header.clone()),
                    segments,
                };
                let body = bincode::serialize(&chunk).unwrap();
                (chunk_key(key, index), frame(2, &body, false))
            })
            .collect()
    }

    /// Compacts ids: the i-th live node becomes node `i`.
    pub fn encode_v1(graph: &Graph) -> Vec<u8> {
        let schema = graph.schema();
        let named = |props: &PropertyMap| -> Vec<(String, Value)> {
            props
                .iter()
                .map(|(a, v)| (schema.attribute_name(a).unwrap().to_string(), v.clone()))
                .collect()
        };
        let mut remap = HashMap::new();
        let nodes = graph
            .nodes()
            .enumerate()
            .map(|(i, (id, n))| {
                remap.insert(id, i as u64);
                NodeV1 {
                    labels: n
                        .labels
                        .iter()
                        .map(|l| schema.label_name(*l).unwrap().to_string())
                        .collect(),
                    properties: named(&n.properties),
                }
            })
            .collect();
        let edges = graph
            .edges()
            .map(|(_, e)| EdgeV1 {
                relation: schema.relation_name(e.relation).unwrap().to_string(),
                src: remap[&e.src],
                dst: remap[&e.dst],
                properties: named(&e.properties),
            })
            .collect();
        let body = bincode::serialize(&GraphV1 {
            name: graph.name().to_string(),
            nodes,
            edges,
        })
        .unwrap();
        frame(1, &body, false)
    }
}
