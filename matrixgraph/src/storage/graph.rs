// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Graph store
//!
//! Owns the node and edge tables, the schema registry, the indexes and the
//! matrix views derived from the tables:
//!
//! - `ADJ`: edge count per node pair, read as a boolean view
//! - `L[l]`: diagonal label masks
//! - `R[t]`: per relation type, cells hold the edge ids between a pair
//!
//! Every write stages deltas in the views and is recorded in an undo log
//! while a write query is active. [`Graph::flush`] checks constraints and
//! folds the deltas; [`Graph::rollback`] replays the undo log backwards.

use log::{debug, info};
use std::collections::BTreeSet;

use crate::storage::constraints::{
    Constraint, ConstraintDefinition, ConstraintKind, ConstraintStatus,
};
use crate::storage::data_block::DataBlock;
use crate::storage::indexes::{
    ExactMatchIndex, FullTextIndex, IndexDefinition, IndexError, IndexHandle, IndexKind, IndexSet,
};
use crate::storage::matrix::{DeltaMatrix, EdgeCell};
use crate::storage::schema::Schema;
use crate::storage::types::{
    AttributeId, EdgeId, EdgeRecord, EntityKind, GraphError, LabelId, NodeId, NodeRecord,
    PropertyMap, RelationId, StorageError,
};
use crate::storage::value::{EdgeValue, NodeValue, Value};

/// Default matrix growth step
pub const DEFAULT_NODE_CREATION_BUFFER: u64 = 16384;

#[derive(Debug, Clone)]
enum UndoOp {
    NodeCreated(NodeId),
    EdgeCreated(EdgeId),
    NodeDeleted(NodeId, NodeRecord),
    EdgeDeleted(EdgeId, EdgeRecord),
    NodePropertySet {
        id: NodeId,
        attr: AttributeId,
        old: Option<Value>,
    },
    EdgePropertySet {
        id: EdgeId,
        attr: AttributeId,
        old: Option<Value>,
    },
    LabelAdded {
        id: NodeId,
        label: LabelId,
    },
    LabelRemoved {
        id: NodeId,
        label: LabelId,
    },
    IndexCreated(IndexHandle),
    IndexDropped(IndexHandle),
}

#[derive(Debug)]
pub struct Graph {
    name: String,
    schema: Schema,
    nodes: DataBlock<NodeRecord>,
    edges: DataBlock<EdgeRecord>,
    adjacency: DeltaMatrix<u32>,
    labels: Vec<DeltaMatrix<()>>,
    relations: Vec<DeltaMatrix<EdgeCell>>,
    node_creation_buffer: u64,
    indexes: IndexSet,
    constraints: Vec<Constraint>,
    undo: Vec<UndoOp>,
    recording: bool,
    dirty_nodes: BTreeSet<NodeId>,
    dirty_edges: BTreeSet<EdgeId>,
}

impl Graph {
    pub fn new(name: &str) -> Self {
        Self::with_buffer(name, DEFAULT_NODE_CREATION_BUFFER)
    }

    pub fn with_buffer(name: &str, node_creation_buffer: u64) -> Self {
        Self::from_schema(name, Schema::new(), node_creation_buffer)
    }

    /// Empty graph over an existing schema; used by restore.
    pub fn from_schema(name: &str, schema: Schema, node_creation_buffer: u64) -> Self {
        let labels = (0..schema.labels().len()).map(|_| DeltaMatrix::new(0)).collect();
        let relations = (0..schema.relations().len())
            .map(|_| DeltaMatrix::new(0))
            .collect();
        Self {
            name: name.to_string(),
            schema,
            nodes: DataBlock::new(),
            edges: DataBlock::new(),
            adjacency: DeltaMatrix::new(0),
            labels,
            relations,
            node_creation_buffer: node_creation_buffer.max(1),
            indexes: IndexSet::new(),
            constraints: Vec::new(),
            undo: Vec::new(),
            recording: false,
            dirty_nodes: BTreeSet::new(),
            dirty_edges: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rename(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Graph signature, bumped whenever a label, type or key is added
    pub fn version(&self) -> u64 {
        self.schema.version()
    }

    pub fn indexes(&self) -> &IndexSet {
        &self.indexes
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn node_creation_buffer(&self) -> u64 {
        self.node_creation_buffer
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    // ---------------------------------------------------------------
    // Schema
    // ---------------------------------------------------------------

    pub fn intern_label(&mut self, name: &str) -> Result<LabelId, StorageError> {
        let id = self.schema.intern_label(name)?;
        while self.labels.len() <= id as usize {
            let mut m = DeltaMatrix::new(0);
            m.ensure_dim(self.nodes.capacity(), self.node_creation_buffer);
            self.labels.push(m);
        }
        Ok(id)
    }

    pub fn intern_relation(&mut self, name: &str) -> Result<RelationId, StorageError> {
        let id = self.schema.intern_relation(name)?;
        while self.relations.len() <= id as usize {
            let mut m = DeltaMatrix::new(0);
            m.ensure_dim(self.nodes.capacity(), self.node_creation_buffer);
            self.relations.push(m);
        }
        Ok(id)
    }

    pub fn intern_attribute(&mut self, name: &str) -> Result<AttributeId, StorageError> {
        Ok(self.schema.intern_attribute(name)?)
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    pub fn get_node(&self, id: NodeId) -> Option<&NodeRecord> {
        self.nodes.get(id)
    }

    pub fn get_edge(&self, id: EdgeId) -> Option<&EdgeRecord> {
        self.edges.get(id)
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains(id)
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.ids().collect()
    }

    pub fn edge_ids(&self) -> Vec<EdgeId> {
        self.edges.ids().collect()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &NodeRecord)> {
        self.nodes.iter()
    }

    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, &EdgeRecord)> {
        self.edges.iter()
    }

    pub fn deleted_node_ids(&self) -> Vec<NodeId> {
        self.nodes.vacant_ids()
    }

    pub fn deleted_edge_ids(&self) -> Vec<EdgeId> {
        self.edges.vacant_ids()
    }

    pub fn adjacency(&self) -> &DeltaMatrix<u32> {
        &self.adjacency
    }

    pub fn label_matrix(&self, label: LabelId) -> Option<&DeltaMatrix<()>> {
        self.labels.get(label as usize)
    }

    pub fn relation_matrix(&self, relation: RelationId) -> Option<&DeltaMatrix<EdgeCell>> {
        self.relations.get(relation as usize)
    }

    /// Nodes carrying `label`, ascending
    pub fn label_nodes(&self, label: LabelId) -> Vec<NodeId> {
        self.label_matrix(label)
            .map(|m| m.entries().into_iter().map(|(row, _, _)| row).collect())
            .unwrap_or_default()
    }

    pub fn node_has_label(&self, id: NodeId, label: LabelId) -> bool {
        self.label_matrix(label)
            .map(|m| m.contains(id, id))
            .unwrap_or(false)
    }

    /// Popcount of `L[label]`
    pub fn label_cardinality(&self, label: LabelId) -> usize {
        self.label_matrix(label).map(DeltaMatrix::nvals).unwrap_or(0)
    }

    fn relation_ids(&self, relations: Option<&[RelationId]>) -> Vec<RelationId> {
        match relations {
            Some(rels) => rels.to_vec(),
            None => (0..self.relations.len() as RelationId).collect(),
        }
    }

    /// Outgoing `(edge, destination)` pairs of `src` over the given types
    /// (all types when `None`).
    pub fn outgoing(&self, src: NodeId, relations: Option<&[RelationId]>) -> Vec<(EdgeId, NodeId)> {
        let mut out = Vec::new();
        for rel in self.relation_ids(relations) {
            if let Some(m) = self.relations.get(rel as usize) {
                for (dst, cell) in m.row(src) {
                    out.extend(cell.ids().into_iter().map(|e| (e, dst)));
                }
            }
        }
        out
    }

    /// Incoming `(edge, source)` pairs of `dst`, read through the transposes.
    pub fn incoming(&self, dst: NodeId, relations: Option<&[RelationId]>) -> Vec<(EdgeId, NodeId)> {
        let mut out = Vec::new();
        for rel in self.relation_ids(relations) {
            if let Some(m) = self.relations.get(rel as usize) {
                for (src, cell) in m.column(dst) {
                    out.extend(cell.ids().into_iter().map(|e| (e, src)));
                }
            }
        }
        out
    }

    /// Edges from `src` to `dst`, probing the relation matrices directly.
    pub fn edges_between(
        &self,
        src: NodeId,
        dst: NodeId,
        relations: Option<&[RelationId]>,
    ) -> Vec<EdgeId> {
        if relations.is_none() && !self.adjacency.contains(src, dst) {
            return Vec::new();
        }
        let mut out = Vec::new();
        for rel in self.relation_ids(relations) {
            if let Some(cell) = self.relations.get(rel as usize).and_then(|m| m.get(src, dst)) {
                out.extend(cell.ids());
            }
        }
        out
    }

    pub fn out_degree(&self, id: NodeId, relations: Option<&[RelationId]>) -> usize {
        self.outgoing(id, relations).len()
    }

    pub fn in_degree(&self, id: NodeId, relations: Option<&[RelationId]>) -> usize {
        self.incoming(id, relations).len()
    }

    pub fn node_property(&self, id: NodeId, attr: AttributeId) -> Option<&Value> {
        self.nodes.get(id).and_then(|n| n.properties.get(attr))
    }

    pub fn edge_property(&self, id: EdgeId, attr: AttributeId) -> Option<&Value> {
        self.edges.get(id).and_then(|e| e.properties.get(attr))
    }

    fn named_properties(&self, props: &PropertyMap) -> Vec<(String, Value)> {
        props
            .iter()
            .map(|(attr, v)| {
                (
                    self.schema.attribute_name(attr).unwrap_or_default().to_string(),
                    v.clone(),
                )
            })
            .collect()
    }

    /// Fully populated node value for result sets
    pub fn node_value(&self, id: NodeId) -> Option<NodeValue> {
        let record = self.nodes.get(id)?;
        Some(NodeValue {
            id,
            labels: record
                .labels
                .iter()
                .filter_map(|l| self.schema.label_name(*l).map(str::to_string))
                .collect(),
            properties: self.named_properties(&record.properties),
        })
    }

    /// Fully populated edge value for result sets
    pub fn edge_value(&self, id: EdgeId) -> Option<EdgeValue> {
        let record = self.edges.get(id)?;
        Some(EdgeValue {
            id,
            rel_type: self
                .schema
                .relation_name(record.relation)
                .unwrap_or_default()
                .to_string(),
            src: record.src,
            dst: record.dst,
            properties: self.named_properties(&record.properties),
        })
    }

    /// Lightweight edge reference with endpoints
    pub fn edge_ref(&self, id: EdgeId) -> Option<EdgeValue> {
        self.edges
            .get(id)
            .map(|e| EdgeValue::reference(id, e.src, e.dst))
    }

    // ---------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------

    /// Start recording an undo log for a write query.
    pub fn begin_write(&mut self) {
        self.undo.clear();
        self.recording = true;
    }

    fn record(&mut self, op: UndoOp) {
        if self.recording {
            self.undo.push(op);
        }
    }

    fn grow_views(&mut self) {
        let required = self.nodes.capacity();
        let buffer = self.node_creation_buffer;
        self.adjacency.ensure_dim(required, buffer);
        for m in &mut self.labels {
            m.ensure_dim(required, buffer);
        }
        for m in &mut self.relations {
            m.ensure_dim(required, buffer);
        }
    }

    fn validate_properties(props: &PropertyMap) -> Result<(), GraphError> {
        for (_, v) in props.iter() {
            if !v.is_valid_property() {
                return Err(GraphError::InvalidPropertyValue(v.type_name().to_string()));
            }
        }
        Ok(())
    }

    pub fn create_node(
        &mut self,
        labels: &[LabelId],
        properties: PropertyMap,
    ) -> Result<NodeId, StorageError> {
        Self::validate_properties(&properties)?;
        let mut unique = Vec::with_capacity(labels.len());
        for l in labels {
            if !unique.contains(l) {
                unique.push(*l);
            }
        }
        let record = NodeRecord {
            labels: unique,
            properties,
        };
        let id = self.nodes.allocate(record)?;
        self.grow_views();
        self.attach_node(id);
        self.dirty_nodes.insert(id);
        self.record(UndoOp::NodeCreated(id));
        Ok(id)
    }

    fn attach_node(&mut self, id: NodeId) {
        if let Some(record) = self.nodes.get(id) {
            for l in &record.labels {
                if let Some(m) = self.labels.get_mut(*l as usize) {
                    m.set(id, id, ());
                }
            }
            self.indexes
                .on_entity_added(EntityKind::Node, &record.labels, id, &record.properties);
        }
    }

    fn detach_node(&mut self, id: NodeId) {
        if let Some(record) = self.nodes.get(id) {
            for l in &record.labels {
                if let Some(m) = self.labels.get_mut(*l as usize) {
                    m.remove(id, id);
                }
            }
            self.indexes
                .on_entity_removed(EntityKind::Node, &record.labels, id, &record.properties);
        }
    }

    pub fn create_edge(
        &mut self,
        relation: RelationId,
        src: NodeId,
        dst: NodeId,
        properties: PropertyMap,
    ) -> Result<EdgeId, StorageError> {
        if !self.nodes.contains(src) || !self.nodes.contains(dst) {
            return Err(GraphError::InvalidEdge { src, dst }.into());
        }
        Self::validate_properties(&properties)?;
        let id = self.edges.allocate(EdgeRecord {
            relation,
            src,
            dst,
            properties,
        })?;
        self.attach_edge(id);
        self.dirty_edges.insert(id);
        self.record(UndoOp::EdgeCreated(id));
        Ok(id)
    }

    fn attach_edge(&mut self, id: EdgeId) {
        let Some(record) = self.edges.get(id) else {
            return;
        };
        let (rel, src, dst) = (record.relation, record.src, record.dst);
        if let Some(m) = self.relations.get_mut(rel as usize) {
            let cell = match m.get(src, dst) {
                Some(existing) => existing.with(id),
                None => EdgeCell::Single(id),
            };
            m.set(src, dst, cell);
        }
        let count = self.adjacency.get(src, dst).copied().unwrap_or(0);
        self.adjacency.set(src, dst, count + 1);
        self.indexes
            .on_entity_added(EntityKind::Edge, &[rel], id, &record.properties);
    }

    fn detach_edge(&mut self, id: EdgeId) {
        let Some(record) = self.edges.get(id) else {
            return;
        };
        let (rel, src, dst) = (record.relation, record.src, record.dst);
        if let Some(m) = self.relations.get_mut(rel as usize) {
            match m.get(src, dst).and_then(|cell| cell.without(id)) {
                Some(rest) => m.set(src, dst, rest),
                None => {
                    m.remove(src, dst);
                }
            }
        }
        match self.adjacency.get(src, dst).copied() {
            Some(n) if n > 1 => self.adjacency.set(src, dst, n - 1),
            _ => {
                self.adjacency.remove(src, dst);
            }
        }
        self.indexes
            .on_entity_removed(EntityKind::Edge, &[rel], id, &record.properties);
    }

    /// Delete an edge. Returns false when it was already gone.
    pub fn delete_edge(&mut self, id: EdgeId) -> bool {
        if !self.edges.contains(id) {
            return false;
        }
        self.detach_edge(id);
        if let Some(record) = self.edges.remove(id) {
            self.dirty_edges.remove(&id);
            self.record(UndoOp::EdgeDeleted(id, record));
        }
        true
    }

    /// Delete a node and every incident edge. Returns the number of edges
    /// removed by the cascade, or `None` when the node was already gone.
    pub fn delete_node(&mut self, id: NodeId) -> Option<usize> {
        if !self.nodes.contains(id) {
            return None;
        }
        let mut incident: BTreeSet<EdgeId> =
            self.outgoing(id, None).into_iter().map(|(e, _)| e).collect();
        incident.extend(self.incoming(id, None).into_iter().map(|(e, _)| e));
        let cascaded = incident.len();
        for edge in incident {
            self.delete_edge(edge);
        }
        self.detach_node(id);
        if let Some(record) = self.nodes.remove(id) {
            self.dirty_nodes.remove(&id);
            self.record(UndoOp::NodeDeleted(id, record));
        }
        Some(cascaded)
    }

    /// Set (or with null, remove) a node property. Returns the old value.
    pub fn set_node_property(
        &mut self,
        id: NodeId,
        attr: AttributeId,
        value: Value,
    ) -> Result<Option<Value>, StorageError> {
        if !value.is_null() && !value.is_valid_property() {
            return Err(GraphError::InvalidPropertyValue(value.type_name().to_string()).into());
        }
        let record = self.nodes.get_mut(id).ok_or(GraphError::NodeNotFound(id))?;
        let new = if value.is_null() { None } else { Some(value.clone()) };
        let old = record.properties.set(attr, value);
        self.indexes.on_attribute_changed(
            EntityKind::Node,
            &record.labels,
            id,
            attr,
            old.as_ref(),
            new.as_ref(),
            &record.properties,
        );
        self.dirty_nodes.insert(id);
        self.record(UndoOp::NodePropertySet {
            id,
            attr,
            old: old.clone(),
        });
        Ok(old)
    }

    pub fn set_edge_property(
        &mut self,
        id: EdgeId,
        attr: AttributeId,
        value: Value,
    ) -> Result<Option<Value>, StorageError> {
        if !value.is_null() && !value.is_valid_property() {
            return Err(GraphError::InvalidPropertyValue(value.type_name().to_string()).into());
        }
        let record = self.edges.get_mut(id).ok_or(GraphError::EdgeNotFound(id))?;
        let new = if value.is_null() { None } else { Some(value.clone()) };
        let old = record.properties.set(attr, value);
        self.indexes.on_attribute_changed(
            EntityKind::Edge,
            &[record.relation],
            id,
            attr,
            old.as_ref(),
            new.as_ref(),
            &record.properties,
        );
        self.dirty_edges.insert(id);
        self.record(UndoOp::EdgePropertySet {
            id,
            attr,
            old: old.clone(),
        });
        Ok(old)
    }

    /// Add a label to a node. Returns false when it already had it.
    pub fn add_label(&mut self, id: NodeId, label: LabelId) -> Result<bool, StorageError> {
        let record = self.nodes.get_mut(id).ok_or(GraphError::NodeNotFound(id))?;
        if record.labels.contains(&label) {
            return Ok(false);
        }
        record.labels.push(label);
        let props = record.properties.clone();
        if let Some(m) = self.labels.get_mut(label as usize) {
            m.set(id, id, ());
        }
        self.indexes
            .on_entity_added(EntityKind::Node, &[label], id, &props);
        self.dirty_nodes.insert(id);
        self.record(UndoOp::LabelAdded { id, label });
        Ok(true)
    }

    /// Remove a label from a node. Returns false when it did not carry it.
    pub fn remove_label(&mut self, id: NodeId, label: LabelId) -> Result<bool, StorageError> {
        let record = self.nodes.get_mut(id).ok_or(GraphError::NodeNotFound(id))?;
        if !record.labels.contains(&label) {
            return Ok(false);
        }
        record.labels.retain(|l| *l != label);
        let props = record.properties.clone();
        if let Some(m) = self.labels.get_mut(label as usize) {
            m.remove(id, id);
        }
        self.indexes
            .on_entity_removed(EntityKind::Node, &[label], id, &props);
        self.record(UndoOp::LabelRemoved { id, label });
        Ok(true)
    }

    // ---------------------------------------------------------------
    // Indexes and constraints
    // ---------------------------------------------------------------

    fn index_target(&mut self, def: &IndexDefinition) -> Result<(LabelId, Vec<AttributeId>), StorageError> {
        let label = match def.entity {
            EntityKind::Node => self.intern_label(&def.label)?,
            EntityKind::Edge => self.intern_relation(&def.label)?,
        };
        let attrs = def
            .properties
            .iter()
            .map(|p| self.intern_attribute(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((label, attrs))
    }

    /// Register an index. It starts `UNDER CONSTRUCTION`; the caller is
    /// responsible for scheduling its population.
    pub fn create_index(&mut self, def: IndexDefinition) -> Result<IndexHandle, StorageError> {
        if def.properties.is_empty() {
            return Err(IndexError::config("an index needs at least one property").into());
        }
        let (label, attrs) = self.index_target(&def)?;
        let handle = match def.kind {
            IndexKind::Exact => {
                IndexHandle::Exact(self.indexes.add_exact(ExactMatchIndex::new(def, label, attrs))?)
            }
            IndexKind::FullText => IndexHandle::FullText(
                self.indexes.add_fulltext(FullTextIndex::new(def, label, attrs))?,
            ),
        };
        debug!(
            "graph '{}': registered {} index {}",
            self.name,
            handle.definition().kind.as_str(),
            handle.definition().describe()
        );
        self.record(UndoOp::IndexCreated(handle.clone()));
        Ok(handle)
    }

    pub fn drop_index(
        &mut self,
        kind: IndexKind,
        entity: EntityKind,
        label: &str,
        properties: &[String],
    ) -> Result<IndexHandle, StorageError> {
        if kind == IndexKind::Exact {
            let props: Vec<String> = properties.to_vec();
            let supports_unique = self.constraints.iter().any(|c| {
                c.definition.kind == ConstraintKind::Unique
                    && c.definition.entity == entity
                    && c.definition.label == label
                    && c.definition.properties.iter().any(|p| props.contains(p))
            });
            if supports_unique {
                return Err(IndexError::config(format!(
                    "index on :{}({}) supports a unique constraint",
                    label,
                    properties.join(", ")
                ))
                .into());
            }
        }
        let handle = self.indexes.drop_index(kind, entity, label, properties)?;
        self.record(UndoOp::IndexDropped(handle.clone()));
        Ok(handle)
    }

    /// Index up to `batch` entities starting at id `start`. Returns the next
    /// start id, or `None` once every entity has been visited.
    pub fn populate_index_batch(&self, handle: &IndexHandle, start: u64, batch: u64) -> Option<u64> {
        let def = handle.definition();
        let label = handle.label_id();
        let (end, capacity) = match def.entity {
            EntityKind::Node => {
                let cap = self.nodes.capacity();
                let end = (start + batch).min(cap);
                for id in start..end {
                    if let Some(record) = self.nodes.get(id) {
                        if record.has_label(label) {
                            handle.index_entity(id, &record.properties);
                        }
                    }
                }
                (end, cap)
            }
            EntityKind::Edge => {
                let cap = self.edges.capacity();
                let end = (start + batch).min(cap);
                for id in start..end {
                    if let Some(record) = self.edges.get(id) {
                        if record.relation == label {
                            handle.index_entity(id, &record.properties);
                        }
                    }
                }
                (end, cap)
            }
        };
        if end >= capacity {
            None
        } else {
            Some(end)
        }
    }

    /// Populate an index in one pass and mark it operational.
    pub fn populate_index(&mut self, handle: &IndexHandle) {
        let mut next = Some(0);
        while let Some(start) = next {
            next = self.populate_index_batch(handle, start, u64::MAX / 2);
        }
        handle.state().mark_operational();
        self.indexes.bump_epoch();
    }

    /// Record that a background population finished.
    pub fn index_became_operational(&mut self) {
        self.indexes.bump_epoch();
    }

    pub fn create_constraint(&mut self, def: ConstraintDefinition) -> Result<ConstraintStatus, StorageError> {
        if def.properties.is_empty() {
            return Err(StorageError::InvalidConstraint(
                "a constraint needs at least one property".into(),
            ));
        }
        if self.constraints.iter().any(|c| c.definition == def) {
            return Err(StorageError::InvalidConstraint("constraint already exists".into()));
        }
        if def.kind == ConstraintKind::Unique {
            let indexed = self.indexes.exact_indexes().iter().any(|idx| {
                let idef = idx.definition();
                idef.entity == def.entity
                    && idef.label == def.label
                    && def.properties.iter().all(|p| idef.properties.contains(p))
            });
            if !indexed {
                return Err(StorageError::InvalidConstraint(format!(
                    "missing supporting exact-match index on :{}({})",
                    def.label,
                    def.properties.join(", ")
                )));
            }
        }
        let label_id = match def.entity {
            EntityKind::Node => self.intern_label(&def.label)?,
            EntityKind::Edge => self.intern_relation(&def.label)?,
        };
        let attributes = def
            .properties
            .iter()
            .map(|p| self.intern_attribute(p))
            .collect::<Result<Vec<_>, _>>()?;
        let mut constraint = Constraint {
            definition: def,
            label_id,
            attributes,
            status: ConstraintStatus::Operational,
        };
        let candidates = self.entities_of(constraint.definition.entity, label_id);
        if candidates
            .iter()
            .any(|id| self.violates(&constraint, *id).is_some())
        {
            constraint.status = ConstraintStatus::Failed;
        }
        info!(
            "graph '{}': {} constraint on {} is {}",
            self.name,
            constraint.definition.kind.as_str(),
            constraint.definition.label,
            constraint.status
        );
        let status = constraint.status;
        self.constraints.push(constraint);
        self.indexes.bump_epoch();
        Ok(status)
    }

    pub fn drop_constraint(&mut self, def: &ConstraintDefinition) -> Result<(), StorageError> {
        let before = self.constraints.len();
        self.constraints.retain(|c| &c.definition != def);
        if self.constraints.len() == before {
            return Err(StorageError::InvalidConstraint("no such constraint".into()));
        }
        self.indexes.bump_epoch();
        Ok(())
    }

    /// Restore a constraint definition without validation (restore path).
    pub fn reinstate_constraint(&mut self, def: ConstraintDefinition) -> Result<(), StorageError> {
        self.create_constraint(def).map(|_| ())
    }

    fn entities_of(&self, entity: EntityKind, label: LabelId) -> Vec<u64> {
        match entity {
            EntityKind::Node => self.label_nodes(label),
            EntityKind::Edge => self
                .edges
                .iter()
                .filter(|(_, e)| e.relation == label)
                .map(|(id, _)| id)
                .collect(),
        }
    }

    fn entity_properties(&self, entity: EntityKind, id: u64) -> Option<&PropertyMap> {
        match entity {
            EntityKind::Node => self.nodes.get(id).map(|n| &n.properties),
            EntityKind::Edge => self.edges.get(id).map(|e| &e.properties),
        }
    }

    fn entity_has_label(&self, entity: EntityKind, id: u64, label: LabelId) -> bool {
        match entity {
            EntityKind::Node => self.nodes.get(id).map(|n| n.has_label(label)).unwrap_or(false),
            EntityKind::Edge => self.edges.get(id).map(|e| e.relation == label).unwrap_or(false),
        }
    }

    fn violates(&self, constraint: &Constraint, id: u64) -> Option<String> {
        let entity = constraint.definition.entity;
        if !self.entity_has_label(entity, id, constraint.label_id) {
            return None;
        }
        let props = self.entity_properties(entity, id)?;
        match constraint.definition.kind {
            ConstraintKind::Mandatory => constraint.key(props).is_none().then(|| constraint.violation()),
            ConstraintKind::Unique => {
                let key = constraint.key(props)?;
                let first_attr = *constraint.attributes.first()?;
                let candidates = match self.indexes.operational_exact(entity, constraint.label_id, first_attr) {
                    Some(idx) => idx.seek_eq(first_attr, &key[0]),
                    None => self.entities_of(entity, constraint.label_id),
                };
                let duplicate = candidates.into_iter().any(|other| {
                    other != id
                        && self
                            .entity_properties(entity, other)
                            .and_then(|p| constraint.key(p))
                            .map(|k| k == key)
                            .unwrap_or(false)
                });
                duplicate.then(|| constraint.violation())
            }
        }
    }

    fn check_constraints(&self) -> Result<(), StorageError> {
        for constraint in &self.constraints {
            if constraint.status != ConstraintStatus::Operational {
                continue;
            }
            let dirty = match constraint.definition.entity {
                EntityKind::Node => &self.dirty_nodes,
                EntityKind::Edge => &self.dirty_edges,
            };
            for id in dirty {
                if let Some(message) = self.violates(constraint, *id) {
                    return Err(StorageError::ConstraintViolation(message));
                }
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Flush, commit, rollback
    // ---------------------------------------------------------------

    pub fn has_pending(&self) -> bool {
        self.adjacency.has_pending()
            || self.labels.iter().any(DeltaMatrix::has_pending)
            || self.relations.iter().any(DeltaMatrix::has_pending)
    }

    /// Check constraints on entities touched since the last flush, then
    /// fold pending deltas into every matrix view.
    pub fn flush(&mut self) -> Result<(), StorageError> {
        self.check_constraints()?;
        self.dirty_nodes.clear();
        self.dirty_edges.clear();
        self.adjacency.flush();
        for m in &mut self.labels {
            m.flush();
        }
        for m in &mut self.relations {
            m.flush();
        }
        Ok(())
    }

    /// Make the current write permanent.
    pub fn commit(&mut self) -> Result<(), StorageError> {
        self.flush()?;
        self.nodes.commit();
        self.edges.commit();
        self.undo.clear();
        self.recording = false;
        Ok(())
    }

    /// Undo every change recorded since [`Graph::begin_write`].
    pub fn rollback(&mut self) {
        let ops = std::mem::take(&mut self.undo);
        self.recording = false;
        if !ops.is_empty() {
            debug!("graph '{}': rolling back {} staged changes", self.name, ops.len());
        }
        for op in ops.into_iter().rev() {
            match op {
                UndoOp::NodeCreated(id) => {
                    self.detach_node(id);
                    self.nodes.discard(id);
                }
                UndoOp::EdgeCreated(id) => {
                    self.detach_edge(id);
                    self.edges.discard(id);
                }
                UndoOp::NodeDeleted(id, record) => {
                    self.nodes.restore(id, record);
                    self.attach_node(id);
                }
                UndoOp::EdgeDeleted(id, record) => {
                    self.edges.restore(id, record);
                    self.attach_edge(id);
                }
                UndoOp::NodePropertySet { id, attr, old } => {
                    if let Some(record) = self.nodes.get_mut(id) {
                        let current = record.properties.set(attr, old.clone().unwrap_or(Value::Null));
                        self.indexes.on_attribute_changed(
                            EntityKind::Node,
                            &record.labels,
                            id,
                            attr,
                            current.as_ref(),
                            old.as_ref(),
                            &record.properties,
                        );
                    }
                }
                UndoOp::EdgePropertySet { id, attr, old } => {
                    if let Some(record) = self.edges.get_mut(id) {
                        let current = record.properties.set(attr, old.clone().unwrap_or(Value::Null));
                        self.indexes.on_attribute_changed(
                            EntityKind::Edge,
                            &[record.relation],
                            id,
                            attr,
                            current.as_ref(),
                            old.as_ref(),
                            &record.properties,
                        );
                    }
                }
                UndoOp::LabelAdded { id, label } => {
                    if let Some(record) = self.nodes.get_mut(id) {
                        record.labels.retain(|l| *l != label);
                        let props = record.properties.clone();
                        self.indexes
                            .on_entity_removed(EntityKind::Node, &[label], id, &props);
                    }
                    if let Some(m) = self.labels.get_mut(label as usize) {
                        m.remove(id, id);
                    }
                }
                UndoOp::LabelRemoved { id, label } => {
                    if let Some(record) = self.nodes.get_mut(id) {
                        record.labels.push(label);
                        let props = record.properties.clone();
                        self.indexes
                            .on_entity_added(EntityKind::Node, &[label], id, &props);
                    }
                    if let Some(m) = self.labels.get_mut(label as usize) {
                        m.set(id, id, ());
                    }
                }
                UndoOp::IndexCreated(handle) => self.indexes.discard(&handle),
                UndoOp::IndexDropped(handle) => self.indexes.reinstate(handle),
            }
        }
        self.dirty_nodes.clear();
        self.dirty_edges.clear();
        self.adjacency.flush();
        for m in &mut self.labels {
            m.flush();
        }
        for m in &mut self.relations {
            m.flush();
        }
    }

    // ---------------------------------------------------------------
    // Restore support
    // ---------------------------------------------------------------

    /// Place a node at a fixed id (restore path, not undo-logged).
    pub fn restore_node(&mut self, id: NodeId, record: NodeRecord) {
        self.nodes.insert_at(id, record);
        self.grow_views();
        self.attach_node(id);
    }

    /// Place an edge at a fixed id (restore path, not undo-logged).
    pub fn restore_edge(&mut self, id: EdgeId, record: EdgeRecord) -> Result<(), StorageError> {
        if !self.nodes.contains(record.src) || !self.nodes.contains(record.dst) {
            return Err(GraphError::InvalidEdge {
                src: record.src,
                dst: record.dst,
            }
            .into());
        }
        self.edges.insert_at(id, record);
        self.attach_edge(id);
        Ok(())
    }

    /// Reserve ids that were vacant in the source graph.
    pub fn reserve_node_slots(&mut self, high_water: u64) {
        self.nodes.reserve_until(high_water);
    }

    pub fn reserve_edge_slots(&mut self, high_water: u64) {
        self.edges.reserve_until(high_water);
    }

    /// Finish a restore: rebuild free lists and fold every view.
    pub fn finish_restore(&mut self) -> Result<(), StorageError> {
        self.nodes.rebuild_free_list();
        self.edges.rebuild_free_list();
        self.grow_views();
        self.flush()
    }

    /// Shared handles of every index; used to repopulate after restore.
    pub fn index_handles(&self) -> Vec<IndexHandle> {
        self.indexes.handles()
    }

    /// Definitions of every index, in registration order.
    pub fn index_definitions(&self) -> Vec<IndexDefinition> {
        self.indexes
            .handles()
            .iter()
            .map(|h| h.definition().clone())
            .collect()
    }

    /// Deep copy with fresh index objects; the copy shares nothing mutable.
    pub fn duplicate(&self, name: &str) -> Result<Graph, StorageError> {
        let mut copy = Graph::from_schema(name, self.schema.clone(), self.node_creation_buffer);
        copy.reserve_node_slots(self.nodes.capacity());
        copy.reserve_edge_slots(self.edges.capacity());
        for (id, record) in self.nodes.iter() {
            copy.restore_node(id, record.clone());
        }
        for (id, record) in self.edges.iter() {
            copy.restore_edge(id, record.clone())?;
        }
        copy.finish_restore()?;
        for def in self.index_definitions() {
            let handle = copy.create_index(def)?;
            copy.populate_index(&handle);
        }
        for c in &self.constraints {
            copy.reinstate_constraint(c.definition.clone())?;
        }
        Ok(copy)
    }

    #[cfg(test)]
    pub(crate) fn adjacency_matches_relations(&self) -> bool {
        let mut union: BTreeSet<(u64, u64)> = BTreeSet::new();
        for m in &self.relations {
            union.extend(m.entries().into_iter().map(|(r, c, _)| (r, c)));
        }
        let adj: BTreeSet<(u64, u64)> = self
            .adjacency
            .entries()
            .into_iter()
            .map(|(r, c, _)| (r, c))
            .collect();
        union == adj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(graph: &mut Graph, pairs: &[(&str, Value)]) -> PropertyMap {
        let mut p = PropertyMap::new();
        for (k, v) in pairs {
            let attr = graph.intern_attribute(k).unwrap();
            p.set(attr, v.clone());
        }
        p
    }

    #[test]
    fn test_create_and_traverse() {
        let mut g = Graph::new("g");
        let person = g.intern_label("Person").unwrap();
        let knows = g.intern_relation("KNOWS").unwrap();
        let a = g.create_node(&[person], PropertyMap::new()).unwrap();
        let b = g.create_node(&[person], PropertyMap::new()).unwrap();
        let e = g.create_edge(knows, a, b, PropertyMap::new()).unwrap();

        assert_eq!(g.outgoing(a, Some(&[knows])), vec![(e, b)]);
        assert_eq!(g.incoming(b, None), vec![(e, a)]);
        assert_eq!(g.edges_between(a, b, None), vec![e]);
        assert_eq!(g.label_nodes(person), vec![a, b]);
        assert!(g.adjacency_matches_relations());
    }

    #[test]
    fn test_multi_edges_share_a_cell() {
        let mut g = Graph::new("g");
        let r = g.intern_relation("R").unwrap();
        let a = g.create_node(&[], PropertyMap::new()).unwrap();
        let b = g.create_node(&[], PropertyMap::new()).unwrap();
        let e1 = g.create_edge(r, a, b, PropertyMap::new()).unwrap();
        let e2 = g.create_edge(r, a, b, PropertyMap::new()).unwrap();
        assert_eq!(g.edges_between(a, b, Some(&[r])), vec![e1, e2]);
        assert!(g.delete_edge(e1));
        assert_eq!(g.edges_between(a, b, Some(&[r])), vec![e2]);
        assert_eq!(g.adjacency().get(a, b), Some(&1));
    }

    #[test]
    fn test_delete_node_cascades() {
        let mut g = Graph::new("g");
        let r = g.intern_relation("R").unwrap();
        let a = g.create_node(&[], PropertyMap::new()).unwrap();
        let b = g.create_node(&[], PropertyMap::new()).unwrap();
        g.create_edge(r, a, b, PropertyMap::new()).unwrap();
        g.create_edge(r, b, a, PropertyMap::new()).unwrap();
        g.create_edge(r, a, a, PropertyMap::new()).unwrap();
        assert_eq!(g.delete_node(a), Some(3));
        assert_eq!(g.edge_count(), 0);
        assert!(g.adjacency_matches_relations());
        assert_eq!(g.delete_node(a), None);
    }

    #[test]
    fn test_rollback_restores_state() {
        let mut g = Graph::new("g");
        let l = g.intern_label("L").unwrap();
        let r = g.intern_relation("R").unwrap();
        let v = props(&mut g, &[("v", Value::Integer(1))]);
        let a = g.create_node(&[l], v).unwrap();
        let b = g.create_node(&[l], PropertyMap::new()).unwrap();
        g.create_edge(r, a, b, PropertyMap::new()).unwrap();
        g.commit().unwrap();

        let attr = g.schema().attribute_id("v").unwrap();
        g.begin_write();
        g.set_node_property(a, attr, Value::Integer(9)).unwrap();
        g.delete_node(b);
        g.create_node(&[l], PropertyMap::new()).unwrap();
        g.rollback();

        assert_eq!(g.node_count(), 2);
        assert_eq!(g.edge_count(), 1);
        assert_eq!(g.node_property(a, attr), Some(&Value::Integer(1)));
        assert_eq!(g.label_cardinality(l), 2);
        assert!(g.adjacency_matches_relations());
    }

    #[test]
    fn test_invalid_property_rejected() {
        let mut g = Graph::new("g");
        let a = g.create_node(&[], PropertyMap::new()).unwrap();
        let attr = g.intern_attribute("m").unwrap();
        let err = g.set_node_property(a, attr, Value::Map(vec![])).unwrap_err();
        assert!(matches!(
            err,
            StorageError::Graph(GraphError::InvalidPropertyValue(_))
        ));
    }

    #[test]
    fn test_index_population_and_maintenance() {
        let mut g = Graph::new("g");
        let l = g.intern_label("L").unwrap();
        let v = props(&mut g, &[("v", Value::Integer(7))]);
        let a = g.create_node(&[l], v).unwrap();
        let handle = g
            .create_index(IndexDefinition::exact(EntityKind::Node, "L", vec!["v".into()]))
            .unwrap();
        assert!(!handle.state().is_operational());
        g.populate_index(&handle);
        let attr = g.schema().attribute_id("v").unwrap();
        let idx = g.indexes().operational_exact(EntityKind::Node, l, attr).unwrap();
        assert_eq!(idx.seek_eq(attr, &Value::Integer(7)), vec![a]);

        g.set_node_property(a, attr, Value::Integer(8)).unwrap();
        assert!(idx.seek_eq(attr, &Value::Integer(7)).is_empty());
        assert_eq!(idx.seek_eq(attr, &Value::Integer(8)), vec![a]);
    }

    #[test]
    fn test_unique_constraint_checked_at_flush() {
        let mut g = Graph::new("g");
        let l = g.intern_label("L").unwrap();
        let handle = g
            .create_index(IndexDefinition::exact(EntityKind::Node, "L", vec!["v".into()]))
            .unwrap();
        g.populate_index(&handle);
        let status = g
            .create_constraint(ConstraintDefinition {
                kind: ConstraintKind::Unique,
                entity: EntityKind::Node,
                label: "L".into(),
                properties: vec!["v".into()],
            })
            .unwrap();
        assert_eq!(status, ConstraintStatus::Operational);

        g.begin_write();
        let p1 = props(&mut g, &[("v", Value::Integer(1))]);
        let p2 = props(&mut g, &[("v", Value::Integer(1))]);
        g.create_node(&[l], p1).unwrap();
        g.create_node(&[l], p2).unwrap();
        let err = g.flush().unwrap_err();
        assert!(matches!(err, StorageError::ConstraintViolation(_)));
        g.rollback();
        assert_eq!(g.node_count(), 0);
    }
}
