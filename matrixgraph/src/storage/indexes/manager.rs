// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Per-graph index registry
//!
//! Holds every index of a graph, routes entity changes to the indexes that
//! cover them, and answers access-path questions for the planner. Only
//! operational indexes are offered to the planner; indexes still under
//! construction receive every update.

use std::sync::Arc;

use super::errors::IndexError;
use super::exact::ExactMatchIndex;
use super::fulltext::FullTextIndex;
use super::types::{IndexDefinition, IndexKind};
use crate::storage::types::{AttributeId, EntityKind, LabelId, PropertyMap};
use crate::storage::value::Value;

/// Shared handle to any index kind
#[derive(Debug, Clone)]
pub enum IndexHandle {
    Exact(Arc<ExactMatchIndex>),
    FullText(Arc<FullTextIndex>),
}

impl IndexHandle {
    pub fn definition(&self) -> &IndexDefinition {
        match self {
            IndexHandle::Exact(idx) => idx.definition(),
            IndexHandle::FullText(idx) => idx.definition(),
        }
    }

    pub fn label_id(&self) -> LabelId {
        match self {
            IndexHandle::Exact(idx) => idx.label_id(),
            IndexHandle::FullText(idx) => idx.label_id(),
        }
    }

    pub fn state(&self) -> &super::types::IndexState {
        match self {
            IndexHandle::Exact(idx) => idx.state(),
            IndexHandle::FullText(idx) => idx.state(),
        }
    }

    pub fn index_entity(&self, id: u64, properties: &PropertyMap) {
        match self {
            IndexHandle::Exact(idx) => idx.index_entity(id, properties),
            IndexHandle::FullText(idx) => idx.index_entity(id, properties),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct IndexSet {
    exact: Vec<Arc<ExactMatchIndex>>,
    fulltext: Vec<Arc<FullTextIndex>>,
    epoch: u64,
}

impl IndexSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bumped on every create, drop or status change observed by the graph.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn bump_epoch(&mut self) {
        self.epoch += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.fulltext.is_empty()
    }

    pub fn handles(&self) -> Vec<IndexHandle> {
        self.exact
            .iter()
            .cloned()
            .map(IndexHandle::Exact)
            .chain(self.fulltext.iter().cloned().map(IndexHandle::FullText))
            .collect()
    }

    pub fn exact_indexes(&self) -> &[Arc<ExactMatchIndex>] {
        &self.exact
    }

    pub fn find_exact(&self, entity: EntityKind, label: &str) -> Option<&Arc<ExactMatchIndex>> {
        self.exact
            .iter()
            .find(|idx| idx.definition().entity == entity && idx.definition().label == label)
    }

    /// Operational exact index of `label` covering `attr`, for access-path selection.
    pub fn operational_exact(
        &self,
        entity: EntityKind,
        label_id: LabelId,
        attr: AttributeId,
    ) -> Option<Arc<ExactMatchIndex>> {
        self.exact
            .iter()
            .find(|idx| {
                idx.definition().entity == entity
                    && idx.label_id() == label_id
                    && idx.covers(attr)
                    && idx.state().is_operational()
            })
            .cloned()
    }

    pub fn fulltext(&self, label: &str) -> Option<&Arc<FullTextIndex>> {
        self.fulltext.iter().find(|idx| idx.definition().label == label)
    }

    /// Register a new exact index. Fails when any requested property is
    /// already indexed for the same label.
    pub fn add_exact(&mut self, index: ExactMatchIndex) -> Result<Arc<ExactMatchIndex>, IndexError> {
        let def = index.definition().clone();
        let siblings = self
            .exact
            .iter()
            .filter(|idx| idx.definition().entity == def.entity && idx.definition().label == def.label);
        for existing in siblings {
            if let Some(dup) = def
                .properties
                .iter()
                .find(|p| existing.definition().properties.contains(p))
            {
                return Err(IndexError::AlreadyExists(dup.clone()));
            }
        }
        let index = Arc::new(index);
        self.exact.push(index.clone());
        self.epoch += 1;
        Ok(index)
    }

    pub fn add_fulltext(&mut self, index: FullTextIndex) -> Result<Arc<FullTextIndex>, IndexError> {
        if self.fulltext(&index.definition().label).is_some() {
            return Err(IndexError::AlreadyExists(index.definition().label.clone()));
        }
        let index = Arc::new(index);
        self.fulltext.push(index.clone());
        self.epoch += 1;
        Ok(index)
    }

    /// Re-register a previously dropped index (rollback).
    pub fn reinstate(&mut self, handle: IndexHandle) {
        match handle {
            IndexHandle::Exact(idx) => self.exact.push(idx),
            IndexHandle::FullText(idx) => self.fulltext.push(idx),
        }
        self.epoch += 1;
    }

    /// Remove an index; a running population observes the cancellation.
    pub fn drop_index(
        &mut self,
        kind: IndexKind,
        entity: EntityKind,
        label: &str,
        properties: &[String],
    ) -> Result<IndexHandle, IndexError> {
        let handle = match kind {
            IndexKind::Exact => {
                let pos = self.exact.iter().position(|idx| {
                    let def = idx.definition();
                    def.entity == entity
                        && def.label == label
                        && (properties.is_empty()
                            || properties.iter().all(|p| def.properties.contains(p)))
                });
                pos.map(|p| IndexHandle::Exact(self.exact.remove(p)))
            }
            IndexKind::FullText => {
                let pos = self
                    .fulltext
                    .iter()
                    .position(|idx| idx.definition().label == label);
                pos.map(|p| IndexHandle::FullText(self.fulltext.remove(p)))
            }
        };
        let handle = handle.ok_or_else(|| {
            IndexError::NotFound(format!(":{}({})", label, properties.join(", ")))
        })?;
        handle.state().cancel();
        self.epoch += 1;
        Ok(handle)
    }

    /// Remove an index created by a query that is being rolled back.
    pub fn discard(&mut self, handle: &IndexHandle) {
        match handle {
            IndexHandle::Exact(idx) => self.exact.retain(|i| !Arc::ptr_eq(i, idx)),
            IndexHandle::FullText(idx) => self.fulltext.retain(|i| !Arc::ptr_eq(i, idx)),
        }
        handle.state().cancel();
        self.epoch += 1;
    }

    pub fn on_entity_added(&self, entity: EntityKind, labels: &[LabelId], id: u64, props: &PropertyMap) {
        for idx in &self.exact {
            if idx.definition().entity == entity && labels.contains(&idx.label_id()) {
                idx.index_entity(id, props);
            }
        }
        if entity == EntityKind::Node {
            for idx in &self.fulltext {
                if labels.contains(&idx.label_id()) {
                    idx.index_entity(id, props);
                }
            }
        }
    }

    pub fn on_entity_removed(&self, entity: EntityKind, labels: &[LabelId], id: u64, props: &PropertyMap) {
        for idx in &self.exact {
            if idx.definition().entity == entity && labels.contains(&idx.label_id()) {
                idx.remove_entity(id, props);
            }
        }
        if entity == EntityKind::Node {
            for idx in &self.fulltext {
                if labels.contains(&idx.label_id()) {
                    idx.remove_entity(id);
                }
            }
        }
    }

    /// `props` is the entity's property map after the change.
    #[allow(clippy::too_many_arguments)]
    pub fn on_attribute_changed(
        &self,
        entity: EntityKind,
        labels: &[LabelId],
        id: u64,
        attr: AttributeId,
        old: Option<&Value>,
        new: Option<&Value>,
        props: &PropertyMap,
    ) {
        for idx in &self.exact {
            if idx.definition().entity == entity && labels.contains(&idx.label_id()) {
                idx.update_attribute(id, attr, old, new);
            }
        }
        if entity == EntityKind::Node {
            for idx in &self.fulltext {
                if labels.contains(&idx.label_id()) && idx.covers(attr) {
                    idx.index_entity(id, props);
                }
            }
        }
    }
}
