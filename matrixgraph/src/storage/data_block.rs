// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Append-with-free-list entity table
//!
//! Slots freed by a delete are parked in `pending_free` until the owning
//! query commits; only then do they become reusable. A rolled-back delete
//! can therefore always restore the entity under its original id.

use crate::storage::types::{GraphError, MAX_ENTITY_ID};

#[derive(Debug, Clone)]
pub struct DataBlock<T> {
    items: Vec<Option<T>>,
    free: Vec<u64>,
    pending_free: Vec<u64>,
    live: usize,
}

impl<T> Default for DataBlock<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            free: Vec::new(),
            pending_free: Vec::new(),
            live: 0,
        }
    }
}

impl<T> DataBlock<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `item`, reusing a vacant slot when one is available.
    pub fn allocate(&mut self, item: T) -> Result<u64, GraphError> {
        let id = match self.free.pop() {
            Some(id) => id,
            None => {
                let id = self.items.len() as u64;
                if id > MAX_ENTITY_ID {
                    return Err(GraphError::SchemaFull(
                        "entity id space exhausted".to_string(),
                    ));
                }
                self.items.push(None);
                id
            }
        };
        self.items[id as usize] = Some(item);
        self.live += 1;
        Ok(id)
    }

    /// Place `item` at a specific id, growing the table with vacant slots.
    /// Used by restore; the caller rebuilds the free list afterwards.
    pub fn insert_at(&mut self, id: u64, item: T) {
        let idx = id as usize;
        if idx >= self.items.len() {
            self.items.resize_with(idx + 1, || None);
        }
        if self.items[idx].is_none() {
            self.live += 1;
        }
        self.items[idx] = Some(item);
    }

    /// Extend the table with vacant slots up to `high_water`.
    pub fn reserve_until(&mut self, high_water: u64) {
        let len = high_water as usize;
        if len > self.items.len() {
            self.items.resize_with(len, || None);
        }
    }

    /// Mark every vacant slot below the high-water mark as reusable.
    pub fn rebuild_free_list(&mut self) {
        self.free = self
            .items
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, slot)| slot.is_none())
            .map(|(i, _)| i as u64)
            .collect();
        self.pending_free.clear();
    }

    pub fn get(&self, id: u64) -> Option<&T> {
        self.items.get(id as usize).and_then(|slot| slot.as_ref())
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut T> {
        self.items.get_mut(id as usize).and_then(|slot| slot.as_mut())
    }

    pub fn contains(&self, id: u64) -> bool {
        self.get(id).is_some()
    }

    /// Remove the entity; its slot stays reserved until [`DataBlock::commit`].
    pub fn remove(&mut self, id: u64) -> Option<T> {
        let item = self.items.get_mut(id as usize)?.take()?;
        self.live -= 1;
        self.pending_free.push(id);
        Some(item)
    }

    /// Undo a `remove` performed in the current query.
    pub fn restore(&mut self, id: u64, item: T) {
        if let Some(pos) = self.pending_free.iter().position(|&p| p == id) {
            self.pending_free.swap_remove(pos);
        }
        self.insert_at(id, item);
    }

    /// Undo an `allocate` performed in the current query.
    pub fn discard(&mut self, id: u64) -> Option<T> {
        let item = self.items.get_mut(id as usize)?.take()?;
        self.live -= 1;
        self.free.push(id);
        Some(item)
    }

    /// Release slots deleted by the committed query for reuse.
    pub fn commit(&mut self) {
        self.free.append(&mut self.pending_free);
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &T)> {
        self.items
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|item| (i as u64, item)))
    }

    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.iter().map(|(id, _)| id)
    }

    /// Number of live entities
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// High-water mark of allocated ids
    pub fn capacity(&self) -> u64 {
        self.items.len() as u64
    }

    /// Ids of vacant slots below the high-water mark, ascending.
    pub fn vacant_ids(&self) -> Vec<u64> {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_none())
            .map(|(i, _)| i as u64)
            .collect()
    }
}
