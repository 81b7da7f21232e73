// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Exact-match index
//!
//! One ordered map per indexed attribute, from value to the set of entity
//! ids holding it. Ordered maps give equality, range and string-prefix
//! lookups from the same structure.

use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use super::types::{IndexDefinition, IndexState};
use crate::storage::types::{AttributeId, LabelId, PropertyMap};
use crate::storage::value::Value;

#[derive(Debug)]
pub struct ExactMatchIndex {
    definition: IndexDefinition,
    label_id: LabelId,
    attributes: Vec<AttributeId>,
    state: IndexState,
    entries: RwLock<Vec<BTreeMap<Value, BTreeSet<u64>>>>,
}

fn indexable(value: &Value) -> bool {
    match value {
        Value::Float(f) => !f.is_nan(),
        Value::Boolean(_) | Value::Integer(_) | Value::String(_) | Value::Point(_) => true,
        _ => false,
    }
}

fn same_class(a: &Value, b: &Value) -> bool {
    a.compare(b).is_some()
}

impl ExactMatchIndex {
    pub fn new(definition: IndexDefinition, label_id: LabelId, attributes: Vec<AttributeId>) -> Self {
        let maps = attributes.iter().map(|_| BTreeMap::new()).collect();
        Self {
            definition,
            label_id,
            attributes,
            state: IndexState::default(),
            entries: RwLock::new(maps),
        }
    }

    pub fn definition(&self) -> &IndexDefinition {
        &self.definition
    }

    pub fn label_id(&self) -> LabelId {
        self.label_id
    }

    pub fn attributes(&self) -> &[AttributeId] {
        &self.attributes
    }

    pub fn state(&self) -> &IndexState {
        &self.state
    }

    pub fn covers(&self, attr: AttributeId) -> bool {
        self.attributes.contains(&attr)
    }

    pub fn index_entity(&self, id: u64, properties: &PropertyMap) {
        let mut maps = self.entries.write();
        for (slot, attr) in self.attributes.iter().enumerate() {
            if let Some(value) = properties.get(*attr) {
                if indexable(value) {
                    maps[slot].entry(value.clone()).or_default().insert(id);
                }
            }
        }
    }

    pub fn remove_entity(&self, id: u64, properties: &PropertyMap) {
        let mut maps = self.entries.write();
        for (slot, attr) in self.attributes.iter().enumerate() {
            if let Some(value) = properties.get(*attr) {
                remove_posting(&mut maps[slot], value, id);
            }
        }
    }

    /// Reflect a single attribute change.
    pub fn update_attribute(
        &self,
        id: u64,
        attr: AttributeId,
        old: Option<&Value>,
        new: Option<&Value>,
    ) {
        let Some(slot) = self.attributes.iter().position(|a| *a == attr) else {
            return;
        };
        let mut maps = self.entries.write();
        if let Some(old) = old {
            remove_posting(&mut maps[slot], old, id);
        }
        if let Some(new) = new {
            if indexable(new) {
                maps[slot].entry(new.clone()).or_default().insert(id);
            }
        }
    }

    pub fn seek_eq(&self, attr: AttributeId, value: &Value) -> Vec<u64> {
        let Some(slot) = self.attributes.iter().position(|a| *a == attr) else {
            return Vec::new();
        };
        let maps = self.entries.read();
        // 1 and 1.0 share a key under the total order, so a single probe
        // answers numeric equality across representations.
        match maps[slot].get(value) {
            Some(ids) if value.equals(value) == Some(true) => ids.iter().copied().collect(),
            _ => Vec::new(),
        }
    }

    /// Entities whose attribute falls within the bounds. Values of a type
    /// incomparable with the bounds never match.
    pub fn seek_range(
        &self,
        attr: AttributeId,
        lower: Bound<&Value>,
        upper: Bound<&Value>,
    ) -> Vec<u64> {
        let Some(slot) = self.attributes.iter().position(|a| *a == attr) else {
            return Vec::new();
        };
        let reference = match (&lower, &upper) {
            (Bound::Included(v) | Bound::Excluded(v), _) => (*v).clone(),
            (_, Bound::Included(v) | Bound::Excluded(v)) => (*v).clone(),
            _ => return Vec::new(),
        };
        if let (Bound::Included(lo) | Bound::Excluded(lo), Bound::Included(hi) | Bound::Excluded(hi)) =
            (&lower, &upper)
        {
            let empty = match lo.cmp(hi) {
                std::cmp::Ordering::Greater => true,
                std::cmp::Ordering::Equal => {
                    matches!(lower, Bound::Excluded(_)) || matches!(upper, Bound::Excluded(_))
                }
                std::cmp::Ordering::Less => false,
            };
            if empty {
                return Vec::new();
            }
        }
        let maps = self.entries.read();
        let mut out = BTreeSet::new();
        for (value, ids) in maps[slot].range::<Value, _>((lower, upper)) {
            if same_class(value, &reference) {
                out.extend(ids.iter().copied());
            }
        }
        out.into_iter().collect()
    }

    pub fn seek_prefix(&self, attr: AttributeId, prefix: &str) -> Vec<u64> {
        let Some(slot) = self.attributes.iter().position(|a| *a == attr) else {
            return Vec::new();
        };
        let start = Value::String(prefix.to_string());
        let maps = self.entries.read();
        let mut out = BTreeSet::new();
        for (value, ids) in maps[slot].range::<Value, _>((Bound::Included(&start), Bound::Unbounded)) {
            match value {
                Value::String(s) if s.starts_with(prefix) => out.extend(ids.iter().copied()),
                _ => break,
            }
        }
        out.into_iter().collect()
    }

    /// Number of distinct keys of the first attribute
    pub fn key_count(&self) -> usize {
        self.entries.read().first().map(BTreeMap::len).unwrap_or(0)
    }
}

fn remove_posting(map: &mut BTreeMap<Value, BTreeSet<u64>>, value: &Value, id: u64) {
    if let Some(ids) = map.get_mut(value) {
        ids.remove(&id);
        if ids.is_empty() {
            map.remove(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::EntityKind;

    fn index() -> ExactMatchIndex {
        let def = IndexDefinition::exact(EntityKind::Node, "L", vec!["v".into()]);
        ExactMatchIndex::new(def, 0, vec![7])
    }

    fn props(v: Value) -> PropertyMap {
        let mut p = PropertyMap::new();
        p.set(7, v);
        p
    }

    #[test]
    fn test_equality_seek_across_numeric_types() {
        let idx = index();
        idx.index_entity(1, &props(Value::Integer(3)));
        idx.index_entity(2, &props(Value::Float(3.0)));
        idx.index_entity(3, &props(Value::Integer(4)));
        assert_eq!(idx.seek_eq(7, &Value::Integer(3)), vec![1, 2]);
    }

    #[test]
    fn test_range_seek_ignores_other_types() {
        let idx = index();
        idx.index_entity(1, &props(Value::Integer(1)));
        idx.index_entity(2, &props(Value::Integer(5)));
        idx.index_entity(3, &props(Value::String("z".into())));
        idx.index_entity(4, &props(Value::Point(crate::storage::value::Point {
            latitude: 1.0,
            longitude: 1.0,
        })));
        let hits = idx.seek_range(7, Bound::Excluded(&Value::Integer(2)), Bound::Unbounded);
        assert_eq!(hits, vec![2]);
    }

    #[test]
    fn test_prefix_seek_and_update() {
        let idx = index();
        idx.index_entity(1, &props(Value::String("apple".into())));
        idx.index_entity(2, &props(Value::String("apricot".into())));
        idx.index_entity(3, &props(Value::String("banana".into())));
        assert_eq!(idx.seek_prefix(7, "ap"), vec![1, 2]);
        idx.update_attribute(2, 7, Some(&Value::String("apricot".into())), None);
        assert_eq!(idx.seek_prefix(7, "ap"), vec![1]);
    }

    #[test]
    fn test_status_transitions() {
        let idx = index();
        assert!(!idx.state().is_operational());
        idx.state().mark_operational();
        assert!(idx.state().is_operational());
    }
}
