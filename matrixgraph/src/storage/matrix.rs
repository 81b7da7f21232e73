// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Sparse matrix views over node ids
//!
//! A [`DeltaMatrix`] is a compressed-sparse-row base plus two pending delta
//! sets: additions (`plus`) and deletions (`minus`). Reads consult the base
//! and the deltas together, so a view is always consistent with every write
//! staged so far; [`DeltaMatrix::flush`] folds the deltas back into the base.
//!
//! Invariants kept by every mutation:
//! - `minus` only holds coordinates present in the base.
//! - `minus` and `plus` never share a coordinate.

use once_cell::sync::OnceCell;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::storage::types::EdgeId;

/// Immutable compressed-sparse-row matrix. Only non-empty rows are stored.
#[derive(Debug, Clone)]
pub struct CsrMatrix<T> {
    row_ids: Vec<u64>,
    row_ptrs: Vec<usize>,
    cols: Vec<u64>,
    vals: Vec<T>,
}

impl<T: Clone> Default for CsrMatrix<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> CsrMatrix<T> {
    pub fn new() -> Self {
        Self {
            row_ids: Vec::new(),
            row_ptrs: vec![0],
            cols: Vec::new(),
            vals: Vec::new(),
        }
    }

    /// Build from unsorted `(row, col, value)` triples. Later duplicates win.
    pub fn from_entries(mut triples: Vec<(u64, u64, T)>) -> Self {
        if triples.is_empty() {
            return Self::new();
        }
        triples.sort_by_key(|(r, c, _)| (*r, *c));
        triples.dedup_by(|later, earlier| {
            if later.0 == earlier.0 && later.1 == earlier.1 {
                std::mem::swap(&mut earlier.2, &mut later.2);
                true
            } else {
                false
            }
        });

        let mut row_ids = Vec::new();
        let mut row_ptrs = Vec::new();
        let mut cols = Vec::with_capacity(triples.len());
        let mut vals = Vec::with_capacity(triples.len());
        for (row, col, val) in triples {
            if row_ids.last() != Some(&row) {
                row_ids.push(row);
                row_ptrs.push(cols.len());
            }
            cols.push(col);
            vals.push(val);
        }
        row_ptrs.push(cols.len());
        Self {
            row_ids,
            row_ptrs,
            cols,
            vals,
        }
    }

    fn row_range(&self, row: u64) -> std::ops::Range<usize> {
        match self.row_ids.binary_search(&row) {
            Ok(pos) => self.row_ptrs[pos]..self.row_ptrs[pos + 1],
            Err(_) => 0..0,
        }
    }

    /// Column ids and values of a row, sorted by column.
    pub fn row(&self, row: u64) -> (&[u64], &[T]) {
        let range = self.row_range(row);
        (&self.cols[range.clone()], &self.vals[range])
    }

    pub fn get(&self, row: u64, col: u64) -> Option<&T> {
        let range = self.row_range(row);
        let start = range.start;
        self.cols[range]
            .binary_search(&col)
            .ok()
            .map(|pos| &self.vals[start + pos])
    }

    pub fn nnz(&self) -> usize {
        self.cols.len()
    }

    pub fn entries(&self) -> Vec<(u64, u64, T)> {
        let mut out = Vec::with_capacity(self.nnz());
        for (idx, &row) in self.row_ids.iter().enumerate() {
            for i in self.row_ptrs[idx]..self.row_ptrs[idx + 1] {
                out.push((row, self.cols[i], self.vals[i].clone()));
            }
        }
        out
    }

    pub fn transpose(&self) -> Self {
        let swapped = self
            .entries()
            .into_iter()
            .map(|(r, c, v)| (c, r, v))
            .collect();
        Self::from_entries(swapped)
    }
}

/// Sparse matrix with pending deltas and a lazily materialized transpose.
#[derive(Debug)]
pub struct DeltaMatrix<T> {
    dim: u64,
    main: CsrMatrix<T>,
    plus: HashMap<u64, BTreeMap<u64, T>>,
    minus: HashSet<(u64, u64)>,
    transposed: OnceCell<CsrMatrix<T>>,
}

impl<T: Clone> Clone for DeltaMatrix<T> {
    fn clone(&self) -> Self {
        Self {
            dim: self.dim,
            main: self.main.clone(),
            plus: self.plus.clone(),
            minus: self.minus.clone(),
            transposed: OnceCell::new(),
        }
    }
}

impl<T: Clone> Default for DeltaMatrix<T> {
    fn default() -> Self {
        Self::new(0)
    }
}

impl<T: Clone> DeltaMatrix<T> {
    pub fn new(dim: u64) -> Self {
        Self {
            dim,
            main: CsrMatrix::new(),
            plus: HashMap::new(),
            minus: HashSet::new(),
            transposed: OnceCell::new(),
        }
    }

    pub fn dim(&self) -> u64 {
        self.dim
    }

    /// Grow the logical dimension to cover `required` rows, rounding up to a
    /// multiple of `buffer` and reserving delta capacity for the new rows.
    pub fn ensure_dim(&mut self, required: u64, buffer: u64) {
        if required <= self.dim {
            return;
        }
        let buffer = buffer.max(1);
        let new_dim = required.div_ceil(buffer) * buffer;
        self.plus.reserve(buffer as usize);
        self.dim = new_dim;
    }

    pub fn get(&self, row: u64, col: u64) -> Option<&T> {
        if let Some(v) = self.plus.get(&row).and_then(|r| r.get(&col)) {
            return Some(v);
        }
        if self.minus.contains(&(row, col)) {
            return None;
        }
        self.main.get(row, col)
    }

    pub fn contains(&self, row: u64, col: u64) -> bool {
        self.get(row, col).is_some()
    }

    pub fn set(&mut self, row: u64, col: u64, value: T) {
        self.minus.remove(&(row, col));
        self.plus.entry(row).or_default().insert(col, value);
        self.transposed.take();
    }

    /// Clear an entry, returning its previous value.
    pub fn remove(&mut self, row: u64, col: u64) -> Option<T> {
        let previous = self.get(row, col).cloned();
        if let Some(r) = self.plus.get_mut(&row) {
            r.remove(&col);
            if r.is_empty() {
                self.plus.remove(&row);
            }
        }
        if self.main.get(row, col).is_some() {
            self.minus.insert((row, col));
        }
        if previous.is_some() {
            self.transposed.take();
        }
        previous
    }

    /// Logical entries of a row, sorted by column.
    pub fn row(&self, row: u64) -> Vec<(u64, T)> {
        let (cols, vals) = self.main.row(row);
        let pending = self.plus.get(&row);
        let base: Vec<(u64, &T)> = cols
            .iter()
            .zip(vals.iter())
            .filter(|(c, _)| {
                !self.minus.contains(&(row, **c))
                    && !pending.map(|p| p.contains_key(*c)).unwrap_or(false)
            })
            .map(|(c, v)| (*c, v))
            .collect();
        let added: Vec<(u64, &T)> = pending
            .into_iter()
            .flat_map(|p| p.iter().map(|(c, v)| (*c, v)))
            .collect();

        let mut out = Vec::with_capacity(base.len() + added.len());
        let (mut i, mut j) = (0, 0);
        while i < base.len() || j < added.len() {
            let take_base = match (base.get(i), added.get(j)) {
                (Some(b), Some(a)) => b.0 < a.0,
                (Some(_), None) => true,
                _ => false,
            };
            if take_base {
                out.push((base[i].0, base[i].1.clone()));
                i += 1;
            } else {
                out.push((added[j].0, added[j].1.clone()));
                j += 1;
            }
        }
        out
    }

    /// Row entries whose column is set on the diagonal of `mask`.
    pub fn masked_row<M: Clone>(&self, row: u64, mask: &DeltaMatrix<M>) -> Vec<(u64, T)> {
        self.row(row)
            .into_iter()
            .filter(|(col, _)| mask.contains(*col, *col))
            .collect()
    }

    /// Logical entries of a column, read through the materialized transpose.
    pub fn column(&self, col: u64) -> Vec<(u64, T)> {
        let transposed = self.transposed();
        let (rows, vals) = transposed.row(col);
        rows.iter().copied().zip(vals.iter().cloned()).collect()
    }

    /// Transpose of the current logical content, built on first use.
    pub fn transposed(&self) -> &CsrMatrix<T> {
        self.transposed.get_or_init(|| {
            let swapped = self
                .entries()
                .into_iter()
                .map(|(r, c, v)| (c, r, v))
                .collect();
            CsrMatrix::from_entries(swapped)
        })
    }

    /// All logical entries sorted by `(row, col)`.
    pub fn entries(&self) -> Vec<(u64, u64, T)> {
        let mut out: Vec<(u64, u64, T)> = self
            .main
            .entries()
            .into_iter()
            .filter(|(r, c, _)| {
                !self.minus.contains(&(*r, *c))
                    && !self.plus.get(r).map(|p| p.contains_key(c)).unwrap_or(false)
            })
            .collect();
        for (row, cols) in &self.plus {
            for (col, val) in cols {
                out.push((*row, *col, val.clone()));
            }
        }
        out.sort_by_key(|(r, c, _)| (*r, *c));
        out
    }

    /// Number of logical entries
    pub fn nvals(&self) -> usize {
        let overridden = self
            .plus
            .iter()
            .flat_map(|(r, cols)| cols.keys().map(move |c| (*r, *c)))
            .filter(|(r, c)| self.main.get(*r, *c).is_some())
            .count();
        let pending: usize = self.plus.values().map(BTreeMap::len).sum();
        self.main.nnz() - self.minus.len() + pending - overridden
    }

    pub fn has_pending(&self) -> bool {
        !self.plus.is_empty() || !self.minus.is_empty()
    }

    /// Fold pending deltas into the base. Logical content is unchanged, so a
    /// materialized transpose stays valid.
    pub fn flush(&mut self) {
        if !self.has_pending() {
            return;
        }
        let entries = self.entries();
        self.main = CsrMatrix::from_entries(entries);
        self.plus.clear();
        self.minus.clear();
    }
}

/// Cell of a relation matrix: every edge of one type between a node pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeCell {
    Single(EdgeId),
    Multi(Vec<EdgeId>),
}

impl EdgeCell {
    pub fn ids(&self) -> Vec<EdgeId> {
        match self {
            EdgeCell::Single(id) => vec![*id],
            EdgeCell::Multi(ids) => ids.clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            EdgeCell::Single(_) => 1,
            EdgeCell::Multi(ids) => ids.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn with(&self, id: EdgeId) -> EdgeCell {
        let mut ids = self.ids();
        if !ids.contains(&id) {
            ids.push(id);
        }
        EdgeCell::Multi(ids)
    }

    /// Cell without `id`; `None` when it was the last edge.
    pub fn without(&self, id: EdgeId) -> Option<EdgeCell> {
        let ids: Vec<EdgeId> = self.ids().into_iter().filter(|e| *e != id).collect();
        match ids.len() {
            0 => None,
            1 => Some(EdgeCell::Single(ids[0])),
            _ => Some(EdgeCell::Multi(ids)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_merges_base_and_pending() {
        let mut m: DeltaMatrix<u32> = DeltaMatrix::new(8);
        m.set(1, 5, 50);
        m.set(1, 2, 20);
        m.flush();
        m.set(1, 3, 30);
        m.set(1, 5, 55);
        m.remove(1, 2);
        assert_eq!(m.row(1), vec![(3, 30), (5, 55)]);
        assert_eq!(m.nvals(), 2);
        m.flush();
        assert!(!m.has_pending());
        assert_eq!(m.row(1), vec![(3, 30), (5, 55)]);
    }

    #[test]
    fn test_remove_then_set_restores_entry() {
        let mut m: DeltaMatrix<()> = DeltaMatrix::new(4);
        m.set(0, 1, ());
        m.flush();
        assert!(m.remove(0, 1).is_some());
        assert!(!m.contains(0, 1));
        m.set(0, 1, ());
        assert!(m.contains(0, 1));
        assert_eq!(m.nvals(), 1);
    }

    #[test]
    fn test_transpose_invalidated_on_mutation() {
        let mut m: DeltaMatrix<()> = DeltaMatrix::new(4);
        m.set(0, 2, ());
        assert_eq!(m.column(2), vec![(0, ())]);
        m.set(1, 2, ());
        assert_eq!(m.column(2), vec![(0, ()), (1, ())]);
    }

    #[test]
    fn test_masked_row() {
        let mut m: DeltaMatrix<()> = DeltaMatrix::new(4);
        m.set(0, 1, ());
        m.set(0, 2, ());
        let mut mask: DeltaMatrix<()> = DeltaMatrix::new(4);
        mask.set(2, 2, ());
        assert_eq!(m.masked_row(0, &mask), vec![(2, ())]);
    }

    #[test]
    fn test_ensure_dim_rounds_to_buffer() {
        let mut m: DeltaMatrix<()> = DeltaMatrix::new(0);
        m.ensure_dim(1, 128);
        assert_eq!(m.dim(), 128);
        m.ensure_dim(129, 128);
        assert_eq!(m.dim(), 256);
    }

    #[test]
    fn test_edge_cell_multi_edges() {
        let cell = EdgeCell::Single(4).with(7);
        assert_eq!(cell.ids(), vec![4, 7]);
        assert_eq!(cell.without(4), Some(EdgeCell::Single(7)));
        assert_eq!(EdgeCell::Single(4).without(4), None);
    }
}
