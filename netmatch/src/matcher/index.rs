//! Keyed candidate tables.

use std::hash::Hash;

use fxhash::{FxHashMap, FxHashSet};

use crate::netlist::{Cell, CellId};

/// A cell listed in an [`IndexTable`], with the extra data computed when it
/// was indexed (e.g. which operand role produced the key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Candidate<V = ()> {
    /// The candidate cell.
    pub cell: CellId,
    /// Data attached by the keying function.
    pub extra: V,
}

/// Candidate cells grouped by key.
///
/// Tables are built once from a worklist of cells, and are read-only during
/// the search. The candidates under a key keep their insertion order, and a
/// cell is listed at most once per key.
#[derive(Debug, Clone)]
pub struct IndexTable<K, V = ()> {
    entries: FxHashMap<K, Vec<Candidate<V>>>,
    cells: FxHashSet<CellId>,
    len: usize,
}

impl<K, V> Default for IndexTable<K, V> {
    fn default() -> Self {
        Self {
            entries: FxHashMap::default(),
            cells: FxHashSet::default(),
            len: 0,
        }
    }
}

impl<K: Eq + Hash, V> IndexTable<K, V> {
    /// Index the cells of a worklist.
    ///
    /// Cells rejected by `predicate` are skipped. The others are listed under
    /// every key returned by `keys`.
    pub fn build<'c, P, F, I>(
        cells: impl IntoIterator<Item = (CellId, &'c Cell)>,
        mut predicate: P,
        mut keys: F,
    ) -> Self
    where
        P: FnMut(CellId, &'c Cell) -> bool,
        F: FnMut(CellId, &'c Cell) -> I,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut table = Self::default();
        for (id, cell) in cells {
            if !predicate(id, cell) {
                continue;
            }
            for (key, extra) in keys(id, cell) {
                table.insert(key, id, extra);
            }
        }
        table
    }

    /// Add a candidate under `key`. Returns `false` if the cell was already
    /// listed under that key; the first entry is kept.
    pub fn insert(&mut self, key: K, cell: CellId, extra: V) -> bool {
        let list = self.entries.entry(key).or_default();
        if list.iter().any(|c| c.cell == cell) {
            return false;
        }
        list.push(Candidate { cell, extra });
        self.cells.insert(cell);
        self.len += 1;
        true
    }

    /// The candidates listed under `key`, in insertion order.
    pub fn lookup(&self, key: &K) -> &[Candidate<V>] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Whether `cell` is listed under any key.
    pub fn contains_cell(&self, cell: CellId) -> bool {
        self.cells.contains(&cell)
    }

    /// Total number of entries, over all keys.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of distinct keys.
    pub fn num_keys(&self) -> usize {
        self.entries.len()
    }
}
