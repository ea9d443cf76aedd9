//! Bookkeeping for tentative bindings and rollbacks.

use fxhash::{FxHashMap, FxHashSet};
use indexmap::IndexSet;

use crate::netlist::CellId;

/// Where a pending rollback stops.
///
/// `Abort` unwinds past the outermost block and ends the search; it orders
/// below every depth so that it always wins over a block-level rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Unwind {
    /// Unwind the whole search.
    Abort,
    /// Unwind to the candidate loop running at this depth.
    To(usize),
}

/// Records which candidate loop bound each cell, which cells may no longer be
/// matched and which cells will be removed once the search is over.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    bindings: FxHashMap<CellId, usize>,
    poisoned: FxHashSet<CellId>,
    doomed: IndexSet<CellId>,
    target: Option<Unwind>,
}

impl Ledger {
    /// Record that `cell` was bound by the candidate loop at `depth`.
    ///
    /// The first binding wins: returns `false` and leaves the ledger untouched
    /// if the cell is already bound.
    pub fn note_binding(&mut self, cell: CellId, depth: usize) -> bool {
        match self.bindings.entry(cell) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(e) => {
                e.insert(depth);
                true
            }
        }
    }

    /// Forget the binding of `cell`.
    pub fn release(&mut self, cell: CellId) {
        self.bindings.remove(&cell);
    }

    /// The depth at which `cell` is bound, if any.
    pub fn binding(&self, cell: CellId) -> Option<usize> {
        self.bindings.get(&cell).copied()
    }

    /// Exclude `cell` from any further match.
    ///
    /// If the cell is currently bound, the search unwinds to the loop that
    /// bound it.
    pub fn poison(&mut self, cell: CellId) {
        if !self.poisoned.insert(cell) {
            return;
        }
        if let Some(depth) = self.binding(cell) {
            self.request(Unwind::To(depth));
        }
    }

    /// Whether `cell` has been poisoned.
    pub fn is_poisoned(&self, cell: CellId) -> bool {
        self.poisoned.contains(&cell)
    }

    /// Remove `cell` from the netlist once the search is over. Also poisons it.
    pub fn schedule_removal(&mut self, cell: CellId) {
        self.doomed.insert(cell);
        self.poison(cell);
    }

    /// The cells scheduled for removal, in scheduling order.
    pub fn doomed(&self) -> impl Iterator<Item = CellId> + '_ {
        self.doomed.iter().copied()
    }

    pub(crate) fn take_doomed(&mut self) -> IndexSet<CellId> {
        std::mem::take(&mut self.doomed)
    }

    /// Request a rollback. The shallowest pending target wins.
    pub fn request(&mut self, target: Unwind) {
        self.target = Some(match self.target {
            Some(current) => current.min(target),
            None => target,
        });
    }

    /// The pending rollback target.
    pub fn target(&self) -> Option<Unwind> {
        self.target
    }

    /// Called by the candidate loop at `depth` after each candidate.
    ///
    /// Clears a rollback aimed at this loop. Returns `true` if a rollback aimed
    /// further up is still pending, in which case the loop must return.
    pub fn absorb(&mut self, depth: usize) -> bool {
        match self.target {
            Some(Unwind::To(d)) if d == depth => {
                self.target = None;
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    pub(crate) fn clear_target(&mut self) {
        self.target = None;
    }

    /// Whether no binding is left and no rollback is pending.
    pub fn is_balanced(&self) -> bool {
        self.bindings.is_empty() && self.target.is_none()
    }

    /// Number of live bindings.
    pub fn num_bindings(&self) -> usize {
        self.bindings.len()
    }
}
