//! Signal canonicalisation and user tracking.
//!
//! Bits joined by direct connections are the same electrical signal. The
//! [`SigMap`] picks one representative per signal so that matchers can compare
//! signals by equality, and [`SigUsers`] answers which cells touch a signal.

use fxhash::{FxHashMap, FxHashSet};

use super::{CellId, Module, SigBit, SigSpec};

/// Canonical representatives for connected signal bits.
///
/// Constants always win as representatives; otherwise the smallest bit does.
/// The map is immutable once built.
#[derive(Debug, Clone, Default)]
pub struct SigMap {
    canonical: FxHashMap<SigBit, SigBit>,
}

impl SigMap {
    /// Compute the representatives for all the connections of a module.
    pub fn new(module: &Module) -> Self {
        let mut sets = UnionFind::default();
        for (lhs, rhs) in module.connections() {
            for (a, b) in lhs.iter().zip(rhs.iter()) {
                sets.union(a, b);
            }
        }
        let keys: Vec<SigBit> = sets.parent.keys().copied().collect();
        let canonical = keys
            .into_iter()
            .filter_map(|bit| {
                let root = sets.find(bit);
                (root != bit).then_some((bit, root))
            })
            .collect();
        Self { canonical }
    }

    /// The representative of a bit.
    #[inline]
    pub fn bit(&self, bit: SigBit) -> SigBit {
        self.canonical.get(&bit).copied().unwrap_or(bit)
    }

    /// Canonicalise every bit of a signal.
    pub fn apply(&self, sig: &SigSpec) -> SigSpec {
        sig.iter().map(|b| self.bit(b)).collect()
    }
}

#[derive(Debug, Default)]
struct UnionFind {
    parent: FxHashMap<SigBit, SigBit>,
}

impl UnionFind {
    fn find(&mut self, bit: SigBit) -> SigBit {
        let mut root = bit;
        while let Some(&p) = self.parent.get(&root) {
            if p == root {
                break;
            }
            root = p;
        }
        // Path compression.
        let mut cur = bit;
        while cur != root {
            let next = self.parent[&cur];
            self.parent.insert(cur, root);
            cur = next;
        }
        root
    }

    fn union(&mut self, a: SigBit, b: SigBit) {
        self.parent.entry(a).or_insert(a);
        self.parent.entry(b).or_insert(b);
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        let (root, child) = match (ra.is_const(), rb.is_const()) {
            (true, false) => (ra, rb),
            (false, true) => (rb, ra),
            _ => (ra.min(rb), ra.max(rb)),
        };
        self.parent.insert(child, root);
    }
}

/// The cells using each canonical signal bit.
///
/// Module ports count as a user, reported as `None`.
#[derive(Debug, Clone, Default)]
pub struct SigUsers {
    users: FxHashMap<SigBit, FxHashSet<Option<CellId>>>,
}

impl SigUsers {
    /// Collect the users of every signal of the module.
    pub fn new(module: &Module, sigmap: &SigMap) -> Self {
        let mut this = Self::default();
        for (id, cell) in module.cells() {
            for sig in cell.ports.values() {
                this.add(sigmap, sig, Some(id));
            }
        }
        for wire in module.ports() {
            let sig = SigSpec::from_wire(wire, module.wire(wire).width);
            this.add(sigmap, &sig, None);
        }
        this
    }

    fn add(&mut self, sigmap: &SigMap, sig: &SigSpec, user: Option<CellId>) {
        for bit in sig.iter().map(|b| sigmap.bit(b)) {
            if bit.is_const() {
                continue;
            }
            self.users.entry(bit).or_default().insert(user);
        }
    }

    /// The users of a canonical bit.
    pub fn users_of(&self, bit: SigBit) -> impl Iterator<Item = Option<CellId>> + '_ {
        self.users.get(&bit).into_iter().flatten().copied()
    }

    /// Number of distinct users over all the bits of a canonical signal.
    pub fn nusers(&self, sig: &SigSpec) -> usize {
        let mut seen: FxHashSet<Option<CellId>> = FxHashSet::default();
        for bit in sig.iter() {
            seen.extend(self.users_of(bit));
        }
        seen.len()
    }
}
