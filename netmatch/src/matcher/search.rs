//! The search context shared by all the blocks of a pattern.

use smol_str::SmolStr;

use super::index::Candidate;
use super::ledger::{Ledger, Unwind};
use super::rng::XorShift32;
use super::SEARCH_TARGET;
use crate::netlist::{CellId, Const, Module, SigMap, SigSpec, SigUsers};

/// The result of a search block.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flow {
    /// The subtree has been explored. The caller carries on.
    Continue,
    /// A rollback is pending. The caller must restore its bindings and return
    /// immediately.
    Unwind,
}

impl Flow {
    /// Whether a rollback is pending.
    #[inline]
    pub fn is_unwind(self) -> bool {
        self == Flow::Unwind
    }
}

/// Whether a candidate loop also explores the case where no candidate is
/// bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Presence {
    /// After the candidates, call the successor once more with nothing bound.
    Optional,
    /// Only the listed candidates are explored.
    Required,
}

/// Order in which candidate loops try their candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TieBreak {
    /// Index insertion order.
    #[default]
    Insertion,
    /// A pseudo-random permutation, reproducible for a given seed.
    Seeded(u32),
}

/// Configuration of a search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SearchOptions {
    /// Candidate ordering.
    pub tie_break: TieBreak,
}

type AcceptFn<'m, S> = Box<dyn FnMut(&mut SearchContext<'m, S>) + 'm>;

/// The mutable state of a running search.
///
/// Owns the module for the duration of the search, together with its signal
/// map, the match state `S` of the pattern and the rollback [`Ledger`]. Cells
/// scheduled for removal are removed when the context is dropped.
pub struct SearchContext<'m, S> {
    module: &'m mut Module,
    sigmap: SigMap,
    users: SigUsers,
    /// The bindings of the pattern.
    pub st: S,
    ledger: Ledger,
    accepted: usize,
    rng: Option<XorShift32>,
    on_accept: Option<AcceptFn<'m, S>>,
}

impl<'m, S: Default> SearchContext<'m, S> {
    /// Create a search context with the default options.
    pub fn new(module: &'m mut Module) -> Self {
        Self::with_options(module, SearchOptions::default())
    }

    /// Create a search context.
    pub fn with_options(module: &'m mut Module, options: SearchOptions) -> Self {
        let sigmap = SigMap::new(module);
        let users = SigUsers::new(module, &sigmap);
        let rng = match options.tie_break {
            TieBreak::Insertion => None,
            TieBreak::Seeded(seed) => Some(XorShift32::new(seed)),
        };
        Self {
            module,
            sigmap,
            users,
            st: S::default(),
            ledger: Ledger::default(),
            accepted: 0,
            rng,
            on_accept: None,
        }
    }

    /// Run a search from its top block, calling `on_accept` for every match.
    ///
    /// Returns the number of matches accepted during this run.
    ///
    /// # Panics
    ///
    /// If a block leaves a binding in the ledger.
    pub fn run(
        &mut self,
        on_accept: impl FnMut(&mut SearchContext<'m, S>) + 'm,
        top: impl FnOnce(&mut Self, usize) -> Flow,
    ) -> usize {
        self.st = S::default();
        self.on_accept = Some(Box::new(on_accept));
        let before = self.accepted;

        if top(self, 1).is_unwind() {
            tracing::trace!(target: SEARCH_TARGET, "search aborted");
        }
        if self.ledger.target() == Some(Unwind::Abort) {
            self.ledger.clear_target();
        }
        self.on_accept = None;

        assert!(
            self.ledger.is_balanced(),
            "unbalanced ledger after search: {} bindings left, target {:?}",
            self.ledger.num_bindings(),
            self.ledger.target()
        );
        self.accepted - before
    }
}

impl<'m, S> SearchContext<'m, S> {
    /// Explore the candidates of a table.
    ///
    /// For each candidate that is not poisoned and passes `filter`, `bind`
    /// records it in the match state and `next` searches the rest of the
    /// pattern at `depth + 1`. A rollback aimed at this loop moves on to the
    /// next candidate; one aimed further up returns [`Flow::Unwind`].
    ///
    /// With [`Presence::Optional`], `bind(None)` is followed by a last call to
    /// `next`.
    pub fn iterate<V>(
        &mut self,
        depth: usize,
        candidates: &[Candidate<V>],
        presence: Presence,
        mut filter: impl FnMut(&Self, &Candidate<V>) -> bool,
        mut bind: impl FnMut(&mut Self, Option<&Candidate<V>>),
        mut next: impl FnMut(&mut Self, usize) -> Flow,
    ) -> Flow {
        let mut order: Vec<usize> = (0..candidates.len()).collect();
        if let Some(rng) = &mut self.rng {
            rng.shuffle(&mut order);
        }

        for i in order {
            let candidate = &candidates[i];
            if self.ledger.is_poisoned(candidate.cell) || !filter(&*self, candidate) {
                continue;
            }
            bind(self, Some(candidate));
            let noted = self.ledger.note_binding(candidate.cell, depth);
            let flow = next(self, depth + 1);
            if noted {
                self.ledger.release(candidate.cell);
            }
            if self.settle(flow, depth) {
                return Flow::Unwind;
            }
            if flow.is_unwind() {
                tracing::trace!(target: SEARCH_TARGET, depth, cell = %candidate.cell, "rolled back");
            }
        }

        if presence == Presence::Optional {
            bind(self, None);
            let flow = next(self, depth + 1);
            if self.settle(flow, depth) {
                return Flow::Unwind;
            }
        }
        Flow::Continue
    }

    /// Absorb a rollback aimed at `depth` once the successor has returned.
    /// Returns true if the loop at `depth` must unwind as well.
    fn settle(&mut self, flow: Flow, depth: usize) -> bool {
        match flow {
            Flow::Continue => {
                debug_assert!(
                    self.ledger.target().is_none(),
                    "successor at depth {} returned with a rollback pending",
                    depth + 1
                );
                false
            }
            Flow::Unwind => self.ledger.absorb(depth),
        }
    }

    /// Report the current bindings as a match.
    ///
    /// Returns [`Flow::Unwind`] if the accept callback poisoned a bound cell
    /// or finished the search.
    pub fn accept(&mut self) -> Flow {
        self.accepted += 1;
        tracing::trace!(target: SEARCH_TARGET, n = self.accepted, "accept");
        if let Some(mut on_accept) = self.on_accept.take() {
            on_accept(self);
            self.on_accept = Some(on_accept);
        }
        self.flow()
    }

    /// [`Flow::Unwind`] if a rollback is pending.
    pub fn flow(&self) -> Flow {
        match self.ledger.target() {
            Some(_) => Flow::Unwind,
            None => Flow::Continue,
        }
    }

    /// The module being searched.
    pub fn module(&self) -> &Module {
        &*self.module
    }

    /// Mutable access to the module, for rewrites.
    ///
    /// Cells must not be removed while the search runs; use
    /// [`SearchContext::schedule_removal`].
    pub fn module_mut(&mut self) -> &mut Module {
        &mut *self.module
    }

    /// The signal map computed when the context was created.
    pub fn sigmap(&self) -> &SigMap {
        &self.sigmap
    }

    /// The users of each signal, computed when the context was created.
    pub fn users(&self) -> &SigUsers {
        &self.users
    }

    /// Canonicalise a signal.
    pub fn sig(&self, sig: &SigSpec) -> SigSpec {
        self.sigmap.apply(sig)
    }

    /// The canonical signal connected to a port.
    ///
    /// # Panics
    ///
    /// If the cell has no such port.
    pub fn port(&self, cell: CellId, port: &str) -> SigSpec {
        let c = &self.module[cell];
        match c.port(port) {
            Some(sig) => self.sigmap.apply(sig),
            None => panic!("cell {} ({}) has no port {port}", c.name, c.kind),
        }
    }

    /// The canonical signal connected to a port, or `default` if it is not
    /// connected.
    pub fn port_or(&self, cell: CellId, port: &str, default: SigSpec) -> SigSpec {
        self.module[cell]
            .port(port)
            .map_or(default, |sig| self.sigmap.apply(sig))
    }

    /// Whether the cell has a port.
    pub fn has_port(&self, cell: CellId, port: &str) -> bool {
        self.module[cell].has_port(port)
    }

    /// The value of a parameter.
    ///
    /// # Panics
    ///
    /// If the cell has no such parameter.
    pub fn param(&self, cell: CellId, param: &str) -> &Const {
        let c = &self.module[cell];
        match c.param(param) {
            Some(value) => value,
            None => panic!("cell {} ({}) has no parameter {param}", c.name, c.kind),
        }
    }

    /// The value of a parameter, or `default` if it is not set.
    pub fn param_or(&self, cell: CellId, param: &str, default: Const) -> Const {
        self.module[cell].param(param).cloned().unwrap_or(default)
    }

    /// The type of a cell.
    pub fn kind(&self, cell: CellId) -> &SmolStr {
        &self.module[cell].kind
    }

    /// Number of distinct cells (and module ports) using a canonical signal.
    pub fn nusers(&self, sig: &SigSpec) -> usize {
        self.users.nusers(sig)
    }

    /// Exclude a cell from any further match. If it is bound, the search
    /// unwinds to the loop that bound it.
    pub fn poison(&mut self, cell: CellId) {
        self.ledger.poison(cell);
    }

    /// Remove a cell once the search is over. Also poisons it.
    pub fn schedule_removal(&mut self, cell: CellId) {
        self.ledger.schedule_removal(cell);
    }

    /// Stop the search after the current accept.
    pub fn finish(&mut self) {
        self.ledger.request(Unwind::Abort);
    }

    /// Total number of accepted matches.
    pub fn accepted(&self) -> usize {
        self.accepted
    }

    /// The rollback ledger.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }
}

impl<S> Drop for SearchContext<'_, S> {
    fn drop(&mut self) {
        for cell in self.ledger.take_doomed() {
            match self.module.remove_cell(cell) {
                Ok(removed) => {
                    tracing::trace!(target: SEARCH_TARGET, cell = %removed.name, "removed")
                }
                Err(e) => tracing::warn!(target: SEARCH_TARGET, "{e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::IndexTable;
    use rstest::{fixture, rstest};

    #[derive(Debug, Default)]
    struct PairState {
        outer: Option<CellId>,
        inner: Option<CellId>,
    }

    struct Tables {
        outer: IndexTable<()>,
        inner: IndexTable<()>,
    }

    impl Tables {
        fn new(module: &Module) -> Self {
            let of_kind = |kind: &'static str| {
                IndexTable::build(module.cells(), move |_, c| c.kind == kind, |_, _| [((), ())])
            };
            Self {
                outer: of_kind("$outer"),
                inner: of_kind("$inner"),
            }
        }
    }

    fn outer_block(t: &Tables, presence: Presence, cx: &mut SearchContext<PairState>, depth: usize) -> Flow {
        let backup = cx.st.outer;
        let flow = cx.iterate(
            depth,
            t.outer.lookup(&()),
            Presence::Required,
            |_, _| true,
            |cx, c| cx.st.outer = c.map(|c| c.cell),
            |cx, depth| inner_block(t, presence, cx, depth),
        );
        cx.st.outer = backup;
        flow
    }

    fn inner_block(t: &Tables, presence: Presence, cx: &mut SearchContext<PairState>, depth: usize) -> Flow {
        let backup = cx.st.inner;
        let flow = cx.iterate(
            depth,
            t.inner.lookup(&()),
            presence,
            |_, _| true,
            |cx, c| cx.st.inner = c.map(|c| c.cell),
            |cx, _| cx.accept(),
        );
        cx.st.inner = backup;
        flow
    }

    /// Two `$outer` cells and three `$inner` cells.
    #[fixture]
    fn pairs() -> Module {
        let mut module = Module::new("top");
        for name in ["o0", "o1"] {
            module.add_cell(name, "$outer");
        }
        for name in ["i0", "i1", "i2"] {
            module.add_cell(name, "$inner");
        }
        module
    }

    type Seen = Vec<(String, Option<String>)>;

    /// Run the pair pattern, calling `hook` after recording each match.
    fn run_pairs(
        module: &mut Module,
        options: SearchOptions,
        presence: Presence,
        mut hook: impl FnMut(&mut SearchContext<PairState>, usize),
    ) -> (usize, Seen) {
        let tables = Tables::new(module);
        let mut seen = Seen::new();
        let count = {
            let mut cx = SearchContext::<PairState>::with_options(module, options);
            let n = cx.run(
                |cx| {
                    let name = |c: CellId| cx.module()[c].name.to_string();
                    let outer = cx.st.outer.map(name).unwrap_or_default();
                    let inner = cx.st.inner.map(name);
                    seen.push((outer, inner));
                    hook(cx, seen.len());
                },
                |cx, depth| outer_block(&tables, presence, cx, depth),
            );
            assert!(cx.ledger().is_balanced());
            n
        };
        (count, seen)
    }

    fn pairs_of(list: &[(&str, Option<&str>)]) -> Seen {
        list.iter()
            .map(|(o, i)| (o.to_string(), i.map(str::to_string)))
            .collect()
    }

    #[rstest]
    fn exhaustive_search(mut pairs: Module) {
        let (n, seen) = run_pairs(&mut pairs, SearchOptions::default(), Presence::Required, |_, _| {});
        assert_eq!(n, 6);
        assert_eq!(seen[0], ("o0".to_string(), Some("i0".to_string())));
        assert_eq!(seen[5], ("o1".to_string(), Some("i2".to_string())));
    }

    #[rstest]
    fn optional_branch(mut pairs: Module) {
        let (n, seen) = run_pairs(&mut pairs, SearchOptions::default(), Presence::Optional, |_, _| {});
        assert_eq!(n, 8);
        assert_eq!(seen[3], ("o0".to_string(), None));
        assert_eq!(seen[7], ("o1".to_string(), None));
    }

    #[rstest]
    fn poisoning_the_outer_cell_resumes_the_outer_loop(mut pairs: Module) {
        let (n, seen) = run_pairs(&mut pairs, SearchOptions::default(), Presence::Required, |cx, n| {
            if n == 2 {
                let outer = cx.st.outer.unwrap();
                cx.poison(outer);
            }
        });
        assert_eq!(n, 5);
        assert_eq!(
            seen,
            pairs_of(&[
                ("o0", Some("i0")),
                ("o0", Some("i1")),
                ("o1", Some("i0")),
                ("o1", Some("i1")),
                ("o1", Some("i2")),
            ])
        );
    }

    #[rstest]
    fn poisoning_the_inner_cell_skips_it_afterwards(mut pairs: Module) {
        let (_, seen) = run_pairs(&mut pairs, SearchOptions::default(), Presence::Required, |cx, n| {
            if n == 1 {
                let inner = cx.st.inner.unwrap();
                cx.poison(inner);
            }
        });
        assert_eq!(
            seen,
            pairs_of(&[
                ("o0", Some("i0")),
                ("o0", Some("i1")),
                ("o0", Some("i2")),
                ("o1", Some("i1")),
                ("o1", Some("i2")),
            ])
        );
    }

    #[rstest]
    fn finish_stops_the_search(mut pairs: Module) {
        let (n, _) = run_pairs(&mut pairs, SearchOptions::default(), Presence::Required, |cx, _| {
            cx.finish()
        });
        assert_eq!(n, 1);
    }

    #[rstest]
    fn scheduled_cells_are_removed_on_drop(mut pairs: Module) {
        let (n, _) = run_pairs(&mut pairs, SearchOptions::default(), Presence::Required, |cx, _| {
            let inner = cx.st.inner.unwrap();
            cx.schedule_removal(inner);
        });
        // Every inner cell is consumed by the first outer cell.
        assert_eq!(n, 3);
        assert_eq!(pairs.num_cells(), 2);
        assert!(pairs.find_cell("i0").is_none());
    }

    #[rstest]
    fn seeded_order_is_reproducible(mut pairs: Module) {
        let options = SearchOptions {
            tie_break: TieBreak::Seeded(42),
        };
        let (_, first) = run_pairs(&mut pairs, options, Presence::Required, |_, _| {});
        let (_, second) = run_pairs(&mut pairs, options, Presence::Required, |_, _| {});
        assert_eq!(first, second);

        let (_, insertion) = run_pairs(&mut pairs, SearchOptions::default(), Presence::Required, |_, _| {});
        let mut sorted = first.clone();
        sorted.sort();
        assert_eq!(sorted, insertion);
    }

    #[rstest]
    fn state_is_restored(mut pairs: Module) {
        let tables = Tables::new(&pairs);
        let mut cx = SearchContext::<PairState>::new(&mut pairs);
        cx.run(|_| {}, |cx, depth| outer_block(&tables, Presence::Optional, cx, depth));
        assert_eq!(cx.st.outer, None);
        assert_eq!(cx.st.inner, None);
        assert_eq!(cx.accepted(), 8);
    }

    #[rstest]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "returned with a rollback pending")]
    fn dropped_rollback_is_caught(mut pairs: Module) {
        let tables = Tables::new(&pairs);
        let mut cx = SearchContext::<PairState>::new(&mut pairs);
        cx.run(
            |cx| {
                let outer = cx.st.outer.unwrap();
                cx.poison(outer);
            },
            |cx, depth| {
                cx.iterate(
                    depth,
                    tables.outer.lookup(&()),
                    Presence::Required,
                    |_, _| true,
                    |cx, c| cx.st.outer = c.map(|c| c.cell),
                    |cx, _| {
                        // Swallows the unwind requested by the poison.
                        let _ = cx.accept();
                        Flow::Continue
                    },
                )
            },
        );
    }
}
