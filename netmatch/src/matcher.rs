//! Backtracking subgraph matching over netlists.
//!
//! A pattern is written as a set of *search blocks*: plain functions taking a
//! [`SearchContext`] and the current recursion depth, and returning a
//! [`Flow`]. Blocks either check a condition on the bindings made so far
//! (guard blocks), or enumerate the candidates of an [`IndexTable`] and call
//! their successor once per candidate ([`SearchContext::iterate`]). The last
//! block calls [`SearchContext::accept`], which hands the complete match to a
//! rewrite callback.
//!
//! The rewrite callback may *poison* cells that it consumed. Every binding of
//! a candidate cell is recorded in a [`Ledger`] together with the depth of the
//! block that made it, so poisoning a bound cell unwinds the search back to
//! that block, which then moves on to its next candidate.

pub mod index;
pub mod ledger;
pub mod rng;
pub mod search;

pub use index::{Candidate, IndexTable};
pub use ledger::{Ledger, Unwind};
pub use rng::XorShift32;
pub use search::{Flow, Presence, SearchContext, SearchOptions, TieBreak};

/// The logging target for search engine events.
pub const SEARCH_TARGET: &str = "netmatch::search";
