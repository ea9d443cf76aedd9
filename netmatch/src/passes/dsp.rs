//! DSP inference.
//!
//! Folds a wide multiplier together with the registers, post-adder and
//! accumulator mux around it into a single `QL_DSP` cell. An existing
//! `QL_DSP` cell can also absorb the logic around it, when its configuration
//! leaves room for it.
//!
//! The pattern is searched with the generic [`matcher`](crate::matcher)
//! engine. Each block of the pattern lives in [`pattern`], the register
//! subpatterns in [`register`] and the rewrite in [`rewrite`].

pub mod index;
pub mod pattern;
pub mod register;
pub mod rewrite;
pub mod state;

pub use index::DspIndex;
pub use rewrite::create_dsp;
pub use state::{DspState, Operand, RegisterMatch};

use crate::matcher::{SearchContext, SearchOptions};
use crate::netlist::{CellId, Const, Module, SigSpec};

/// The logging target for DSP inference events.
pub const LOG_TARGET: &str = "netmatch::dsp";

/// The fused DSP primitive.
pub const QL_DSP: &str = "QL_DSP";
pub(crate) const MUL: &str = "$mul";
pub(crate) const ADD: &str = "$add";
pub(crate) const MUX: &str = "$mux";
pub(crate) const DFF: &str = "$dff";
pub(crate) const DFFE: &str = "$dffe";
pub(crate) const SDFF: &str = "$sdff";
pub(crate) const SDFFCE: &str = "$sdffce";

pub(crate) const PORT_A: &str = "A";
pub(crate) const PORT_B: &str = "B";
pub(crate) const PORT_C: &str = "C";
pub(crate) const PORT_D: &str = "D";
pub(crate) const PORT_O: &str = "O";
pub(crate) const PORT_Y: &str = "Y";
pub(crate) const PORT_Q: &str = "Q";
pub(crate) const PORT_CO: &str = "CO";
pub(crate) const PORT_CLK: &str = "CLK";
pub(crate) const PORT_EN: &str = "EN";
pub(crate) const PORT_ARST: &str = "ARST";
pub(crate) const PORT_SRST: &str = "SRST";

pub(crate) const PARAM_A_SIGNED: &str = "A_SIGNED";
pub(crate) const PARAM_B_SIGNED: &str = "B_SIGNED";
pub(crate) const PARAM_A_REG: &str = "A_REG";
pub(crate) const PARAM_B_REG: &str = "B_REG";
pub(crate) const PARAM_C_REG: &str = "C_REG";
pub(crate) const PARAM_D_REG: &str = "D_REG";
pub(crate) const PARAM_ENABLE_DSP: &str = "ENABLE_DSP";
pub(crate) const PARAM_CLK_POLARITY: &str = "CLK_POLARITY";
pub(crate) const PARAM_ARST_POLARITY: &str = "ARST_POLARITY";
pub(crate) const PARAM_SRST_VALUE: &str = "SRST_VALUE";

/// Widest `A` operand of a `QL_DSP`.
pub const MAX_A_WIDTH: usize = 16;
/// Widest `B` operand of a `QL_DSP`.
pub const MAX_B_WIDTH: usize = 16;
/// Widest output, including the adder carry.
pub const MAX_O_WIDTH: usize = 33;
/// Widest product.
pub const MAX_H_WIDTH: usize = 32;
/// Multipliers with narrower operands (summed) or products are left alone.
pub const MIN_MUL_WIDTH: usize = 10;

/// The search context of the DSP pattern.
pub type DspContext<'m> = SearchContext<'m, DspState>;

/// Configuration of DSP inference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DspOptions {
    /// Options of the underlying search.
    pub search: SearchOptions,
}

/// Matches the DSP pattern in a module.
///
/// Cells consumed by accepted matches are removed when the matcher is
/// dropped.
pub struct DspMatcher<'m> {
    index: DspIndex,
    cx: DspContext<'m>,
}

impl<'m> DspMatcher<'m> {
    /// Prepare a search over the given cells of a module.
    pub fn new(module: &'m mut Module, cells: &[CellId]) -> Self {
        Self::with_options(module, cells, &DspOptions::default())
    }

    /// Prepare a search over the given cells of a module.
    pub fn with_options(module: &'m mut Module, cells: &[CellId], options: &DspOptions) -> Self {
        let cx = DspContext::with_options(module, options.search);
        let index = DspIndex::build(&cx, cells);
        tracing::debug!(
            target: LOG_TARGET,
            multipliers = index.mul.len(),
            adders = index.add.len(),
            muxes = index.mux.len(),
            "built DSP candidate index"
        );
        Self { index, cx }
    }

    /// Search for every match, calling `on_accept` on each of them.
    ///
    /// Returns the number of matches.
    pub fn run(&mut self, on_accept: impl FnMut(&mut DspContext<'m>) + 'm) -> usize {
        let index = &self.index;
        self.cx
            .run(on_accept, |cx, depth| pattern::find_multiplier(index, cx, depth))
    }

    /// The candidate tables.
    pub fn index(&self) -> &DspIndex {
        &self.index
    }

    /// The search context.
    pub fn context(&self) -> &DspContext<'m> {
        &self.cx
    }
}

/// Replace the multipliers of a module with `QL_DSP` cells.
///
/// Returns the number of cells created or updated.
pub fn infer_dsp(module: &mut Module) -> usize {
    infer_dsp_with_options(module, &DspOptions::default())
}

/// Replace the multipliers of a module with `QL_DSP` cells.
///
/// Returns the number of cells created or updated.
#[tracing::instrument(skip_all, fields(module = %module.name()))]
pub fn infer_dsp_with_options(module: &mut Module, options: &DspOptions) -> usize {
    let cells = module.cell_ids();
    let mut replaced = 0;
    {
        let mut matcher = DspMatcher::with_options(module, &cells, options);
        matcher.run(|cx| {
            if create_dsp(cx) {
                replaced += 1;
            }
        });
    }
    tracing::info!(target: LOG_TARGET, replaced, "DSP inference done");
    replaced
}

/// A boolean parameter of a cell. Missing parameters read as `false`.
pub(crate) fn param_bool(cx: &DspContext<'_>, cell: CellId, param: &str) -> bool {
    cx.module()[cell].param(param).is_some_and(Const::as_bool)
}

/// Drop the copies of the top bit that only extend a signal.
///
/// A non-constant sign bit is kept.
pub fn unextend(sig: &SigSpec) -> SigSpec {
    if sig.is_empty() {
        return SigSpec::new();
    }
    let mut i = sig.len() - 1;
    while i > 0 && sig[i] == sig[i - 1] {
        i -= 1;
    }
    if !sig[i].is_const() {
        i += 1;
    }
    sig.extract(0, i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlist::{SigBit, State};
    use rstest::rstest;

    fn wire_bits(n: usize) -> SigSpec {
        SigSpec::from_wire(crate::netlist::WireId::new(0), n)
    }

    #[rstest]
    #[case::zero_extended(8, Some(State::S0), 8, 8)]
    #[case::one_extended(4, Some(State::S1), 12, 4)]
    #[case::no_extension(16, None, 0, 16)]
    fn unextend_constants(
        #[case] width: usize,
        #[case] fill: Option<State>,
        #[case] extra: usize,
        #[case] expected: usize,
    ) {
        let mut sig = wire_bits(width);
        if let Some(state) = fill {
            sig.append(&SigSpec::repeat(state, extra));
        }
        assert_eq!(unextend(&sig).len(), expected);
    }

    #[test]
    fn unextend_keeps_a_sign_bit() {
        let mut sig = wire_bits(6);
        let msb = sig[5];
        for _ in 0..10 {
            sig.push(msb);
        }
        assert_eq!(unextend(&sig), wire_bits(6));
        assert_eq!(unextend(&SigSpec::repeat(State::S0, 4)), SigSpec::new());
        assert_eq!(unextend(&SigSpec::from(SigBit::wire(crate::netlist::WireId::new(1), 0))).len(), 1);
    }
}
