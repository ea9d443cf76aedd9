//! Bindings of the DSP pattern.

use crate::netlist::{CellId, SigBit, SigSpec};

use super::{PORT_A, PORT_B, PARAM_A_SIGNED, PARAM_B_SIGNED};

/// Which input of a two-operand cell a match goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    /// The `A` input.
    A,
    /// The `B` input.
    B,
}

impl Operand {
    /// Both operands, in the order they are indexed.
    pub const ALL: [Operand; 2] = [Operand::A, Operand::B];

    /// The port name of the operand.
    pub fn port(self) -> &'static str {
        match self {
            Operand::A => PORT_A,
            Operand::B => PORT_B,
        }
    }

    /// The signedness parameter of the operand.
    pub fn signed_param(self) -> &'static str {
        match self {
            Operand::A => PARAM_A_SIGNED,
            Operand::B => PARAM_B_SIGNED,
        }
    }

    /// The other operand.
    pub fn other(self) -> Self {
        match self {
            Operand::A => Operand::B,
            Operand::B => Operand::A,
        }
    }
}

/// A register found by the register subpatterns.
///
/// This record is how a subpattern reports back to the block that invoked
/// it, so blocks never restore it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterMatch {
    /// The register cell.
    pub cell: Option<CellId>,
    /// The signal seen through the register's data input.
    pub d: SigSpec,
    /// The signal seen through the register's output.
    pub q: SigSpec,
    /// The register clock.
    pub clock: Option<SigBit>,
    /// Whether the register triggers on the rising edge.
    pub clock_pol: bool,
}

/// Bindings made while matching a multiplier and the logic around it.
///
/// Signals are canonical.
#[derive(Debug, Clone, Default)]
pub struct DspState {
    /// The multiplier, a `$mul` or an existing `QL_DSP`.
    pub mul: Option<CellId>,
    /// Register in front of the `A` input.
    pub ff_a: Option<CellId>,
    /// Register in front of the `B` input.
    pub ff_b: Option<CellId>,
    /// Register in front of the accumulator input.
    pub ff_cd: Option<CellId>,
    /// First pipeline register after the multiplier.
    pub ff_fjkg: Option<CellId>,
    /// Second pipeline register after the multiplier.
    pub ff_h: Option<CellId>,
    /// Output register.
    pub ff_o: Option<CellId>,
    /// Post-adder.
    pub add: Option<CellId>,
    /// Input of the post-adder fed by the product.
    pub add_ab: Option<Operand>,
    /// Accumulator load mux.
    pub mux: Option<CellId>,
    /// Input of the mux fed by the output.
    pub mux_ab: Option<Operand>,

    /// Multiplier `A` operand.
    pub sig_a: SigSpec,
    /// Multiplier `B` operand.
    pub sig_b: SigSpec,
    /// Accumulator input.
    pub sig_cd: SigSpec,
    /// The used bits of the product.
    pub sig_h: SigSpec,
    /// Final output.
    pub sig_o: SigSpec,
    /// Whether the accumulator input is signed.
    pub cd_signed: bool,

    /// Clock shared by all the absorbed registers.
    pub clock: Option<SigBit>,
    /// Polarity of [`DspState::clock`].
    pub clock_pol: bool,
    /// Whether the output register only covers the low 16 bits.
    pub o_lo: bool,

    /// Data input searched for by the output register subpattern.
    pub arg_d: SigSpec,
    /// Output searched for by the input register subpattern.
    pub arg_q: SigSpec,
    /// Whether registers with a synchronous reset are allowed.
    pub arg_sdff: bool,
    /// Candidate register of the subpatterns.
    pub ff: Option<CellId>,
    /// Result of the last register subpattern.
    pub dff: RegisterMatch,
}

impl DspState {
    /// The cells folded into the multiplier, besides the multiplier itself.
    pub fn absorbed(&self) -> impl Iterator<Item = CellId> {
        [
            self.ff_a,
            self.ff_b,
            self.ff_cd,
            self.ff_fjkg,
            self.ff_h,
            self.add,
            self.mux,
            self.ff_o,
        ]
        .into_iter()
        .flatten()
    }
}
