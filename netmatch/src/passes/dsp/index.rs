//! Candidate tables of the DSP pattern.

use crate::matcher::IndexTable;
use crate::netlist::{Cell, CellId, Const, SigBit, SigSpec};

use super::state::Operand;
use super::*;

/// The candidate tables, built once per search.
#[derive(Debug, Clone, Default)]
pub struct DspIndex {
    /// Multipliers wide enough to be worth a DSP block.
    pub mul: IndexTable<()>,
    /// Adders, by the first bit of an operand with no other user.
    pub add: IndexTable<SigBit, Operand>,
    /// Muxes, by an input with no other user.
    pub mux: IndexTable<SigSpec, Operand>,
    /// Positive-edge registers without reset, by output bit.
    pub ff_by_q: IndexTable<SigBit, usize>,
    /// Positive-edge registers, possibly with a synchronous reset, by input
    /// bit.
    pub ff_by_d: IndexTable<SigBit, usize>,
}

fn has_ports(cell: &Cell, ports: &[&str]) -> bool {
    ports.iter().all(|p| cell.has_port(p))
}

fn rising_edge(cell: &Cell) -> bool {
    cell.param(PARAM_CLK_POLARITY).is_some_and(Const::as_bool)
        && has_ports(cell, &[PORT_CLK, PORT_D, PORT_Q])
}

impl DspIndex {
    /// Index the cells of a worklist.
    pub fn build(cx: &DspContext<'_>, cells: &[CellId]) -> Self {
        let module = cx.module();
        let worklist = || cells.iter().filter_map(|&id| Some((id, module.cell(id)?)));
        let port = |id: CellId, name: &str| cx.port(id, name);

        let mul = IndexTable::build(
            worklist(),
            |id, cell| {
                let output = if cell.kind == MUL { PORT_Y } else { PORT_O };
                cell.is_kind(&[MUL, QL_DSP])
                    && has_ports(cell, &[PORT_A, PORT_B, output])
                    && port(id, PORT_A).len() + port(id, PORT_B).len() > MIN_MUL_WIDTH
                    && unextend(&port(id, PORT_A)).len() <= MAX_A_WIDTH
                    && unextend(&port(id, PORT_B)).len() <= MAX_B_WIDTH
            },
            |_, _| [((), ())],
        );

        let add = IndexTable::build(
            worklist(),
            |_, cell| cell.kind == ADD && has_ports(cell, &[PORT_A, PORT_B, PORT_Y]),
            |id, _| {
                Operand::ALL.into_iter().filter_map(move |ab| {
                    let sig = port(id, ab.port());
                    let first = *sig.bits().first()?;
                    (cx.nusers(&sig) == 2).then_some((first, ab))
                })
            },
        );

        let mux = IndexTable::build(
            worklist(),
            |_, cell| cell.kind == MUX && has_ports(cell, &[PORT_A, PORT_B, PORT_Y]),
            |id, _| {
                Operand::ALL.into_iter().filter_map(move |ab| {
                    let sig = port(id, ab.port());
                    (cx.nusers(&sig) == 2).then_some((sig, ab))
                })
            },
        );

        let ff_by_q = IndexTable::build(
            worklist(),
            |_, cell| cell.is_kind(&[DFF, DFFE]) && rising_edge(cell),
            |id, _| {
                let width = port(id, PORT_D).len();
                let q = port(id, PORT_Q);
                q.iter()
                    .take(width)
                    .enumerate()
                    .map(|(offset, bit)| (bit, offset))
                    .collect::<Vec<_>>()
            },
        );

        let ff_by_d = IndexTable::build(
            worklist(),
            |_, cell| cell.is_kind(&[DFF, DFFE, SDFF, SDFFCE]) && rising_edge(cell),
            |id, _| {
                port(id, PORT_D)
                    .iter()
                    .enumerate()
                    .map(|(offset, bit)| (bit, offset))
                    .collect::<Vec<_>>()
            },
        );

        Self {
            mul,
            add,
            mux,
            ff_by_q,
            ff_by_d,
        }
    }
}
