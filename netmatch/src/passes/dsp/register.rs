//! Register subpatterns.
//!
//! [`in_register`] looks for a register whose output drives `arg_q`, and
//! [`out_register`] for a register whose input is `arg_d`. Both report the
//! register they found in [`DspState::dff`](super::DspState::dff), which the
//! calling block reads once the subpattern returns. When several registers
//! fit, the last one tried wins.

use crate::matcher::{Flow, Presence};
use crate::netlist::{SigSpec, Wire};

use super::state::RegisterMatch;
use super::*;

const ATTR_KEEP: &str = "keep";
const ATTR_INIT: &str = "init";

/// Whether the wire has no initial value other than zero.
fn init_is_clear(wire: &Wire) -> bool {
    wire.attribute(ATTR_INIT)
        .is_none_or(|init| init.is_fully_undef() || init.is_fully_zero())
}

/// Whether the register runs on the clock of the registers matched so far.
fn clock_matches(cx: &DspContext<'_>, ff: CellId) -> bool {
    let Some(clock) = cx.st.clock else {
        return true;
    };
    cx.port(ff, PORT_CLK) == SigSpec::from(clock)
        && cx.param(ff, PARAM_CLK_POLARITY).as_bool() == cx.st.clock_pol
}

/// Find a register driving `arg_q`.
pub fn in_register(index: &DspIndex, cx: &mut DspContext<'_>, depth: usize) -> Flow {
    cx.st.dff = RegisterMatch::default();
    let arg_q = &cx.st.arg_q;
    if arg_q.is_empty() || arg_q.iter().any(|bit| bit.is_const()) {
        return Flow::Continue;
    }
    let module = cx.module();
    let wires_ok = arg_q.wires().all(|id| {
        let wire = module.wire(id);
        !wire.bool_attribute(ATTR_KEEP) && init_is_clear(wire)
    });
    if !wires_ok {
        return Flow::Continue;
    }
    find_input_register(index, cx, depth + 1)
}

fn find_input_register(index: &DspIndex, cx: &mut DspContext<'_>, depth: usize) -> Flow {
    let first = cx.st.arg_q[0];
    let backup = cx.st.ff;
    let flow = cx.iterate(
        depth,
        index.ff_by_q.lookup(&first),
        Presence::Required,
        |cx, c| {
            let q = cx.port(c.cell, PORT_Q);
            let n = cx.st.arg_q.len();
            q.len() >= c.extra + n && q.extract(c.extra, n) == cx.st.arg_q
        },
        |cx, c| cx.st.ff = c.map(|c| c.cell),
        bind_input_register,
    );
    cx.st.ff = backup;
    flow
}

fn bind_input_register(cx: &mut DspContext<'_>, _depth: usize) -> Flow {
    let Some(ff) = cx.st.ff else {
        return Flow::Continue;
    };
    if !clock_matches(cx, ff) {
        return Flow::Continue;
    }
    let d = cx.port(ff, PORT_D);
    let q = cx.port(ff, PORT_Q);
    if d.len() != q.len() {
        return Flow::Continue;
    }
    let mut dff_d = cx.st.arg_q.clone();
    dff_d.replace(&q, &d);
    cx.st.dff = RegisterMatch {
        cell: Some(ff),
        d: dff_d,
        q: cx.st.arg_q.clone(),
        clock: cx.port(ff, PORT_CLK).bits().first().copied(),
        clock_pol: cx.param(ff, PARAM_CLK_POLARITY).as_bool(),
    };
    Flow::Continue
}

/// Find a register fed by `arg_d`.
///
/// Registers with a synchronous reset are only considered when `arg_sdff` is
/// set.
pub fn out_register(index: &DspIndex, cx: &mut DspContext<'_>, depth: usize) -> Flow {
    cx.st.dff = RegisterMatch::default();
    let module = cx.module();
    if cx.st.arg_d.is_empty()
        || cx
            .st
            .arg_d
            .wires()
            .any(|id| module.wire(id).bool_attribute(ATTR_KEEP))
    {
        return Flow::Continue;
    }
    find_output_register(index, cx, depth + 1)
}

fn find_output_register(index: &DspIndex, cx: &mut DspContext<'_>, depth: usize) -> Flow {
    let first = cx.st.arg_d[0];
    let backup = cx.st.ff;
    let flow = cx.iterate(
        depth,
        index.ff_by_d.lookup(&first),
        Presence::Required,
        |cx, c| {
            if !cx.st.arg_sdff && !cx.module()[c.cell].is_kind(&[DFF, DFFE]) {
                return false;
            }
            // The register must be consumed whole.
            c.extra == 0 && cx.port(c.cell, PORT_D) == cx.st.arg_d
        },
        |cx, c| cx.st.ff = c.map(|c| c.cell),
        bind_output_register,
    );
    cx.st.ff = backup;
    flow
}

fn bind_output_register(cx: &mut DspContext<'_>, _depth: usize) -> Flow {
    let Some(ff) = cx.st.ff else {
        return Flow::Continue;
    };
    if !clock_matches(cx, ff) {
        return Flow::Continue;
    }
    let d = cx.port(ff, PORT_D);
    let q = cx.port(ff, PORT_Q);
    if d.len() != q.len() {
        return Flow::Continue;
    }
    let mut arg_q = cx.st.arg_d.clone();
    arg_q.replace(&d, &q);
    let module = cx.module();
    if !arg_q.wires().all(|id| init_is_clear(module.wire(id))) {
        return Flow::Continue;
    }
    cx.st.dff = RegisterMatch {
        cell: Some(ff),
        d: cx.st.arg_d.clone(),
        q: arg_q,
        clock: cx.port(ff, PORT_CLK).bits().first().copied(),
        clock_pol: cx.param(ff, PARAM_CLK_POLARITY).as_bool(),
    };
    Flow::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlist::{Module, State};
    use crate::utils::test::wire;
    use rstest::{fixture, rstest};

    /// `q` registered from `d` on `clk`, and a second register `q2` fed by
    /// `q` with a synchronous reset.
    #[fixture]
    fn registers() -> Module {
        let mut module = Module::new("top");
        let clk = module.add_wire("clk", 1);
        let d = module.add_wire("d", 8);
        let q = module.add_wire("q", 8);
        let q2 = module.add_wire("q2", 8);
        let rst = module.add_wire("rst", 1);

        let ff = module.add_cell("ff", DFF);
        let cell = &mut module[ff];
        cell.set_port(PORT_CLK, SigSpec::from_wire(clk, 1));
        cell.set_port(PORT_D, SigSpec::from_wire(d, 8));
        cell.set_port(PORT_Q, SigSpec::from_wire(q, 8));
        cell.set_param(PARAM_CLK_POLARITY, true);

        let sff = module.add_cell("sff", SDFF);
        let cell = &mut module[sff];
        cell.set_port(PORT_CLK, SigSpec::from_wire(clk, 1));
        cell.set_port(PORT_SRST, SigSpec::from_wire(rst, 1));
        cell.set_port(PORT_D, SigSpec::from_wire(q, 8));
        cell.set_port(PORT_Q, SigSpec::from_wire(q2, 8));
        cell.set_param(PARAM_CLK_POLARITY, true);
        cell.set_param(PARAM_SRST_VALUE, crate::netlist::Const::from_int(0, 8));
        module
    }

    fn search_in(module: &mut Module, arg_q: SigSpec) -> RegisterMatch {
        let cells = module.cell_ids();
        let mut cx = DspContext::new(module);
        let index = DspIndex::build(&cx, &cells);
        cx.st.arg_q = arg_q;
        let _ = in_register(&index, &mut cx, 1);
        assert!(cx.ledger().is_balanced());
        cx.st.dff.clone()
    }

    fn search_out(module: &mut Module, arg_d: SigSpec, sdff: bool) -> RegisterMatch {
        let cells = module.cell_ids();
        let mut cx = DspContext::new(module);
        let index = DspIndex::build(&cx, &cells);
        cx.st.arg_d = arg_d;
        cx.st.arg_sdff = sdff;
        let _ = out_register(&index, &mut cx, 1);
        cx.st.dff.clone()
    }

    #[rstest]
    fn input_register_of_a_slice(mut registers: Module) {
        let q = wire(&registers, "q");
        let d = wire(&registers, "d");
        let found = search_in(&mut registers, q.extract(2, 4));
        assert_eq!(found.cell, registers.find_cell("ff"));
        assert_eq!(found.d, d.extract(2, 4));
        assert!(found.clock_pol);
        assert_eq!(found.clock, Some(wire(&registers, "clk")[0]));
    }

    #[rstest]
    fn input_register_rejects_init(mut registers: Module) {
        let q = registers.find_wire("q").unwrap();
        registers
            .wire_mut(q)
            .attributes
            .insert(ATTR_INIT.into(), crate::netlist::Const::from_int(5, 8));
        let sig = wire(&registers, "q");
        assert_eq!(search_in(&mut registers, sig).cell, None);
    }

    #[rstest]
    fn input_register_rejects_constants(mut registers: Module) {
        let mut sig = wire(&registers, "q");
        sig.push(State::S0.into());
        assert_eq!(search_in(&mut registers, sig).cell, None);
    }

    #[rstest]
    #[case::plain_only(false, None)]
    #[case::sync_reset_allowed(true, Some("sff"))]
    fn output_register_sync_reset(mut registers: Module, #[case] sdff: bool, #[case] expected: Option<&str>) {
        let q = wire(&registers, "q");
        let found = search_out(&mut registers, q.clone(), sdff);
        assert_eq!(found.cell, expected.and_then(|name| registers.find_cell(name)));
        if found.cell.is_some() {
            assert_eq!(found.q, wire(&registers, "q2"));
            assert_eq!(found.d, q);
        }
    }

    #[rstest]
    fn output_register_must_be_whole(mut registers: Module) {
        let d = wire(&registers, "d");
        assert_eq!(search_out(&mut registers, d.extract(0, 4), false).cell, None);
        let found = search_out(&mut registers, d, false);
        assert_eq!(found.cell, registers.find_cell("ff"));
    }

    #[rstest]
    fn clock_must_match(mut registers: Module) {
        let cells = registers.cell_ids();
        let q = wire(&registers, "q");
        let rst = wire(&registers, "rst")[0];
        let mut cx = DspContext::new(&mut registers);
        let index = DspIndex::build(&cx, &cells);
        cx.st.clock = Some(rst);
        cx.st.clock_pol = true;
        cx.st.arg_q = q;
        let _ = in_register(&index, &mut cx, 1);
        assert_eq!(cx.st.dff.cell, None);
    }
}
