//! Folding a match into a `QL_DSP` cell.

use crate::netlist::{CellId, NetlistError, SigSpec, State};

use super::state::DspState;
use super::*;

/// Width of each `QL_DSP` multiplier operand.
const OPERAND_WIDTH: usize = 16;
/// Width of the `QL_DSP` output, without the carry.
const OUTPUT_WIDTH: usize = 32;

/// Replace the matched multiplier with a `QL_DSP` cell absorbing the matched
/// logic. Called on every accepted match.
///
/// Returns `false` if the match does not fit in a `QL_DSP`. In that case the
/// netlist is left untouched.
pub fn create_dsp(cx: &mut DspContext<'_>) -> bool {
    let Some(mul) = cx.st.mul else {
        return false;
    };
    let st = cx.st.clone();
    let module = cx.module();
    tracing::info!(
        target: LOG_TARGET,
        module = %module.name(),
        cell = %module[mul].name,
        "checking for QL_DSP inference"
    );
    let name_of = |cell: Option<CellId>| {
        cell.map_or_else(|| "--".into(), |id| module[id].name.clone())
    };
    tracing::debug!(
        target: LOG_TARGET,
        ff_a = %name_of(st.ff_a),
        ff_b = %name_of(st.ff_b),
        ff_cd = %name_of(st.ff_cd),
        mul = %name_of(st.mul),
        ff_fjkg = %name_of(st.ff_fjkg),
        ff_h = %name_of(st.ff_h),
        add = %name_of(st.add),
        mux = %name_of(st.mux),
        ff_o = %name_of(st.ff_o),
        "matched cells"
    );

    let limits = [
        ("input A", &st.sig_a, MAX_A_WIDTH),
        ("input B", &st.sig_b, MAX_B_WIDTH),
        ("adder/accumulator", &st.sig_o, MAX_O_WIDTH),
        ("output", &st.sig_h, MAX_H_WIDTH),
    ];
    for (what, sig, max) in limits {
        if sig.len() > max {
            tracing::info!(
                target: LOG_TARGET,
                "{what} ({}) is too large ({} > {max})",
                module.describe(sig),
                sig.len()
            );
            return false;
        }
    }

    match fold(cx, mul, &st) {
        Ok(dsp) => {
            let module = cx.module();
            tracing::info!(
                target: LOG_TARGET,
                cell = %module[dsp].name,
                absorbed = st.absorbed().count(),
                "created QL_DSP"
            );
            true
        }
        Err(e) => {
            tracing::error!(target: LOG_TARGET, "QL_DSP inference failed: {e}");
            false
        }
    }
}

/// Rewrite the netlist. Returns the `QL_DSP` cell.
fn fold(cx: &mut DspContext<'_>, mul: CellId, st: &DspState) -> Result<CellId, NetlistError> {
    let fused = cx.kind(mul) == QL_DSP;
    let a_signed = param_bool(cx, mul, PARAM_A_SIGNED);
    let b_signed = param_bool(cx, mul, PARAM_B_SIGNED);
    let add_signed = st
        .add
        .is_some_and(|add| param_bool(cx, add, PARAM_A_SIGNED) && param_bool(cx, add, PARAM_B_SIGNED));
    let registered = |param: &str| fused && param_bool(cx, mul, param);
    let regs = [
        (PARAM_A_REG, st.ff_a.is_some() || registered(PARAM_A_REG)),
        (PARAM_B_REG, st.ff_b.is_some() || registered(PARAM_B_REG)),
        (PARAM_C_REG, st.ff_cd.is_some() || registered(PARAM_C_REG)),
        (PARAM_D_REG, st.ff_cd.is_some() || registered(PARAM_D_REG)),
    ];
    let has_carry = cx.has_port(mul, PORT_CO);

    let module = cx.module_mut();
    let dsp = if fused {
        mul
    } else {
        tracing::info!(target: LOG_TARGET, "replacing {MUL} with {QL_DSP} cell");
        module.replace_cell(mul, QL_DSP)?
    };

    let mut a = st.sig_a.clone();
    a.extend_u0(OPERAND_WIDTH, a_signed);
    let mut b = st.sig_b.clone();
    b.extend_u0(OPERAND_WIDTH, b_signed);
    // A QL_DSP without a new accumulator input keeps its own.
    let cd = match (st.sig_cd.is_empty(), fused) {
        (false, _) => Some(st.sig_cd.clone()),
        (true, false) => Some(SigSpec::repeat(State::S0, 2 * OPERAND_WIDTH)),
        (true, true) => None,
    };

    let mut o = st.sig_o.clone();
    let mut carry = None;
    if o.len() == MAX_O_WIDTH {
        let (msb, top) = (o[OUTPUT_WIDTH - 1], o[OUTPUT_WIDTH]);
        if add_signed {
            // Signed multiply-add: the carry is a sign extension.
            module.connect(SigSpec::from(top), SigSpec::from(msb))?;
        } else {
            carry = Some(SigSpec::from(top));
        }
        o.pop();
    } else if !has_carry {
        carry = Some(SigSpec::from_wire(module.add_fresh_wire(1), 1));
    }
    if o.len() < OUTPUT_WIDTH {
        let pad = OUTPUT_WIDTH - o.len();
        o.append(&SigSpec::from_wire(module.add_fresh_wire(pad), pad));
    }

    let cell = &mut module[dsp];
    cell.set_port(PORT_A, a);
    cell.set_port(PORT_B, b);
    if let Some(cd) = cd {
        cell.set_port(PORT_C, cd.extract(OPERAND_WIDTH, OPERAND_WIDTH));
        cell.set_port(PORT_D, cd.extract(0, OPERAND_WIDTH));
    }
    if let Some(clock) = st.clock {
        cell.set_port(PORT_CLK, clock);
    }
    for (param, value) in regs {
        cell.set_param(param, value);
    }
    if let Some(carry) = carry {
        cell.set_port(PORT_CO, carry);
    }
    cell.set_port(PORT_O, o);
    cell.set_param(PARAM_A_SIGNED, a_signed);
    cell.set_param(PARAM_B_SIGNED, b_signed);

    if fused {
        cx.poison(mul);
    } else {
        cx.schedule_removal(mul);
    }
    for cell in [st.ff_fjkg, st.ff_h, st.add, st.mux, st.ff_o].into_iter().flatten() {
        cx.schedule_removal(cell);
    }
    Ok(dsp)
}
