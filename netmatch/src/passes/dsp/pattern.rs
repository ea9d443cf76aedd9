//! The search blocks of the DSP pattern.
//!
//! Blocks run in a fixed order, from the multiplier outwards:
//!
//! 1. [`find_multiplier`] and its operands,
//! 2. the `A` and `B` input registers,
//! 3. the F/J/K/G and H pipeline registers on the product,
//! 4. an optional post-adder, and an optional mux on its output,
//! 5. the output register,
//! 6. the register in front of the accumulator input,
//! 7. the accumulator extension, then the accept.
//!
//! Every block saves the fields of [`DspState`](super::DspState) it writes,
//! and restores them before returning, whether its successor was called or
//! not.

use crate::matcher::{Flow, Presence};
use crate::netlist::{CellId, Const, SigSpec};

use super::register::{in_register, out_register};
use super::*;

/// Width of the low half of the output that may be registered on its own.
const O_LO_WIDTH: usize = 16;
/// Width of the accumulator input.
const CD_WIDTH: usize = 32;

fn is_fused(cx: &DspContext<'_>, cell: CellId) -> bool {
    cx.kind(cell) == QL_DSP
}

/// The `ENABLE_DSP` mode of a `QL_DSP`. Missing parameters read as 0.
fn enable_dsp(cx: &DspContext<'_>, cell: CellId) -> i64 {
    cx.module()[cell].param(PARAM_ENABLE_DSP).map_or(0, Const::as_int)
}

/// Whether `dff` shares the asynchronous reset of `other`, signal and
/// polarity, or neither has one.
fn resets_compatible(cx: &DspContext<'_>, other: CellId, dff: CellId) -> bool {
    let has_reset = cx.has_port(other, PORT_ARST);
    if has_reset != cx.has_port(dff, PORT_ARST) {
        return false;
    }
    !has_reset
        || (cx.port(other, PORT_ARST) == cx.port(dff, PORT_ARST)
            && cx.module()[other].param(PARAM_ARST_POLARITY)
                == cx.module()[dff].param(PARAM_ARST_POLARITY))
}

/// Whether the post-adder is signed on both inputs.
fn adder_signed(cx: &DspContext<'_>) -> bool {
    cx.st.add.is_some_and(|add| {
        param_bool(cx, add, PARAM_A_SIGNED) && param_bool(cx, add, PARAM_B_SIGNED)
    })
}

/// Enumerate the wide multipliers. Top block of the pattern.
pub fn find_multiplier(index: &DspIndex, cx: &mut DspContext<'_>, depth: usize) -> Flow {
    let backup = cx.st.mul;
    let flow = cx.iterate(
        depth,
        index.mul.lookup(&()),
        Presence::Required,
        |_, _| true,
        |cx, c| cx.st.mul = c.map(|c| c.cell),
        |cx, depth| multiplier_operands(index, cx, depth),
    );
    cx.st.mul = backup;
    flow
}

fn multiplier_operands(index: &DspIndex, cx: &mut DspContext<'_>, depth: usize) -> Flow {
    let Some(mul) = cx.st.mul else {
        return Flow::Continue;
    };
    let backup = (cx.st.sig_a.clone(), cx.st.sig_b.clone(), cx.st.sig_h.clone());
    let flow = 'body: {
        cx.st.sig_a = unextend(&cx.port(mul, PORT_A));
        cx.st.sig_b = unextend(&cx.port(mul, PORT_B));
        let output = if is_fused(cx, mul) { PORT_O } else { PORT_Y };
        let o = cx.port(mul, output);
        if o.len() <= MIN_MUL_WIDTH {
            break 'body Flow::Continue;
        }
        // Only the product bits that are used.
        let used = o
            .iter()
            .take_while(|&bit| cx.nusers(&SigSpec::from(bit)) > 1)
            .count();
        if used == 0 {
            break 'body Flow::Continue;
        }
        cx.st.sig_h = o.extract(0, used);
        input_register_a(index, cx, depth + 1)
    };
    (cx.st.sig_a, cx.st.sig_b, cx.st.sig_h) = backup;
    flow
}

fn input_register_a(index: &DspIndex, cx: &mut DspContext<'_>, depth: usize) -> Flow {
    let Some(mul) = cx.st.mul else {
        return Flow::Continue;
    };
    let backup = (
        cx.st.sig_a.clone(),
        cx.st.arg_q.clone(),
        cx.st.clock,
        cx.st.clock_pol,
        cx.st.ff_a,
    );
    let flow = 'body: {
        if !is_fused(cx, mul) || !param_bool(cx, mul, PARAM_A_REG) {
            cx.st.arg_q = cx.st.sig_a.clone();
            if in_register(index, cx, depth + 1).is_unwind() {
                break 'body Flow::Unwind;
            }
            if let Some(ff) = cx.st.dff.cell {
                cx.st.ff_a = Some(ff);
                cx.st.clock = cx.st.dff.clock;
                cx.st.clock_pol = cx.st.dff.clock_pol;
                cx.st.sig_a = cx.st.dff.d.clone();
            }
        }
        input_register_b(index, cx, depth + 1)
    };
    (
        cx.st.sig_a,
        cx.st.arg_q,
        cx.st.clock,
        cx.st.clock_pol,
        cx.st.ff_a,
    ) = backup;
    flow
}

fn input_register_b(index: &DspIndex, cx: &mut DspContext<'_>, depth: usize) -> Flow {
    let Some(mul) = cx.st.mul else {
        return Flow::Continue;
    };
    let backup = (
        cx.st.sig_b.clone(),
        cx.st.arg_q.clone(),
        cx.st.clock,
        cx.st.clock_pol,
        cx.st.ff_b,
    );
    let flow = 'body: {
        if !is_fused(cx, mul) || !param_bool(cx, mul, PARAM_B_REG) {
            cx.st.arg_q = cx.st.sig_b.clone();
            if in_register(index, cx, depth + 1).is_unwind() {
                break 'body Flow::Unwind;
            }
            if let Some(ff) = cx.st.dff.cell {
                cx.st.ff_b = Some(ff);
                cx.st.clock = cx.st.dff.clock;
                cx.st.clock_pol = cx.st.dff.clock_pol;
                cx.st.sig_b = cx.st.dff.d.clone();
            }
        }
        pipeline_register_fjkg(index, cx, depth + 1)
    };
    (
        cx.st.sig_b,
        cx.st.arg_q,
        cx.st.clock,
        cx.st.clock_pol,
        cx.st.ff_b,
    ) = backup;
    flow
}

fn pipeline_register_fjkg(index: &DspIndex, cx: &mut DspContext<'_>, depth: usize) -> Flow {
    let Some(mul) = cx.st.mul else {
        return Flow::Continue;
    };
    let backup = (
        cx.st.arg_d.clone(),
        cx.st.arg_sdff,
        cx.st.clock,
        cx.st.clock_pol,
        cx.st.sig_h.clone(),
        cx.st.ff_fjkg,
    );
    let flow = 'body: {
        if cx.nusers(&cx.st.sig_h) == 2 && !is_fused(cx, mul) {
            cx.st.arg_d = cx.st.sig_h.clone();
            cx.st.arg_sdff = false;
            if out_register(index, cx, depth + 1).is_unwind() {
                break 'body Flow::Unwind;
            }
            if let Some(ff) = cx.st.dff.cell {
                // F/J/K/G have no enable, and share the reset of A and B.
                let fits = !cx.has_port(ff, PORT_EN)
                    && [cx.st.ff_a, cx.st.ff_b]
                        .into_iter()
                        .flatten()
                        .all(|other| resets_compatible(cx, other, ff));
                if fits {
                    cx.st.ff_fjkg = Some(ff);
                    cx.st.clock = cx.st.dff.clock;
                    cx.st.clock_pol = cx.st.dff.clock_pol;
                    cx.st.sig_h = cx.st.dff.q.clone();
                } else {
                    tracing::trace!(target: LOG_TARGET, cell = %cx.module()[ff].name, "F/J/K/G register rejected");
                }
            }
        }
        pipeline_register_h(index, cx, depth + 1)
    };
    (
        cx.st.arg_d,
        cx.st.arg_sdff,
        cx.st.clock,
        cx.st.clock_pol,
        cx.st.sig_h,
        cx.st.ff_fjkg,
    ) = backup;
    flow
}

fn pipeline_register_h(index: &DspIndex, cx: &mut DspContext<'_>, depth: usize) -> Flow {
    let Some(mul) = cx.st.mul else {
        return Flow::Continue;
    };
    let backup = (
        cx.st.arg_d.clone(),
        cx.st.arg_sdff,
        cx.st.clock,
        cx.st.clock_pol,
        cx.st.sig_h.clone(),
        cx.st.sig_o.clone(),
        cx.st.ff_h,
    );
    let flow = 'body: {
        if cx.st.ff_fjkg.is_some() && cx.nusers(&cx.st.sig_h) == 2 && !is_fused(cx, mul) {
            cx.st.arg_d = cx.st.sig_h.clone();
            cx.st.arg_sdff = false;
            if out_register(index, cx, depth + 1).is_unwind() {
                break 'body Flow::Unwind;
            }
            if let Some(ff) = cx.st.dff.cell {
                // H has no enable, and shares the reset of B.
                let fits = !cx.has_port(ff, PORT_EN)
                    && cx
                        .st
                        .ff_b
                        .is_none_or(|ff_b| resets_compatible(cx, ff_b, ff));
                if fits {
                    cx.st.ff_h = Some(ff);
                    cx.st.clock = cx.st.dff.clock;
                    cx.st.clock_pol = cx.st.dff.clock_pol;
                    cx.st.sig_h = cx.st.dff.q.clone();
                }
            }
        }
        cx.st.sig_o = cx.st.sig_h.clone();
        find_post_adder(index, cx, depth + 1)
    };
    (
        cx.st.arg_d,
        cx.st.arg_sdff,
        cx.st.clock,
        cx.st.clock_pol,
        cx.st.sig_h,
        cx.st.sig_o,
        cx.st.ff_h,
    ) = backup;
    flow
}

fn find_post_adder(index: &DspIndex, cx: &mut DspContext<'_>, depth: usize) -> Flow {
    let Some(mul) = cx.st.mul else {
        return Flow::Continue;
    };
    let backup = (cx.st.add, cx.st.add_ab);
    let flow = if is_fused(cx, mul) && enable_dsp(cx, mul) != 1 {
        // The post-adder of this QL_DSP is not available.
        cx.st.add = None;
        post_adder_operands(index, cx, depth + 1)
    } else {
        let first = cx.st.sig_h[0];
        cx.iterate(
            depth,
            index.add.lookup(&first),
            Presence::Optional,
            |cx, c| {
                let ab = cx.port(c.cell, c.extra.port());
                let sig_h = &cx.st.sig_h;
                ab.len() <= sig_h.len()
                    && ab == sig_h.extract(0, ab.len())
                    && cx.nusers(&sig_h.extract_end(ab.len())) <= 1
            },
            |cx, c| {
                cx.st.add = c.map(|c| c.cell);
                cx.st.add_ab = c.map(|c| c.extra);
            },
            |cx, depth| post_adder_operands(index, cx, depth),
        )
    };
    (cx.st.add, cx.st.add_ab) = backup;
    flow
}

fn post_adder_operands(index: &DspIndex, cx: &mut DspContext<'_>, depth: usize) -> Flow {
    let Some(mul) = cx.st.mul else {
        return Flow::Continue;
    };
    let backup = (cx.st.sig_o.clone(), cx.st.sig_cd.clone(), cx.st.cd_signed);
    let flow = 'body: {
        if let (Some(add), Some(ab)) = (cx.st.add, cx.st.add_ab) {
            let other = ab.other();
            cx.st.sig_cd = cx.port(add, other.port());
            cx.st.cd_signed = param_bool(cx, add, other.signed_param());

            let natural_mul_width = cx.st.sig_a.len() + cx.st.sig_b.len();
            let actual_mul_width = cx.st.sig_h.len();
            let actual_acc_width = cx.st.sig_cd.len();
            if actual_acc_width > actual_mul_width && natural_mul_width > actual_mul_width {
                break 'body Flow::Continue;
            }
            // An accumulator must agree with the multiplier on signedness.
            if cx.st.sig_cd == cx.st.sig_h
                && actual_acc_width != actual_mul_width
                && param_bool(cx, mul, PARAM_A_SIGNED) != param_bool(cx, add, PARAM_A_SIGNED)
            {
                break 'body Flow::Continue;
            }
            cx.st.sig_o = cx.port(add, PORT_Y);
        }
        find_output_mux(index, cx, depth + 1)
    };
    (cx.st.sig_o, cx.st.sig_cd, cx.st.cd_signed) = backup;
    flow
}

fn find_output_mux(index: &DspIndex, cx: &mut DspContext<'_>, depth: usize) -> Flow {
    let backup = (cx.st.mux, cx.st.mux_ab);
    let sig_o = cx.st.sig_o.clone();
    let flow = cx.iterate(
        depth,
        index.mux.lookup(&sig_o),
        Presence::Optional,
        |_, _| true,
        |cx, c| {
            cx.st.mux = c.map(|c| c.cell);
            cx.st.mux_ab = c.map(|c| c.extra);
        },
        |cx, depth| output_mux_operands(index, cx, depth),
    );
    (cx.st.mux, cx.st.mux_ab) = backup;
    flow
}

fn output_mux_operands(index: &DspIndex, cx: &mut DspContext<'_>, depth: usize) -> Flow {
    let backup = cx.st.sig_o.clone();
    if let Some(mux) = cx.st.mux {
        cx.st.sig_o = cx.port(mux, PORT_Y);
    }
    let flow = output_register(index, cx, depth + 1);
    cx.st.sig_o = backup;
    flow
}

fn output_register(index: &DspIndex, cx: &mut DspContext<'_>, depth: usize) -> Flow {
    let Some(mul) = cx.st.mul else {
        return Flow::Continue;
    };
    let backup = (
        cx.st.arg_d.clone(),
        cx.st.arg_sdff,
        cx.st.cd_signed,
        cx.st.clock,
        cx.st.clock_pol,
        cx.st.sig_cd.clone(),
        cx.st.sig_o.clone(),
        cx.st.ff_o,
        cx.st.o_lo,
    );
    let flow = 'body: {
        if !is_fused(cx, mul) || enable_dsp(cx, mul) != 0 {
            cx.st.dff = Default::default();
            // First try the whole output, then its low half.
            if cx.nusers(&cx.st.sig_o) == 2 {
                cx.st.arg_d = cx.st.sig_o.clone();
                cx.st.arg_sdff = cx.st.mux.is_none();
                if out_register(index, cx, depth + 1).is_unwind() {
                    break 'body Flow::Unwind;
                }
            }
            if cx.st.dff.cell.is_none() && cx.st.sig_o.len() > O_LO_WIDTH {
                cx.st.arg_d = cx.st.sig_o.extract(0, O_LO_WIDTH);
                if cx.nusers(&cx.st.arg_d) == 2 {
                    cx.st.arg_sdff = cx.st.mux.is_none();
                    if out_register(index, cx, depth + 1).is_unwind() {
                        break 'body Flow::Unwind;
                    }
                    cx.st.o_lo = cx.st.dff.cell.is_some();
                }
            }
            if let Some(ff) = cx.st.dff.cell {
                cx.st.ff_o = Some(ff);
                cx.st.clock = cx.st.dff.clock;
                cx.st.clock_pol = cx.st.dff.clock_pol;
                let q = cx.st.dff.q.clone();
                let d = cx.st.sig_o.extract(0, q.len());
                cx.st.sig_o.replace(&d, &q);
            }

            // Only an accumulator can be loaded, through the mux or the
            // synchronous reset of the output register.
            if let Some(mux) = cx.st.mux {
                if cx.st.sig_cd != cx.st.sig_o {
                    break 'body Flow::Continue;
                }
                let load = cx.st.mux_ab.map_or(Operand::A, Operand::other);
                cx.st.sig_cd = cx.port(mux, load.port());
                cx.st.cd_signed = adder_signed(cx);
            } else if let Some(ff) = cx.st.dff.cell.filter(|&ff| cx.has_port(ff, PORT_SRST)) {
                if cx.st.sig_cd != cx.st.sig_o {
                    break 'body Flow::Continue;
                }
                cx.st.sig_cd = SigSpec::from(cx.param(ff, PARAM_SRST_VALUE));
                cx.st.cd_signed = adder_signed(cx);
            }
        }
        input_register_cd(index, cx, depth + 1)
    };
    (
        cx.st.arg_d,
        cx.st.arg_sdff,
        cx.st.cd_signed,
        cx.st.clock,
        cx.st.clock_pol,
        cx.st.sig_cd,
        cx.st.sig_o,
        cx.st.ff_o,
        cx.st.o_lo,
    ) = backup;
    flow
}

fn input_register_cd(index: &DspIndex, cx: &mut DspContext<'_>, depth: usize) -> Flow {
    let Some(mul) = cx.st.mul else {
        return Flow::Continue;
    };
    let backup = (
        cx.st.arg_q.clone(),
        cx.st.clock,
        cx.st.clock_pol,
        cx.st.sig_cd.clone(),
        cx.st.ff_cd,
    );
    let flow = 'body: {
        let registered = is_fused(cx, mul)
            && (param_bool(cx, mul, PARAM_C_REG) || param_bool(cx, mul, PARAM_D_REG));
        if !cx.st.sig_cd.is_empty() && cx.st.sig_cd != cx.st.sig_o && !registered {
            cx.st.arg_q = cx.st.sig_cd.clone();
            if in_register(index, cx, depth + 1).is_unwind() {
                break 'body Flow::Unwind;
            }
            if let Some(ff) = cx.st.dff.cell {
                // C and D share the reset of A and B.
                let fits = [cx.st.ff_a, cx.st.ff_b]
                    .into_iter()
                    .flatten()
                    .all(|other| resets_compatible(cx, other, ff));
                if fits {
                    cx.st.ff_cd = Some(ff);
                    cx.st.clock = cx.st.dff.clock;
                    cx.st.clock_pol = cx.st.dff.clock_pol;
                    cx.st.sig_cd = cx.st.dff.d.clone();
                }
            }
        }
        extend_accumulator(cx, depth + 1)
    };
    (
        cx.st.arg_q,
        cx.st.clock,
        cx.st.clock_pol,
        cx.st.sig_cd,
        cx.st.ff_cd,
    ) = backup;
    flow
}

fn extend_accumulator(cx: &mut DspContext<'_>, depth: usize) -> Flow {
    let backup = cx.st.sig_cd.clone();
    if !cx.st.sig_cd.is_empty() {
        let signed = cx.st.cd_signed;
        cx.st.sig_cd.extend_u0(CD_WIDTH, signed);
    }
    let flow = accept_match(cx, depth + 1);
    cx.st.sig_cd = backup;
    flow
}

fn accept_match(cx: &mut DspContext<'_>, _depth: usize) -> Flow {
    let Some(mul) = cx.st.mul else {
        return Flow::Continue;
    };
    // An existing QL_DSP with nothing new around it.
    if is_fused(cx, mul) && cx.st.absorbed().next().is_none() {
        return Flow::Continue;
    }
    cx.accept()
}
