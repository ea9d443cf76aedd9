//! Netlist rewriting passes.

pub mod dsp;

pub use dsp::{infer_dsp, infer_dsp_with_options, DspMatcher, DspOptions};
