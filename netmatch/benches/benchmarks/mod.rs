pub mod dsp;
pub mod generators;
