//! netmatch: backtracking pattern matching and rewriting for gate-level
//! netlists.
//!
//! Netlists are represented by [`Module`]s of cells connected through
//! multi-bit signals, and can be read from and written to the JSON format of
//! the Yosys synthesis suite.
//!
//! Patterns are searched with the engine in [`matcher`]: a pattern is a chain
//! of search blocks that bind candidate cells one at a time, backtrack when a
//! condition fails, and hand every complete match to a rewrite callback. The
//! callback may consume matched cells, which unwinds the search to the block
//! that bound them.
//!
//! The [`passes`] module includes DSP inference, which folds wide multipliers
//! and the registers, adders and muxes around them into `QL_DSP` cells.
//!
//! # Example
//!
//! ```
//! use netmatch::netlist::json::load_yosys_json_str;
//! use netmatch::passes::infer_dsp;
//!
//! let json = r#"{
//!   "modules": {
//!     "top": {
//!       "ports": {
//!         "a": { "direction": "input", "bits": [ 2, 3, 4, 5, 6, 7, 8, 9 ] },
//!         "b": { "direction": "input", "bits": [ 10, 11, 12, 13, 14, 15, 16, 17 ] },
//!         "y": { "direction": "output", "bits": [ 18, 19, 20, 21, 22, 23, 24, 25,
//!                                                 26, 27, 28, 29, 30, 31, 32, 33 ] }
//!       },
//!       "cells": {
//!         "mul": {
//!           "type": "$mul",
//!           "parameters": { "A_SIGNED": 0, "B_SIGNED": 0 },
//!           "connections": {
//!             "A": [ 2, 3, 4, 5, 6, 7, 8, 9 ],
//!             "B": [ 10, 11, 12, 13, 14, 15, 16, 17 ],
//!             "Y": [ 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33 ]
//!           }
//!         }
//!       },
//!       "netnames": {
//!         "a": { "bits": [ 2, 3, 4, 5, 6, 7, 8, 9 ] },
//!         "b": { "bits": [ 10, 11, 12, 13, 14, 15, 16, 17 ] },
//!         "y": { "bits": [ 18, 19, 20, 21, 22, 23, 24, 25,
//!                          26, 27, 28, 29, 30, 31, 32, 33 ] }
//!       }
//!     }
//!   }
//! }"#;
//!
//! let mut design = load_yosys_json_str(json).unwrap();
//! let top = design.module_mut("top").unwrap();
//! assert_eq!(infer_dsp(top), 1);
//!
//! let dsp = top.find_cell("mul").unwrap();
//! assert_eq!(top[dsp].kind, "QL_DSP");
//! ```
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod matcher;
pub mod netlist;
pub mod passes;

mod utils;

pub use matcher::{Flow, IndexTable, Presence, SearchContext, SearchOptions, TieBreak};
pub use netlist::json::{load_yosys_json_file, save_yosys_json_file, NetlistJsonError};
pub use netlist::{Cell, CellId, Const, Design, Module, NetlistError, SigBit, SigSpec};
pub use passes::{infer_dsp, DspOptions};
