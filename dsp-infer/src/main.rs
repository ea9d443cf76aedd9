//! Command line driver for DSP inference on Yosys JSON netlists.

mod tracing;

use crate::tracing::Tracer;

use std::path::PathBuf;
use std::process::exit;

use clap::Parser;
use netmatch::netlist::json::{load_yosys_json_file, save_yosys_json_file};
use netmatch::passes::{infer_dsp_with_options, DspOptions};
use netmatch::{SearchOptions, TieBreak};

/// Infer QL_DSP cells in a Yosys JSON netlist.
#[derive(Parser, Debug)]
#[clap(version = "1.0", long_about = None)]
#[clap(about = "Fold multipliers and the logic around them into QL_DSP cells.")]
struct CmdLineArgs {
    /// Input netlist file as Yosys JSON.
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Input. A netlist in Yosys JSON format."
    )]
    input: PathBuf,
    /// Output netlist file
    #[arg(
        short,
        long,
        default_value = "out.json",
        value_name = "FILE",
        help = "Output. A netlist in Yosys JSON format."
    )]
    output: PathBuf,
    /// Log output file
    #[arg(
        short,
        long,
        value_name = "LOGFILE",
        help = "Logfile with every event of the matcher."
    )]
    logfile: Option<PathBuf>,
    /// Modules to process (default=all)
    #[arg(
        short,
        long = "module",
        value_name = "MODULE",
        help = "Only process the named module. Can be repeated. By default, all modules are processed."
    )]
    modules: Vec<String>,
    /// Seed for the candidate order (default=insertion order)
    #[arg(
        short,
        long,
        value_name = "SEED",
        help = "Try candidates in a pseudo-random order derived from this seed."
    )]
    seed: Option<u32>,
    /// Print the details of every match.
    #[arg(short, long, help = "Print the details of every match.")]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opts = CmdLineArgs::parse();

    // We need to keep the object around to keep the logging active.
    let _tracer = Tracer::setup_tracing(opts.logfile, opts.verbose)?;

    let mut design = load_yosys_json_file(&opts.input)?;

    for name in &opts.modules {
        if design.module(name).is_none() {
            eprintln!("Module {name} not found in {:?}.", opts.input);
            exit(1);
        }
    }

    let options = DspOptions {
        search: SearchOptions {
            tie_break: opts.seed.map_or(TieBreak::Insertion, TieBreak::Seeded),
        },
    };

    let mut total = 0;
    for (name, module) in design.modules.iter_mut() {
        if !opts.modules.is_empty() && !opts.modules.iter().any(|m| m.as_str() == name.as_str()) {
            continue;
        }
        let replaced = infer_dsp_with_options(module, &options);
        println!("{name}: {replaced} QL_DSP cells");
        total += replaced;
    }

    println!("Saving result");
    save_yosys_json_file(&design, &opts.output)?;

    println!("Done. {total} QL_DSP cells created or updated.");
    Ok(())
}
