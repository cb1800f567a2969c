//! The `neurostats` command line tool.

use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;
use std::process;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(
    name = "neurostats",
    version,
    about = "Mass-univariate statistics for surface, volume and region-wise brain morphometry data"
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a vertex or voxel-wise analysis and write result maps.
    Run {
        /// The model specification file.
        modelspec: PathBuf,
        /// Output directory, created if needed.
        outdir: PathBuf,
    },
    /// Run a region-wise ANOVA and write a text report.
    Roi {
        modelspec: PathBuf,
        outdir: PathBuf,
    },
    /// Adjust the p-values in a text or curv file for multiple comparisons.
    Fdr {
        input: PathBuf,
        output: PathBuf,
        /// Correction method.
        #[arg(long, default_value = "BH")]
        method: String,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let start = Instant::now();

    let res = match &args.command {
        Command::Run { modelspec, outdir } => neurostats::run_spatial(modelspec, outdir).map(|_| ()),
        Command::Roi { modelspec, outdir } => neurostats::run_roi(modelspec, outdir),
        Command::Fdr { input, output, method } => neurostats::run_fdr(input, output, method),
    };

    match res {
        Ok(()) => info!("Done in {:.2} seconds.", start.elapsed().as_secs_f64()),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
