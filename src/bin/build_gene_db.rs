//! Protein FASTA to GDB Converter
//!
//! Builds the indexed gene database that `simpairs --gene-db` reads to look
//! up reference protein lengths by gene name.
//!
//! Usage:
//!   cargo run --release --bin build_gene_db -- \
//!     -i proteins.faa.gz \
//!     -o proteins.gdb

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use log::{info, warn};
use std::path::PathBuf;
use std::time::Instant;

use simpairs::gdb;

#[derive(Parser)]
#[command(name = "build_gene_db")]
#[command(version)]
#[command(about = "Build a gene database (.gdb) from a protein FASTA file")]
struct Args {
    /// Protein FASTA (plain or .gz); gene name is the second '|' field of each header
    #[arg(short = 'i', long, value_name = "FILE")]
    input: PathBuf,

    /// Output gene database
    #[arg(short = 'o', long, value_name = "FILE", default_value = "proteins.gdb")]
    output: PathBuf,

    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(match args.verbose {
            0 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .parse_default_env()
        .init();

    let start_time = Instant::now();
    let summary = gdb::build(&args.input, &args.output)
        .with_context(|| format!("Failed to build gene database from {}", args.input.display()))?;

    info!("Genes: {}", summary.genes);
    info!("Records: {}", summary.records);
    if summary.ambiguous > 0 {
        warn!(
            "{} gene names map to more than one record; looking them up will fail",
            summary.ambiguous
        );
    }
    info!("Total time: {:.1}s", start_time.elapsed().as_secs_f64());

    Ok(())
}
