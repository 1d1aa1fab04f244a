//! Replay tool for the ANCS bridge.
//!
//! Feeds captured Data Source chunk sequences through the bridge, then
//! re-slices each stream at several chunk sizes and checks the host link
//! output never changes.

mod capture;
mod protocol;
mod replay;

use std::path::PathBuf;

use ancs_bridge::reassembly::{LeadingAttribute, ReassemblerConfig};
use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::filter::LevelFilter;

use capture::parse_capture;
use replay::{print_results, run_record};

#[derive(Parser)]
#[command(name = "replay")]
#[command(about = "Replay captured ANCS attribute streams through the bridge")]
struct Args {
    /// Capture file: one hex chunk per line, blank line between records
    capture: PathBuf,

    /// Chunk sizes to re-slice each stream with
    #[arg(short, long, value_delimiter = ',', default_value = "1,2,3,4,7,20,185")]
    chunk_sizes: Vec<usize>,

    /// Streams open with the app identifier
    #[arg(long)]
    app_id: bool,

    /// Fail records whose attribute IDs are out of order
    #[arg(long)]
    verify_ids: bool,

    /// Show the library's log output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.verbose {
        tracing_subscriber::fmt().with_max_level(LevelFilter::TRACE).init();
    }

    let text = std::fs::read_to_string(&args.capture)
        .with_context(|| format!("reading {}", args.capture.display()))?;
    let records = parse_capture(&text)?;

    let config = ReassemblerConfig {
        leading_attribute: if args.app_id {
            LeadingAttribute::AppIdentifier
        } else {
            LeadingAttribute::Title
        },
        verify_attribute_ids: args.verify_ids,
    };

    println!("{}", "ANCS Bridge Replay".bold());
    println!("Capture: {}", args.capture.display());
    println!("Records: {}", records.len());
    println!("Chunk sizes: {:?}", args.chunk_sizes);
    println!();

    let reports: Vec<_> = records
        .iter()
        .map(|record| run_record(record, config, &args.chunk_sizes))
        .collect();
    print_results(&reports);

    // Exit with error code if any record failed
    let failed = reports.iter().filter(|r| !r.passed()).count();
    if failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}
