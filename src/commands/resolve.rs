use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use crate::route::resolver::{
    default_output_path, resolve_directory, resolve_file, BatchSummary, FileOutcome,
    RESOLVED_DIR,
};

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Recording to resolve
    #[arg(value_name = "INPUT", required_unless_present = "all", conflicts_with = "all")]
    pub input: Option<PathBuf>,

    /// Resolve every recording in this directory
    #[arg(long, value_name = "DIR")]
    pub all: Option<PathBuf>,

    /// Output file, or output directory with --all
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Recompute outputs that already exist
    #[arg(short, long)]
    pub force: bool,
}

pub fn run(args: ResolveArgs) -> Result<ExitCode> {
    match (&args.all, &args.input) {
        (Some(dir), _) => {
            let out_dir = args.out.clone().unwrap_or_else(|| dir.join(RESOLVED_DIR));
            let summary = resolve_directory(dir, &out_dir, args.force)
                .with_context(|| format!("Cannot resolve routes in {}", dir.display()))?;
            println!(
                "Processed: {}, skipped: {}, errored: {}",
                summary.processed, summary.skipped, summary.errored
            );
            if batch_failed(&summary, std::io::stdin().is_terminal()) {
                Ok(ExitCode::FAILURE)
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
        (None, Some(input)) => {
            let output = args
                .out
                .clone()
                .unwrap_or_else(|| default_output_path(input));
            let outcome = resolve_file(input, &output, args.force)
                .with_context(|| format!("Cannot resolve {}", input.display()))?;

            match outcome {
                FileOutcome::Processed(report) => {
                    println!(
                        "{} -> {}: {} on-spot, {} detection, {} failed, {} already resolved",
                        input.display(),
                        output.display(),
                        report.on_spot,
                        report.detection,
                        report.failed.len(),
                        report.already_resolved
                    );
                    for name in &report.failed {
                        println!("  unresolved: {name}");
                    }
                }
                FileOutcome::Skipped => {
                    println!("{} exists, skipped (use --force)", output.display())
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        (None, None) => anyhow::bail!("Either INPUT or --all <DIR> is required"),
    }
}

/// Non-zero only for scripted runs that hit errors; an interactive user reads
/// the counts instead.
fn batch_failed(summary: &BatchSummary, interactive: bool) -> bool {
    summary.errored > 0 && !interactive
}
