//! Molt - Python build pipeline
//!
//! CLI entry point: parses the three platform directories, runs the
//! build pipeline, and reports the outcome.

use clap::Parser;
use console::style;
use molt::cli::Cli;
use molt::context::BuildContext;
use molt::error::MoltResult;
use molt::pipeline::{BuildReport, Pipeline};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> MoltResult<()> {
    let cli = Cli::parse();

    // 0 = warn, 1 = info (build narration), 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("molt=warn"),
        1 => EnvFilter::new("molt=info"),
        _ => EnvFilter::new("molt=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    let ctx = BuildContext::new(cli.build_dir, cli.cache_dir, cli.env_dir).await?;
    let report = Pipeline::new(ctx).run().await?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &BuildReport) {
    println!(
        "{} Python {} with {} in {:.1}s ({})",
        style("Built").green().bold(),
        report.version.resolved,
        report.manager,
        report.elapsed.as_secs_f64(),
        if report.cache_reused {
            "cache reused"
        } else {
            "cold cache"
        }
    );
}
