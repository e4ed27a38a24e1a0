//! Command line interface.
//!
//! Thin layer over the orchestrator: parse arguments, load and override the
//! configuration, run, and map the outcome onto the exit-code contract.

mod args;

pub use args::Args;

use clap::Parser;
use clap::error::ErrorKind;

use crate::error::Result;
use crate::model::BuildTarget;
use crate::orchestrator::{EXIT_CONFIG_ERROR, EXIT_SUCCESS, Orchestrator};
use crate::report::TargetOutcome;

/// Main CLI entry point. Returns the process exit code.
pub async fn run() -> i32 {
    // Usage errors are configuration errors under the exit-code contract,
    // not clap's default exit status.
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => EXIT_SUCCESS,
                _ => EXIT_CONFIG_ERROR,
            };
            let _ = e.print();
            return code;
        }
    };
    match execute(args).await {
        Ok(code) => code,
        Err(e) => {
            // Fatal pre-target errors: nothing was built, no report exists.
            log::error!("{e}");
            eprintln!("Error: {e}");
            EXIT_CONFIG_ERROR
        }
    }
}

async fn execute(args: Args) -> Result<i32> {
    let mut config = crate::config::OrchestratorConfig::load(&args.config)?;
    if let Some(output_dir) = &args.output_dir {
        config.package.output_dir = output_dir.clone();
    }
    if let Some(max_parallel) = args.max_parallel {
        config.limits.max_parallel = max_parallel;
    }

    let signing = args.signing_mode();
    let targets: Vec<BuildTarget> = args
        .platforms()?
        .into_iter()
        .map(|platform| BuildTarget {
            platform,
            build_type: args.build_type,
            signing,
        })
        .collect();

    let orchestrator = Orchestrator::new(config, args.report.clone());
    let outcome = orchestrator.run(&targets).await?;

    for section in &outcome.report.targets {
        match &section.outcome {
            TargetOutcome::Succeeded { packages } => {
                println!("{}: ok ({} package(s))", section.target, packages.len());
                for package in packages {
                    println!("  {} {}", package.format, package.path.display());
                }
            }
            TargetOutcome::Failed { error } => {
                println!("{}: FAILED: {error}", section.target);
            }
        }
        for warning in &section.warnings {
            println!("  warning: {warning}");
        }
    }
    println!("report: {}", outcome.report_path.display());

    Ok(outcome.exit_code)
}
