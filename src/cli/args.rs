//! Command line argument parsing and validation.

use clap::Parser;
use std::path::PathBuf;

use crate::error::{OrchestratorError, Result};
use crate::model::{BuildType, Platform, SigningMode};

/// Release build-and-package orchestrator
#[derive(Parser, Debug)]
#[command(
    name = "shipwright",
    version,
    about = "Builds, signs, and packages release artifacts for multiple platforms",
    long_about = "Reconciles the project version, then builds the server and client \
executables for each requested platform, signs them when requested, and packages \
them into distributable archives and installers.

Usage:
  shipwright --platform linux --platform windows --build-type ci
  shipwright --platform macos --build-type production --sign

Exit code 0 = every requested target was packaged.
Exit code 1 = fatal configuration or validation error; nothing was built.
Exit code 2 = at least one target failed; the build report lists which."
)]
pub struct Args {
    /// Path to the orchestrator configuration file
    #[arg(short, long, value_name = "PATH", default_value = "shipwright.toml")]
    pub config: PathBuf,

    /// Platform to build; repeat for several (defaults to the host platform)
    #[arg(short, long, value_name = "PLATFORM")]
    pub platform: Vec<Platform>,

    /// Build type driving retry, signing, and packaging policy
    #[arg(short, long, value_name = "TYPE", default_value = "development")]
    pub build_type: BuildType,

    /// Sign the built artifacts (credentials are read from the environment)
    #[arg(long)]
    pub sign: bool,

    /// Override the configured package output directory
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Maximum number of targets built concurrently (0 = number of CPUs)
    #[arg(long, value_name = "N")]
    pub max_parallel: Option<usize>,

    /// Where to write the build report (defaults to <output-dir>/build-report.json)
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,
}

impl Args {
    /// The platforms to build, defaulting to the host.
    pub fn platforms(&self) -> Result<Vec<Platform>> {
        if self.platform.is_empty() {
            let host = Platform::host().ok_or_else(|| {
                OrchestratorError::Config(
                    "no --platform given and the host platform is unsupported".into(),
                )
            })?;
            Ok(vec![host])
        } else {
            let mut platforms = self.platform.clone();
            platforms.dedup();
            Ok(platforms)
        }
    }

    /// Signing mode implied by the flags and build type.
    pub fn signing_mode(&self) -> SigningMode {
        if self.sign || self.build_type.signing_is_fatal() {
            SigningMode::Signed
        } else {
            SigningMode::Unsigned
        }
    }
}
