//! Platform build strategies.
//!
//! Linux and Windows targets build through the cross-platform toolchain
//! strategy; macOS builds through the native bundling strategy with its
//! stricter bundling requirements. Both validate the project layout up
//! front, clean stale output for the target, and run every toolchain step
//! under the retry executor.

mod cross;
mod layout;
mod locate;
mod native;

pub use cross::CrossToolchainStrategy;
pub use layout::validate_layout;
pub use native::NativeBundleStrategy;

use semver::Version;

use crate::config::OrchestratorConfig;
use crate::error::Result;
use crate::exec::{RetryExecutor, RetryPolicy};
use crate::model::{BuildArtifact, BuildTarget, Platform};
use crate::redact::Redactor;
use crate::resources::ResourcePreflight;

/// The server and client artifacts one target build produces.
#[derive(Clone, Debug)]
pub struct BuildOutput {
    /// Server artifact
    pub server: BuildArtifact,
    /// Client artifact
    pub client: BuildArtifact,
}

/// Strategy selection for a target platform.
#[derive(Debug)]
pub enum Strategy {
    /// Cross-platform toolchain (Linux, Windows)
    Cross(CrossToolchainStrategy),
    /// Native bundling (macOS)
    Native(NativeBundleStrategy),
}

impl Strategy {
    /// Selects the strategy for a target and wires up its retry executor.
    pub fn for_target(
        target: BuildTarget,
        config: &OrchestratorConfig,
        version: &Version,
        redactor: &Redactor,
    ) -> Self {
        let executor = RetryExecutor::new(
            RetryPolicy {
                max_attempts: config.build.max_attempts,
                base_delay: config.build.base_delay(),
                attempt_timeout: config.build.attempt_timeout(),
            },
            redactor.clone(),
        )
        .with_preflight(ResourcePreflight::new(
            config.limits.clone(),
            config.package.output_dir.clone(),
        ));
        match target.platform {
            Platform::Linux | Platform::Windows => Self::Cross(CrossToolchainStrategy::new(
                config.project.clone(),
                config.build.clone(),
                version.clone(),
                executor,
            )),
            Platform::Macos => Self::Native(NativeBundleStrategy::new(
                config.project.clone(),
                config.build.clone(),
                config.native.clone(),
                version.clone(),
                executor,
            )),
        }
    }

    /// Validates layout, cleans stale output, and builds both artifacts.
    pub async fn build(&self, target: BuildTarget) -> Result<BuildOutput> {
        match self {
            Self::Cross(strategy) => strategy.build(target).await,
            Self::Native(strategy) => strategy.build(target).await,
        }
    }
}
