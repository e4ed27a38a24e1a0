//! Pipeline orchestration.
//!
//! One run: reconcile the version once, then drive each requested target
//! through build → sign → package. Targets share no mutable state and run
//! concurrently under the configured cap; within a target the stages are
//! strictly sequential. A target failing never aborts the others, and the
//! build report is written no matter how the run went.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::build::Strategy;
use crate::config::OrchestratorConfig;
use crate::error::Result;
use crate::exec::{RetryExecutor, RetryPolicy};
use crate::model::{BuildTarget, SigningMode};
use crate::package::ArtifactPackager;
use crate::redact::Redactor;
use crate::report::{BuildReport, TargetOutcome, TargetReport};
use crate::resources;
use crate::signing::{SigningCoordinator, SigningCredentials};
use crate::version::VersionResolver;

/// Exit code: everything requested was packaged.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code: fatal configuration or validation error before any target ran.
pub const EXIT_CONFIG_ERROR: i32 = 1;
/// Exit code: one or more targets failed; the report lists which.
pub const EXIT_TARGET_FAILURES: i32 = 2;

/// Result of one orchestrator run.
#[derive(Debug)]
pub struct RunOutcome {
    /// The persisted report
    pub report: BuildReport,
    /// Where the report was written
    pub report_path: PathBuf,
    /// Process exit code per the CLI contract
    pub exit_code: i32,
}

/// Drives the full pipeline for a set of targets.
pub struct Orchestrator {
    config: Arc<OrchestratorConfig>,
    report_path: PathBuf,
}

impl Orchestrator {
    /// Creates an orchestrator; `report_path` defaults to
    /// `<output_dir>/build-report.json`.
    pub fn new(config: OrchestratorConfig, report_path: Option<PathBuf>) -> Self {
        let report_path = report_path
            .unwrap_or_else(|| config.package.output_dir.join("build-report.json"));
        Self {
            config: Arc::new(config),
            report_path,
        }
    }

    /// Runs the pipeline for every requested target.
    ///
    /// Returns `Err` only for fatal pre-target conditions (version
    /// reconciliation, credentials decoding, resource preflight); per-target
    /// failures land in the report and the exit code instead.
    pub async fn run(&self, targets: &[BuildTarget]) -> Result<RunOutcome> {
        let resolved = VersionResolver::from_config(&self.config.project).resolve()?;
        log::info!("canonical version: {}", resolved.version);

        let credentials = Arc::new(SigningCredentials::from_env(&self.config.signing)?);
        let redactor =
            SigningCoordinator::redactor_for(&Redactor::default(), credentials.as_ref().as_ref());

        resources::check(&self.config.limits, &self.config.package.output_dir)?;

        let mut report = BuildReport::new(resolved.version.to_string());
        report.warnings.extend(resolved.warnings.clone());

        let parallelism = self.config.limits.effective_parallelism();
        log::debug!("running {} target(s), at most {parallelism} in parallel", targets.len());
        let semaphore = Arc::new(Semaphore::new(parallelism));
        let mut tasks = JoinSet::new();

        for (index, target) in targets.iter().copied().enumerate() {
            let config = Arc::clone(&self.config);
            let semaphore = Arc::clone(&semaphore);
            let credentials = Arc::clone(&credentials);
            let redactor = redactor.clone();
            let version = resolved.version.clone();
            tasks.spawn(async move {
                // Closed semaphore is unreachable; treat it as permission.
                let _permit = semaphore.acquire_owned().await;
                let report =
                    run_target(target, &config, &version, credentials.as_ref().as_ref(), &redactor)
                        .await;
                (index, report)
            });
        }

        let mut sections: Vec<(usize, TargetReport)> = Vec::with_capacity(targets.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(section) => sections.push(section),
                Err(e) => log::error!("target task panicked: {e}"),
            }
        }
        sections.sort_by_key(|(index, _)| *index);
        for (_, section) in sections {
            report.record(section);
        }

        let report_path = report.persist(&self.report_path).await?;
        let exit_code = if report.all_succeeded() {
            EXIT_SUCCESS
        } else {
            EXIT_TARGET_FAILURES
        };

        Ok(RunOutcome {
            report,
            report_path,
            exit_code,
        })
    }
}

/// Runs one target's pipeline; never propagates, always reports.
async fn run_target(
    target: BuildTarget,
    config: &OrchestratorConfig,
    version: &semver::Version,
    credentials: Option<&SigningCredentials>,
    redactor: &Redactor,
) -> TargetReport {
    let started = Instant::now();
    let mut warnings = Vec::new();

    let outcome = match run_stages(target, config, version, credentials, redactor, &mut warnings)
        .await
    {
        Ok(packages) => {
            log::info!("target {target} completed with {} package(s)", packages.len());
            TargetOutcome::Succeeded { packages }
        }
        Err(e) => {
            // Error text has been through the redactor wherever command
            // output was captured.
            log::error!("target {target} failed: {e}");
            TargetOutcome::Failed {
                error: e.to_string(),
            }
        }
    };

    TargetReport {
        target,
        outcome,
        warnings,
        duration_secs: started.elapsed().as_secs_f64(),
    }
}

/// The strictly sequential stages for one target.
async fn run_stages(
    target: BuildTarget,
    config: &OrchestratorConfig,
    version: &semver::Version,
    credentials: Option<&SigningCredentials>,
    redactor: &Redactor,
    warnings: &mut Vec<String>,
) -> Result<Vec<crate::model::Package>> {
    let strategy = Strategy::for_target(target, config, version, redactor);
    let output = strategy.build(target).await?;

    let executor = RetryExecutor::new(
        RetryPolicy {
            max_attempts: config.build.max_attempts,
            base_delay: config.build.base_delay(),
            attempt_timeout: config.build.attempt_timeout(),
        },
        redactor.clone(),
    );

    let (server, client) = if target.signing == SigningMode::Signed {
        let coordinator = SigningCoordinator::new(config.signing.clone(), executor.clone());
        let server = coordinator.sign(output.server, credentials).await?;
        warnings.extend(server.warnings);
        let client = coordinator.sign(output.client, credentials).await?;
        warnings.extend(client.warnings);
        (server.artifact, client.artifact)
    } else {
        (output.server, output.client)
    };

    let packager = ArtifactPackager::new(
        config.project.name.clone(),
        version.clone(),
        &config.package,
        executor,
    );
    let packaged = packager.package(&[server, client], target).await?;
    warnings.extend(packaged.warnings);
    Ok(packaged.packages)
}
