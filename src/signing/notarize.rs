//! Notarization: submit, poll, staple.
//!
//! macOS artifacts need approval from the external notarization service
//! before they run without warnings. The flow is submit (as a zip), poll the
//! submission until it reaches a terminal status or the configured deadline,
//! then staple the approval ticket into the bundle. Rejection and timeout
//! are signing failures; the coordinator applies the build-type policy.

use std::time::{Duration, Instant};

use regex::Regex;

use crate::config::SigningConfig;
use crate::error::{OrchestratorError, Result};
use crate::exec::{CommandSpec, RetryExecutor};
use crate::model::BuildArtifact;
use crate::signing::SigningCredentials;

/// Terminal and in-flight submission statuses the service reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SubmissionStatus {
    InProgress,
    Accepted,
    Rejected,
}

/// Runs the full notarization flow for one artifact.
///
/// Skipped with a debug log when no notary credentials are configured;
/// whether that is acceptable is the coordinator's policy decision, made
/// before calling here.
pub(super) async fn notarize(
    artifact: &BuildArtifact,
    credentials: &SigningCredentials,
    config: &SigningConfig,
    executor: &RetryExecutor,
) -> Result<()> {
    let (Some(key_id), Some(issuer)) = (&credentials.notary_key_id, &credentials.notary_issuer)
    else {
        log::debug!("no notary credentials; skipping notarization");
        return Ok(());
    };

    // The service accepts zips, not bare bundles.
    let zip_path = artifact.path.with_extension("zip");
    let compress = CommandSpec::new("ditto").args(vec![
        "-c".to_string(),
        "-k".to_string(),
        "--keepParent".to_string(),
        artifact.path.to_string_lossy().into_owned(),
        zip_path.to_string_lossy().into_owned(),
    ]);
    executor.run(&compress).await?;

    // The staging zip is removed on every exit path, terminal or not.
    let result = submit_poll_staple(artifact, key_id, issuer, config, executor, &zip_path).await;
    let _ = tokio::fs::remove_file(&zip_path).await;
    result
}

/// Submit, poll to a terminal status, staple. The staging zip is owned by
/// the caller, which removes it whatever this returns.
async fn submit_poll_staple(
    artifact: &BuildArtifact,
    key_id: &str,
    issuer: &str,
    config: &SigningConfig,
    executor: &RetryExecutor,
    zip_path: &std::path::Path,
) -> Result<()> {
    let submit = CommandSpec::new("xcrun").args(vec![
        "notarytool".to_string(),
        "submit".to_string(),
        zip_path.to_string_lossy().into_owned(),
        "--key-id".to_string(),
        key_id.to_string(),
        "--issuer".to_string(),
        issuer.to_string(),
        "--output-format".to_string(),
        "plist".to_string(),
    ]);
    let output = executor.run(&submit).await?;
    let submission_id = parse_submission_id(&output.stdout).ok_or_else(|| {
        OrchestratorError::SigningFailed {
            artifact: artifact.path.clone(),
            reason: "notarization submit returned no submission id".into(),
        }
    })?;
    log::info!("notarization submitted, polling for a terminal status");

    let deadline = Instant::now() + Duration::from_secs(config.poll_timeout_secs);
    loop {
        let info = CommandSpec::new("xcrun").args(vec![
            "notarytool".to_string(),
            "info".to_string(),
            submission_id.clone(),
            "--key-id".to_string(),
            key_id.to_string(),
            "--issuer".to_string(),
            issuer.to_string(),
        ]);
        let output = executor.run(&info).await?;

        match parse_status(&output.stdout) {
            SubmissionStatus::Accepted => break,
            SubmissionStatus::Rejected => {
                return Err(OrchestratorError::SigningFailed {
                    artifact: artifact.path.clone(),
                    reason: format!("notarization rejected: {}", output.stdout.trim()),
                });
            }
            SubmissionStatus::InProgress => {
                if Instant::now() >= deadline {
                    return Err(OrchestratorError::SigningFailed {
                        artifact: artifact.path.clone(),
                        reason: format!(
                            "notarization did not reach a terminal status within {}s",
                            config.poll_timeout_secs
                        ),
                    });
                }
                tokio::time::sleep(Duration::from_secs(config.poll_interval_secs)).await;
            }
        }
    }

    // Embed the approval ticket so the artifact verifies offline.
    let staple = CommandSpec::new("xcrun").args(vec![
        "stapler".to_string(),
        "staple".to_string(),
        artifact.path.to_string_lossy().into_owned(),
    ]);
    executor.run(&staple).await?;
    log::info!("notarization ticket stapled to {}", artifact.path.display());
    Ok(())
}

/// Pulls the submission id out of notarytool submit output.
fn parse_submission_id(stdout: &str) -> Option<String> {
    let re = Regex::new(
        r"(?i)\bid\b\D*([0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})",
    )
    .ok()?;
    re.captures(stdout).map(|c| c[1].to_string())
}

/// Interprets notarytool info output; anything unrecognized counts as
/// still in progress so the bounded poll loop keeps the final say.
fn parse_status(stdout: &str) -> SubmissionStatus {
    let lower = stdout.to_lowercase();
    if lower.contains("status: accepted") || lower.contains("<string>accepted</string>") {
        SubmissionStatus::Accepted
    } else if lower.contains("status: invalid") || lower.contains("<string>invalid</string>") {
        SubmissionStatus::Rejected
    } else {
        SubmissionStatus::InProgress
    }
}
