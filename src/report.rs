//! Build report.
//!
//! One report per run, appended to as targets complete and always persisted
//! at the end, including on partial failure. Everything in it has already
//! been through the redactor; the report is safe to upload as a CI artifact.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorExt, Result};
use crate::model::{BuildTarget, Package};

/// Outcome of one target's pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "outcome")]
pub enum TargetOutcome {
    /// All stages completed; at least one package exists
    Succeeded {
        /// Packages produced for this target
        packages: Vec<Package>,
    },
    /// A stage failed; the error is recorded in diagnostic detail
    Failed {
        /// Redacted failure description
        error: String,
    },
}

/// Per-target section of the report.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TargetReport {
    /// The target
    pub target: BuildTarget,
    /// Success or failure with detail
    #[serde(flatten)]
    pub outcome: TargetOutcome,
    /// Non-fatal warnings collected across the stages
    pub warnings: Vec<String>,
    /// Wall-clock duration of the target's pipeline in seconds
    pub duration_secs: f64,
}

impl TargetReport {
    /// Whether this target completed successfully.
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, TargetOutcome::Succeeded { .. })
    }
}

/// The whole-run build report.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildReport {
    /// Canonical version the run built
    pub version: String,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished
    pub finished_at: Option<DateTime<Utc>>,
    /// Run-level warnings (e.g. from version reconciliation)
    pub warnings: Vec<String>,
    /// One section per requested target
    pub targets: Vec<TargetReport>,
}

impl BuildReport {
    /// Starts an empty report for the given version.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            started_at: Utc::now(),
            finished_at: None,
            warnings: Vec::new(),
            targets: Vec::new(),
        }
    }

    /// Appends a completed target section.
    pub fn record(&mut self, target: TargetReport) {
        self.targets.push(target);
    }

    /// Whether every target succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.targets.iter().all(TargetReport::succeeded)
    }

    /// Whether at least one target failed.
    pub fn any_failed(&self) -> bool {
        self.targets.iter().any(|t| !t.succeeded())
    }

    /// Stamps the finish time and writes the report as pretty JSON.
    pub async fn persist(&mut self, path: &Path) -> Result<PathBuf> {
        self.finished_at = Some(Utc::now());
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .fs_context("creating report directory", parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content)
            .await
            .fs_context("writing build report", path)?;
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BuildType, Platform, SigningMode};

    fn target(platform: Platform) -> BuildTarget {
        BuildTarget {
            platform,
            build_type: BuildType::Ci,
            signing: SigningMode::Unsigned,
        }
    }

    #[tokio::test]
    async fn mixed_outcomes_round_trip_through_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let mut report = BuildReport::new("1.2.3");
        report.record(TargetReport {
            target: target(Platform::Linux),
            outcome: TargetOutcome::Succeeded { packages: vec![] },
            warnings: vec!["makensis unavailable".into()],
            duration_secs: 12.5,
        });
        report.record(TargetReport {
            target: target(Platform::Windows),
            outcome: TargetOutcome::Failed {
                error: "build failed".into(),
            },
            warnings: vec![],
            duration_secs: 3.0,
        });
        assert!(report.any_failed());
        assert!(!report.all_succeeded());

        let path = dir.path().join("out/build-report.json");
        report.persist(&path).await.unwrap();

        let loaded: BuildReport =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        assert_eq!(loaded.version, "1.2.3");
        assert_eq!(loaded.targets.len(), 2);
        assert!(loaded.targets[0].succeeded());
        assert!(!loaded.targets[1].succeeded());
        assert!(loaded.finished_at.is_some());
    }
}
