//! Version reconciliation between the runtime version file and the
//! packaging manifest.
//!
//! The runtime version file is authoritative. When the manifest disagrees,
//! its version value is rewritten in place with a structured, format
//! preserving edit (only the one value node changes, so a look-alike string
//! elsewhere in the manifest can never be touched), then re-read and
//! verified before the canonical version is returned.

use std::path::{Path, PathBuf};

use regex::Regex;
use semver::Version;
use toml_edit::{DocumentMut, Item, value};

use crate::config::ProjectConfig;
use crate::error::{OrchestratorError, Result};

/// Outcome of one reconciliation run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedVersion {
    /// Canonical version after reconciliation
    pub version: Version,
    /// Whether the manifest was rewritten this run
    pub rewritten: bool,
    /// Non-fatal observations (e.g. one location absent)
    pub warnings: Vec<String>,
}

/// Reconciles the two authoritative version locations.
#[derive(Debug)]
pub struct VersionResolver {
    version_file: PathBuf,
    version_key: String,
    manifest: PathBuf,
    manifest_version_path: Vec<String>,
}

/// What reading one location yielded.
enum Location {
    Absent,
    Unreadable(std::io::Error),
    Present(String),
}

impl VersionResolver {
    /// Creates a resolver from the project configuration.
    pub fn from_config(project: &ProjectConfig) -> Self {
        Self {
            version_file: project.resolve(&project.version_file),
            version_key: project.version_key.clone(),
            manifest: project.resolve(&project.manifest),
            manifest_version_path: project
                .manifest_version_path
                .split('.')
                .map(str::to_string)
                .collect(),
        }
    }

    /// Resolves the canonical version, rewriting the manifest on drift.
    ///
    /// Idempotent: a second run over reconciled files performs no writes.
    pub fn resolve(&self) -> Result<ResolvedVersion> {
        let file_value = match self.read_location(&self.version_file)? {
            Location::Present(content) => Some(self.extract_from_version_file(&content)?),
            Location::Absent => None,
            Location::Unreadable(source) => {
                return Err(OrchestratorError::VersionUnreadable {
                    path: self.version_file.clone(),
                    source,
                });
            }
        };

        let manifest_value = match self.read_location(&self.manifest)? {
            Location::Present(content) => Some(self.extract_from_manifest(&content)?),
            Location::Absent => None,
            Location::Unreadable(source) => {
                return Err(OrchestratorError::VersionUnreadable {
                    path: self.manifest.clone(),
                    source,
                });
            }
        };

        match (file_value, manifest_value) {
            (None, None) => Err(OrchestratorError::VersionMissing {
                checked: vec![self.version_file.clone(), self.manifest.clone()],
            }),
            (Some(version), None) => Ok(ResolvedVersion {
                warnings: vec![format!(
                    "manifest {} absent; using version file only",
                    self.manifest.display()
                )],
                version,
                rewritten: false,
            }),
            (None, Some(version)) => Ok(ResolvedVersion {
                warnings: vec![format!(
                    "version file {} absent; using manifest only",
                    self.version_file.display()
                )],
                version,
                rewritten: false,
            }),
            (Some(canonical), Some(manifest)) if canonical == manifest => Ok(ResolvedVersion {
                version: canonical,
                rewritten: false,
                warnings: Vec::new(),
            }),
            (Some(canonical), Some(manifest)) => {
                log::info!(
                    "version drift: {} declares {canonical}, {} declares {manifest}; rewriting manifest",
                    self.version_file.display(),
                    self.manifest.display()
                );
                self.rewrite_manifest(&canonical)?;
                Ok(ResolvedVersion {
                    version: canonical,
                    rewritten: true,
                    warnings: Vec::new(),
                })
            }
        }
    }

    /// Reads one location, distinguishing absent from unreadable.
    fn read_location(&self, path: &Path) -> Result<Location> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(Location::Present(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Location::Absent),
            Err(e) => Ok(Location::Unreadable(e)),
        }
    }

    /// Extracts the version assigned to the configured key in the version
    /// file, e.g. `version = "1.2.3"`.
    fn extract_from_version_file(&self, content: &str) -> Result<Version> {
        let pattern = format!(
            r#"(?m)^\s*{}\s*[:=]\s*["']?([0-9A-Za-z.+-]+)["']?\s*$"#,
            regex::escape(&self.version_key)
        );
        let re = Regex::new(&pattern)
            .map_err(|e| OrchestratorError::Config(format!("bad version key pattern: {e}")))?;
        let found = re
            .captures(content)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| OrchestratorError::InvalidFormat {
                path: self.version_file.clone(),
                found: format!("no `{}` assignment found", self.version_key),
            })?;
        self.parse_version(&found, &self.version_file)
    }

    /// Extracts the version value at the configured dotted path in the
    /// manifest document.
    fn extract_from_manifest(&self, content: &str) -> Result<Version> {
        let doc: DocumentMut = content.parse()?;
        let mut item: &Item = doc.as_item();
        for segment in &self.manifest_version_path {
            item = item
                .get(segment)
                .ok_or_else(|| OrchestratorError::InvalidFormat {
                    path: self.manifest.clone(),
                    found: format!("missing key `{}`", self.manifest_version_path.join(".")),
                })?;
        }
        let raw = item.as_str().ok_or_else(|| OrchestratorError::InvalidFormat {
            path: self.manifest.clone(),
            found: format!(
                "`{}` is not a string",
                self.manifest_version_path.join(".")
            ),
        })?;
        self.parse_version(raw, &self.manifest)
    }

    fn parse_version(&self, raw: &str, path: &Path) -> Result<Version> {
        Version::parse(raw).map_err(|_| OrchestratorError::InvalidFormat {
            path: path.to_path_buf(),
            found: raw.to_string(),
        })
    }

    /// Rewrites the manifest's version value in place and verifies the
    /// rewrite byte-for-byte before returning. Verification failure is
    /// fatal and never retried.
    fn rewrite_manifest(&self, canonical: &Version) -> Result<()> {
        let content = std::fs::read_to_string(&self.manifest).map_err(|e| {
            OrchestratorError::VersionReconciliationFailed {
                manifest: self.manifest.clone(),
                reason: format!("re-reading manifest: {e}"),
            }
        })?;
        let mut doc: DocumentMut = content.parse()?;

        let mut item: &mut Item = doc.as_item_mut();
        for segment in &self.manifest_version_path {
            item = item.get_mut(segment).ok_or_else(|| {
                OrchestratorError::VersionReconciliationFailed {
                    manifest: self.manifest.clone(),
                    reason: format!(
                        "key `{}` vanished during rewrite",
                        self.manifest_version_path.join(".")
                    ),
                }
            })?;
        }
        *item = value(canonical.to_string());

        let written = doc.to_string();
        std::fs::write(&self.manifest, &written).map_err(|e| {
            OrchestratorError::VersionReconciliationFailed {
                manifest: self.manifest.clone(),
                reason: format!("writing manifest: {e}"),
            }
        })?;

        // Verify what landed on disk matches what was serialized and that
        // the version round-trips to exactly the canonical value.
        let on_disk = std::fs::read_to_string(&self.manifest).map_err(|e| {
            OrchestratorError::VersionReconciliationFailed {
                manifest: self.manifest.clone(),
                reason: format!("verifying rewrite: {e}"),
            }
        })?;
        if on_disk != written {
            return Err(OrchestratorError::VersionReconciliationFailed {
                manifest: self.manifest.clone(),
                reason: "written bytes do not match serialized document".into(),
            });
        }
        let verified = self.extract_from_manifest(&on_disk)?;
        if &verified != canonical {
            return Err(OrchestratorError::VersionReconciliationFailed {
                manifest: self.manifest.clone(),
                reason: format!("rewrite verified as {verified}, expected {canonical}"),
            });
        }
        Ok(())
    }
}
