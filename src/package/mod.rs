//! Artifact packaging.
//!
//! Wraps a target's signed (or deliberately unsigned) artifacts into final
//! distributables. A portable archive is always produced, so a successful
//! build can never yield zero packages; richer installer formats are added
//! on top when their tooling is detected, and their failure degrades to a
//! warning rather than losing the archive.

mod archive;
mod checksum;
mod tools;

pub use checksum::calculate_sha256;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use semver::Version;
use serde::Serialize;

use crate::config::PackageConfig;
use crate::error::{ErrorExt, OrchestratorError, Result};
use crate::exec::{CommandSpec, RetryExecutor};
use crate::fsutil;
use crate::model::{BuildArtifact, BuildTarget, Package, PackageFormat, Platform};

use archive::ArchiveEntry;

/// Result of packaging one target.
#[derive(Clone, Debug)]
pub struct PackageOutcome {
    /// Produced distributables; never empty on success
    pub packages: Vec<Package>,
    /// Non-fatal degradations (installer tooling missing or failed)
    pub warnings: Vec<String>,
    /// Location of the per-target packaging manifest
    pub manifest_path: PathBuf,
}

/// Per-target packaging manifest, written next to the packages.
#[derive(Debug, Serialize)]
struct PackagingManifest<'a> {
    target: &'a BuildTarget,
    version: String,
    generated_at: DateTime<Utc>,
    packages: &'a [Package],
}

/// Produces distributable packages and the packaging manifest.
#[derive(Debug)]
pub struct ArtifactPackager {
    product: String,
    version: Version,
    output_dir: PathBuf,
    executor: RetryExecutor,
}

impl ArtifactPackager {
    /// Creates a packager writing under `config.output_dir`.
    pub fn new(
        product: impl Into<String>,
        version: Version,
        config: &PackageConfig,
        executor: RetryExecutor,
    ) -> Self {
        Self {
            product: product.into(),
            version,
            output_dir: config.output_dir.clone(),
            executor,
        }
    }

    /// Packages the artifacts for one target.
    pub async fn package(
        &self,
        artifacts: &[BuildArtifact],
        target: BuildTarget,
    ) -> Result<PackageOutcome> {
        if artifacts.is_empty() {
            return Err(OrchestratorError::PackagingIncomplete {
                target: target.to_string(),
            });
        }

        let target_dir = self.output_dir.join(target.platform.dir_name());
        fsutil::create_dir_all(&target_dir, true).await?;

        let mut packages = Vec::new();
        let mut warnings = Vec::new();

        // The portable archive is unconditional.
        let archive_path = self.create_archive(artifacts, target, &target_dir).await?;
        packages.push(self.describe(archive_format(target.platform), archive_path).await?);

        match target.platform {
            Platform::Windows => {
                if *tools::HAS_MAKENSIS {
                    match self.create_nsis_installer(artifacts, &target_dir).await {
                        Ok(path) => {
                            packages.push(self.describe(PackageFormat::NsisInstaller, path).await?)
                        }
                        Err(e) => warnings.push(format!("NSIS installer skipped: {e}")),
                    }
                } else {
                    warnings.push("makensis unavailable; shipping archive only".into());
                }
            }
            Platform::Macos => {
                if *tools::HAS_HDIUTIL {
                    match self.create_dmg(artifacts, &target_dir).await {
                        Ok(path) => packages.push(self.describe(PackageFormat::Dmg, path).await?),
                        Err(e) => warnings.push(format!("dmg skipped: {e}")),
                    }
                } else {
                    warnings.push("hdiutil unavailable; shipping archive only".into());
                }
            }
            Platform::Linux => {}
        }

        if packages.is_empty() {
            return Err(OrchestratorError::PackagingIncomplete {
                target: target.to_string(),
            });
        }

        let manifest_path = target_dir.join("manifest.json");
        let manifest = PackagingManifest {
            target: &target,
            version: self.version.to_string(),
            generated_at: Utc::now(),
            packages: &packages,
        };
        let content = serde_json::to_string_pretty(&manifest)?;
        tokio::fs::write(&manifest_path, content)
            .await
            .fs_context("writing packaging manifest", &manifest_path)?;
        log::info!(
            "packaged {} as {} package(s), manifest at {}",
            target,
            packages.len(),
            manifest_path.display()
        );

        Ok(PackageOutcome {
            packages,
            warnings,
            manifest_path,
        })
    }

    fn base_name(&self, target: BuildTarget) -> String {
        format!("{}-{}-{}", self.product, self.version, target.platform)
    }

    async fn create_archive(
        &self,
        artifacts: &[BuildArtifact],
        target: BuildTarget,
        target_dir: &std::path::Path,
    ) -> Result<PathBuf> {
        let entries: Vec<ArchiveEntry> = artifacts
            .iter()
            .map(|artifact| ArchiveEntry {
                source: artifact.path.clone(),
                name: format!(
                    "{}/{}",
                    self.product,
                    artifact
                        .path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| artifact.role.to_string())
                ),
            })
            .collect();

        let path = match target.platform {
            Platform::Windows => {
                let path = target_dir.join(format!("{}.zip", self.base_name(target)));
                archive::create_zip(entries, path.clone()).await?;
                path
            }
            Platform::Linux | Platform::Macos => {
                let path = target_dir.join(format!("{}.tar.gz", self.base_name(target)));
                archive::create_tar_gz(entries, path.clone()).await?;
                path
            }
        };
        Ok(path)
    }

    /// Generates a minimal NSIS script over a payload copy of the artifacts
    /// and compiles it with makensis.
    async fn create_nsis_installer(
        &self,
        artifacts: &[BuildArtifact],
        target_dir: &std::path::Path,
    ) -> Result<PathBuf> {
        let payload = target_dir.join("payload");
        fsutil::create_dir_all(&payload, true).await?;
        for artifact in artifacts {
            let dest = payload.join(
                artifact
                    .path
                    .file_name()
                    .ok_or_else(|| OrchestratorError::Generic("artifact has no file name".into()))?,
            );
            fsutil::copy_file(&artifact.path, &dest).await?;
        }

        let installer_name = format!("{}-setup.exe", self.base_name_for_installer());
        let script = format!(
            "Name \"{product}\"\n\
             OutFile \"{installer}\"\n\
             InstallDir \"$PROGRAMFILES\\{product}\"\n\
             SetCompressor /SOLID lzma\n\
             Section \"Install\"\n\
             \x20 SetOutPath \"$INSTDIR\"\n\
             \x20 File /r \"payload\\*.*\"\n\
             SectionEnd\n",
            product = self.product,
            installer = installer_name,
        );
        let script_path = target_dir.join("installer.nsi");
        tokio::fs::write(&script_path, script)
            .await
            .fs_context("writing NSIS script", &script_path)?;

        let spec = CommandSpec::new("makensis")
            .args(vec![
                "-V3".to_string(),
                "-INPUTCHARSET".to_string(),
                "UTF8".to_string(),
                script_path.to_string_lossy().into_owned(),
            ])
            .cwd(target_dir);
        self.executor.run(&spec).await?;

        let _ = tokio::fs::remove_dir_all(&payload).await;
        Ok(target_dir.join(installer_name))
    }

    fn base_name_for_installer(&self) -> String {
        format!("{}-{}", self.product, self.version)
    }

    /// Stages the bundles and builds a compressed dmg with hdiutil.
    async fn create_dmg(
        &self,
        artifacts: &[BuildArtifact],
        target_dir: &std::path::Path,
    ) -> Result<PathBuf> {
        let staging = target_dir.join("dmg-staging");
        fsutil::create_dir_all(&staging, true).await?;
        for artifact in artifacts {
            let name = artifact
                .path
                .file_name()
                .ok_or_else(|| OrchestratorError::Generic("artifact has no file name".into()))?;
            fsutil::copy_dir(&artifact.path, &staging.join(name)).await?;
        }

        let dmg_path = target_dir.join(format!("{}.dmg", self.base_name_for_installer()));
        let spec = CommandSpec::new("hdiutil").args(vec![
            "create".to_string(),
            "-volname".to_string(),
            self.product.clone(),
            "-srcfolder".to_string(),
            staging.to_string_lossy().into_owned(),
            "-ov".to_string(),
            "-format".to_string(),
            "UDZO".to_string(),
            dmg_path.to_string_lossy().into_owned(),
        ]);
        self.executor.run(&spec).await?;

        let _ = tokio::fs::remove_dir_all(&staging).await;
        Ok(dmg_path)
    }

    /// Builds the [`Package`] record for a written file.
    async fn describe(&self, format: PackageFormat, path: PathBuf) -> Result<Package> {
        let metadata = tokio::fs::metadata(&path)
            .await
            .fs_context("reading package metadata", &path)?;
        let sha256 = calculate_sha256(&path).await?;
        Ok(Package {
            format,
            path,
            size: metadata.len(),
            sha256,
        })
    }
}

fn archive_format(platform: Platform) -> PackageFormat {
    match platform {
        Platform::Windows => PackageFormat::Zip,
        Platform::Linux | Platform::Macos => PackageFormat::TarGz,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::RetryPolicy;
    use crate::model::{ArtifactKind, ArtifactRole, BuildType, SigningMode, SigningStatus};
    use crate::redact::Redactor;
    use std::time::Duration;

    fn target(platform: Platform) -> BuildTarget {
        BuildTarget {
            platform,
            build_type: BuildType::Ci,
            signing: SigningMode::Unsigned,
        }
    }

    fn artifact(path: PathBuf, platform: Platform) -> BuildArtifact {
        BuildArtifact {
            target: target(platform),
            role: ArtifactRole::Server,
            path,
            kind: ArtifactKind::RawExecutable,
            signing: SigningStatus::Unsigned,
        }
    }

    fn packager(output_dir: PathBuf) -> ArtifactPackager {
        let config = PackageConfig { output_dir };
        ArtifactPackager::new(
            "acme",
            Version::new(1, 2, 3),
            &config,
            RetryExecutor::new(RetryPolicy::once(Duration::from_secs(10)), Redactor::default()),
        )
    }

    #[tokio::test]
    async fn always_produces_at_least_one_package() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("acme-server");
        tokio::fs::write(&bin, b"exe").await.unwrap();

        let outcome = packager(dir.path().join("dist"))
            .package(&[artifact(bin, Platform::Linux)], target(Platform::Linux))
            .await
            .unwrap();
        assert!(!outcome.packages.is_empty());
        let archive = &outcome.packages[0];
        assert_eq!(archive.format, PackageFormat::TarGz);
        assert!(archive.path.exists());
        assert!(archive.size > 0);
        assert_eq!(archive.sha256.len(), 64);
    }

    #[tokio::test]
    async fn windows_target_gets_a_zip() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("acme-server.exe");
        tokio::fs::write(&bin, b"exe").await.unwrap();

        let outcome = packager(dir.path().join("dist"))
            .package(&[artifact(bin, Platform::Windows)], target(Platform::Windows))
            .await
            .unwrap();
        assert_eq!(outcome.packages[0].format, PackageFormat::Zip);
        assert!(
            outcome.packages[0]
                .path
                .to_string_lossy()
                .ends_with("acme-1.2.3-windows.zip")
        );
    }

    #[tokio::test]
    async fn manifest_enumerates_every_package() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("acme-server");
        tokio::fs::write(&bin, b"exe").await.unwrap();

        let outcome = packager(dir.path().join("dist"))
            .package(&[artifact(bin, Platform::Linux)], target(Platform::Linux))
            .await
            .unwrap();
        let manifest: serde_json::Value = serde_json::from_str(
            &tokio::fs::read_to_string(&outcome.manifest_path).await.unwrap(),
        )
        .unwrap();
        assert_eq!(manifest["version"], "1.2.3");
        let listed = manifest["packages"].as_array().unwrap();
        assert_eq!(listed.len(), outcome.packages.len());
        assert!(listed[0]["size"].as_u64().unwrap() > 0);
        assert_eq!(listed[0]["sha256"].as_str().unwrap().len(), 64);
    }

    #[tokio::test]
    async fn zero_artifacts_is_packaging_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        let err = packager(dir.path().join("dist"))
            .package(&[], target(Platform::Linux))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::PackagingIncomplete { .. }));
    }
}
