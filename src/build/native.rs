//! Native bundling strategy (macOS).
//!
//! macOS has stricter bundling and signing requirements than the other
//! platforms, so instead of the generic toolchain this strategy generates a
//! build descriptor per app (metadata, version, included and excluded
//! libraries) and hands it to the native bundling tool, then locates the
//! produced `.app` bundle directory.

use std::path::PathBuf;

use semver::Version;
use serde::Serialize;

use super::{BuildOutput, layout::validate_layout, locate};
use crate::config::{BuildConfig, NativeConfig, ProjectConfig};
use crate::error::{ErrorExt, OrchestratorError, Result};
use crate::exec::{CommandSpec, RetryExecutor};
use crate::fsutil;
use crate::model::{ArtifactKind, ArtifactRole, BuildArtifact, BuildTarget, BuildType, SigningStatus};

/// Build descriptor consumed by the native bundling tool.
///
/// Generated fresh for every build so the embedded version can never go
/// stale relative to the reconciled one.
#[derive(Debug, Serialize)]
struct BundleDescriptor<'a> {
    name: &'a str,
    version: String,
    bundle_id: String,
    entry: String,
    includes: &'a [String],
    excludes: &'a [String],
}

/// Builds server and client `.app` bundles with the native tool.
#[derive(Debug)]
pub struct NativeBundleStrategy {
    project: ProjectConfig,
    build: BuildConfig,
    native: NativeConfig,
    version: Version,
    executor: RetryExecutor,
}

impl NativeBundleStrategy {
    /// Creates the strategy.
    pub fn new(
        project: ProjectConfig,
        build: BuildConfig,
        native: NativeConfig,
        version: Version,
        executor: RetryExecutor,
    ) -> Self {
        Self {
            project,
            build,
            native,
            version,
            executor,
        }
    }

    /// Builds both bundles for the target.
    pub async fn build(&self, target: BuildTarget) -> Result<BuildOutput> {
        validate_layout(&self.project)?;
        let server = self.build_app(target, ArtifactRole::Server).await?;
        let client = self.build_app(target, ArtifactRole::Client).await?;
        Ok(BuildOutput { server, client })
    }

    async fn build_app(&self, target: BuildTarget, role: ArtifactRole) -> Result<BuildArtifact> {
        let app_name = format!("{}-{}", self.project.name, role);
        let build_dir = self.project.root.join("build").join(&app_name);

        if target.build_type == BuildType::Package {
            log::info!("package-only run; locating existing {app_name} bundle");
        } else {
            fsutil::remove_dir_all(&build_dir).await?;

            let descriptor_path = self.write_descriptor(&app_name, role).await?;
            log::info!("bundling {app_name} via {}", self.native.tool);

            let spec = CommandSpec::new(&self.native.tool)
                .args(self.native.args.iter().cloned())
                .args([descriptor_path.to_string_lossy().into_owned()])
                .cwd(&self.project.root);

            let cleanup_dir = build_dir.clone();
            self.executor
                .run_with_cleanup(&spec, move |attempt| {
                    let cleanup_dir = cleanup_dir.clone();
                    async move {
                        log::debug!(
                            "clearing partial bundle {} after attempt {attempt}",
                            cleanup_dir.display()
                        );
                        let _ = tokio::fs::remove_dir_all(&cleanup_dir).await;
                    }
                })
                .await
                .map_err(|e| OrchestratorError::BuildFailed {
                    target: format!("{target} {role}"),
                    reason: e.to_string(),
                })?;
        }

        let path = self.locate(target, &app_name).ok_or_else(|| {
            OrchestratorError::BuildFailed {
                target: format!("{target} {role}"),
                reason: format!("no `.app` bundle matching `{app_name}` was produced"),
            }
        })?;
        log::info!("located {role} bundle at {}", path.display());

        Ok(BuildArtifact {
            target,
            role,
            path,
            kind: ArtifactKind::AppBundle,
            signing: SigningStatus::Unsigned,
        })
    }

    /// Writes the per-app descriptor and returns its path.
    async fn write_descriptor(&self, app_name: &str, role: ArtifactRole) -> Result<PathBuf> {
        let entry_dir = match role {
            ArtifactRole::Server => &self.project.server_dir,
            ArtifactRole::Client => &self.project.client_dir,
        };
        let bundle_id = format!(
            "{}.{}",
            self.native.bundle_id_prefix.as_deref().unwrap_or("app"),
            app_name
        );
        let descriptor = BundleDescriptor {
            name: app_name,
            version: self.version.to_string(),
            bundle_id,
            entry: self.project.resolve(entry_dir).to_string_lossy().into_owned(),
            includes: &self.native.includes,
            excludes: &self.native.excludes,
        };

        let content = toml::to_string_pretty(&descriptor)
            .map_err(|e| OrchestratorError::Generic(format!("serializing descriptor: {e}")))?;
        let dir = self.project.root.join("build").join("descriptors");
        tokio::fs::create_dir_all(&dir)
            .await
            .fs_context("creating descriptor directory", &dir)?;
        let path = dir.join(format!("{app_name}.toml"));
        tokio::fs::write(&path, content)
            .await
            .fs_context("writing build descriptor", &path)?;
        Ok(path)
    }

    fn locate(&self, target: BuildTarget, app_name: &str) -> Option<PathBuf> {
        let pattern = locate::substitute(
            self.build.output_patterns.for_platform(target.platform),
            app_name,
            &self.version.to_string(),
        );
        if let Some(path) = locate::by_pattern(&self.project.root, &pattern) {
            return Some(path);
        }
        log::debug!("pattern `{pattern}` matched nothing; falling back to bundle search");
        locate::by_name_substring(&self.project.root.join("build"), app_name, true, None)
    }
}
