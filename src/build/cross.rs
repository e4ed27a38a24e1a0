//! Cross-platform toolchain build strategy (Linux, Windows).
//!
//! Delegates to the configured packaging toolchain: a scaffold step creates
//! the application skeleton, a build step compiles it. Each step runs under
//! the retry executor with a cleanup hook that removes the app's partial
//! build output between attempts.

use std::path::PathBuf;

use semver::Version;

use super::{BuildOutput, layout::validate_layout, locate};
use crate::config::{BuildConfig, ProjectConfig};
use crate::error::{OrchestratorError, Result};
use crate::exec::{CommandSpec, RetryExecutor};
use crate::fsutil;
use crate::model::{ArtifactKind, ArtifactRole, BuildArtifact, BuildTarget, BuildType, SigningStatus};

/// Builds server and client executables with the cross-platform toolchain.
#[derive(Debug)]
pub struct CrossToolchainStrategy {
    project: ProjectConfig,
    build: BuildConfig,
    version: Version,
    executor: RetryExecutor,
}

impl CrossToolchainStrategy {
    /// Creates the strategy.
    pub fn new(
        project: ProjectConfig,
        build: BuildConfig,
        version: Version,
        executor: RetryExecutor,
    ) -> Self {
        Self {
            project,
            build,
            version,
            executor,
        }
    }

    /// Builds both artifacts for the target.
    pub async fn build(&self, target: BuildTarget) -> Result<BuildOutput> {
        validate_layout(&self.project)?;
        let server = self.build_app(target, ArtifactRole::Server).await?;
        let client = self.build_app(target, ArtifactRole::Client).await?;
        Ok(BuildOutput { server, client })
    }

    fn app_name(&self, role: ArtifactRole) -> String {
        format!("{}-{}", self.project.name, role)
    }

    async fn build_app(&self, target: BuildTarget, role: ArtifactRole) -> Result<BuildArtifact> {
        let app_name = self.app_name(role);
        let app_dir = match role {
            ArtifactRole::Server => self.project.resolve(&self.project.server_dir),
            ArtifactRole::Client => self.project.resolve(&self.project.client_dir),
        };
        let build_dir = self.project.root.join("build").join(&app_name);

        if target.build_type == BuildType::Package {
            // Package-only runs re-wrap the output a previous build left.
            log::info!("package-only run; locating existing {app_name} output");
        } else {
            // Stale output from a previous run would defeat artifact location.
            fsutil::remove_dir_all(&build_dir).await?;

            log::info!("building {app_name} for {target}");
            self.run_step(&self.build.scaffold_args, &app_dir, &build_dir, target, role)
                .await?;
            self.run_step(&self.build.build_args, &app_dir, &build_dir, target, role)
                .await?;
        }

        let path = self.locate(target, &app_name).ok_or_else(|| {
            OrchestratorError::BuildFailed {
                target: format!("{target} {role}"),
                reason: format!("no artifact matching `{app_name}` was found in the build tree"),
            }
        })?;
        log::info!("located {role} artifact at {}", path.display());

        Ok(BuildArtifact {
            target,
            role,
            path,
            kind: ArtifactKind::RawExecutable,
            signing: SigningStatus::Unsigned,
        })
    }

    async fn run_step(
        &self,
        step_args: &[String],
        app_dir: &PathBuf,
        build_dir: &PathBuf,
        target: BuildTarget,
        role: ArtifactRole,
    ) -> Result<()> {
        let spec = CommandSpec::new(&self.build.tool)
            .args(step_args.iter().cloned())
            .args([app_dir.to_string_lossy().into_owned()])
            .cwd(&self.project.root);

        let cleanup_dir = build_dir.clone();
        self.executor
            .run_with_cleanup(&spec, move |attempt| {
                let cleanup_dir = cleanup_dir.clone();
                async move {
                    log::debug!(
                        "clearing partial output {} after attempt {attempt}",
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
        Ok(())
    }

    /// Primary pattern lookup with recursive name-substring fallback.
    fn locate(&self, target: BuildTarget, app_name: &str) -> Option<PathBuf> {
        let pattern = locate::substitute(
            self.build.output_patterns.for_platform(target.platform),
            app_name,
            &self.version.to_string(),
        );
        if let Some(path) = locate::by_pattern(&self.project.root, &pattern) {
            return Some(path);
        }
        log::debug!("pattern `{pattern}` matched nothing; falling back to recursive search");
        let ext = target.platform.executable_ext();
        locate::by_name_substring(&self.project.root.join("build"), app_name, false, ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::RetryPolicy;
    use crate::model::{BuildType, Platform, SigningMode};
    use crate::redact::Redactor;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;

    fn target() -> BuildTarget {
        BuildTarget {
            platform: Platform::Linux,
            build_type: BuildType::Ci,
            signing: SigningMode::Unsigned,
        }
    }

    /// Lays out a minimal valid project and a fake toolchain script.
    fn project_with_tool(dir: &std::path::Path, tool_body: &str) -> (ProjectConfig, BuildConfig) {
        fs::write(dir.join("version.txt"), "version = \"1.0.0\"\n").unwrap();
        fs::write(dir.join("manifest.toml"), "[package]\nversion = \"1.0.0\"\n").unwrap();
        fs::create_dir_all(dir.join("server")).unwrap();
        fs::create_dir_all(dir.join("client")).unwrap();

        let tool = dir.join("faketool.sh");
        fs::write(&tool, format!("#!/bin/sh\n{tool_body}\n")).unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();

        let project = ProjectConfig {
            name: "acme".into(),
            root: dir.to_path_buf(),
            version_file: "version.txt".into(),
            version_key: "version".into(),
            manifest: "manifest.toml".into(),
            manifest_version_path: "package.version".into(),
            server_dir: "server".into(),
            client_dir: "client".into(),
            required_paths: vec![],
        };
        let build = BuildConfig {
            tool: tool.to_string_lossy().into_owned(),
            scaffold_args: vec!["scaffold".into()],
            build_args: vec!["build".into()],
            output_patterns: Default::default(),
            max_attempts: 2,
            base_delay_secs: 0,
            attempt_timeout_secs: 10,
        };
        (project, build)
    }

    fn strategy(project: ProjectConfig, build: BuildConfig) -> CrossToolchainStrategy {
        let executor = RetryExecutor::new(
            RetryPolicy {
                max_attempts: build.max_attempts,
                base_delay: Duration::ZERO,
                attempt_timeout: Duration::from_secs(10),
            },
            Redactor::default(),
        );
        CrossToolchainStrategy::new(project, build, Version::new(1, 0, 0), executor)
    }

    #[tokio::test]
    async fn builds_and_locates_both_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        // On "build", emit an executable where the default pattern expects it.
        let body = r#"
if [ "$1" = "build" ]; then
  app=$(basename "$2" | sed s/^server$/acme-server/ | sed s/^client$/acme-client/)
  mkdir -p "build/$app/linux/out"
  echo bin > "build/$app/linux/out/$app"
fi
"#;
        let (project, build) = project_with_tool(dir.path(), body);
        let output = strategy(project, build).build(target()).await.unwrap();
        assert!(output.server.path.ends_with("acme-server"));
        assert!(output.client.path.ends_with("acme-client"));
        assert_eq!(output.server.kind, ArtifactKind::RawExecutable);
        assert_eq!(output.server.signing, SigningStatus::Unsigned);
    }

    #[tokio::test]
    async fn falls_back_to_recursive_search() {
        let dir = tempfile::tempdir().unwrap();
        // Output lands outside the expected pattern directory.
        let body = r#"
if [ "$1" = "build" ]; then
  app=$(basename "$2" | sed s/^server$/acme-server/ | sed s/^client$/acme-client/)
  mkdir -p "build/moved-$app"
  echo bin > "build/moved-$app/$app-bin"
fi
"#;
        let (project, build) = project_with_tool(dir.path(), body);
        let output = strategy(project, build).build(target()).await.unwrap();
        assert!(output.server.path.to_string_lossy().contains("acme-server"));
    }

    #[tokio::test]
    async fn failure_surfaces_captured_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let body = "echo 'linker exploded' >&2; exit 3";
        let (project, build) = project_with_tool(dir.path(), body);
        let err = strategy(project, build).build(target()).await.unwrap_err();
        match err {
            OrchestratorError::BuildFailed { reason, .. } => {
                assert!(reason.contains("linker exploded"));
                assert!(reason.contains("2 attempts"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn package_only_build_type_skips_the_toolchain() {
        let dir = tempfile::tempdir().unwrap();
        // A toolchain that would fail if invoked.
        let (project, build) = project_with_tool(dir.path(), "exit 1");
        for app in ["acme-server", "acme-client"] {
            fs::create_dir_all(dir.path().join(format!("build/{app}/linux/out"))).unwrap();
            fs::write(dir.path().join(format!("build/{app}/linux/out/{app}")), b"bin").unwrap();
        }
        let target = BuildTarget {
            platform: Platform::Linux,
            build_type: BuildType::Package,
            signing: SigningMode::Unsigned,
        };
        let output = strategy(project, build).build(target).await.unwrap();
        assert!(output.server.path.ends_with("acme-server"));
        assert!(output.client.path.ends_with("acme-client"));
    }

    #[tokio::test]
    async fn invalid_layout_fails_before_running_the_tool() {
        let dir = tempfile::tempdir().unwrap();
        let (project, build) = project_with_tool(dir.path(), "exit 0");
        fs::remove_dir_all(dir.path().join("server")).unwrap();
        fs::remove_dir_all(dir.path().join("client")).unwrap();
        let err = strategy(project, build).build(target()).await.unwrap_err();
        match err {
            OrchestratorError::ProjectStructureInvalid { missing } => {
                assert_eq!(missing.len(), 2)
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
