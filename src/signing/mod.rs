//! Signing coordination.
//!
//! The signing lifecycle is an explicit state machine:
//! Unsigned → Signing → Signed | Failed. A failure (or absent credentials
//! with signing requested) is fatal only for production builds; every other
//! build type degrades back to Unsigned with a recorded warning. Credential
//! values are registered with the redactor before any command runs, so they
//! cannot reach captured output on any path.

mod keychain;
mod notarize;

pub use keychain::TempKeychain;

use std::fmt;

use base64::Engine;

use crate::config::SigningConfig;
use crate::error::{OrchestratorError, Result};
use crate::exec::{CommandSpec, RetryExecutor};
use crate::model::{BuildArtifact, Platform, SigningMode, SigningStatus};
use crate::redact::Redactor;

/// Signing credential material resolved from the secrets provider.
///
/// Never printed; the `Debug` impl masks every field.
#[derive(Clone)]
pub struct SigningCredentials {
    /// Signing identity name
    pub identity: String,
    /// Decoded certificate bytes (macOS import)
    pub certificate: Option<Vec<u8>>,
    /// Certificate password
    pub certificate_password: Option<String>,
    /// Notarization API key id
    pub notary_key_id: Option<String>,
    /// Notarization issuer id
    pub notary_issuer: Option<String>,
}

impl fmt::Debug for SigningCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningCredentials")
            .field("identity", &self.identity)
            .field("certificate", &self.certificate.as_ref().map(|_| "<bytes>"))
            .field("certificate_password", &self.certificate_password.as_ref().map(|_| "***"))
            .field("notary_key_id", &self.notary_key_id.as_ref().map(|_| "***"))
            .field("notary_issuer", &self.notary_issuer.as_ref().map(|_| "***"))
            .finish()
    }
}

impl SigningCredentials {
    /// Reads credentials from the environment variables named in config.
    ///
    /// Returns `None` when no identity is provided; the coordinator then
    /// applies the missing-credentials policy for the build type.
    pub fn from_env(config: &SigningConfig) -> Result<Option<Self>> {
        let identity = match std::env::var(&config.identity_env) {
            Ok(identity) if !identity.trim().is_empty() => identity.trim().to_string(),
            _ => return Ok(None),
        };

        let certificate = match std::env::var(&config.certificate_env) {
            Ok(encoded) if !encoded.trim().is_empty() => Some(
                base64::engine::general_purpose::STANDARD
                    .decode(encoded.trim())
                    .map_err(|e| {
                        OrchestratorError::Config(format!(
                            "{} is not valid base64: {e}",
                            config.certificate_env
                        ))
                    })?,
            ),
            _ => None,
        };

        Ok(Some(Self {
            identity,
            certificate,
            certificate_password: std::env::var(&config.certificate_password_env)
                .ok()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty()),
            notary_key_id: std::env::var(&config.notary_key_env).ok().filter(|v| !v.is_empty()),
            notary_issuer: std::env::var(&config.notary_issuer_env)
                .ok()
                .filter(|v| !v.is_empty()),
        }))
    }

    /// Values that must never appear in captured output.
    pub fn secret_values(&self) -> Vec<String> {
        let mut secrets = Vec::new();
        if let Some(password) = &self.certificate_password {
            secrets.push(password.clone());
        }
        if let Some(key) = &self.notary_key_id {
            secrets.push(key.clone());
        }
        if let Some(issuer) = &self.notary_issuer {
            secrets.push(issuer.clone());
        }
        secrets
    }
}

/// Explicit signing lifecycle state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SigningState {
    /// Initial state, or final state after a non-fatal degrade
    Unsigned,
    /// A signing operation is in flight
    Signing,
    /// Terminal success
    Signed { identity: String },
    /// Terminal failure (fatal only for production builds)
    Failed { reason: String },
}

/// Result of one signing pass over an artifact.
#[derive(Clone, Debug)]
pub struct SignOutcome {
    /// The artifact, with its signing status possibly replaced
    pub artifact: BuildArtifact,
    /// Warnings recorded on degraded paths
    pub warnings: Vec<String>,
}

/// Coordinates signing and notarization for one target's artifacts.
pub struct SigningCoordinator {
    config: SigningConfig,
    executor: RetryExecutor,
}

impl SigningCoordinator {
    /// Creates a coordinator.
    ///
    /// The `redactor` must already contain the credential secret values; the
    /// executor it was built into is what keeps them out of diagnostics.
    pub fn new(config: SigningConfig, executor: RetryExecutor) -> Self {
        Self { config, executor }
    }

    /// Builds a redactor covering the given credentials.
    pub fn redactor_for(base: &Redactor, credentials: Option<&SigningCredentials>) -> Redactor {
        let mut redactor = base.clone();
        if let Some(creds) = credentials {
            for secret in creds.secret_values() {
                redactor.add(secret);
            }
        }
        redactor
    }

    /// Signs (and notarizes where required) one artifact.
    pub async fn sign(
        &self,
        artifact: BuildArtifact,
        credentials: Option<&SigningCredentials>,
    ) -> Result<SignOutcome> {
        let state = if artifact.target.signing == SigningMode::Unsigned {
            SigningState::Unsigned
        } else {
            self.advance(&artifact, credentials).await
        };
        self.conclude(artifact, state)
    }

    /// Drives the artifact from Unsigned through Signing to a terminal
    /// state. Policy-free: fatality is decided in [`Self::conclude`].
    async fn advance(
        &self,
        artifact: &BuildArtifact,
        credentials: Option<&SigningCredentials>,
    ) -> SigningState {
        let Some(credentials) = credentials else {
            return SigningState::Failed {
                reason: "signing requested but no credentials were provided".to_string(),
            };
        };

        log::debug!(
            "signing state: {:?} -> {:?} for {}",
            SigningState::Unsigned,
            SigningState::Signing,
            artifact.path.display()
        );
        let signed = match artifact.target.platform {
            Platform::Macos => self.sign_macos(artifact, credentials).await,
            Platform::Linux | Platform::Windows => self.sign_generic(artifact, credentials).await,
        };

        match signed {
            Ok(()) => SigningState::Signed {
                identity: credentials.identity.clone(),
            },
            Err(e) => SigningState::Failed {
                reason: e.to_string(),
            },
        }
    }

    /// Maps the terminal state onto the artifact under the build-type
    /// fatality policy.
    fn conclude(&self, artifact: BuildArtifact, state: SigningState) -> Result<SignOutcome> {
        match state {
            SigningState::Unsigned => Ok(SignOutcome {
                artifact,
                warnings: Vec::new(),
            }),
            SigningState::Signed { identity } => {
                log::info!(
                    "signing state: Signing -> Signed for {}",
                    artifact.path.display()
                );
                let mut artifact = artifact;
                artifact.signing = SigningStatus::Signed { identity };
                Ok(SignOutcome {
                    artifact,
                    warnings: Vec::new(),
                })
            }
            SigningState::Failed { reason } => {
                log::warn!(
                    "signing state: Signing -> Failed for {}",
                    artifact.path.display()
                );
                self.degrade_or_fail(artifact, reason)
            }
            // `advance` only ever returns terminal states
            SigningState::Signing => unreachable!("Signing is not a terminal state"),
        }
    }

    /// Applies the build-type fatality policy to a signing failure.
    fn degrade_or_fail(&self, artifact: BuildArtifact, reason: String) -> Result<SignOutcome> {
        if artifact.target.build_type.signing_is_fatal() {
            return Err(OrchestratorError::SigningFailed {
                artifact: artifact.path.clone(),
                reason,
            });
        }
        let warning = format!(
            "{}: {reason}; continuing unsigned ({} build)",
            artifact.path.display(),
            artifact.target.build_type
        );
        log::warn!("{warning}");
        let mut artifact = artifact;
        artifact.signing = SigningStatus::Unsigned;
        Ok(SignOutcome {
            artifact,
            warnings: vec![warning],
        })
    }

    /// Signs with the configured generic command (Linux, Windows).
    async fn sign_generic(
        &self,
        artifact: &BuildArtifact,
        credentials: &SigningCredentials,
    ) -> Result<()> {
        let Some(template) = &self.config.sign_command else {
            crate::bail!(
                "no sign_command configured for {}",
                artifact.target.platform
            );
        };
        let mut parts = template.iter().map(|part| {
            part.replace("{artifact}", &artifact.path.to_string_lossy())
                .replace("{identity}", &credentials.identity)
        });
        let program = parts
            .next()
            .ok_or_else(|| OrchestratorError::Config("sign_command is empty".into()))?;
        let spec = CommandSpec::new(program).args(parts);
        self.executor.run(&spec).await?;
        Ok(())
    }

    /// Signs and notarizes a macOS bundle.
    ///
    /// Certificate material is imported into a temporary keychain that is
    /// destroyed when this function returns, on success or failure.
    async fn sign_macos(
        &self,
        artifact: &BuildArtifact,
        credentials: &SigningCredentials,
    ) -> Result<()> {
        let _keychain = match (&credentials.certificate, &credentials.certificate_password) {
            (Some(certificate), Some(password)) => Some(
                TempKeychain::import(certificate, password, &self.executor).await?,
            ),
            _ => {
                log::debug!("no certificate material; assuming identity is already available");
                None
            }
        };

        let spec = CommandSpec::new("codesign").args(vec![
            "--deep".to_string(),
            "--force".to_string(),
            "--options".to_string(),
            "runtime".to_string(),
            "--sign".to_string(),
            credentials.identity.clone(),
            artifact.path.to_string_lossy().into_owned(),
        ]);
        self.executor.run(&spec).await?;

        notarize::notarize(artifact, credentials, &self.config, &self.executor).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::RetryPolicy;
    use crate::model::{ArtifactKind, ArtifactRole, BuildTarget, BuildType};
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;

    fn artifact(build_type: BuildType, signing: SigningMode) -> BuildArtifact {
        BuildArtifact {
            target: BuildTarget {
                platform: Platform::Linux,
                build_type,
                signing,
            },
            role: ArtifactRole::Server,
            path: "/tmp/acme-server".into(),
            kind: ArtifactKind::RawExecutable,
            signing: SigningStatus::Unsigned,
        }
    }

    fn coordinator(config: SigningConfig, redactor: Redactor) -> SigningCoordinator {
        let executor = RetryExecutor::new(RetryPolicy::once(Duration::from_secs(10)), redactor);
        SigningCoordinator::new(config, executor)
    }

    fn credentials() -> SigningCredentials {
        SigningCredentials {
            identity: "Developer ID: Acme".into(),
            certificate: None,
            certificate_password: Some("hunter2".into()),
            notary_key_id: None,
            notary_issuer: None,
        }
    }

    #[tokio::test]
    async fn unsigned_mode_short_circuits() {
        let coordinator = coordinator(SigningConfig::default(), Redactor::default());
        let outcome = coordinator
            .sign(artifact(BuildType::Production, SigningMode::Unsigned), None)
            .await
            .unwrap();
        assert_eq!(outcome.artifact.signing, SigningStatus::Unsigned);
        assert!(outcome.warnings.is_empty());
    }

    #[tokio::test]
    async fn missing_credentials_degrade_for_development() {
        let coordinator = coordinator(SigningConfig::default(), Redactor::default());
        let outcome = coordinator
            .sign(artifact(BuildType::Development, SigningMode::Signed), None)
            .await
            .unwrap();
        assert_eq!(outcome.artifact.signing, SigningStatus::Unsigned);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("no credentials"));
    }

    #[tokio::test]
    async fn missing_credentials_are_fatal_for_production() {
        let coordinator = coordinator(SigningConfig::default(), Redactor::default());
        let err = coordinator
            .sign(artifact(BuildType::Production, SigningMode::Signed), None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::SigningFailed { .. }));
    }

    #[tokio::test]
    async fn generic_command_signs_and_sets_status() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("signer.sh");
        fs::write(&tool, "#!/bin/sh\necho signed \"$1\"\n").unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();

        let config = SigningConfig {
            sign_command: Some(vec![
                tool.to_string_lossy().into_owned(),
                "{artifact}".into(),
                "{identity}".into(),
            ]),
            ..SigningConfig::default()
        };
        let creds = credentials();
        let outcome = coordinator(config, Redactor::default())
            .sign(artifact(BuildType::Production, SigningMode::Signed), Some(&creds))
            .await
            .unwrap();
        assert_eq!(
            outcome.artifact.signing,
            SigningStatus::Signed {
                identity: "Developer ID: Acme".into()
            }
        );
    }

    #[tokio::test]
    async fn signing_tool_failure_never_leaks_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("signer.sh");
        // A leaky tool that echoes its environment-provided password.
        fs::write(
            &tool,
            "#!/bin/sh\necho \"signing with password hunter2\" >&2\nexit 1\n",
        )
        .unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();

        let config = SigningConfig {
            sign_command: Some(vec![tool.to_string_lossy().into_owned(), "{artifact}".into()]),
            ..SigningConfig::default()
        };
        let creds = credentials();
        let redactor = SigningCoordinator::redactor_for(&Redactor::default(), Some(&creds));
        let err = coordinator(config, redactor)
            .sign(artifact(BuildType::Production, SigningMode::Signed), Some(&creds))
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(!message.contains("hunter2"));
        assert!(message.contains(crate::redact::MASK));
    }

    #[tokio::test]
    async fn development_degrades_on_tool_failure_with_warning() {
        let config = SigningConfig {
            sign_command: Some(vec!["/nonexistent/signer".into(), "{artifact}".into()]),
            ..SigningConfig::default()
        };
        let creds = credentials();
        let outcome = coordinator(config, Redactor::default())
            .sign(artifact(BuildType::Development, SigningMode::Signed), Some(&creds))
            .await
            .unwrap();
        assert_eq!(outcome.artifact.signing, SigningStatus::Unsigned);
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[test]
    fn debug_output_masks_credential_fields() {
        let rendered = format!("{:?}", credentials());
        assert!(!rendered.contains("hunter2"));
    }

    /// End-to-end macOS flow against fake codesign/ditto/xcrun/security
    /// executables prepended to PATH. PATH is process-global, so a lock
    /// serializes these tests and Drop restores the original value.
    mod macos_flow {
        use super::*;
        use crate::exec::RetryExecutor;
        use std::sync::{Mutex, MutexGuard};

        static PATH_LOCK: Mutex<()> = Mutex::new(());

        const LOG_CALLS: &str = r#"echo "$1" >> "$(dirname "$0")/calls.log""#;

        struct FakeToolchain {
            dir: tempfile::TempDir,
            saved_path: std::ffi::OsString,
            _guard: MutexGuard<'static, ()>,
        }

        impl FakeToolchain {
            fn install(xcrun_body: &str) -> Self {
                Self::with_security(xcrun_body, LOG_CALLS)
            }

            fn with_security(xcrun_body: &str, security_body: &str) -> Self {
                let guard = PATH_LOCK.lock().unwrap_or_else(|e| e.into_inner());
                let dir = tempfile::tempdir().unwrap();
                write_tool(dir.path(), "codesign", "exit 0");
                // ditto -c -k --keepParent <bundle> <zip>
                write_tool(dir.path(), "ditto", r#": > "$5""#);
                write_tool(dir.path(), "xcrun", xcrun_body);
                write_tool(dir.path(), "security", security_body);

                let saved_path = std::env::var_os("PATH").unwrap_or_default();
                let mut prepended = dir.path().as_os_str().to_os_string();
                prepended.push(":");
                prepended.push(&saved_path);
                unsafe { std::env::set_var("PATH", &prepended) };
                Self {
                    dir,
                    saved_path,
                    _guard: guard,
                }
            }

            fn calls(&self) -> String {
                fs::read_to_string(self.dir.path().join("calls.log")).unwrap_or_default()
            }

            fn stapled(&self) -> bool {
                self.dir.path().join("stapled").exists()
            }
        }

        impl Drop for FakeToolchain {
            fn drop(&mut self) {
                unsafe { std::env::set_var("PATH", &self.saved_path) };
            }
        }

        fn write_tool(dir: &std::path::Path, name: &str, body: &str) {
            let path = dir.join(name);
            fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }

        fn xcrun_reporting(info_status: &str) -> String {
            format!(
                r#"case "$1:$2" in
  notarytool:submit) echo "id: 0f70f027-2f3e-4cbb-a123-deadbeef0001" ;;
  notarytool:info) echo "status: {info_status}" ;;
  stapler:*) : > "$(dirname "$0")/stapled" ;;
esac"#
            )
        }

        fn notary_credentials() -> SigningCredentials {
            SigningCredentials {
                identity: "Developer ID: Acme".into(),
                certificate: None,
                certificate_password: None,
                notary_key_id: Some("KEY123456".into()),
                notary_issuer: Some("69a6de8f-0000-0000-0000-000000000000".into()),
            }
        }

        fn macos_artifact(dir: &std::path::Path, build_type: BuildType) -> BuildArtifact {
            let bundle = dir.join("Acme.app");
            fs::write(&bundle, b"bundle").unwrap();
            BuildArtifact {
                target: BuildTarget {
                    platform: Platform::Macos,
                    build_type,
                    signing: SigningMode::Signed,
                },
                role: ArtifactRole::Client,
                path: bundle,
                kind: ArtifactKind::AppBundle,
                signing: SigningStatus::Unsigned,
            }
        }

        #[tokio::test]
        async fn accepted_submission_staples_and_removes_the_staging_zip() {
            let tools = FakeToolchain::install(&xcrun_reporting("Accepted"));
            let dir = tempfile::tempdir().unwrap();
            let artifact = macos_artifact(dir.path(), BuildType::Production);
            let zip = artifact.path.with_extension("zip");

            let creds = notary_credentials();
            let outcome = coordinator(SigningConfig::default(), Redactor::default())
                .sign(artifact, Some(&creds))
                .await
                .unwrap();

            assert!(matches!(outcome.artifact.signing, SigningStatus::Signed { .. }));
            assert!(tools.stapled());
            assert!(!zip.exists());
        }

        #[tokio::test]
        async fn rejected_submission_is_fatal_for_production() {
            let _tools = FakeToolchain::install(&xcrun_reporting("Invalid"));
            let dir = tempfile::tempdir().unwrap();
            let artifact = macos_artifact(dir.path(), BuildType::Production);
            let zip = artifact.path.with_extension("zip");

            let creds = notary_credentials();
            let err = coordinator(SigningConfig::default(), Redactor::default())
                .sign(artifact, Some(&creds))
                .await
                .unwrap_err();

            match err {
                OrchestratorError::SigningFailed { reason, .. } => {
                    assert!(reason.contains("rejected"))
                }
                other => panic!("unexpected error: {other}"),
            }
            assert!(!zip.exists());
        }

        #[tokio::test]
        async fn poll_timeout_degrades_for_development() {
            let _tools = FakeToolchain::install(&xcrun_reporting("In Progress"));
            let dir = tempfile::tempdir().unwrap();
            let artifact = macos_artifact(dir.path(), BuildType::Development);
            let zip = artifact.path.with_extension("zip");

            let config = SigningConfig {
                poll_interval_secs: 0,
                poll_timeout_secs: 0,
                ..SigningConfig::default()
            };
            let creds = notary_credentials();
            let outcome = coordinator(config, Redactor::default())
                .sign(artifact, Some(&creds))
                .await
                .unwrap();

            assert_eq!(outcome.artifact.signing, SigningStatus::Unsigned);
            assert_eq!(outcome.warnings.len(), 1);
            assert!(outcome.warnings[0].contains("terminal status"));
            assert!(!zip.exists());
        }

        #[tokio::test]
        async fn keychain_is_deleted_after_the_signing_stage() {
            let tools = FakeToolchain::install("exit 0");
            let executor =
                RetryExecutor::new(RetryPolicy::once(Duration::from_secs(10)), Redactor::default());

            {
                let keychain = TempKeychain::import(b"cert-bytes", "hunter2", &executor)
                    .await
                    .unwrap();
                assert!(keychain.name().ends_with(".keychain"));
            }

            let calls = tools.calls();
            for operation in ["create-keychain", "import", "unlock-keychain", "delete-keychain"] {
                assert!(calls.contains(operation), "missing {operation} in:\n{calls}");
            }
        }

        #[tokio::test]
        async fn keychain_is_deleted_even_when_import_fails() {
            let body = format!("{LOG_CALLS}\nif [ \"$1\" = \"import\" ]; then exit 1; fi");
            let tools = FakeToolchain::with_security("exit 0", &body);
            let executor =
                RetryExecutor::new(RetryPolicy::once(Duration::from_secs(10)), Redactor::default());

            let result = TempKeychain::import(b"cert-bytes", "hunter2", &executor).await;
            assert!(result.is_err());

            let calls = tools.calls();
            assert!(calls.contains("delete-keychain"), "missing delete-keychain in:\n{calls}");
        }
    }
}
