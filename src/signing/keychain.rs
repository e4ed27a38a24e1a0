//! Temporary keychain for certificate import.
//!
//! Certificate material lives in a dedicated keychain (and a tempfile during
//! import) scoped to one target's signing stage. Drop deletes the keychain,
//! so the identity is destroyed on every exit path rather than lingering
//! until process exit.

use std::io::Write;
use std::process::Command as StdCommand;

use crate::error::Result;
use crate::exec::{CommandSpec, RetryExecutor};

/// A keychain that exists only for the lifetime of this value.
pub struct TempKeychain {
    name: String,
}

impl std::fmt::Debug for TempKeychain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TempKeychain").field("name", &self.name).finish()
    }
}

impl TempKeychain {
    /// Creates a keychain and imports the certificate into it.
    ///
    /// The certificate bytes are written to a tempfile that is removed as
    /// soon as the import command completes, pass or fail.
    pub async fn import(
        certificate: &[u8],
        password: &str,
        executor: &RetryExecutor,
    ) -> Result<Self> {
        let name = format!(
            "shipwright-{}-{}.keychain",
            std::process::id(),
            chrono::Utc::now().timestamp_millis()
        );

        let create = CommandSpec::new("security").args(vec![
            "create-keychain".to_string(),
            "-p".to_string(),
            password.to_string(),
            name.clone(),
        ]);
        executor.run(&create).await?;

        let keychain = Self { name: name.clone() };

        // Tempfile is dropped (and unlinked) when this scope ends, even if
        // the import command fails.
        let mut cert_file = tempfile::NamedTempFile::new()?;
        cert_file.write_all(certificate)?;
        cert_file.flush()?;

        let import = CommandSpec::new("security").args(vec![
            "import".to_string(),
            cert_file.path().to_string_lossy().into_owned(),
            "-k".to_string(),
            name.clone(),
            "-P".to_string(),
            password.to_string(),
            "-T".to_string(),
            "/usr/bin/codesign".to_string(),
        ]);
        executor.run(&import).await?;

        let unlock = CommandSpec::new("security").args(vec![
            "unlock-keychain".to_string(),
            "-p".to_string(),
            password.to_string(),
            name,
        ]);
        executor.run(&unlock).await?;

        log::info!("certificate imported to temporary keychain");
        Ok(keychain)
    }

    /// Keychain name for use in signing commands.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for TempKeychain {
    fn drop(&mut self) {
        // Synchronous on purpose: Drop cannot await, and the keychain must
        // not outlive the signing stage.
        let status = StdCommand::new("security")
            .args(["delete-keychain", &self.name])
            .status();
        match status {
            Ok(status) if status.success() => {
                log::debug!("deleted temporary keychain {}", self.name)
            }
            Ok(status) => log::warn!(
                "failed to delete temporary keychain {} (exit {:?})",
                self.name,
                status.code()
            ),
            Err(e) => log::warn!("failed to delete temporary keychain {}: {e}", self.name),
        }
    }
}
