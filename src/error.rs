//! Error taxonomy for orchestrator operations.
//!
//! Every failure mode the pipeline can hit has a dedicated variant so that
//! callers can decide fatality per stage instead of string-matching messages.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Main error type for all orchestrator operations
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Neither version location exists on disk
    #[error("no version declaration found; checked {}", format_paths(.checked))]
    VersionMissing {
        /// Paths that were checked
        checked: Vec<PathBuf>,
    },

    /// A version location exists but could not be read (e.g. permissions)
    #[error("version location {path} exists but is unreadable: {source}")]
    VersionUnreadable {
        /// Location that failed to read
        path: PathBuf,
        /// Underlying read error
        source: std::io::Error,
    },

    /// A version value was found but is not semver-shaped
    #[error("invalid version format in {path}: {found:?}")]
    InvalidFormat {
        /// Location containing the bad value
        path: PathBuf,
        /// The offending value
        found: String,
    },

    /// The manifest rewrite did not verify after writing
    #[error("version reconciliation failed for {manifest}: {reason}")]
    VersionReconciliationFailed {
        /// Manifest that was rewritten
        manifest: PathBuf,
        /// Why verification failed
        reason: String,
    },

    /// Required project files are missing; lists every missing path
    #[error("project structure invalid; missing: {}", format_paths(.missing))]
    ProjectStructureInvalid {
        /// Every required path that does not exist
        missing: Vec<PathBuf>,
    },

    /// A command exceeded its per-attempt timeout on every attempt
    #[error("command `{command}` timed out after {timeout_secs}s ({attempts} attempts): {diagnostics}")]
    ExecutionTimeout {
        /// Command that timed out (redacted)
        command: String,
        /// Configured per-attempt timeout
        timeout_secs: u64,
        /// Attempts made before giving up
        attempts: u32,
        /// Last attempt's partial captured output (redacted)
        diagnostics: String,
    },

    /// A command failed on every attempt
    #[error("command `{command}` failed after {attempts} attempts: {diagnostics}")]
    ExecutionFailed {
        /// Command that failed (redacted)
        command: String,
        /// Attempts made before giving up
        attempts: u32,
        /// Last attempt's captured output (redacted)
        diagnostics: String,
    },

    /// A build strategy failed for one target after retries exhausted
    #[error("build failed for {target}: {reason}")]
    BuildFailed {
        /// Target description
        target: String,
        /// Diagnostic detail (redacted)
        reason: String,
    },

    /// Signing or notarization failed where the build type makes it fatal
    #[error("signing failed for {artifact}: {reason}")]
    SigningFailed {
        /// Artifact that could not be signed
        artifact: PathBuf,
        /// Diagnostic detail (redacted)
        reason: String,
    },

    /// A successful build produced zero packages
    #[error("packaging incomplete for {target}: no packages produced")]
    PackagingIncomplete {
        /// Target description
        target: String,
    },

    /// Disk or memory preflight check failed before a build attempt
    #[error("insufficient resources: {reason}")]
    InsufficientResources {
        /// Which resource and how short
        reason: String,
    },

    /// Configuration file errors
    #[error("configuration error: {0}")]
    Config(String),

    /// File operation failed, with the operation and path that failed
    #[error("{operation} failed for {path}: {source}")]
    FileSystem {
        /// What was being done
        operation: String,
        /// Path involved
        path: PathBuf,
        /// Underlying io error
        source: std::io::Error,
    },

    /// IO errors without richer context
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing errors (configuration)
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML document editing errors (manifest rewrite)
    #[error("TOML edit error: {0}")]
    TomlEdit(#[from] toml_edit::TomlError),

    /// JSON serialization errors (report, packaging manifest)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Archive creation errors
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Catch-all with a formatted message
    #[error("{0}")]
    Generic(String),
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Extension trait attaching filesystem context to io errors.
pub trait ErrorExt<T> {
    /// Wrap an io error with the operation and path it was performing.
    fn fs_context(self, operation: &str, path: &std::path::Path) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, std::io::Error> {
    fn fs_context(self, operation: &str, path: &std::path::Path) -> Result<T> {
        self.map_err(|source| OrchestratorError::FileSystem {
            operation: operation.to_string(),
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Constructs a [`OrchestratorError::Generic`] and returns early.
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::error::OrchestratorError::Generic(format!($($arg)*)))
    };
}
