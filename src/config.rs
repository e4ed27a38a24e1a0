//! Orchestrator configuration.
//!
//! All behavior is driven by an explicit [`OrchestratorConfig`] loaded from a
//! TOML file and passed into each component. The only ambient inputs are the
//! secret values a CI runner exposes through the environment variables named
//! here; their *names* live in config, never their values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ErrorExt, OrchestratorError, Result};
use crate::model::Platform;

/// Top-level orchestrator configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrchestratorConfig {
    /// Project layout and version locations
    pub project: ProjectConfig,
    /// Cross-platform toolchain settings
    pub build: BuildConfig,
    /// Native (macOS) bundling settings
    #[serde(default)]
    pub native: NativeConfig,
    /// Signing and notarization settings
    #[serde(default)]
    pub signing: SigningConfig,
    /// Output and packaging settings
    #[serde(default)]
    pub package: PackageConfig,
    /// Concurrency and resource limits
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Project layout: where sources, version declarations, and entry points live.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Product name; used for artifact lookup and package file names
    pub name: String,
    /// Project root directory
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Runtime version file (authoritative version location)
    pub version_file: PathBuf,
    /// Identifier assigned in the version file, e.g. `version` in
    /// `version = "1.2.3"`
    #[serde(default = "default_version_key")]
    pub version_key: String,
    /// Packaging manifest (secondary version location, rewritten on drift)
    pub manifest: PathBuf,
    /// Dotted path of the version value inside the manifest,
    /// e.g. `package.version`
    #[serde(default = "default_manifest_version_path")]
    pub manifest_version_path: String,
    /// Server application entry directory
    pub server_dir: PathBuf,
    /// Client application entry directory
    pub client_dir: PathBuf,
    /// Additional files the layout check requires
    #[serde(default)]
    pub required_paths: Vec<PathBuf>,
}

impl ProjectConfig {
    /// Resolves a project-relative path against the project root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

/// Cross-platform toolchain invocation and retry policy.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    /// Packaging toolchain executable
    pub tool: String,
    /// Arguments for the scaffold step
    #[serde(default)]
    pub scaffold_args: Vec<String>,
    /// Arguments for the build step
    #[serde(default)]
    pub build_args: Vec<String>,
    /// Primary output glob pattern per platform, relative to the project
    /// root. `{name}` and `{version}` placeholders are substituted.
    #[serde(default)]
    pub output_patterns: OutputPatterns,
    /// Maximum build attempts per step
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay between attempts in seconds (grows linearly per attempt)
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: u64,
    /// Per-attempt timeout in seconds
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,
}

impl BuildConfig {
    /// Per-attempt timeout as a [`Duration`].
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    /// Base backoff delay as a [`Duration`].
    pub fn base_delay(&self) -> Duration {
        Duration::from_secs(self.base_delay_secs)
    }
}

/// Primary output lookup patterns per platform.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputPatterns {
    /// Linux executable pattern
    #[serde(default = "default_linux_pattern")]
    pub linux: String,
    /// Windows executable pattern
    #[serde(default = "default_windows_pattern")]
    pub windows: String,
    /// macOS bundle pattern
    #[serde(default = "default_macos_pattern")]
    pub macos: String,
}

impl OutputPatterns {
    /// Returns the pattern for a platform.
    pub fn for_platform(&self, platform: Platform) -> &str {
        match platform {
            Platform::Linux => &self.linux,
            Platform::Windows => &self.windows,
            Platform::Macos => &self.macos,
        }
    }
}

impl Default for OutputPatterns {
    fn default() -> Self {
        Self {
            linux: default_linux_pattern(),
            windows: default_windows_pattern(),
            macos: default_macos_pattern(),
        }
    }
}

/// Native macOS bundling strategy settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NativeConfig {
    /// Native bundling tool executable
    #[serde(default = "default_native_tool")]
    pub tool: String,
    /// Extra arguments passed after the descriptor path
    #[serde(default)]
    pub args: Vec<String>,
    /// Libraries to bundle into the app
    #[serde(default)]
    pub includes: Vec<String>,
    /// Libraries to exclude from the bundle
    #[serde(default)]
    pub excludes: Vec<String>,
    /// Bundle identifier prefix, e.g. `com.example`
    #[serde(default)]
    pub bundle_id_prefix: Option<String>,
}

impl Default for NativeConfig {
    fn default() -> Self {
        Self {
            tool: default_native_tool(),
            args: Vec::new(),
            includes: Vec::new(),
            excludes: Vec::new(),
            bundle_id_prefix: None,
        }
    }
}

/// Signing and notarization settings.
///
/// Only environment variable *names* appear here; the secrets provider
/// resolves the values at runtime.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SigningConfig {
    /// Env var holding the signing identity name
    #[serde(default = "default_identity_env")]
    pub identity_env: String,
    /// Env var holding the base64-encoded certificate
    #[serde(default = "default_certificate_env")]
    pub certificate_env: String,
    /// Env var holding the certificate password
    #[serde(default = "default_certificate_password_env")]
    pub certificate_password_env: String,
    /// Env vars for the notarization API key id and issuer
    #[serde(default = "default_notary_key_env")]
    pub notary_key_env: String,
    /// Env var for the notarization issuer id
    #[serde(default = "default_notary_issuer_env")]
    pub notary_issuer_env: String,
    /// Signing command for platforms without a built-in flow; `{artifact}`
    /// and `{identity}` placeholders are substituted. Absent means those
    /// platforms follow the missing-credentials policy.
    #[serde(default)]
    pub sign_command: Option<Vec<String>>,
    /// Seconds between notarization status polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Bound on the total notarization wait
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            identity_env: default_identity_env(),
            certificate_env: default_certificate_env(),
            certificate_password_env: default_certificate_password_env(),
            notary_key_env: default_notary_key_env(),
            notary_issuer_env: default_notary_issuer_env(),
            sign_command: None,
            poll_interval_secs: default_poll_interval(),
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

/// Output directory and packaging settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageConfig {
    /// Root directory for packages, manifests, and the build report
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

/// Concurrency cap and resource preflight thresholds.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Maximum targets built in parallel; 0 means one per CPU
    #[serde(default)]
    pub max_parallel: usize,
    /// Minimum free disk space (bytes) required before a build attempt
    #[serde(default = "default_min_disk")]
    pub min_disk_bytes: u64,
    /// Minimum available memory (bytes) required before a build attempt
    #[serde(default = "default_min_memory")]
    pub min_memory_bytes: u64,
}

impl LimitsConfig {
    /// Effective parallelism, defaulting to the CPU count.
    pub fn effective_parallelism(&self) -> usize {
        if self.max_parallel == 0 {
            num_cpus::get()
        } else {
            self.max_parallel
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_parallel: 0,
            min_disk_bytes: default_min_disk(),
            min_memory_bytes: default_min_memory(),
        }
    }
}

impl OrchestratorConfig {
    /// Loads and validates configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).fs_context("reading configuration", path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field constraints that serde cannot express.
    fn validate(&self) -> Result<()> {
        if self.project.name.is_empty() {
            return Err(OrchestratorError::Config(
                "project.name must not be empty".into(),
            ));
        }
        if self.build.tool.is_empty() {
            return Err(OrchestratorError::Config(
                "build.tool must not be empty".into(),
            ));
        }
        if self.build.max_attempts == 0 {
            return Err(OrchestratorError::Config(
                "build.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_version_key() -> String {
    "version".into()
}

fn default_manifest_version_path() -> String {
    "package.version".into()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    5
}

fn default_attempt_timeout() -> u64 {
    1800
}

fn default_linux_pattern() -> String {
    "build/{name}/linux/**/{name}".into()
}

fn default_windows_pattern() -> String {
    "build/{name}/windows/**/{name}.exe".into()
}

fn default_macos_pattern() -> String {
    "build/{name}/macos/**/{name}.app".into()
}

fn default_native_tool() -> String {
    "appbundler".into()
}

fn default_identity_env() -> String {
    "SIGNING_IDENTITY".into()
}

fn default_certificate_env() -> String {
    "SIGNING_CERTIFICATE".into()
}

fn default_certificate_password_env() -> String {
    "SIGNING_CERTIFICATE_PASSWORD".into()
}

fn default_notary_key_env() -> String {
    "NOTARY_KEY_ID".into()
}

fn default_notary_issuer_env() -> String {
    "NOTARY_ISSUER_ID".into()
}

fn default_poll_interval() -> u64 {
    15
}

fn default_poll_timeout() -> u64 {
    1800
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("dist")
}

fn default_min_disk() -> u64 {
    2 * 1024 * 1024 * 1024
}

fn default_min_memory() -> u64 {
    512 * 1024 * 1024
}
