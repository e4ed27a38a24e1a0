//! Core data model: targets, artifacts, and packages.
//!
//! The loosely-typed platform/build-type strings a CI runner passes on the
//! command line become closed enums here, validated once at the boundary.

use std::fmt;
use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Target operating system for one build-and-package run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Linux (tar.gz portable archive, cross-toolchain build)
    Linux,
    /// Windows (zip portable archive, NSIS installer when available)
    Windows,
    /// macOS (app bundle via the native strategy, dmg when available)
    Macos,
}

impl Platform {
    /// Returns the conventional output-directory name for this platform.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::Windows => "windows",
            Platform::Macos => "macos",
        }
    }

    /// File extension carried by executables on this platform, if any.
    pub fn executable_ext(&self) -> Option<&'static str> {
        match self {
            Platform::Windows => Some("exe"),
            Platform::Linux | Platform::Macos => None,
        }
    }

    /// Returns the platform the orchestrator is currently running on.
    pub fn host() -> Option<Self> {
        if cfg!(target_os = "linux") {
            Some(Platform::Linux)
        } else if cfg!(target_os = "windows") {
            Some(Platform::Windows)
        } else if cfg!(target_os = "macos") {
            Some(Platform::Macos)
        } else {
            None
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Build type driving retry, signing, and packaging policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildType {
    /// Local development build; signing failures degrade to unsigned
    Development,
    /// Release build; signing failures are fatal
    Production,
    /// CI verification build
    Ci,
    /// Re-package existing build output without rebuilding
    Package,
}

impl BuildType {
    /// Whether a signing failure (or absent credentials with signing
    /// requested) aborts the target rather than degrading to unsigned.
    pub fn signing_is_fatal(&self) -> bool {
        matches!(self, BuildType::Production)
    }
}

impl fmt::Display for BuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuildType::Development => "development",
            BuildType::Production => "production",
            BuildType::Ci => "ci",
            BuildType::Package => "package",
        };
        f.write_str(s)
    }
}

/// Whether signing was requested for a target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SigningMode {
    /// Sign (and notarize where the platform requires it)
    Signed,
    /// Skip signing entirely
    Unsigned,
}

/// One (platform, build-type, signing-mode) tuple driving a pipeline run.
///
/// Immutable once constructed; passed by value through the stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildTarget {
    /// Target operating system
    pub platform: Platform,
    /// Build type
    pub build_type: BuildType,
    /// Signing mode
    pub signing: SigningMode,
}

impl fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.platform, self.build_type)
    }
}

/// Role of an artifact within the product pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactRole {
    /// The server executable/bundle
    Server,
    /// The client executable/bundle
    Client,
}

impl fmt::Display for ArtifactRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactRole::Server => f.write_str("server"),
            ArtifactRole::Client => f.write_str("client"),
        }
    }
}

/// Kind of filesystem object a build strategy produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    /// A single executable file
    RawExecutable,
    /// An application bundle directory (macOS .app)
    AppBundle,
}

/// Signing status carried by an artifact through the pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "state")]
pub enum SigningStatus {
    /// Not signed (initial state, or degraded after a non-fatal failure)
    Unsigned,
    /// Signed, and notarized where the platform requires it
    Signed {
        /// Identity the artifact was signed with
        identity: String,
    },
}

/// One built, not-yet-packaged executable or bundle.
///
/// Created by the build strategy, possibly replaced (new signing status) by
/// the signing coordinator, finally consumed by the packager. Each stage
/// owns the artifact exclusively until it hands it on.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildArtifact {
    /// Target this artifact was built for
    pub target: BuildTarget,
    /// Server or client
    pub role: ArtifactRole,
    /// Location on disk
    pub path: PathBuf,
    /// Executable vs bundle directory
    pub kind: ArtifactKind,
    /// Signing state
    pub signing: SigningStatus,
}

/// One final distributable file; immutable once written.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Package {
    /// Distributable format
    pub format: PackageFormat,
    /// Location on disk
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// Hex-encoded SHA-256 of the file
    pub sha256: String,
}

/// Distributable formats the packager can produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackageFormat {
    /// Gzipped tar portable archive
    TarGz,
    /// Zip portable archive
    Zip,
    /// NSIS Windows installer executable
    NsisInstaller,
    /// macOS disk image
    Dmg,
}

impl fmt::Display for PackageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PackageFormat::TarGz => "tar.gz",
            PackageFormat::Zip => "zip",
            PackageFormat::NsisInstaller => "nsis-installer",
            PackageFormat::Dmg => "dmg",
        };
        f.write_str(s)
    }
}
