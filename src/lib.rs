//! Release build-and-package orchestration library.
//!
//! Drives a product's release pipeline end to end: version reconciliation
//! across the project's version locations, per-platform builds through
//! pluggable strategies, optional code signing and notarization, packaging
//! into distributable archives and installers, and a machine-readable build
//! report. Targets run concurrently and fail independently.
//!
//! It can be used both as a CLI tool and as a library dependency.

pub mod build;
pub mod cli;
pub mod config;
pub mod error;
pub mod exec;
pub mod fsutil;
pub mod model;
pub mod orchestrator;
pub mod package;
pub mod redact;
pub mod report;
pub mod resources;
pub mod signing;
pub mod version;

// Re-export commonly used types
pub use config::OrchestratorConfig;
pub use error::{OrchestratorError, Result};
pub use model::{BuildTarget, BuildType, Platform, SigningMode};
pub use orchestrator::{Orchestrator, RunOutcome};
pub use report::BuildReport;
