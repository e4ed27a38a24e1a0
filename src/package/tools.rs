//! Installer tool detection.
//!
//! Cached probes so repeated packaging runs do not spawn version checks per
//! target. A missing tool is not an error; the packager falls back to the
//! portable archive and records a warning.

use std::sync::LazyLock;

/// Whether makensis is available for NSIS installer creation.
pub static HAS_MAKENSIS: LazyLock<bool> = LazyLock::new(|| probe("makensis", "-VERSION"));

/// Whether hdiutil is available for dmg creation.
pub static HAS_HDIUTIL: LazyLock<bool> = LazyLock::new(|| probe("hdiutil", "help"));

fn probe(tool: &str, version_arg: &str) -> bool {
    match which::which(tool) {
        Ok(path) => {
            log::debug!("found {tool} at {}", path.display());
            match std::process::Command::new(&path).arg(version_arg).output() {
                Ok(output) if output.status.success() => {
                    log::info!("{tool} available");
                    true
                }
                Ok(output) => {
                    log::warn!(
                        "{tool} found at {} but probe failed (exit code: {:?}); \
                         installers needing it will be skipped",
                        path.display(),
                        output.status.code()
                    );
                    false
                }
                Err(e) => {
                    log::warn!(
                        "{tool} found at {} but failed to execute: {e}; \
                         installers needing it will be skipped",
                        path.display()
                    );
                    false
                }
            }
        }
        Err(e) => {
            log::debug!("{tool} not found in PATH: {e}");
            false
        }
    }
}
