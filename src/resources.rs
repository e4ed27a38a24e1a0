//! Disk and memory preflight.
//!
//! A build tool starved of disk or memory tends to die as an opaque timeout
//! or a half-written artifact. Checking up front turns that into a fast,
//! clear failure.

use std::path::{Path, PathBuf};

use sysinfo::{Disks, System};

use crate::config::LimitsConfig;
use crate::error::{OrchestratorError, Result};

/// Thresholds bound to the location they guard.
///
/// Attached to a [`RetryExecutor`](crate::exec::RetryExecutor) so the check
/// runs before every attempt, not just once per run; a target that exhausted
/// the disk mid-run fails fast instead of timing out.
#[derive(Clone, Debug)]
pub struct ResourcePreflight {
    limits: LimitsConfig,
    output_dir: PathBuf,
}

impl ResourcePreflight {
    /// Binds the limits to the output location they are checked against.
    pub fn new(limits: LimitsConfig, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            limits,
            output_dir: output_dir.into(),
        }
    }

    /// Runs the disk and memory check.
    pub fn check(&self) -> Result<()> {
        check(&self.limits, &self.output_dir)
    }
}

/// Verifies the machine has enough free disk (at the output location) and
/// available memory to start a build attempt.
pub fn check(limits: &LimitsConfig, output_dir: &Path) -> Result<()> {
    let mut system = System::new();
    system.refresh_memory();
    let available_memory = system.available_memory();
    if available_memory < limits.min_memory_bytes {
        return Err(OrchestratorError::InsufficientResources {
            reason: format!(
                "available memory {available_memory} bytes is below the {} byte minimum",
                limits.min_memory_bytes
            ),
        });
    }

    if let Some(free) = free_disk_for(output_dir) {
        if free < limits.min_disk_bytes {
            return Err(OrchestratorError::InsufficientResources {
                reason: format!(
                    "free disk {free} bytes at {} is below the {} byte minimum",
                    output_dir.display(),
                    limits.min_disk_bytes
                ),
            });
        }
    } else {
        // Unknown mount is not a failure; the build itself will surface
        // real disk errors.
        log::debug!("no disk stats for {}; skipping disk preflight", output_dir.display());
    }

    Ok(())
}

/// Free space on the disk whose mount point contains `path` (longest
/// matching mount wins).
fn free_disk_for(path: &Path) -> Option<u64> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(path)
    };

    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|disk| absolute.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| disk.available_space())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permissive_limits_pass() {
        let limits = LimitsConfig {
            max_parallel: 0,
            min_disk_bytes: 1,
            min_memory_bytes: 1,
        };
        check(&limits, Path::new(".")).unwrap();
    }

    #[test]
    fn absurd_memory_requirement_short_circuits() {
        let limits = LimitsConfig {
            max_parallel: 0,
            min_disk_bytes: 1,
            min_memory_bytes: u64::MAX,
        };
        let err = check(&limits, Path::new(".")).unwrap_err();
        assert!(matches!(err, OrchestratorError::InsufficientResources { .. }));
    }

    #[test]
    fn preflight_carries_its_location() {
        let permissive = ResourcePreflight::new(
            LimitsConfig {
                max_parallel: 0,
                min_disk_bytes: 1,
                min_memory_bytes: 1,
            },
            ".",
        );
        permissive.check().unwrap();

        let starved = ResourcePreflight::new(
            LimitsConfig {
                max_parallel: 0,
                min_disk_bytes: 1,
                min_memory_bytes: u64::MAX,
            },
            ".",
        );
        let err = starved.check().unwrap_err();
        assert!(matches!(err, OrchestratorError::InsufficientResources { .. }));
    }
}
