//! Project layout validation.

use std::path::PathBuf;

use crate::config::ProjectConfig;
use crate::error::{OrchestratorError, Result};

/// Checks every required project path and fails with the complete list of
/// missing ones, not just the first.
pub fn validate_layout(project: &ProjectConfig) -> Result<()> {
    let mut required: Vec<PathBuf> = vec![
        project.version_file.clone(),
        project.manifest.clone(),
        project.server_dir.clone(),
        project.client_dir.clone(),
    ];
    required.extend(project.required_paths.iter().cloned());

    let missing: Vec<PathBuf> = required
        .into_iter()
        .map(|p| project.resolve(&p))
        .filter(|p| !p.exists())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(OrchestratorError::ProjectStructureInvalid { missing })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn project(root: &std::path::Path) -> ProjectConfig {
        ProjectConfig {
            name: "acme-suite".into(),
            root: root.to_path_buf(),
            version_file: "version.txt".into(),
            version_key: "version".into(),
            manifest: "manifest.toml".into(),
            manifest_version_path: "package.version".into(),
            server_dir: "server".into(),
            client_dir: "client".into(),
            required_paths: vec!["assets/icon.png".into()],
        }
    }

    #[test]
    fn lists_every_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        // Only the manifest exists.
        fs::write(dir.path().join("manifest.toml"), "[package]\n").unwrap();
        let err = validate_layout(&project(dir.path())).unwrap_err();
        match err {
            OrchestratorError::ProjectStructureInvalid { missing } => {
                assert_eq!(missing.len(), 4);
                let rendered = format!("{missing:?}");
                assert!(rendered.contains("version.txt"));
                assert!(rendered.contains("server"));
                assert!(rendered.contains("client"));
                assert!(rendered.contains("icon.png"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn complete_layout_passes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("version.txt"), "version = \"1.0.0\"\n").unwrap();
        fs::write(dir.path().join("manifest.toml"), "[package]\n").unwrap();
        fs::create_dir_all(dir.path().join("server")).unwrap();
        fs::create_dir_all(dir.path().join("client")).unwrap();
        fs::create_dir_all(dir.path().join("assets")).unwrap();
        fs::write(dir.path().join("assets/icon.png"), b"png").unwrap();
        validate_layout(&project(dir.path())).unwrap();
    }
}
