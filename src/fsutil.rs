//! File system helpers for build output handling.
//!
//! Idempotent removal and creation, so stale-output cleanup can run before
//! every build without caring whether a previous run left anything behind.

use std::io;
use std::path::Path;

use tokio::fs;

use crate::error::Result;

/// Removes the directory and its contents if it exists.
pub async fn remove_dir_all(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()), // Idempotent
        Err(e) => Err(e.into()),
    }
}

/// Creates all of the directories of the specified path, erasing it first if
/// specified.
pub async fn create_dir_all(path: &Path, erase: bool) -> Result<()> {
    if erase {
        remove_dir_all(path).await?;
    }
    Ok(fs::create_dir_all(path).await?)
}

/// Copies a regular file, creating any parent directories of the destination
/// as necessary.
pub async fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if !from.is_file() {
        crate::bail!("{} is not a file", from.display());
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::copy(from, to).await?;
    Ok(())
}

/// Recursively copies a directory, creating destination parents as needed.
///
/// Preserves symlinks on unix; app bundles rely on them.
pub async fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    if !from.is_dir() {
        crate::bail!("{} is not a directory", from.display());
    }

    let from = from.to_path_buf();
    let to = to.to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<()> {
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent)?;
        }

        for entry in walkdir::WalkDir::new(&from) {
            let entry = entry.map_err(|e| crate::error::OrchestratorError::Generic(e.to_string()))?;
            let rel_path = entry
                .path()
                .strip_prefix(&from)
                .map_err(|e| crate::error::OrchestratorError::Generic(e.to_string()))?;
            let dest_path = to.join(rel_path);

            if entry.file_type().is_symlink() {
                #[cfg(unix)]
                {
                    let link_target = std::fs::read_link(entry.path())?;
                    std::os::unix::fs::symlink(&link_target, &dest_path)?;
                }
                #[cfg(not(unix))]
                {
                    std::fs::copy(entry.path(), &dest_path)?;
                }
            } else if entry.file_type().is_dir() {
                std::fs::create_dir_all(&dest_path)?;
            } else {
                std::fs::copy(entry.path(), &dest_path)?;
            }
        }

        Ok(())
    })
    .await
    .map_err(|e| crate::error::OrchestratorError::Generic(format!("directory copy task panicked: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn remove_missing_dir_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        remove_dir_all(&dir.path().join("never-created")).await.unwrap();
    }

    #[tokio::test]
    async fn create_with_erase_clears_stale_content() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        tokio::fs::create_dir_all(&out).await.unwrap();
        tokio::fs::write(out.join("stale"), b"old").await.unwrap();
        create_dir_all(&out, true).await.unwrap();
        assert!(out.exists());
        assert!(!out.join("stale").exists());
    }

    #[tokio::test]
    async fn copy_dir_preserves_structure() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("bundle.app");
        tokio::fs::create_dir_all(src.join("Contents/MacOS")).await.unwrap();
        tokio::fs::write(src.join("Contents/MacOS/bin"), b"exe").await.unwrap();
        let dst = dir.path().join("staging/bundle.app");
        copy_dir(&src, &dst).await.unwrap();
        assert!(dst.join("Contents/MacOS/bin").is_file());
    }

    #[tokio::test]
    async fn copy_file_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.bin");
        tokio::fs::write(&src, b"data").await.unwrap();
        let dst = dir.path().join("nested/deep/b.bin");
        copy_file(&src, &dst).await.unwrap();
        assert_eq!(tokio::fs::read(&dst).await.unwrap(), b"data");
    }
}
