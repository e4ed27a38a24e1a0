//! Portable archive creation.
//!
//! tar.gz for Linux and macOS targets, zip for Windows. Archive writing is
//! blocking work and runs on the blocking thread pool.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use zip::write::SimpleFileOptions;

use crate::error::{OrchestratorError, Result};

/// An entry to place into an archive: source path and archive-relative name.
#[derive(Clone, Debug)]
pub struct ArchiveEntry {
    /// File or directory on disk
    pub source: PathBuf,
    /// Name inside the archive
    pub name: String,
}

/// Creates a gzipped tar archive containing the given entries.
pub async fn create_tar_gz(entries: Vec<ArchiveEntry>, dest: PathBuf) -> Result<()> {
    tokio::task::spawn_blocking(move || -> Result<()> {
        let file = File::create(&dest)?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder.follow_symlinks(false);

        for entry in &entries {
            if entry.source.is_dir() {
                builder.append_dir_all(&entry.name, &entry.source)?;
            } else {
                builder.append_path_with_name(&entry.source, &entry.name)?;
            }
        }

        let encoder = builder.into_inner()?;
        encoder.finish()?;
        Ok(())
    })
    .await
    .map_err(|e| OrchestratorError::Generic(format!("archive task panicked: {e}")))?
}

/// Creates a zip archive containing the given entries.
pub async fn create_zip(entries: Vec<ArchiveEntry>, dest: PathBuf) -> Result<()> {
    tokio::task::spawn_blocking(move || -> Result<()> {
        let file = File::create(&dest)?;
        let mut writer = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        for entry in &entries {
            if entry.source.is_dir() {
                add_dir_to_zip(&mut writer, &entry.source, &entry.name, options)?;
            } else {
                add_file_to_zip(&mut writer, &entry.source, &entry.name, options)?;
            }
        }

        writer.finish()?;
        Ok(())
    })
    .await
    .map_err(|e| OrchestratorError::Generic(format!("archive task panicked: {e}")))?
}

fn add_file_to_zip(
    writer: &mut zip::ZipWriter<File>,
    source: &Path,
    name: &str,
    options: SimpleFileOptions,
) -> Result<()> {
    writer.start_file(name, options)?;
    let mut file = File::open(source)?;
    let mut buffer = vec![0u8; 8192];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        writer.write_all(&buffer[..n])?;
    }
    Ok(())
}

fn add_dir_to_zip(
    writer: &mut zip::ZipWriter<File>,
    source: &Path,
    prefix: &str,
    options: SimpleFileOptions,
) -> Result<()> {
    for entry in walkdir::WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(|e| OrchestratorError::Generic(e.to_string()))?;
        let rel = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| OrchestratorError::Generic(e.to_string()))?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        let archived = format!("{prefix}/{}", rel.to_string_lossy().replace('\\', "/"));
        if entry.file_type().is_dir() {
            writer.add_directory(archived, options)?;
        } else if entry.file_type().is_file() {
            add_file_to_zip(writer, entry.path(), &archived, options)?;
        }
    }
    Ok(())
}
