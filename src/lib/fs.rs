//! Utilities for build artifact directories and file operations.

use std::{
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;
use zip::{write::FileOptions, CompressionMethod, ZipWriter};

use crate::lib::errors::ArtifactError;

/// Unix permission bits applied to generated ZIP entries.
const ZIP_DIR_PERMISSIONS: u32 = 0o755;

/// Ensure a job directory such as `target/xcbridge-jobs/<job_id>/` exists.
pub fn ensure_job_dir(base_dir: &Path, job_id: &Uuid) -> Result<PathBuf, ArtifactError> {
    fs::create_dir_all(base_dir).map_err(|source| ArtifactError::CreateDir {
        path: base_dir.to_path_buf(),
        source,
    })?;

    let job_dir = base_dir.join(job_id.to_string());
    fs::create_dir_all(&job_dir).map_err(|source| ArtifactError::CreateDir {
        path: job_dir.clone(),
        source,
    })?;
    Ok(job_dir)
}

/// Delete artifacts whose TTL has expired and return the removed paths.
pub fn cleanup_expired_entries(
    root: &Path,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Result<Vec<PathBuf>, ArtifactError> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut removed = Vec::new();
    for entry in fs::read_dir(root).map_err(|source| ArtifactError::ReadDir {
        path: root.to_path_buf(),
        source,
    })? {
        let entry = entry.map_err(|source| ArtifactError::ReadDir {
            path: root.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let metadata = entry.metadata().map_err(|source| ArtifactError::Io {
            path: path.clone(),
            source,
        })?;
        let modified = metadata.modified().map_err(|source| ArtifactError::Io {
            path: path.clone(),
            source,
        })?;
        let modified = DateTime::<Utc>::from(modified);
        if now - modified > ttl {
            if path.is_dir() {
                fs::remove_dir_all(&path).map_err(|source| ArtifactError::Cleanup {
                    path: path.clone(),
                    source,
                })?;
            } else {
                fs::remove_file(&path).map_err(|source| ArtifactError::Cleanup {
                    path: path.clone(),
                    source,
                })?;
            }
            removed.push(path);
        }
    }
    Ok(removed)
}

/// Return the SHA256 of any file as a hex string.
pub fn compute_sha256(path: &Path) -> Result<String, ArtifactError> {
    let mut file = File::open(path).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer).map_err(|source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Zip a directory tree, preserving empty directories as entries.
pub fn zip_directory(source: &Path, destination: &Path) -> Result<(), ArtifactError> {
    if !source.is_dir() {
        return Err(ArtifactError::InvalidSource {
            path: source.to_path_buf(),
        });
    }

    let file = File::create(destination).map_err(|source_err| ArtifactError::Io {
        path: destination.to_path_buf(),
        source: source_err,
    })?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(ZIP_DIR_PERMISSIONS);

    add_directory_to_zip(source, source, &mut zip, options)?;

    zip.finish().map_err(|source| ArtifactError::Zip {
        path: destination.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Walk and append directory entries into a ZIP archive.
fn add_directory_to_zip(
    base: &Path,
    current: &Path,
    zip: &mut ZipWriter<File>,
    options: FileOptions,
) -> Result<(), ArtifactError> {
    let entries = fs::read_dir(current).map_err(|source| ArtifactError::ReadDir {
        path: current.to_path_buf(),
        source,
    })?;

    let mut is_empty = true;
    for entry in entries {
        let entry = entry.map_err(|source| ArtifactError::ReadDir {
            path: current.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let relative = path
            .strip_prefix(base)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");

        if path.is_dir() {
            is_empty = false;
            let dir_name = format!("{relative}/");
            zip.add_directory(dir_name, options)
                .map_err(|source| ArtifactError::Zip {
                    path: path.clone(),
                    source,
                })?;
            add_directory_to_zip(base, &path, zip, options)?;
        } else {
            is_empty = false;
            zip.start_file(relative, options)
                .map_err(|source| ArtifactError::Zip {
                    path: path.clone(),
                    source,
                })?;
            let mut file = File::open(&path).map_err(|source| ArtifactError::Io {
                path: path.clone(),
                source,
            })?;
            let mut buffer = Vec::new();
            file.read_to_end(&mut buffer)
                .map_err(|source| ArtifactError::Io {
                    path: path.clone(),
                    source,
                })?;
            zip.write_all(&buffer).map_err(|source| ArtifactError::Io {
                path: path.clone(),
                source,
            })?;
        }
    }

    if is_empty {
        let relative = current
            .strip_prefix(base)
            .unwrap_or(current)
            .to_string_lossy()
            .replace('\\', "/");
        if !relative.is_empty() {
            let dir_name = format!("{relative}/");
            zip.add_directory(dir_name, options)
                .map_err(|source| ArtifactError::Zip {
                    path: current.to_path_buf(),
                    source,
                })?;
        }
    }

    Ok(())
}
