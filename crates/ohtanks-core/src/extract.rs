use std::io::{Read, Seek};
use std::path::Path;

use log::{info, warn};
use thiserror::Error;

use crate::status::StatusReporter;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    Zip {
        context: &'static str,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("extraction task failed: {0}")]
    Task(String),
}

impl ExtractError {
    fn zip(context: &'static str, source: zip::result::ZipError) -> Self {
        Self::Zip { context, source }
    }

    fn io_with_path(context: &'static str, path: &Path, source: &std::io::Error) -> Self {
        Self::Io {
            context,
            source: std::io::Error::new(source.kind(), format!("{}: {source}", path.display())),
        }
    }
}

/// Unpack `archive_path` into `dest`, reporting progress after every file.
///
/// The file total comes from the archive's central directory, so the archive
/// is opened once. Directory entries only create directories, and entries
/// whose path would escape `dest` are skipped; neither is counted. On error,
/// whatever was already written stays on disk.
///
/// Returns the number of files written.
///
/// # Errors
/// Returns an error when the archive cannot be read or an entry cannot be
/// written.
pub fn extract_archive(
    archive_path: &Path,
    dest: &Path,
    status: &StatusReporter,
) -> Result<usize, ExtractError> {
    let file = std::fs::File::open(archive_path).map_err(|error| {
        ExtractError::io_with_path("failed to open zip file", archive_path, &error)
    })?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|error| ExtractError::zip("failed to read zip archive", error))?;

    let total = extractable_file_count(&mut archive)?;
    let mut extracted = 0_usize;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|error| ExtractError::zip("failed to read zip entry", error))?;
        let Some(name) = entry.enclosed_name() else {
            warn!("Skipping zip entry with unsafe path: {}", entry.name());
            continue;
        };
        let out_path = dest.join(name);

        if is_directory_name(entry.name()) {
            std::fs::create_dir_all(&out_path).map_err(|error| {
                ExtractError::io_with_path(
                    "failed to create extraction directory",
                    &out_path,
                    &error,
                )
            })?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                ExtractError::io_with_path(
                    "failed to create extraction parent directory",
                    parent,
                    &error,
                )
            })?;
        }
        let mut outfile = std::fs::File::create(&out_path).map_err(|error| {
            ExtractError::io_with_path("failed to create extracted file", &out_path, &error)
        })?;
        std::io::copy(&mut entry, &mut outfile).map_err(|error| {
            ExtractError::io_with_path("failed to extract archive entry", &out_path, &error)
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                let _ = std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode));
            }
        }

        extracted += 1;
        status.send(format!(
            "Extracting files: {}% ({extracted}/{total})",
            rounded_percent(extracted, total)
        ));
    }

    info!("Extraction completed: {extracted} files extracted to {}", dest.display());
    status.send(format!("Extraction completed: {extracted} files extracted"));
    Ok(extracted)
}

/// [`extract_archive`] on the blocking thread pool.
///
/// # Errors
/// Same as [`extract_archive`], plus a task error if the worker panics.
pub async fn extract_archive_in_background(
    archive_path: &Path,
    dest: &Path,
    status: &StatusReporter,
) -> Result<usize, ExtractError> {
    let archive_path = archive_path.to_path_buf();
    let dest = dest.to_path_buf();
    let status = status.clone();
    tokio::task::spawn_blocking(move || extract_archive(&archive_path, &dest, &status))
        .await
        .map_err(|error| ExtractError::Task(error.to_string()))?
}

fn extractable_file_count<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> Result<usize, ExtractError> {
    let mut count = 0;
    for i in 0..archive.len() {
        let entry = archive
            .by_index_raw(i)
            .map_err(|error| ExtractError::zip("failed to read zip entry", error))?;
        if !is_directory_name(entry.name()) && entry.enclosed_name().is_some() {
            count += 1;
        }
    }
    Ok(count)
}

fn is_directory_name(name: &str) -> bool {
    name.ends_with('/') || name.ends_with('\\')
}

fn rounded_percent(done: usize, total: usize) -> usize {
    if total == 0 {
        return 100;
    }
    (done * 200 + total) / (total * 2)
}
