//! Archive extraction
//!
//! Unpacks an uploaded zip container into a scoped temporary directory and
//! locates the primary geometry file among the entries. The directory is
//! removed on every exit path (the `TempDir` guard deletes it on drop, even
//! when conversion later fails).

use std::io::{Cursor, Read};
use std::path::PathBuf;
use tempfile::TempDir;
use tracing::debug;

use super::{PipelineError, Result};

/// Extension of the primary geometry file inside an archive (case-insensitive)
pub const PRIMARY_GEOMETRY_EXTENSION: &str = "shp";

/// One file extracted from an archive
#[derive(Debug, Clone)]
pub struct ExtractedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// An unpacked archive on disk
///
/// Holds the temp-dir guard: dropping this value deletes everything that
/// was extracted.
#[derive(Debug)]
pub struct ExtractedArchive {
    pub dir: TempDir,
    pub files: Vec<ExtractedFile>,
    pub primary_path: PathBuf,
}

/// Unpack `archive` and locate the primary geometry file
///
/// Entry names are flattened to their basename before writing, so archive
/// paths can never escape the scoped directory.
pub fn extract_archive(archive: &[u8]) -> Result<ExtractedArchive> {
    let cursor = Cursor::new(archive);
    let mut zip = zip::ZipArchive::new(cursor)
        .map_err(|e| PipelineError::Archive(format!("Failed to open archive: {}", e)))?;

    let dir = TempDir::new()?;
    let mut files = Vec::new();
    let mut primary_path = None;

    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| PipelineError::Archive(format!("Failed to read archive entry: {}", e)))?;

        if entry.is_dir() {
            continue;
        }

        let name = entry.name().to_string();
        let filename = name.split('/').last().unwrap_or(&name).to_string();
        if filename.is_empty() {
            continue;
        }

        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes).map_err(|e| {
            PipelineError::Archive(format!("Failed to read archive entry {}: {}", filename, e))
        })?;

        let path = dir.path().join(&filename);
        std::fs::write(&path, &bytes)?;
        debug!("Extracted {} ({} bytes)", filename, bytes.len());

        if has_primary_extension(&filename) && primary_path.is_none() {
            primary_path = Some(path);
        }

        files.push(ExtractedFile {
            name: filename,
            bytes,
        });
    }

    let primary_path = primary_path.ok_or_else(|| PipelineError::MissingPrimaryFile {
        extension: format!(".{}", PRIMARY_GEOMETRY_EXTENSION),
    })?;

    Ok(ExtractedArchive {
        dir,
        files,
        primary_path,
    })
}

fn has_primary_extension(filename: &str) -> bool {
    std::path::Path::new(filename)
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case(PRIMARY_GEOMETRY_EXTENSION))
        .unwrap_or(false)
}
