//! Recursive file lookup by name suffix

use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

use crate::error::{CdmError, Result};

/// Every regular file under `root` whose file name ends with `suffix`
///
/// An empty or absent root gives an empty list. Results are sorted so the
/// single-match rule used by the target builders is deterministic.
pub fn find_files_with_suffix(root: &Path, suffix: &str) -> Vec<PathBuf> {
    if !root.exists() {
        return Vec::new();
    }

    let mut matching = Vec::new();
    // Links below the root are not descended into; linked files still count
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Failed to read entry under {}: {}", root.display(), e);
                continue;
            }
        };
        let is_file =
            entry.file_type().is_file() || (entry.path_is_symlink() && entry.path().is_file());
        if !is_file {
            continue;
        }
        if entry.file_name().to_string_lossy().ends_with(suffix) {
            matching.push(entry.into_path());
        }
    }

    matching.sort();
    matching
}

/// Immediate subdirectories of `dir`, optionally restricted to names starting with `prefix`
pub fn list_subdirs(dir: &Path, prefix: Option<&str>) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => CdmError::MissingInput(dir.to_path_buf()),
        _ => CdmError::Io(e),
    })?;

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let keep = match prefix {
            Some(p) => entry.file_name().to_string_lossy().starts_with(p),
            None => true,
        };
        if keep {
            dirs.push(path);
        }
    }

    dirs.sort();
    Ok(dirs)
}
