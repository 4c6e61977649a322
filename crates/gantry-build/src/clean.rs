//! Output directory removal.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::pipeline::BuildError;

/// Recursively delete `dir` and return every path removed.
///
/// A missing directory is not an error.
pub fn clean(dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let removed: Vec<PathBuf> = WalkDir::new(dir)
        .contents_first(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .collect();

    fs::remove_dir_all(dir).map_err(|e| BuildError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;

    Ok(removed)
}
