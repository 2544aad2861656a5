//! Archive and index directory traversal utilities.

use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::paths::is_archive;

/// List the package archives directly inside `archive_dir`, sorted by filename.
///
/// Subdirectories, in-progress downloads and other files are ignored.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn walk_archives(archive_dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut archives = Vec::new();
    for entry in WalkDir::new(archive_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(io::Error::from)?;
        if entry.file_type().is_file() && is_archive(entry.path()) {
            archives.push(entry.into_path());
        }
    }
    Ok(archives)
}

/// Files directly inside `dir` whose name ends with `suffix`, keyed by the
/// name with the suffix removed. A missing directory yields nothing.
pub fn walk_suffixed(dir: &Path, suffix: &str) -> Vec<(String, PathBuf)> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let stem = e.file_name().to_str()?.strip_suffix(suffix)?.to_string();
            Some((stem, e.into_path()))
        })
        .collect()
}
