//! Atomic file replacement.

use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

/// Write `data` to `path` so readers see either the old file or the new one.
///
/// The bytes go to a temporary file in the same directory which is then
/// renamed over `path`. On failure the temporary file is removed.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created or the write or
/// rename fails.
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Write `data` to `path` unless the file already holds exactly those bytes.
///
/// Returns whether the file was written.
///
/// # Errors
///
/// Same as [`write_atomic`].
pub fn write_if_changed(path: &Path, data: &[u8]) -> io::Result<bool> {
    if std::fs::read(path).is_ok_and(|existing| existing == data) {
        return Ok(false);
    }
    write_atomic(path, data)?;
    Ok(true)
}
