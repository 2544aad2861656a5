//! Package archive container access.
//!
//! An archive is a tar file (`<basename>.gem`) whose `metadata` entry holds
//! the self-describing descriptor, optionally gzipped as `metadata.gz`.
//! Payload entries are never inspected.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use quarry_schema::codec::{decode_self_describing, encode_self_describing};
use quarry_schema::compress::{gunzip_limited, gzip, is_gzip};
use quarry_schema::{DecodeError, EncodeError, Specification};
use thiserror::Error;

/// Raw metadata entry name.
pub const METADATA_ENTRY: &str = "metadata";

/// Gzipped metadata entry name.
pub const METADATA_GZ_ENTRY: &str = "metadata.gz";

/// Largest metadata entry read from an archive, before and after
/// decompression.
pub const MAX_METADATA_BYTES: u64 = 16 * 1024 * 1024;

/// Errors raised while writing an archive.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Creating or writing the archive file failed.
    #[error("IO error writing {}: {source}", path.display())]
    Io {
        /// Archive being written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The descriptor could not be serialized.
    #[error("failed to encode descriptor: {0}")]
    Encode(#[from] EncodeError),
}

/// Yields named raw byte entries from a package container.
pub trait ArchiveReader: Send + Sync + std::fmt::Debug {
    /// Return the first entry whose name is one of `names`, with its bytes.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Archive`] if the container cannot be read and
    /// [`DecodeError::TooLarge`] if the entry exceeds [`MAX_METADATA_BYTES`].
    fn read_entry(
        &self,
        path: &Path,
        names: &[&str],
    ) -> Result<Option<(String, Vec<u8>)>, DecodeError>;
}

/// [`ArchiveReader`] over tar containers.
#[derive(Debug, Clone, Copy, Default)]
pub struct TarArchiveReader;

impl ArchiveReader for TarArchiveReader {
    fn read_entry(
        &self,
        path: &Path,
        names: &[&str],
    ) -> Result<Option<(String, Vec<u8>)>, DecodeError> {
        let file = File::open(path).map_err(DecodeError::Archive)?;
        let mut archive = tar::Archive::new(file);

        for entry in archive.entries().map_err(DecodeError::Archive)? {
            let entry = entry.map_err(DecodeError::Archive)?;
            let entry_path = entry.path().map_err(DecodeError::Archive)?;
            let Some(entry_name) = entry_path.to_str().map(str::to_string) else {
                continue;
            };
            if !names.contains(&entry_name.as_str()) {
                continue;
            }

            // The header size is untrusted; never allocate from it unchecked.
            let declared = entry.size();
            if declared > MAX_METADATA_BYTES {
                return Err(DecodeError::TooLarge {
                    limit: MAX_METADATA_BYTES,
                });
            }
            let mut bytes = Vec::with_capacity(usize::try_from(declared).unwrap_or_default());
            entry
                .take(MAX_METADATA_BYTES)
                .read_to_end(&mut bytes)
                .map_err(DecodeError::Archive)?;
            return Ok(Some((entry_name, bytes)));
        }

        Ok(None)
    }
}

/// Read and decode the descriptor embedded in the archive at `path`.
///
/// # Errors
///
/// Returns a [`DecodeError`] attributed to `path` for an unreadable container,
/// a missing metadata entry, bad compression, or a malformed descriptor.
pub fn read_specification(
    reader: &dyn ArchiveReader,
    path: &Path,
) -> Result<Specification, DecodeError> {
    decode_metadata(reader, path).map_err(|e| e.at(path))
}

fn decode_metadata(reader: &dyn ArchiveReader, path: &Path) -> Result<Specification, DecodeError> {
    let (name, bytes) = reader
        .read_entry(path, &[METADATA_ENTRY, METADATA_GZ_ENTRY])?
        .ok_or(DecodeError::MissingMetadata)?;

    let bytes = if name == METADATA_GZ_ENTRY || is_gzip(&bytes) {
        gunzip_limited(&bytes, MAX_METADATA_BYTES).map_err(DecodeError::Compression)?
    } else {
        bytes
    };

    decode_self_describing(&bytes)
}

/// Write `spec` as a package archive into `dir`, named by its basename.
///
/// The metadata entry is gzipped when `compress` is set. `payload` entries are
/// stored after it as-is.
///
/// # Errors
///
/// Returns [`ArchiveError`] if encoding or writing fails.
pub fn write_archive(
    dir: &Path,
    spec: &Specification,
    payload: &[(&str, &[u8])],
    compress: bool,
) -> Result<PathBuf, ArchiveError> {
    let path = dir.join(spec.archive_filename());
    let io_err = |source| ArchiveError::Io {
        path: path.clone(),
        source,
    };

    let descriptor = encode_self_describing(spec)?;
    let (entry_name, metadata) = if compress {
        (METADATA_GZ_ENTRY, gzip(&descriptor).map_err(io_err)?)
    } else {
        (METADATA_ENTRY, descriptor)
    };

    let file = File::create(&path).map_err(io_err)?;
    let mut builder = tar::Builder::new(file);
    append(&mut builder, entry_name, &metadata).map_err(io_err)?;
    for (name, data) in payload {
        append(&mut builder, name, data).map_err(io_err)?;
    }
    builder.into_inner().map_err(io_err)?;

    Ok(path)
}

fn append<W: io::Write>(builder: &mut tar::Builder<W>, name: &str, data: &[u8]) -> io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_cksum();
    builder.append_data(&mut header, name, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_schema::Version;
    use tempfile::tempdir;

    fn spec(name: &str, version: &str) -> Specification {
        Specification::builder(name, Version::parse(version).unwrap())
            .unwrap()
            .summary("test package")
            .files(vec!["lib/a.rb".into()])
            .build()
    }

    #[test]
    fn reads_raw_and_gzipped_metadata() {
        let dir = tempdir().unwrap();
        let raw = write_archive(dir.path(), &spec("rake", "13.0"), &[], false).unwrap();
        let gz = write_archive(dir.path(), &spec("rack", "3.0"), &[("data.tar.gz", b"x")], true)
            .unwrap();

        let a = read_specification(&TarArchiveReader, &raw).unwrap();
        let b = read_specification(&TarArchiveReader, &gz).unwrap();
        assert_eq!(a.basename(), "rake-13.0");
        assert_eq!(b.basename(), "rack-3.0");
        assert_eq!(b.files, vec!["lib/a.rb".to_string()]);
    }

    #[test]
    fn missing_metadata_names_the_archive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty-1.0.gem");
        let mut builder = tar::Builder::new(File::create(&path).unwrap());
        append(&mut builder, "data.tar.gz", b"payload").unwrap();
        builder.into_inner().unwrap();

        let err = read_specification(&TarArchiveReader, &path).unwrap_err();
        assert_eq!(err.path(), Some(path.as_path()));
        assert!(err.to_string().contains("empty-1.0.gem"));
        assert!(matches!(err, DecodeError::At { ref source, .. } if matches!(**source, DecodeError::MissingMetadata)));
    }

    #[test]
    fn oversized_metadata_header_is_rejected_without_allocating() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("huge-1.0.gem");
        let mut header = tar::Header::new_gnu();
        header.set_path(METADATA_ENTRY).unwrap();
        header.set_size(1 << 44);
        header.set_mode(0o644);
        header.set_cksum();
        let mut bytes = header.as_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 1024]);
        std::fs::write(&path, bytes).unwrap();

        let err = read_specification(&TarArchiveReader, &path).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::At { ref source, .. } if matches!(**source, DecodeError::TooLarge { .. })
        ));
    }

    #[test]
    fn garbage_file_is_a_decode_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("junk-1.0.gem");
        std::fs::write(&path, b"definitely not a tar file, but long enough to be read").unwrap();

        let err = read_specification(&TarArchiveReader, &path).unwrap_err();
        assert_eq!(err.path(), Some(path.as_path()));
    }
}
