//! Deflate-family byte transforms used by index artifacts.
//!
//! Per-package entries are zlib streams (`.rz`); aggregate indices are gzip
//! members (`.gz`). Both encoders are deterministic: the gzip header carries
//! no filename and a zero mtime, so equal input always yields equal bytes.

use std::io::{self, Read, Write};

use flate2::Compression;
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};

/// Gzip member magic bytes.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Compress with zlib.
///
/// # Errors
///
/// Returns an I/O error if the encoder fails.
pub fn deflate(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Decompress a zlib stream.
///
/// # Errors
///
/// Returns an I/O error if the input is not a valid zlib stream.
pub fn inflate(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}

/// Compress into a single gzip member.
///
/// # Errors
///
/// Returns an I/O error if the encoder fails.
pub fn gzip(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Decompress a gzip member.
///
/// # Errors
///
/// Returns an I/O error if the input is not valid gzip.
pub fn gunzip(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}

/// Decompress a gzip member, failing once the output would pass `limit`
/// bytes.
///
/// # Errors
///
/// Returns an I/O error if the input is not valid gzip, or one of kind
/// [`io::ErrorKind::InvalidData`] if it inflates past `limit`.
pub fn gunzip_limited(data: &[u8], limit: u64) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(data)
        .take(limit.saturating_add(1))
        .read_to_end(&mut out)?;
    if out.len() as u64 > limit {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("decompressed size exceeds {limit} bytes"),
        ));
    }
    Ok(out)
}

/// Whether `data` starts with the gzip magic.
pub fn is_gzip(data: &[u8]) -> bool {
    data.starts_with(&GZIP_MAGIC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gzip_output_is_deterministic() {
        let a = gzip(b"the same bytes").unwrap();
        let b = gzip(b"the same bytes").unwrap();
        assert_eq!(a, b);
        assert!(is_gzip(&a));
        assert_eq!(gunzip(&a).unwrap(), b"the same bytes");
    }

    #[test]
    fn limited_gunzip_stops_at_the_limit() {
        let bomb = gzip(&vec![0u8; 64 * 1024]).unwrap();
        assert_eq!(gunzip_limited(&bomb, 64 * 1024).unwrap().len(), 64 * 1024);

        let err = gunzip_limited(&bomb, 1024).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn zlib_is_not_gzip() {
        let z = deflate(b"payload").unwrap();
        assert!(!is_gzip(&z));
        assert_eq!(inflate(&z).unwrap(), b"payload");
        assert!(gunzip(&z).is_err());
    }
}
