//! Single-package lookup against an archive directory.

use std::path::{Path, PathBuf};

use quarry_schema::{ARCHIVE_EXTENSION, DecodeError, Specification, Version, platform};
use thiserror::Error;

use crate::archive::{TarArchiveReader, read_specification};
use crate::indexer::walk_archives;

/// Errors raised by [`lookup`].
#[derive(Error, Debug)]
pub enum LookupError {
    /// No archive matches the request.
    #[error("no archive found for {name}{}{}",
        version.as_ref().map(|v| format!(" {v}")).unwrap_or_default(),
        platform.as_ref().map(|p| format!(" ({p})")).unwrap_or_default())]
    NotFound {
        /// Requested name.
        name: String,
        /// Requested version, if any.
        version: Option<String>,
        /// Requested platform, `None` for generic.
        platform: Option<String>,
    },

    /// The chosen archive does not decode.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The archive directory could not be listed.
    #[error("IO error reading {}: {source}", path.display())]
    Io {
        /// Directory being listed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Find and decode the descriptor of one package in `archive_dir`.
///
/// A trailing `.gem` on `name` is ignored. `platform` of `None` (or the
/// generic marker) selects generic archives. Without a version the newest
/// released version is chosen.
///
/// # Errors
///
/// Returns [`LookupError::NotFound`] if no archive matches,
/// [`LookupError::Decode`] if the chosen archive is unreadable, and
/// [`LookupError::Io`] if the directory cannot be listed.
pub fn lookup(
    archive_dir: &Path,
    name: &str,
    version: Option<&Version>,
    platform: Option<&str>,
) -> Result<Specification, LookupError> {
    let name = name
        .strip_suffix(&format!(".{ARCHIVE_EXTENSION}"))
        .unwrap_or(name);
    let wanted = platform::normalize(platform);

    let archives = walk_archives(archive_dir).map_err(|source| LookupError::Io {
        path: archive_dir.to_path_buf(),
        source,
    })?;

    let best = archives
        .into_iter()
        .filter_map(|path| {
            let stem = path.file_stem()?.to_str()?;
            let candidate = parse_stem(stem, name, wanted.as_deref())?;
            Some((candidate, path))
        })
        .filter(|(candidate, _)| match version {
            Some(v) => candidate == v,
            None => !candidate.is_prerelease(),
        })
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(&a.1)));

    let Some((_, path)) = best else {
        return Err(LookupError::NotFound {
            name: name.to_string(),
            version: version.map(ToString::to_string),
            platform: wanted,
        });
    };

    Ok(read_specification(&TarArchiveReader, &path)?)
}

/// Version of an archive stem `<name>-<version>[-<platform>]` whose platform
/// matches `wanted`.
///
/// Versions may contain `-` themselves, so the platform is stripped as a
/// known suffix rather than split off at a separator. For generic lookups the
/// whole remainder is the version.
fn parse_stem(stem: &str, name: &str, wanted: Option<&str>) -> Option<Version> {
    let rest = stem.strip_prefix(name)?.strip_prefix('-')?;
    let version = match wanted {
        Some(platform) => rest.strip_suffix(platform)?.strip_suffix('-')?,
        None => rest,
    };
    Version::parse(version).ok()
}
