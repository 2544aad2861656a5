//! Aggregate index entries.
//!
//! Aggregate indices (`full`, `latest`, `prerelease`) are lists of
//! `(name, version, platform)` triples, with generic packages written using
//! the [`GENERIC_PLATFORM`](crate::GENERIC_PLATFORM) marker.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::{DecodeError, EncodeError};
use crate::platform;
use crate::specification::{self, SpecificationError};
use crate::version::Version;

/// One `(name, version, platform)` aggregate index entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpecTuple {
    /// Package name.
    pub name: String,
    /// Package version.
    pub version: Version,
    /// Platform, or the generic marker.
    pub platform: String,
}

impl SpecTuple {
    /// Build a tuple; a missing or empty platform becomes the generic marker.
    pub fn new(name: impl Into<String>, version: Version, platform: Option<&str>) -> Self {
        Self {
            name: name.into(),
            version,
            platform: platform::for_tuple(platform).to_string(),
        }
    }

    /// Canonical basename of the archive this tuple names.
    pub fn basename(&self) -> String {
        specification::basename(&self.name, &self.version, Some(&self.platform))
    }

    /// Archive filename this tuple names.
    pub fn archive_filename(&self) -> String {
        format!("{}.{}", self.basename(), crate::ARCHIVE_EXTENSION)
    }

    /// Check that the name and platform can be used as filename components.
    ///
    /// # Errors
    ///
    /// Returns [`SpecificationError`] under the same rules as
    /// [`Specification::new`](crate::Specification::new).
    pub fn validate(&self) -> Result<(), SpecificationError> {
        specification::validate_name(&self.name)?;
        specification::validate_platform(Some(&self.platform))
    }
}

impl Ord for SpecTuple {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.version.cmp(&other.version))
            .then_with(|| {
                platform::rank(Some(&self.platform)).cmp(&platform::rank(Some(&other.platform)))
            })
            .then_with(|| self.platform.cmp(&other.platform))
    }
}

impl PartialOrd for SpecTuple {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SpecTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.name, self.version, self.platform)
    }
}

/// Serialize an aggregate list.
///
/// # Errors
///
/// Returns [`EncodeError`] if serialization fails.
pub fn encode_list(tuples: &[SpecTuple]) -> Result<Vec<u8>, EncodeError> {
    Ok(postcard::to_allocvec(tuples)?)
}

/// Deserialize an aggregate list, rejecting trailing garbage and entries
/// whose name or platform could not name a file.
///
/// # Errors
///
/// Returns [`DecodeError`] on truncated, trailing or invalid input.
pub fn decode_list(bytes: &[u8]) -> Result<Vec<SpecTuple>, DecodeError> {
    let mut tuples: Vec<SpecTuple> = crate::codec::take_exact(bytes)?;
    for tuple in &mut tuples {
        tuple.validate()?;
        tuple.platform = platform::for_tuple(Some(&tuple.platform)).to_string();
    }
    Ok(tuples)
}
