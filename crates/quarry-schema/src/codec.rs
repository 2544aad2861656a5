//! Descriptor wire formats.
//!
//! Two encodings of a [`Specification`] exist:
//!
//! - the **self-describing** form: a TOML document embedded in every archive
//!   and published per package. It is decoded as plain data; unknown keys are
//!   rejected.
//! - the **compact tuple** form: a postcard-encoded sequence of exactly 18
//!   fields in a fixed order. Readers depend on that order, so it is a wire
//!   contract. The platform appears twice (positions 9 and 17); both copies
//!   are written and the later one wins when reading.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::platform;
use crate::specification::{
    Dependency, Specification, SpecificationError, default_requirement, today,
};
use crate::version::Version;

/// Errors raised while decoding a descriptor or an index list.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The self-describing form is not valid UTF-8.
    #[error("descriptor is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// The self-describing form is not a valid descriptor document.
    #[error("malformed descriptor: {0}")]
    Toml(#[from] toml::de::Error),

    /// The compact form could not be deserialized.
    #[error("malformed compact encoding: {0}")]
    Postcard(postcard::Error),

    /// The input ended before every field was read.
    #[error("truncated encoding: fewer fields than expected")]
    Truncated,

    /// Bytes remain after the last expected field.
    #[error("{0} unexpected trailing bytes after last field")]
    TrailingBytes(usize),

    /// The descriptor declares a newer format than this reader understands.
    #[error("unsupported descriptor format version {found} (newest supported: {supported})")]
    UnsupportedFormat {
        /// Version found in the input.
        found: u32,
        /// Newest version this crate reads.
        supported: u32,
    },

    /// The fields decoded but do not form a valid specification.
    #[error("invalid descriptor: {0}")]
    Invalid(#[from] SpecificationError),

    /// Decompression failed.
    #[error("decompression failed: {0}")]
    Compression(#[source] std::io::Error),

    /// The archive has no metadata entry.
    #[error("no metadata entry found")]
    MissingMetadata,

    /// The metadata entry is larger than any descriptor should be.
    #[error("metadata entry exceeds {limit} bytes")]
    TooLarge {
        /// Largest accepted size.
        limit: u64,
    },

    /// The archive container could not be read.
    #[error("unreadable archive: {0}")]
    Archive(#[source] std::io::Error),

    /// A decode failure attributed to a source file.
    #[error("{}: {source}", path.display())]
    At {
        /// File the descriptor was read from.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: Box<DecodeError>,
    },
}

impl DecodeError {
    /// Attribute this error to `path`.
    pub fn at(self, path: impl AsRef<Path>) -> Self {
        match self {
            already @ Self::At { .. } => already,
            other => Self::At {
                path: path.as_ref().to_path_buf(),
                source: Box::new(other),
            },
        }
    }

    /// The source file, if this error has been attributed to one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::At { path, .. } => Some(path),
            _ => None,
        }
    }
}

impl From<postcard::Error> for DecodeError {
    fn from(err: postcard::Error) -> Self {
        match err {
            postcard::Error::DeserializeUnexpectedEnd => Self::Truncated,
            other => Self::Postcard(other),
        }
    }
}

/// Errors raised while encoding a descriptor or an index list.
#[derive(Error, Debug)]
pub enum EncodeError {
    /// TOML serialization failed.
    #[error("descriptor serialization failed: {0}")]
    Toml(#[from] toml::ser::Error),

    /// Postcard serialization failed.
    #[error("compact serialization failed: {0}")]
    Postcard(#[from] postcard::Error),
}

/// Deserialize a postcard value that must span `bytes` exactly.
pub(crate) fn take_exact<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DecodeError> {
    let (value, rest) = postcard::take_from_bytes::<T>(bytes)?;
    if !rest.is_empty() {
        return Err(DecodeError::TrailingBytes(rest.len()));
    }
    Ok(value)
}

fn check_format(found: u32) -> Result<(), DecodeError> {
    if found > crate::SPECIFICATION_VERSION {
        return Err(DecodeError::UnsupportedFormat {
            found,
            supported: crate::SPECIFICATION_VERSION,
        });
    }
    Ok(())
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn default_tool_version() -> String {
    crate::TOOL_VERSION.to_string()
}

/// The self-describing document. Field order here is the order keys are written.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Descriptor {
    name: String,
    version: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    platform: Option<String>,
    #[serde(default = "default_tool_version")]
    tool_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    specification_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    licenses: Vec<String>,
    #[serde(default = "default_requirement")]
    required_runtime_version: String,
    #[serde(default = "default_requirement")]
    required_tool_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    project_id: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    has_extra_docs: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    files: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    test_files: Vec<String>,
    // Arrays of tables go last.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    dependencies: Vec<Dependency>,
}

/// Decode the self-describing form.
///
/// The input is treated as untrusted data: it is parsed, never evaluated.
///
/// # Errors
///
/// Returns [`DecodeError`] for non-UTF-8 input, malformed or unknown keys,
/// an unsupported format version, or an invalid identity.
pub fn decode_self_describing(bytes: &[u8]) -> Result<Specification, DecodeError> {
    let text = std::str::from_utf8(bytes)?;
    let doc: Descriptor = toml::from_str(text)?;
    if let Some(found) = doc.specification_version {
        check_format(found)?;
    }

    let mut spec = Specification::new(doc.name, doc.version, doc.platform.as_deref())?;
    spec.tool_version = doc.tool_version;
    spec.date = doc.date.unwrap_or_else(today);
    spec.summary = doc.summary;
    spec.description = doc.description;
    spec.homepage = doc.homepage;
    spec.email = doc.email;
    spec.authors = doc.authors;
    spec.licenses = doc.licenses;
    spec.dependencies = doc.dependencies;
    spec.required_runtime_version = doc.required_runtime_version;
    spec.required_tool_version = doc.required_tool_version;
    spec.project_id = doc.project_id;
    spec.has_extra_docs = doc.has_extra_docs;
    spec.files = doc.files;
    spec.test_files = doc.test_files;
    Ok(spec)
}

/// Encode the self-describing form.
///
/// # Errors
///
/// Returns [`EncodeError`] if TOML serialization fails.
pub fn encode_self_describing(spec: &Specification) -> Result<Vec<u8>, EncodeError> {
    let doc = Descriptor {
        name: spec.name().to_string(),
        version: spec.version().clone(),
        platform: spec.platform().map(str::to_string),
        tool_version: spec.tool_version.clone(),
        specification_version: Some(spec.specification_version()),
        date: Some(spec.date),
        summary: spec.summary.clone(),
        description: spec.description.clone(),
        homepage: spec.homepage.clone(),
        email: spec.email.clone(),
        authors: spec.authors.clone(),
        licenses: spec.licenses.clone(),
        required_runtime_version: spec.required_runtime_version.clone(),
        required_tool_version: spec.required_tool_version.clone(),
        project_id: spec.project_id.clone(),
        has_extra_docs: spec.has_extra_docs,
        files: spec.files.clone(),
        test_files: spec.test_files.clone(),
        dependencies: spec.dependencies.clone(),
    };
    Ok(toml::to_string(&doc)?.into_bytes())
}

/// The compact tuple, field for field. Do not reorder.
#[derive(Debug, Serialize, Deserialize)]
struct CompactTuple(
    String,            // 1  tool version
    u32,               // 2  format version
    String,            // 3  name
    Version,           // 4  version
    DateTime<Utc>,     // 5  date
    Option<String>,    // 6  summary
    String,            // 7  required runtime version
    String,            // 8  required tool version
    Option<String>,    // 9  platform
    Vec<Dependency>,   // 10 dependencies
    Option<String>,    // 11 project id
    Option<String>,    // 12 email
    Vec<String>,       // 13 authors
    Option<String>,    // 14 description
    Option<String>,    // 15 homepage
    bool,              // 16 has extra docs
    Option<String>,    // 17 platform (repeated)
    Vec<String>,       // 18 licenses
);

/// Encode the 18-field compact tuple.
///
/// File manifests are not part of this form.
///
/// # Errors
///
/// Returns [`EncodeError`] if serialization fails.
pub fn encode_compact_tuple(spec: &Specification) -> Result<Vec<u8>, EncodeError> {
    Ok(postcard::to_allocvec(&CompactTuple::from(spec))?)
}

impl From<&Specification> for CompactTuple {
    fn from(spec: &Specification) -> Self {
        let platform = spec.platform().map(str::to_string);
        CompactTuple(
            spec.tool_version.clone(),
            spec.specification_version(),
            spec.name().to_string(),
            spec.version().clone(),
            spec.date,
            spec.summary.clone(),
            spec.required_runtime_version.clone(),
            spec.required_tool_version.clone(),
            platform.clone(),
            spec.dependencies.clone(),
            spec.project_id.clone(),
            spec.email.clone(),
            spec.authors.clone(),
            spec.description.clone(),
            spec.homepage.clone(),
            spec.has_extra_docs,
            platform,
            spec.licenses.clone(),
        )
    }
}

/// Decode the 18-field compact tuple.
///
/// # Errors
///
/// Returns [`DecodeError`] if the input holds fewer or more than 18 fields,
/// a field is malformed, or the identity is invalid.
pub fn decode_compact_tuple(bytes: &[u8]) -> Result<Specification, DecodeError> {
    take_exact::<CompactTuple>(bytes)?.into_specification()
}

impl CompactTuple {
    fn into_specification(self) -> Result<Specification, DecodeError> {
        let CompactTuple(
            tool_version,
            format_version,
            name,
            version,
            date,
            summary,
            required_runtime_version,
            required_tool_version,
            first_platform,
            dependencies,
            project_id,
            email,
            authors,
            description,
            homepage,
            has_extra_docs,
            platform,
            licenses,
        ) = self;
        check_format(format_version)?;

        let platform = platform::normalize(platform.as_deref())
            .or_else(|| platform::normalize(first_platform.as_deref()));
        let mut spec = Specification::new(name, version, platform.as_deref())?;
        spec.tool_version = tool_version;
        spec.date = date;
        spec.summary = summary;
        spec.required_runtime_version = required_runtime_version;
        spec.required_tool_version = required_tool_version;
        spec.dependencies = dependencies;
        spec.project_id = project_id;
        spec.email = email;
        spec.authors = authors;
        spec.description = description;
        spec.homepage = homepage;
        spec.has_extra_docs = has_extra_docs;
        spec.licenses = licenses;
        Ok(spec)
    }
}

/// Encode the combined catalog: every specification as a
/// `(basename, compact tuple)` pair, in the given order.
///
/// # Errors
///
/// Returns [`EncodeError`] if serialization fails.
pub fn encode_catalog<'a>(
    specs: impl IntoIterator<Item = &'a Specification>,
) -> Result<Vec<u8>, EncodeError> {
    let entries: Vec<(String, CompactTuple)> = specs
        .into_iter()
        .map(|spec| (spec.basename().to_string(), CompactTuple::from(spec)))
        .collect();
    Ok(postcard::to_allocvec(&entries)?)
}

/// Decode the combined catalog.
///
/// # Errors
///
/// Returns [`DecodeError`] on malformed input, or if a basename does not
/// match the identity of its tuple.
pub fn decode_catalog(bytes: &[u8]) -> Result<Vec<Specification>, DecodeError> {
    let entries: Vec<(String, CompactTuple)> = take_exact(bytes)?;
    entries
        .into_iter()
        .map(|(basename, tuple)| {
            let spec = tuple.into_specification()?;
            if spec.basename() != basename {
                return Err(DecodeError::Invalid(SpecificationError::InvalidName(
                    basename,
                )));
            }
            Ok(spec)
        })
        .collect()
}
