//! Package versions.
//!
//! A version is a dot-separated run of alphanumeric segments such as `1.2.3`,
//! `2.0.a` or `1.0.0.rc1`. Digit runs compare numerically, letter runs
//! lexically, and any letter marks the version as a prerelease which sorts
//! before the release it precedes (`1.0.a < 1.0`).

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]+([.\-]?[0-9A-Za-z]+)*$").expect("version pattern compiles")
});

static SEGMENT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+|[A-Za-z]+").expect("segment pattern compiles"));

/// Errors produced while parsing a [`Version`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// The input was empty or only whitespace.
    #[error("empty version string")]
    Empty,

    /// The input contains characters or separators outside the version grammar.
    #[error("malformed version: {0:?}")]
    Malformed(String),

    /// A numeric segment does not fit in 64 bits.
    #[error("numeric segment out of range in version {0:?}")]
    Overflow(String),
}

/// One comparable piece of a version. Text sorts before numbers, which is
/// what places `1.0.a` ahead of `1.0.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Segment {
    Text(String),
    Number(u64),
}

static ZERO: Segment = Segment::Number(0);

/// An immutable, comparable package version.
///
/// Equality follows ordering, so `1.0` and `1.0.0` are equal and hash alike;
/// [`Display`](fmt::Display) still reproduces the original text.
#[derive(Debug, Clone)]
pub struct Version {
    text: String,
    segments: Vec<Segment>,
}

impl Version {
    /// Parse a version string.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError`] if the text is empty, contains characters other
    /// than ASCII alphanumerics, `.` and `-`, or has empty segments.
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let text = s.trim();
        if text.is_empty() {
            return Err(VersionError::Empty);
        }
        if !VERSION_PATTERN.is_match(text) {
            return Err(VersionError::Malformed(text.to_string()));
        }

        let segments = SEGMENT_PATTERN
            .find_iter(text)
            .map(|m| {
                let part = m.as_str();
                if part.as_bytes()[0].is_ascii_digit() {
                    part.parse::<u64>()
                        .map(Segment::Number)
                        .map_err(|_| VersionError::Overflow(text.to_string()))
                } else {
                    Ok(Segment::Text(part.to_string()))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            text: text.to_string(),
            segments,
        })
    }

    /// Whether this version precedes a numbered release (contains a letter).
    pub fn is_prerelease(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Text(_)))
    }

    /// The version exactly as it was written.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Segments with trailing numeric zeros removed; equal versions share this.
    fn canonical(&self) -> &[Segment] {
        let end = self
            .segments
            .iter()
            .rposition(|s| *s != ZERO)
            .map_or(0, |i| i + 1);
        &self.segments[..end]
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        for i in 0..len {
            let a = self.segments.get(i).unwrap_or(&ZERO);
            let b = other.segments.get(i).unwrap_or(&ZERO);
            match a.cmp(b) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical().hash(state);
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for Version {
    type Error = VersionError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl AsRef<str> for Version {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn numeric_segments_compare_by_value() {
        assert!(v("1.2.3") < v("1.2.10"));
        assert!(v("1.10") > v("1.9.9"));
        assert!(v("2") > v("1.99"));
    }

    #[test]
    fn prerelease_sorts_before_release() {
        assert!(v("1.0.a") < v("1.0"));
        assert!(v("2.0.pre") < v("2.0"));
        assert!(v("2.0.pre") > v("1.1"));
        assert!(v("1.0.0.rc1") < v("1.0.0.rc2"));
        assert!(v("1.0.alpha") < v("1.0.beta"));
    }

    #[test]
    fn prerelease_detection() {
        assert!(v("1.0.0.pre").is_prerelease());
        assert!(v("2.0.a").is_prerelease());
        assert!(v("1.0rc1").is_prerelease());
        assert!(!v("1.0.0").is_prerelease());
        assert!(!v("1.0-1").is_prerelease());
    }

    #[test]
    fn trailing_zeros_are_equal_and_hash_alike() {
        assert_eq!(v("1.0"), v("1.0.0"));
        assert_eq!(v("1.0").cmp(&v("1.0.0")), Ordering::Equal);

        let set: HashSet<Version> = [v("1.0"), v("1.0.0"), v("1")].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn display_keeps_original_text() {
        assert_eq!(v("1.0").to_string(), "1.0");
        assert_eq!(v(" 3.1.4 ").to_string(), "3.1.4");
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(Version::parse(""), Err(VersionError::Empty));
        assert!(matches!(Version::parse("1..0"), Err(VersionError::Malformed(_))));
        assert!(matches!(Version::parse("1.0."), Err(VersionError::Malformed(_))));
        assert!(matches!(Version::parse("v1.0"), Err(VersionError::Malformed(_))));
        assert!(matches!(Version::parse("1.0 beta"), Err(VersionError::Malformed(_))));
        assert!(matches!(
            Version::parse("1.99999999999999999999999"),
            Err(VersionError::Overflow(_))
        ));
    }
}
