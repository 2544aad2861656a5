//! Target platform handling.
//!
//! A package either targets a specific native platform (`x86_64-linux`,
//! `java`, ...) or is generic. Generic packages are written as the marker
//! [`GENERIC_PLATFORM`] in aggregate indices but are never stored with it:
//! inside a [`Specification`](crate::Specification) "generic" is `None`.

/// Literal used by aggregate indices for packages with no native platform.
pub const GENERIC_PLATFORM: &str = "ruby";

/// Normalize a platform read from any source.
///
/// The generic marker and the empty string both become `None`.
///
/// # Example
///
/// ```
/// use quarry_schema::platform::normalize;
///
/// assert_eq!(normalize(Some("ruby")), None);
/// assert_eq!(normalize(Some("")), None);
/// assert_eq!(normalize(Some("java")), Some("java".to_string()));
/// ```
pub fn normalize(platform: Option<&str>) -> Option<String> {
    match platform.map(str::trim) {
        None | Some("" | GENERIC_PLATFORM) => None,
        Some(p) => Some(p.to_string()),
    }
}

/// Platform as written into a 3-tuple: the marker when generic.
pub fn for_tuple(platform: Option<&str>) -> &str {
    match platform {
        None | Some("" | GENERIC_PLATFORM) => GENERIC_PLATFORM,
        Some(p) => p,
    }
}

/// Sort rank: generic entries precede platform-specific ones.
pub fn rank(platform: Option<&str>) -> i8 {
    match platform {
        None | Some("" | GENERIC_PLATFORM) => -1,
        Some(_) => 1,
    }
}
