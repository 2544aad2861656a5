//! The package descriptor entity.
//!
//! A [`Specification`] describes one published package at one version for
//! one platform. Its identity (`name`, `version`, `platform`) is private and
//! only changes through setters, because the derived [`basename`] is memoized
//! and must be dropped on every identity change.
//!
//! [`basename`]: Specification::basename

use std::sync::OnceLock;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::platform;
use crate::tuple::SpecTuple;
use crate::version::{Version, VersionError};

/// Requirement used when a dependency or runtime constraint is not given.
pub const DEFAULT_REQUIREMENT: &str = ">= 0";

/// Errors raised while constructing or mutating a [`Specification`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecificationError {
    /// The package name is empty.
    #[error("package name must not be empty")]
    EmptyName,

    /// The package name contains characters that cannot appear in a filename.
    #[error("invalid package name: {0:?}")]
    InvalidName(String),

    /// The platform contains characters that cannot appear in a filename.
    #[error("invalid platform: {0:?}")]
    InvalidPlatform(String),

    /// The version could not be parsed.
    #[error(transparent)]
    Version(#[from] VersionError),
}

/// Whether a dependency is needed at runtime or only for development.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    /// Required by installed code (default).
    #[default]
    Runtime,
    /// Required only to develop or test the package.
    Development,
}

/// A dependency on another package.
///
/// The requirement is kept as written; quarry does not resolve it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Dependency {
    /// Name of the required package.
    pub name: String,
    /// Version requirement, e.g. `~> 1.2` or `>= 0`.
    #[serde(default = "default_requirement")]
    pub requirement: String,
    /// Runtime or development dependency.
    #[serde(default)]
    pub kind: DependencyKind,
}

impl Dependency {
    /// Create a dependency of the given kind.
    pub fn new(name: impl Into<String>, requirement: impl Into<String>, kind: DependencyKind) -> Self {
        Self {
            name: name.into(),
            requirement: requirement.into(),
            kind,
        }
    }
}

pub(crate) fn default_requirement() -> String {
    DEFAULT_REQUIREMENT.to_string()
}

pub(crate) fn today() -> DateTime<Utc> {
    Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Canonical `name-version[-platform]` string for archive and index names.
///
/// The platform suffix is omitted for generic packages.
pub fn basename(name: &str, version: &Version, platform: Option<&str>) -> String {
    match platform::normalize(platform) {
        Some(p) => format!("{name}-{version}-{p}"),
        None => format!("{name}-{version}"),
    }
}

/// Memoized basename. Never participates in equality.
#[derive(Debug, Clone, Default)]
struct BasenameCache(OnceLock<String>);

impl PartialEq for BasenameCache {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

impl Eq for BasenameCache {}

/// One published package at one version for one target platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Specification {
    name: String,
    version: Version,
    platform: Option<String>,
    basename: BasenameCache,

    /// Version of the tool that produced this descriptor.
    pub tool_version: String,
    /// Publication date (midnight UTC).
    pub date: DateTime<Utc>,
    /// One-line summary.
    pub summary: Option<String>,
    /// Longer description.
    pub description: Option<String>,
    /// Project homepage URL.
    pub homepage: Option<String>,
    /// Contact address of the maintainers.
    pub email: Option<String>,
    /// Authors, in publication order.
    pub authors: Vec<String>,
    /// License identifiers, in publication order.
    pub licenses: Vec<String>,
    /// Declared dependencies, in publication order.
    pub dependencies: Vec<Dependency>,
    /// Runtime version requirement.
    pub required_runtime_version: String,
    /// Packaging-tool version requirement.
    pub required_tool_version: String,
    /// Legacy hosting project identifier.
    pub project_id: Option<String>,
    /// Whether the package ships extra documentation.
    pub has_extra_docs: bool,
    /// Every file in the package payload.
    pub files: Vec<String>,
    /// Test files in the package payload.
    pub test_files: Vec<String>,
}

/// Whether `part` can be embedded in a single filename component.
fn is_path_safe(part: &str) -> bool {
    !part.contains(['/', '\\', '\0'])
        && !part.contains("..")
        && !part.chars().any(char::is_whitespace)
}

/// Check a package name before it is used to derive archive or index paths.
///
/// # Errors
///
/// Returns [`SpecificationError::EmptyName`] for an empty name and
/// [`SpecificationError::InvalidName`] for one holding a path separator, NUL,
/// whitespace or `..`.
pub fn validate_name(name: &str) -> Result<(), SpecificationError> {
    if name.trim().is_empty() {
        return Err(SpecificationError::EmptyName);
    }
    if !is_path_safe(name) {
        return Err(SpecificationError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Check a platform under the same filename rules as names. Generic
/// platforms (`None`, empty, or the marker) always pass.
///
/// # Errors
///
/// Returns [`SpecificationError::InvalidPlatform`] for a platform that could
/// not be embedded in a filename.
pub fn validate_platform(platform: Option<&str>) -> Result<(), SpecificationError> {
    match platform::normalize(platform) {
        Some(p) if !is_path_safe(&p) => Err(SpecificationError::InvalidPlatform(p)),
        _ => Ok(()),
    }
}

impl Specification {
    /// Create a specification with only its identity populated.
    ///
    /// `platform` is normalized, so the generic marker is stored as `None`.
    ///
    /// # Errors
    ///
    /// Returns [`SpecificationError`] if the name or platform is empty or
    /// unusable as a filename component.
    pub fn new(
        name: impl Into<String>,
        version: Version,
        platform: Option<&str>,
    ) -> Result<Self, SpecificationError> {
        let name = name.into();
        validate_name(&name)?;
        validate_platform(platform)?;
        Ok(Self {
            name,
            version,
            platform: platform::normalize(platform),
            basename: BasenameCache::default(),
            tool_version: crate::TOOL_VERSION.to_string(),
            date: today(),
            summary: None,
            description: None,
            homepage: None,
            email: None,
            authors: Vec::new(),
            licenses: Vec::new(),
            dependencies: Vec::new(),
            required_runtime_version: default_requirement(),
            required_tool_version: default_requirement(),
            project_id: None,
            has_extra_docs: false,
            files: Vec::new(),
            test_files: Vec::new(),
        })
    }

    /// Start a builder for a specification with the given identity.
    ///
    /// # Errors
    ///
    /// Returns [`SpecificationError`] if the name is invalid.
    pub fn builder(
        name: impl Into<String>,
        version: Version,
    ) -> Result<SpecificationBuilder, SpecificationError> {
        Ok(SpecificationBuilder {
            spec: Self::new(name, version, None)?,
        })
    }

    /// Construct from an identity plus an explicit options structure.
    ///
    /// # Errors
    ///
    /// Returns [`SpecificationError`] if the name or platform is invalid.
    pub fn from_options(
        name: impl Into<String>,
        version: Version,
        platform: Option<&str>,
        options: SpecificationOptions,
    ) -> Result<Self, SpecificationError> {
        let builder = Self::builder(name, version)?.platform(platform)?;
        Ok(builder.options(options).build())
    }

    /// Construct an identity-only specification from an aggregate 3-tuple.
    ///
    /// # Errors
    ///
    /// Returns [`SpecificationError`] if the tuple's name or platform is
    /// invalid.
    pub fn from_tuple(tuple: &SpecTuple) -> Result<Self, SpecificationError> {
        Self::new(tuple.name.clone(), tuple.version.clone(), Some(&tuple.platform))
    }

    /// Package name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Package version.
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Native platform, or `None` for generic packages.
    pub fn platform(&self) -> Option<&str> {
        self.platform.as_deref()
    }

    /// Rename the package.
    ///
    /// # Errors
    ///
    /// Returns [`SpecificationError`] if the new name is invalid; the
    /// specification is left unchanged in that case.
    pub fn set_name(&mut self, name: impl Into<String>) -> Result<(), SpecificationError> {
        let name = name.into();
        validate_name(&name)?;
        self.basename = BasenameCache::default();
        self.name = name;
        Ok(())
    }

    /// Replace the version.
    pub fn set_version(&mut self, version: Version) {
        self.basename = BasenameCache::default();
        self.version = version;
    }

    /// Replace the platform. The generic marker is stored as `None`.
    ///
    /// # Errors
    ///
    /// Returns [`SpecificationError::InvalidPlatform`] if the platform is
    /// unusable as a filename component; the specification is left unchanged.
    pub fn set_platform(&mut self, platform: Option<&str>) -> Result<(), SpecificationError> {
        validate_platform(platform)?;
        self.basename = BasenameCache::default();
        self.platform = platform::normalize(platform);
        Ok(())
    }

    /// Canonical `name-version[-platform]` string, memoized.
    pub fn basename(&self) -> &str {
        self.basename
            .0
            .get_or_init(|| basename(&self.name, &self.version, self.platform.as_deref()))
    }

    /// Archive filename: basename plus the archive extension.
    pub fn archive_filename(&self) -> String {
        format!("{}.{}", self.basename(), crate::ARCHIVE_EXTENSION)
    }

    /// Whether the version is a prerelease.
    pub fn is_prerelease(&self) -> bool {
        self.version.is_prerelease()
    }

    /// The aggregate-index entry for this specification.
    pub fn to_tuple(&self) -> SpecTuple {
        SpecTuple::new(
            self.name.clone(),
            self.version.clone(),
            self.platform.as_deref(),
        )
    }

    /// Identity ordering: name, version, then generic before specific platforms.
    pub fn cmp_identity(&self, other: &Self) -> std::cmp::Ordering {
        self.to_tuple().cmp(&other.to_tuple())
    }

    /// Descriptor format version this crate writes.
    pub fn specification_version(&self) -> u32 {
        crate::SPECIFICATION_VERSION
    }

    /// First author, if any.
    pub fn author(&self) -> Option<&str> {
        self.authors.first().map(String::as_str)
    }

    /// First license, if any.
    pub fn license(&self) -> Option<&str> {
        self.licenses.first().map(String::as_str)
    }

    /// Declare a runtime dependency.
    pub fn add_runtime_dependency(&mut self, name: impl Into<String>, requirement: impl Into<String>) {
        self.dependencies
            .push(Dependency::new(name, requirement, DependencyKind::Runtime));
    }

    /// Declare a development dependency.
    pub fn add_development_dependency(
        &mut self,
        name: impl Into<String>,
        requirement: impl Into<String>,
    ) {
        self.dependencies
            .push(Dependency::new(name, requirement, DependencyKind::Development));
    }

    /// Runtime dependencies only.
    pub fn runtime_dependencies(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies
            .iter()
            .filter(|d| d.kind == DependencyKind::Runtime)
    }

    /// Drop the file manifests in place.
    pub fn strip_for_cache(&mut self) {
        self.files = Vec::new();
        self.test_files = Vec::new();
    }

    /// A copy without file manifests, as kept in indices. `self` is untouched.
    pub fn for_cache(&self) -> Self {
        let mut spec = self.clone();
        spec.strip_for_cache();
        spec
    }
}

/// Named optional descriptive fields for [`Specification::from_options`].
///
/// When read from a document, unknown keys are rejected rather than ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpecificationOptions {
    /// See [`Specification::tool_version`].
    pub tool_version: Option<String>,
    /// See [`Specification::date`].
    pub date: Option<DateTime<Utc>>,
    /// See [`Specification::summary`].
    pub summary: Option<String>,
    /// See [`Specification::description`].
    pub description: Option<String>,
    /// See [`Specification::homepage`].
    pub homepage: Option<String>,
    /// See [`Specification::email`].
    pub email: Option<String>,
    /// See [`Specification::authors`].
    pub authors: Option<Vec<String>>,
    /// See [`Specification::licenses`].
    pub licenses: Option<Vec<String>>,
    /// See [`Specification::dependencies`].
    pub dependencies: Option<Vec<Dependency>>,
    /// See [`Specification::required_runtime_version`].
    pub required_runtime_version: Option<String>,
    /// See [`Specification::required_tool_version`].
    pub required_tool_version: Option<String>,
    /// See [`Specification::project_id`].
    pub project_id: Option<String>,
    /// See [`Specification::has_extra_docs`].
    pub has_extra_docs: Option<bool>,
    /// See [`Specification::files`].
    pub files: Option<Vec<String>>,
    /// See [`Specification::test_files`].
    pub test_files: Option<Vec<String>>,
}

impl SpecificationOptions {
    /// Parse options from a TOML table.
    ///
    /// # Errors
    ///
    /// Returns the TOML error, including for any unknown key.
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}

/// Fluent construction of a [`Specification`].
#[derive(Debug, Clone)]
pub struct SpecificationBuilder {
    spec: Specification,
}

impl SpecificationBuilder {
    /// Set the native platform.
    ///
    /// # Errors
    ///
    /// Returns [`SpecificationError::InvalidPlatform`] if the platform is
    /// unusable as a filename component.
    pub fn platform(mut self, platform: Option<&str>) -> Result<Self, SpecificationError> {
        self.spec.set_platform(platform)?;
        Ok(self)
    }

    /// Set the summary.
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.spec.summary = Some(summary.into());
        self
    }

    /// Set the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.spec.description = Some(description.into());
        self
    }

    /// Set the homepage.
    pub fn homepage(mut self, homepage: impl Into<String>) -> Self {
        self.spec.homepage = Some(homepage.into());
        self
    }

    /// Set the contact email.
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.spec.email = Some(email.into());
        self
    }

    /// Append an author.
    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.spec.authors.push(author.into());
        self
    }

    /// Append a license.
    pub fn license(mut self, license: impl Into<String>) -> Self {
        self.spec.licenses.push(license.into());
        self
    }

    /// Set the publication date.
    pub fn date(mut self, date: DateTime<Utc>) -> Self {
        self.spec.date = date;
        self
    }

    /// Append a dependency.
    pub fn dependency(mut self, dependency: Dependency) -> Self {
        self.spec.dependencies.push(dependency);
        self
    }

    /// Set the runtime version requirement.
    pub fn required_runtime_version(mut self, requirement: impl Into<String>) -> Self {
        self.spec.required_runtime_version = requirement.into();
        self
    }

    /// Set the packaging-tool version requirement.
    pub fn required_tool_version(mut self, requirement: impl Into<String>) -> Self {
        self.spec.required_tool_version = requirement.into();
        self
    }

    /// Set the file manifest.
    pub fn files(mut self, files: Vec<String>) -> Self {
        self.spec.files = files;
        self
    }

    /// Set the test-file manifest.
    pub fn test_files(mut self, files: Vec<String>) -> Self {
        self.spec.test_files = files;
        self
    }

    /// Apply every field present in `options`, leaving the rest untouched.
    pub fn options(mut self, options: SpecificationOptions) -> Self {
        let spec = &mut self.spec;
        let SpecificationOptions {
            tool_version,
            date,
            summary,
            description,
            homepage,
            email,
            authors,
            licenses,
            dependencies,
            required_runtime_version,
            required_tool_version,
            project_id,
            has_extra_docs,
            files,
            test_files,
        } = options;

        if let Some(v) = tool_version {
            spec.tool_version = v;
        }
        if let Some(v) = date {
            spec.date = v;
        }
        if summary.is_some() {
            spec.summary = summary;
        }
        if description.is_some() {
            spec.description = description;
        }
        if homepage.is_some() {
            spec.homepage = homepage;
        }
        if email.is_some() {
            spec.email = email;
        }
        if let Some(v) = authors {
            spec.authors = v;
        }
        if let Some(v) = licenses {
            spec.licenses = v;
        }
        if let Some(v) = dependencies {
            spec.dependencies = v;
        }
        if let Some(v) = required_runtime_version {
            spec.required_runtime_version = v;
        }
        if let Some(v) = required_tool_version {
            spec.required_tool_version = v;
        }
        if project_id.is_some() {
            spec.project_id = project_id;
        }
        if let Some(v) = has_extra_docs {
            spec.has_extra_docs = v;
        }
        if let Some(v) = files {
            spec.files = v;
        }
        if let Some(v) = test_files {
            spec.test_files = v;
        }
        self
    }

    /// Finish building.
    pub fn build(self) -> Specification {
        self.spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn basename_includes_platform_only_when_specific() {
        let generic = Specification::new("json", v("1.2.3"), None).unwrap();
        assert_eq!(generic.basename(), "json-1.2.3");

        let marked = Specification::new("json", v("1.2.3"), Some("ruby")).unwrap();
        assert_eq!(marked.basename(), "json-1.2.3");
        assert_eq!(marked.platform(), None);

        let native = Specification::new("json", v("1.2.3"), Some("java")).unwrap();
        assert_eq!(native.basename(), "json-1.2.3-java");
        assert_eq!(native.archive_filename(), "json-1.2.3-java.gem");
    }

    #[test]
    fn mutating_identity_invalidates_basename() {
        let mut spec = Specification::new("json", v("1.2.3"), None).unwrap();
        assert_eq!(spec.basename(), "json-1.2.3");

        spec.set_version(v("1.2.4"));
        assert_eq!(spec.basename(), "json-1.2.4");

        spec.set_platform(Some("x86_64-linux")).unwrap();
        assert_eq!(spec.basename(), "json-1.2.4-x86_64-linux");

        spec.set_name("json_pure").unwrap();
        assert_eq!(spec.basename(), "json_pure-1.2.4-x86_64-linux");

        spec.set_platform(Some("ruby")).unwrap();
        assert_eq!(spec.basename(), "json_pure-1.2.4");
    }

    #[test]
    fn memoized_basename_does_not_affect_equality() {
        let a = Specification::new("rake", v("13.0"), None).unwrap();
        let b = a.clone();
        let _ = a.basename();
        assert_eq!(a, b);
    }

    #[test]
    fn generic_sorts_before_native() {
        let generic = Specification::new("json", v("1.2.3"), None).unwrap();
        let native = Specification::new("json", v("1.2.3"), Some("native")).unwrap();
        assert_eq!(generic.cmp_identity(&native), std::cmp::Ordering::Less);
    }

    #[test]
    fn rejects_empty_or_path_like_names() {
        assert_eq!(
            Specification::new("", v("1.0"), None),
            Err(SpecificationError::EmptyName)
        );
        assert!(matches!(
            Specification::new("../evil", v("1.0"), None),
            Err(SpecificationError::InvalidName(_))
        ));

        assert!(matches!(
            Specification::new("..", v("1.0"), None),
            Err(SpecificationError::InvalidName(_))
        ));

        let mut spec = Specification::new("ok", v("1.0"), None).unwrap();
        assert!(spec.set_name("").is_err());
        assert_eq!(spec.name(), "ok");
    }

    #[test]
    fn rejects_path_like_platforms() {
        for platform in ["../../../outside", "x86_64/linux", "a\\b", "java linux", ".."] {
            assert!(
                matches!(
                    Specification::new("evil", v("1.0"), Some(platform)),
                    Err(SpecificationError::InvalidPlatform(_))
                ),
                "{platform:?} accepted"
            );
        }
        assert!(Specification::new("nokogiri", v("1.15.0"), Some("x86_64-linux")).is_ok());
        assert!(Specification::new("json", v("1.0"), Some("universal-darwin-22")).is_ok());

        let mut spec = Specification::new("ok", v("1.0"), Some("java")).unwrap();
        assert!(spec.set_platform(Some("../x")).is_err());
        assert_eq!(spec.basename(), "ok-1.0-java");
    }

    #[test]
    fn for_cache_strips_manifests_without_touching_original() {
        let spec = Specification::builder("rack", v("2.2.8"))
            .unwrap()
            .files(vec!["lib/rack.rb".into()])
            .test_files(vec!["test/spec_rack.rb".into()])
            .build();

        let cached = spec.for_cache();
        assert!(cached.files.is_empty());
        assert!(cached.test_files.is_empty());
        assert_eq!(spec.files, vec!["lib/rack.rb".to_string()]);
        assert_eq!(cached.basename(), spec.basename());
    }

    #[test]
    fn options_reject_unknown_keys() {
        let ok = SpecificationOptions::from_toml("summary = \"fast json\"\nauthors = [\"a\"]").unwrap();
        assert_eq!(ok.summary.as_deref(), Some("fast json"));

        assert!(SpecificationOptions::from_toml("summry = \"typo\"").is_err());
    }

    #[test]
    fn from_options_applies_only_present_fields() {
        let options = SpecificationOptions {
            summary: Some("HTTP toolkit".into()),
            licenses: Some(vec!["MIT".into()]),
            ..SpecificationOptions::default()
        };
        let spec = Specification::from_options("rack", v("3.0"), Some("java"), options).unwrap();

        assert_eq!(spec.summary.as_deref(), Some("HTTP toolkit"));
        assert_eq!(spec.license(), Some("MIT"));
        assert_eq!(spec.required_runtime_version, DEFAULT_REQUIREMENT);
        assert_eq!(spec.basename(), "rack-3.0-java");
    }

    #[test]
    fn dependency_helpers() {
        let mut spec = Specification::new("rails", v("7.1.0"), None).unwrap();
        spec.add_runtime_dependency("rack", "~> 3.0");
        spec.add_development_dependency("minitest", ">= 5");

        let runtime: Vec<_> = spec.runtime_dependencies().map(|d| d.name.as_str()).collect();
        assert_eq!(runtime, vec!["rack"]);
        assert_eq!(spec.dependencies[1].kind, DependencyKind::Development);
    }
}
