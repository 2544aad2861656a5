//! Filesystem locations.
//!
//! `QUARRY_HOME` (default `~/.quarry`) holds the configuration file and the
//! default archive and index directories. [`IndexLayout`] names every
//! artifact the index builder writes.

use std::path::{Path, PathBuf};

use dirs::home_dir;
use quarry_schema::{ARCHIVE_EXTENSION, COMPACT_FORMAT};

/// Returns the quarry home directory, or None if the user's home cannot be resolved.
pub fn try_quarry_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("QUARRY_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".quarry"))
}

/// Configuration file: `$QUARRY_HOME/config.toml`
pub fn config_path() -> Option<PathBuf> {
    try_quarry_home().map(|h| h.join("config.toml"))
}

/// Default archive directory: `$QUARRY_HOME/gems`
pub fn default_archive_dir() -> Option<PathBuf> {
    try_quarry_home().map(|h| h.join("gems"))
}

/// Default index directory: `$QUARRY_HOME/index`
pub fn default_index_dir() -> Option<PathBuf> {
    try_quarry_home().map(|h| h.join("index"))
}

/// Whether `path` looks like a package archive.
pub fn is_archive(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == ARCHIVE_EXTENSION)
}

/// The three aggregate compact-tuple indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregate {
    /// Newest released version of every name.
    Latest,
    /// Every released (non-prerelease) version.
    Full,
    /// Every prerelease version.
    Prerelease,
}

impl Aggregate {
    /// All aggregates, in mirror fetch priority order.
    pub const ALL: [Aggregate; 3] = [Aggregate::Latest, Aggregate::Full, Aggregate::Prerelease];

    /// Short name used in filenames and messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Latest => "latest",
            Self::Full => "full",
            Self::Prerelease => "prerelease",
        }
    }

    /// Filename of this aggregate, e.g. `latest.1.gz`.
    pub fn file_name(&self) -> String {
        format!("{}.{COMPACT_FORMAT}.gz", self.as_str())
    }
}

impl std::fmt::Display for Aggregate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Names of every artifact under an index directory.
///
/// ```text
/// <root>/
/// ├── quick/
/// │   ├── <basename>.gemspec.rz
/// │   └── tuple.1/<basename>.tuple.rz
/// ├── full.1.gz
/// ├── latest.1.gz
/// ├── prerelease.1.gz
/// ├── catalog.1.rz
/// └── remote/                  aggregates last fetched by `mirror`
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexLayout {
    root: PathBuf,
}

impl IndexLayout {
    /// Layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The index directory itself.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of per-package self-describing entries.
    pub fn quick_dir(&self) -> PathBuf {
        self.root.join("quick")
    }

    /// Directory of per-package compact entries, tagged with the format.
    pub fn tuple_dir(&self) -> PathBuf {
        self.quick_dir().join(format!("tuple.{COMPACT_FORMAT}"))
    }

    /// Per-package self-describing entry.
    pub fn descriptor_path(&self, basename: &str) -> PathBuf {
        self.quick_dir().join(format!("{basename}.gemspec.rz"))
    }

    /// Per-package compact entry.
    pub fn tuple_path(&self, basename: &str) -> PathBuf {
        self.tuple_dir().join(format!("{basename}.tuple.rz"))
    }

    /// Aggregate index file.
    pub fn aggregate_path(&self, aggregate: Aggregate) -> PathBuf {
        self.root.join(aggregate.file_name())
    }

    /// Directory holding the last aggregates fetched from a mirror remote.
    pub fn remote_dir(&self) -> PathBuf {
        self.root.join("remote")
    }

    /// Local copy of a remote aggregate.
    pub fn remote_aggregate_path(&self, aggregate: Aggregate) -> PathBuf {
        self.remote_dir().join(aggregate.file_name())
    }

    /// Combined `(basename, compact tuple)` catalog.
    pub fn catalog_path(&self) -> PathBuf {
        self.root.join(format!("catalog.{COMPACT_FORMAT}.rz"))
    }
}

/// Join a remote root and a relative path with exactly one slash.
pub fn join_url(root: &str, relative: &str) -> String {
    format!(
        "{}/{}",
        root.trim_end_matches('/'),
        relative.trim_start_matches('/')
    )
}
