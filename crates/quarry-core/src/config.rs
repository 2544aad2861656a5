//! Configuration file handling.
//!
//! `config.toml` supplies defaults for every run; command-line flags and
//! `QUARRY_*` environment variables override it field by field.
//!
//! ```toml
//! remote = "https://gems.example.org"
//! archive_dir = "/srv/quarry/gems"
//! index_dir = "/srv/quarry/index"
//! jobs = 8
//!
//! [fetch]
//! timeout_secs = 60
//! retries = 3
//! backoff_ms = 500
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::io::fetch::{FetchConfig, FetchError};
use crate::paths;

/// Conditions that make a run impossible before any work is persisted.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        /// Config file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The config file is not valid TOML or has unknown keys.
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        /// Config file.
        path: PathBuf,
        /// Parser error.
        #[source]
        source: toml::de::Error,
    },

    /// No home directory to derive defaults from.
    #[error("cannot determine home directory; set QUARRY_HOME")]
    NoHome,

    /// A required directory is absent.
    #[error("directory {} does not exist", .0.display())]
    MissingDirectory(PathBuf),

    /// A directory path names something else.
    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    /// A directory cannot be listed.
    #[error("directory {} is not readable: {source}", path.display())]
    Unreadable {
        /// Directory.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// A directory cannot be created or written.
    #[error("directory {} is not writable: {source}", path.display())]
    Unwritable {
        /// Directory.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// `mirror` was run without a remote.
    #[error("no remote repository configured")]
    MissingRemote,

    /// The remote is not an HTTP(S) URL.
    #[error("invalid remote {0}: expected an http or https URL")]
    InvalidRemote(String),

    /// An aggregate could not be fetched and was never fetched before.
    #[error("remote is unreachable and no local copy of {aggregate} exists: {source}")]
    RemoteUnreachable {
        /// Aggregate file name.
        aggregate: String,
        /// Last fetch failure.
        #[source]
        source: FetchError,
    },

    /// A worker count of zero.
    #[error("jobs must be at least 1")]
    InvalidJobs,
}

/// Fetch timing, as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FetchSettings {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Retries after the first attempt.
    pub retries: u32,
    /// Base delay between retries in milliseconds.
    pub backoff_ms: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        let defaults = FetchConfig::default();
        Self {
            timeout_secs: defaults.timeout.as_secs(),
            retries: defaults.retries,
            backoff_ms: defaults.backoff.as_millis() as u64,
        }
    }
}

impl From<&FetchSettings> for FetchConfig {
    fn from(settings: &FetchSettings) -> Self {
        Self {
            timeout: Duration::from_secs(settings.timeout_secs),
            retries: settings.retries,
            backoff: Duration::from_millis(settings.backoff_ms),
        }
    }
}

/// Contents of `config.toml`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Remote repository root for `mirror`.
    pub remote: Option<String>,
    /// Directory of package archives.
    pub archive_dir: Option<PathBuf>,
    /// Directory the index artifacts are written to.
    pub index_dir: Option<PathBuf>,
    /// Worker count for decoding and fetching.
    pub jobs: Option<usize>,
    /// The `[fetch]` table.
    pub fetch: FetchSettings,
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit `path` must exist. Otherwise `$QUARRY_HOME/config.toml`
    /// is read if present, and defaults are used if not.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => match paths::config_path() {
                Some(path) if path.is_file() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Read and parse one config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Archive directory, falling back to `$QUARRY_HOME/gems`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoHome`] if no fallback can be resolved.
    pub fn archive_dir(&self) -> Result<PathBuf, ConfigError> {
        self.archive_dir
            .clone()
            .or_else(paths::default_archive_dir)
            .ok_or(ConfigError::NoHome)
    }

    /// Index directory, falling back to `$QUARRY_HOME/index`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoHome`] if no fallback can be resolved.
    pub fn index_dir(&self) -> Result<PathBuf, ConfigError> {
        self.index_dir
            .clone()
            .or_else(paths::default_index_dir)
            .ok_or(ConfigError::NoHome)
    }

    /// Worker count, defaulting to the number of CPUs.
    pub fn jobs(&self) -> usize {
        self.jobs.unwrap_or_else(num_cpus::get)
    }

    /// Validated remote root.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if no remote is set or it is not an HTTP URL.
    pub fn remote(&self) -> Result<&str, ConfigError> {
        let remote = self.remote.as_deref().ok_or(ConfigError::MissingRemote)?;
        validate_remote(remote)?;
        Ok(remote)
    }

    /// HTTP client settings.
    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig::from(&self.fetch)
    }

    /// Check the settings shared by every command.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidJobs`] for a zero worker count.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jobs == Some(0) {
            return Err(ConfigError::InvalidJobs);
        }
        if let Some(remote) = &self.remote {
            validate_remote(remote)?;
        }
        Ok(())
    }
}

/// Require an `http://` or `https://` remote root.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidRemote`] otherwise.
pub fn validate_remote(remote: &str) -> Result<(), ConfigError> {
    if remote.starts_with("http://") || remote.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidRemote(remote.to_string()))
    }
}

/// Require `dir` to be an existing directory.
///
/// # Errors
///
/// Returns [`ConfigError`] if it is missing or not a directory.
pub fn require_directory(dir: &Path) -> Result<(), ConfigError> {
    match std::fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(ConfigError::NotADirectory(dir.to_path_buf())),
        Err(_) => Err(ConfigError::MissingDirectory(dir.to_path_buf())),
    }
}

/// Create `dir` if needed and confirm files can be created in it.
///
/// # Errors
///
/// Returns [`ConfigError`] if it is not a directory or not writable.
pub fn ensure_writable_directory(dir: &Path) -> Result<(), ConfigError> {
    let unwritable = |source| ConfigError::Unwritable {
        path: dir.to_path_buf(),
        source,
    };
    if dir.exists() && !dir.is_dir() {
        return Err(ConfigError::NotADirectory(dir.to_path_buf()));
    }
    std::fs::create_dir_all(dir).map_err(unwritable)?;
    tempfile::tempfile_in(dir).map_err(unwritable)?;
    Ok(())
}
