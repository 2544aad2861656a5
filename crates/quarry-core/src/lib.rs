//! Index builder and mirror engine for quarry package repositories.
//!
//! The three entry points are [`build_index`], [`mirror`] and [`lookup`].

pub mod archive;
pub mod config;
pub mod index;
pub mod indexer;
pub mod io;
pub mod lookup;
pub mod mirror;
pub mod paths;

pub mod reporter;

pub use archive::{ArchiveError, ArchiveReader, TarArchiveReader};
pub use config::{Config, ConfigError};
pub use index::Index;
pub use indexer::{BuildOptions, BuildOutput, BuildReport, IndexError, build_index};
pub use io::fetch::{FetchConfig, FetchError, FetchOutcome, Fetcher, HttpFetcher};
pub use lookup::{LookupError, lookup};
pub use mirror::{MirrorError, MirrorOptions, MirrorOutput, MirrorReport, mirror};
pub use paths::{Aggregate, IndexLayout};
pub use reporter::{NullReporter, Reporter};

/// User Agent string for remote requests
pub const USER_AGENT: &str = concat!("quarry/", env!("CARGO_PKG_VERSION"));
