//! quarry - package repository indexer and mirror
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
//!
//! Command-line front end over `quarry-core`.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.quarry/
//! ├── config.toml   # Optional settings
//! ├── gems/         # Package archives
//! └── index/        # Generated indices
//!     ├── quick/    # Per-package descriptors
//!     └── remote/   # Aggregates last fetched by `mirror`
//! ```

pub mod cmd;
pub mod ui;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "quarry")]
#[command(author, version, about = "Build, mirror and query package repository indices", long_about = None)]
pub struct Cli {
    /// Config file (defaults to $QUARRY_HOME/config.toml)
    #[arg(long, global = true, env = "QUARRY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print the final report as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Directory overrides shared by `index` and `mirror`.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct DirArgs {
    /// Directory holding package archives
    #[arg(long, env = "QUARRY_ARCHIVE_DIR")]
    pub archive_dir: Option<PathBuf>,

    /// Directory receiving generated indices
    #[arg(long, env = "QUARRY_INDEX_DIR")]
    pub index_dir: Option<PathBuf>,

    /// Number of concurrent workers
    #[arg(short, long, env = "QUARRY_JOBS")]
    pub jobs: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Rebuild the index from the archive directory
    Index {
        #[command(flatten)]
        dirs: DirArgs,
    },
    /// Replicate a remote repository and rebuild the local index
    Mirror {
        /// Remote root URL (http or https)
        #[arg(env = "QUARRY_REMOTE")]
        remote: Option<String>,

        #[command(flatten)]
        dirs: DirArgs,
    },
    /// Show the descriptor of one archived package
    Lookup {
        /// Package name
        name: String,

        /// Exact version (defaults to the newest release)
        #[arg(long)]
        version: Option<String>,

        /// Target platform (defaults to generic)
        #[arg(long)]
        platform: Option<String>,

        /// Directory holding package archives
        #[arg(long, env = "QUARRY_ARCHIVE_DIR")]
        archive_dir: Option<PathBuf>,
    },
}

/// Process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Completed cleanly.
    Clean,
    /// Completed with recoverable failures.
    Partial,
}

impl Status {
    pub fn code(self) -> u8 {
        match self {
            Self::Clean => 0,
            Self::Partial => 2,
        }
    }
}

/// Exit code for a run that aborted.
pub const ABORTED: u8 = 1;

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn mirror_takes_remote_and_dirs() {
        let cli = Cli::try_parse_from([
            "quarry",
            "mirror",
            "https://rubygems.example",
            "--archive-dir",
            "/srv/gems",
            "-j",
            "4",
        ])
        .unwrap();
        match cli.command {
            Commands::Mirror { remote, dirs } => {
                assert_eq!(remote.as_deref(), Some("https://rubygems.example"));
                assert_eq!(dirs.archive_dir, Some(PathBuf::from("/srv/gems")));
                assert_eq!(dirs.jobs, Some(4));
                assert_eq!(dirs.index_dir, None);
            }
            _ => panic!("expected mirror"),
        }
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from(["quarry", "lookup", "rake", "--json", "-v"]).unwrap();
        assert!(cli.json);
        assert!(cli.verbose);
    }
}
