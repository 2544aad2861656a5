//! Subcommand implementations.

pub mod index;
pub mod lookup;
pub mod mirror;

use std::path::Path;

use anyhow::{Context, Result};
use quarry_core::Config;
use serde::Serialize;

use crate::DirArgs;

/// Load the config file and apply command-line and environment overrides.
pub fn settings(config: Option<&Path>, dirs: &DirArgs) -> Result<Config> {
    let mut config = Config::load(config).context("Failed to load configuration")?;
    if let Some(dir) = &dirs.archive_dir {
        config.archive_dir = Some(dir.clone());
    }
    if let Some(dir) = &dirs.index_dir {
        config.index_dir = Some(dir.clone());
    }
    if dirs.jobs.is_some() {
        config.jobs = dirs.jobs;
    }
    config.validate()?;
    Ok(config)
}

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
