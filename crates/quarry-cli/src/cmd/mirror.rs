//! Mirror command

use std::path::Path;

use anyhow::{Context, Result};
use quarry_core::{HttpFetcher, MirrorOptions, mirror as run_mirror};
use tokio_util::sync::CancellationToken;

use crate::ui::ConsoleReporter;
use crate::{DirArgs, Status};

/// Replicate `remote` (or the configured remote) into the local directories.
pub async fn mirror(
    config: Option<&Path>,
    remote: Option<&str>,
    dirs: &DirArgs,
    json: bool,
    verbose: bool,
    cancel: &CancellationToken,
) -> Result<Status> {
    let mut config = super::settings(config, dirs)?;
    if let Some(remote) = remote {
        config.remote = Some(remote.to_string());
    }

    let opts = MirrorOptions::new(config.remote()?, config.archive_dir()?, config.index_dir()?)
        .jobs(config.jobs());
    let fetcher =
        HttpFetcher::new(config.fetch_config()).context("Failed to build HTTP client")?;
    let reporter = ConsoleReporter::new(verbose);

    let output = run_mirror(&opts, &fetcher, &reporter, cancel).await?;
    let report = &output.report;

    if json {
        super::print_json(report)?;
    } else if !report.is_clean() {
        eprintln!();
        if !report.failed.is_empty() {
            eprintln!("  {} archive(s) could not be fetched", report.failed.len());
        }
        if !report.build.failed.is_empty() {
            eprintln!("  {} archive(s) skipped while indexing", report.build.failed.len());
        }
    }

    Ok(if report.is_clean() {
        Status::Clean
    } else {
        Status::Partial
    })
}
