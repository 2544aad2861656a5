//! Index command

use std::path::Path;

use anyhow::Result;
use quarry_core::{BuildOptions, build_index};
use tokio_util::sync::CancellationToken;

use crate::ui::ConsoleReporter;
use crate::{DirArgs, Status};

/// Rebuild the index from the configured archive directory.
pub async fn index(
    config: Option<&Path>,
    dirs: &DirArgs,
    json: bool,
    verbose: bool,
    cancel: &CancellationToken,
) -> Result<Status> {
    let config = super::settings(config, dirs)?;
    let opts = BuildOptions::new(config.archive_dir()?, config.index_dir()?).jobs(config.jobs());
    let reporter = ConsoleReporter::new(verbose);

    let output = build_index(&opts, &reporter, cancel).await?;
    let report = &output.report;

    if json {
        super::print_json(report)?;
    } else if !report.failed.is_empty() {
        eprintln!();
        eprintln!("  {} archive(s) skipped", report.failed.len());
    }

    Ok(if report.is_clean() {
        Status::Clean
    } else {
        Status::Partial
    })
}
