//! Mirror engine.
//!
//! A run fetches the remote's three aggregate indices, plans which archives
//! are missing or unreadable locally, fetches them with bounded concurrency,
//! and finally rebuilds the local index from the archives actually on disk.
//! The local index therefore always matches the local archive set, even when
//! some fetches fail.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use futures::stream;
use quarry_schema::compress::gunzip;
use quarry_schema::tuple::decode_list;
use quarry_schema::{DecodeError, SpecTuple, Specification};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::Reporter;
use crate::archive::{ArchiveReader, TarArchiveReader, read_specification};
use crate::config::{self, ConfigError};
use crate::index::Index;
use crate::indexer::{BuildOptions, BuildReport, IndexError, build_index};
use crate::io::fetch::{FetchOutcome, Fetcher};
use crate::paths::{Aggregate, IndexLayout, join_url};

/// Directory under the remote root that holds archives.
pub const REMOTE_ARCHIVE_DIR: &str = "gems";

/// Errors that abort a mirror run.
#[derive(Error, Debug)]
pub enum MirrorError {
    /// The remote or a directory is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A fetched aggregate index does not decode.
    #[error("remote {aggregate} index is unreadable: {source}")]
    Aggregate {
        /// Which aggregate.
        aggregate: Aggregate,
        /// Decode failure, attributed to the local copy.
        #[source]
        source: DecodeError,
    },

    /// Local filesystem failure.
    #[error("IO error on {}: {source}", path.display())]
    Io {
        /// Path being read or removed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The closing local rebuild failed.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// The run was cancelled.
    #[error("mirror cancelled")]
    Cancelled,

    /// A blocking check task panicked.
    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Inputs to [`mirror`].
#[derive(Debug, Clone)]
pub struct MirrorOptions {
    /// Remote repository root URL.
    pub remote: String,
    /// Local archive directory.
    pub archive_dir: PathBuf,
    /// Local index directory.
    pub index_dir: PathBuf,
    /// Concurrent fetch and decode workers.
    pub jobs: usize,
    /// Archive decoder used to verify fetched and local archives.
    pub reader: Arc<dyn ArchiveReader>,
}

impl MirrorOptions {
    /// Options with one worker per CPU and the tar reader.
    pub fn new(
        remote: impl Into<String>,
        archive_dir: impl Into<PathBuf>,
        index_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            remote: remote.into(),
            archive_dir: archive_dir.into(),
            index_dir: index_dir.into(),
            jobs: num_cpus::get(),
            reader: Arc::new(TarArchiveReader),
        }
    }

    /// Set the worker count (at least one).
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// URL of an archive on the remote.
    pub fn archive_url(&self, spec: &Specification) -> String {
        join_url(
            &self.remote,
            &format!("{REMOTE_ARCHIVE_DIR}/{}", spec.archive_filename()),
        )
    }

    /// Local path of an archive. A [`Specification`] identity is always a
    /// single filename component, so the path stays inside `archive_dir`.
    pub fn archive_path(&self, spec: &Specification) -> PathBuf {
        self.archive_dir.join(spec.archive_filename())
    }
}

/// Outcome of a mirror run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MirrorReport {
    /// Planned archives already present and readable.
    pub present: usize,
    /// Archives fetched this run.
    pub fetched: usize,
    /// Archives that could not be mirrored, with the reason.
    pub failed: Vec<(SpecTuple, String)>,
    /// Wall time of the whole run.
    pub elapsed: Duration,
    /// The local rebuild that ended the run.
    pub build: BuildReport,
}

impl MirrorReport {
    /// Whether nothing failed, here or in the rebuild.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.build.is_clean()
    }
}

/// The rebuilt local index and the run's report.
#[derive(Debug, Clone)]
pub struct MirrorOutput {
    /// Index rebuilt from the local archives.
    pub index: Index,
    /// Run statistics and failures.
    pub report: MirrorReport,
}

/// Replicate `opts.remote` into the local archive and index directories.
///
/// # Errors
///
/// Returns [`MirrorError`] if the configuration is unusable, an aggregate
/// index can neither be fetched nor found locally, the local rebuild fails,
/// or `cancel` fires. Individual archive fetch failures are not errors; they
/// are listed in [`MirrorReport::failed`].
pub async fn mirror(
    opts: &MirrorOptions,
    fetcher: &dyn Fetcher,
    reporter: &dyn Reporter,
    cancel: &CancellationToken,
) -> Result<MirrorOutput, MirrorError> {
    let started = Instant::now();
    config::validate_remote(&opts.remote)?;
    config::ensure_writable_directory(&opts.archive_dir)?;
    config::ensure_writable_directory(&opts.index_dir)?;
    let layout = IndexLayout::new(&opts.index_dir);

    reporter.section("Fetching indices");
    let mut lists = Vec::with_capacity(Aggregate::ALL.len());
    for aggregate in Aggregate::ALL {
        if cancel.is_cancelled() {
            return Err(MirrorError::Cancelled);
        }
        lists.push(fetch_aggregate(opts, &layout, aggregate, fetcher, reporter).await?);
    }

    let plan = plan(&lists);
    info!(remote = %opts.remote, entries = plan.len(), "planning mirror");
    let (planned, mut failed) = resolve(plan, reporter);

    reporter.section("Checking local archives");
    let (present, missing) = check_local(opts, planned, cancel).await?;
    info!(present, missing = missing.len(), "local archives checked");
    reporter.info(&format!(
        "{present} archives present, {} to fetch",
        missing.len()
    ));

    reporter.section("Fetching archives");
    let (fetched, fetch_failed) = fetch_archives(opts, missing, fetcher, reporter, cancel).await?;
    failed.extend(fetch_failed);

    let build_opts = BuildOptions::new(&opts.archive_dir, &opts.index_dir)
        .jobs(opts.jobs)
        .reader(Arc::clone(&opts.reader));
    let build = build_index(&build_opts, reporter, cancel).await?;

    let report = MirrorReport {
        present,
        fetched,
        failed,
        elapsed: started.elapsed(),
        build: build.report,
    };
    info!(
        present = report.present,
        fetched = report.fetched,
        failed = report.failed.len(),
        "mirror complete"
    );
    reporter.summary(report.fetched, "fetched", report.elapsed.as_secs_f64());

    Ok(MirrorOutput {
        index: build.index,
        report,
    })
}

async fn fetch_aggregate(
    opts: &MirrorOptions,
    layout: &IndexLayout,
    aggregate: Aggregate,
    fetcher: &dyn Fetcher,
    reporter: &dyn Reporter,
) -> Result<Vec<SpecTuple>, MirrorError> {
    let url = join_url(&opts.remote, &aggregate.file_name());
    let dest = layout.remote_aggregate_path(aggregate);

    let fresh = match fetcher.fetch(&url, &dest).await {
        Ok(outcome) => {
            debug!(%aggregate, ?outcome, "aggregate fetched");
            true
        }
        Err(e) if dest.is_file() => {
            warn!(%aggregate, error = %e, "using previously fetched copy");
            reporter.warning(&format!("{aggregate} index unavailable, using local copy: {e}"));
            false
        }
        Err(e) => {
            return Err(ConfigError::RemoteUnreachable {
                aggregate: aggregate.file_name(),
                source: e,
            }
            .into());
        }
    };

    let bytes = tokio::fs::read(&dest)
        .await
        .map_err(|source| MirrorError::Io {
            path: dest.clone(),
            source,
        })?;
    let tuples = gunzip(&bytes)
        .map_err(DecodeError::Compression)
        .and_then(|raw| decode_list(&raw))
        .map_err(|e| MirrorError::Aggregate {
            aggregate,
            source: e.at(&dest),
        })?;

    reporter.aggregate(aggregate, tuples.len(), fresh);
    Ok(tuples)
}

/// Every tuple across `lists`, once, in first-seen order.
pub fn plan(lists: &[Vec<SpecTuple>]) -> Vec<SpecTuple> {
    let mut seen = HashSet::new();
    lists
        .iter()
        .flatten()
        .filter(|tuple| seen.insert(tuple.basename()))
        .cloned()
        .collect()
}

/// Turn planned tuples into archive identities. Tuples whose name or
/// platform cannot be a filename are reported as failures and never touched.
fn resolve(
    plan: Vec<SpecTuple>,
    reporter: &dyn Reporter,
) -> (Vec<Specification>, Vec<(SpecTuple, String)>) {
    let mut planned = Vec::with_capacity(plan.len());
    let mut rejected = Vec::new();
    for tuple in plan {
        match Specification::from_tuple(&tuple) {
            Ok(spec) => planned.push(spec),
            Err(e) => {
                let reason = format!("rejected index entry: {e}");
                warn!(%tuple, error = %e, "index entry rejected");
                reporter.failed(&tuple, &reason);
                rejected.push((tuple, reason));
            }
        }
    }
    (planned, rejected)
}

async fn check_local(
    opts: &MirrorOptions,
    plan: Vec<Specification>,
    cancel: &CancellationToken,
) -> Result<(usize, Vec<Specification>), MirrorError> {
    let mut checks = stream::iter(plan)
        .map(|expected| {
            let path = opts.archive_path(&expected);
            let reader = Arc::clone(&opts.reader);
            tokio::task::spawn_blocking(move || {
                let usable = is_usable(reader.as_ref(), &path, &expected);
                (expected, path, usable)
            })
        })
        .buffered(opts.jobs.max(1));

    let mut present = 0;
    let mut missing = Vec::new();
    while let Some(checked) = checks.next().await {
        if cancel.is_cancelled() {
            return Err(MirrorError::Cancelled);
        }
        let (expected, path, usable) = checked?;
        match usable {
            Some(true) => present += 1,
            Some(false) => {
                warn!(archive = %path.display(), "local archive is unusable; refetching");
                tokio::fs::remove_file(&path)
                    .await
                    .map_err(|source| MirrorError::Io { path, source })?;
                missing.push(expected);
            }
            None => missing.push(expected),
        }
    }
    Ok((present, missing))
}

/// `None` if absent, otherwise whether it decodes to `expected`.
fn is_usable(
    reader: &dyn ArchiveReader,
    path: &Path,
    expected: &Specification,
) -> Option<bool> {
    if !path.is_file() {
        return None;
    }
    Some(read_specification(reader, path).is_ok_and(|spec| same_identity(&spec, expected)))
}

/// Exact identity match, with version text compared as written.
fn same_identity(found: &Specification, expected: &Specification) -> bool {
    found.name() == expected.name()
        && found.version().as_str() == expected.version().as_str()
        && found.platform() == expected.platform()
}

async fn fetch_archives(
    opts: &MirrorOptions,
    missing: Vec<Specification>,
    fetcher: &dyn Fetcher,
    reporter: &dyn Reporter,
    cancel: &CancellationToken,
) -> Result<(usize, Vec<(SpecTuple, String)>), MirrorError> {
    let total = missing.len();
    let mut results = stream::iter(missing.into_iter().enumerate())
        .map(|(position, expected)| {
            let cancel = cancel.clone();
            async move {
                if cancel.is_cancelled() {
                    return None;
                }
                let result = fetch_one(opts, fetcher, &expected).await;
                Some((position, expected.to_tuple(), result))
            }
        })
        .buffer_unordered(opts.jobs.max(1));

    let mut fetched = 0;
    let mut failed = Vec::new();
    let mut done = 0;
    while let Some(next) = results.next().await {
        let Some((position, tuple, result)) = next else {
            return Err(MirrorError::Cancelled);
        };
        done += 1;
        match result {
            Ok(bytes) => {
                fetched += 1;
                debug!(%tuple, bytes, "fetched");
                reporter.fetched(&tuple, bytes, done, total);
            }
            Err(reason) => {
                warn!(%tuple, error = %reason, "fetch failed");
                reporter.failed(&tuple, &reason);
                failed.push((position, tuple, reason));
            }
        }
    }

    failed.sort_by_key(|(position, ..)| *position);
    let failed = failed
        .into_iter()
        .map(|(_, tuple, reason)| (tuple, reason))
        .collect();
    Ok((fetched, failed))
}

/// Fetch one archive and confirm it decodes to the identity it was fetched
/// for. Failures are returned as text for the report.
async fn fetch_one(
    opts: &MirrorOptions,
    fetcher: &dyn Fetcher,
    expected: &Specification,
) -> Result<u64, String> {
    let url = opts.archive_url(expected);
    let dest = opts.archive_path(expected);
    let outcome = fetcher.fetch(&url, &dest).await.map_err(|e| e.to_string())?;
    let bytes = match outcome {
        FetchOutcome::Fetched { bytes } | FetchOutcome::Resumed { bytes } => bytes,
        FetchOutcome::Unchanged => 0,
    };

    let reader = Arc::clone(&opts.reader);
    let path = dest.clone();
    let decoded = tokio::task::spawn_blocking(move || read_specification(reader.as_ref(), &path))
        .await
        .map_err(|e| e.to_string())?;

    let reason = match decoded {
        Ok(found) if same_identity(&found, expected) => return Ok(bytes),
        Ok(found) => format!(
            "fetched archive holds {}, expected {}",
            found.basename(),
            expected.basename()
        ),
        Err(e) => format!("fetched archive does not decode: {e}"),
    };
    // Leave nothing behind that the rebuild would index.
    let _ = tokio::fs::remove_file(&dest).await;
    Err(reason)
}
