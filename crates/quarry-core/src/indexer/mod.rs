//! Index builder.
//!
//! Scans an archive directory, decodes each archive's descriptor on the
//! blocking pool, and writes the index artifacts described by
//! [`IndexLayout`]. A corrupt archive is logged and skipped. Artifacts are
//! always emitted from the sorted [`Index`], so the output does not depend
//! on the order workers finish in.

/// Archive and index directory traversal utilities.
pub mod walk;

pub use walk::{walk_archives, walk_suffixed};

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use futures::stream;
use quarry_schema::codec::{encode_catalog, encode_compact_tuple, encode_self_describing};
use quarry_schema::compress::{deflate, gzip};
use quarry_schema::tuple::encode_list;
use quarry_schema::{DecodeError, EncodeError, SpecTuple, Specification};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::Reporter;
use crate::archive::{ArchiveReader, TarArchiveReader, read_specification};
use crate::config::{self, ConfigError};
use crate::index::Index;
use crate::io::write_if_changed;
use crate::paths::{Aggregate, IndexLayout};

const DESCRIPTOR_SUFFIX: &str = ".gemspec.rz";
const TUPLE_SUFFIX: &str = ".tuple.rz";

/// Errors that abort an index build.
#[derive(Error, Debug)]
pub enum IndexError {
    /// A directory is missing or unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An artifact could not be written or a stale one removed.
    #[error("IO error writing {}: {source}", path.display())]
    Io {
        /// Artifact path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// An artifact could not be serialized.
    #[error("failed to encode {name}: {source}")]
    Encode {
        /// Artifact or basename being encoded.
        name: String,
        /// Encoder error.
        #[source]
        source: EncodeError,
    },

    /// The build was cancelled.
    #[error("index build cancelled")]
    Cancelled,

    /// A blocking worker panicked.
    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl IndexError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn encode(name: &str, source: EncodeError) -> Self {
        Self::Encode {
            name: name.to_string(),
            source,
        }
    }
}

/// Inputs to [`build_index`].
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Directory scanned for archives.
    pub archive_dir: PathBuf,
    /// Directory the artifacts are written to.
    pub index_dir: PathBuf,
    /// Concurrent decode workers.
    pub jobs: usize,
    /// Archive decoder.
    pub reader: Arc<dyn ArchiveReader>,
}

impl BuildOptions {
    /// Options with one worker per CPU and the tar reader.
    pub fn new(archive_dir: impl Into<PathBuf>, index_dir: impl Into<PathBuf>) -> Self {
        Self {
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

    /// Replace the archive decoder.
    pub fn reader(mut self, reader: Arc<dyn ArchiveReader>) -> Self {
        self.reader = reader;
        self
    }
}

/// Outcome of an index build.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    /// Specifications in the emitted index.
    pub indexed: usize,
    /// Archives skipped, with the reason.
    pub failed: Vec<(PathBuf, String)>,
    /// Wall time of the build.
    pub elapsed: Duration,
}

impl BuildReport {
    /// Whether every archive decoded.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// The built index and its report.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// The emitted index.
    pub index: Index,
    /// Build statistics and failures.
    pub report: BuildReport,
}

/// Build the index for `opts.archive_dir` into `opts.index_dir`.
///
/// # Errors
///
/// Returns [`IndexError`] if a directory is unusable, an artifact cannot be
/// written, or `cancel` fires. Undecodable archives are not errors; they are
/// listed in [`BuildReport::failed`].
pub async fn build_index(
    opts: &BuildOptions,
    reporter: &dyn Reporter,
    cancel: &CancellationToken,
) -> Result<BuildOutput, IndexError> {
    let started = Instant::now();
    config::require_directory(&opts.archive_dir)?;
    config::ensure_writable_directory(&opts.index_dir)?;

    reporter.section("Indexing");
    let archives = walk_archives(&opts.archive_dir).map_err(|source| ConfigError::Unreadable {
        path: opts.archive_dir.clone(),
        source,
    })?;
    let total = archives.len();
    info!(archives = total, dir = %opts.archive_dir.display(), "indexing archives");
    reporter.info(&format!(
        "{total} archives found in {}",
        opts.archive_dir.display()
    ));

    let (mut index, mut failed) = decode_all(opts, archives, reporter, cancel).await?;
    index.finalize();
    failed.sort();

    if cancel.is_cancelled() {
        return Err(IndexError::Cancelled);
    }

    let layout = IndexLayout::new(&opts.index_dir);
    let token = cancel.clone();
    let (index, written) = tokio::task::spawn_blocking(move || {
        let written = write_artifacts(&index, &layout, &token);
        (index, written)
    })
    .await?;
    written?;

    let report = BuildReport {
        indexed: index.len(),
        failed,
        elapsed: started.elapsed(),
    };
    info!(
        indexed = report.indexed,
        failed = report.failed.len(),
        "index written to {}",
        opts.index_dir.display()
    );
    reporter.summary(report.indexed, "indexed", report.elapsed.as_secs_f64());

    Ok(BuildOutput { index, report })
}

async fn decode_all(
    opts: &BuildOptions,
    archives: Vec<PathBuf>,
    reporter: &dyn Reporter,
    cancel: &CancellationToken,
) -> Result<(Index, Vec<(PathBuf, String)>), IndexError> {
    let total = archives.len();
    let mut results = stream::iter(archives)
        .map(|path| {
            let reader = Arc::clone(&opts.reader);
            let cancel = cancel.clone();
            async move {
                if cancel.is_cancelled() {
                    return None;
                }
                Some(
                    tokio::task::spawn_blocking(move || {
                        let result = read_specification(reader.as_ref(), &path);
                        (path, result)
                    })
                    .await,
                )
            }
        })
        .buffer_unordered(opts.jobs.max(1));

    let mut decoded = Vec::with_capacity(total);
    let mut failed = Vec::new();
    let mut done = 0;

    while let Some(next) = results.next().await {
        let Some(joined) = next else {
            return Err(IndexError::Cancelled);
        };
        let (path, result) = joined?;
        done += 1;

        match result {
            Ok(mut spec) => {
                spec.strip_for_cache();
                let tuple = spec.to_tuple();
                debug!(archive = %path.display(), %tuple, "decoded");
                reporter.indexed(&tuple, done, total);
                decoded.push((path, spec));
            }
            Err(e) => {
                let reason = failure_reason(&e);
                warn!(archive = %path.display(), error = %reason, "skipping undecodable archive");
                reporter.skipped(&path, &reason);
                failed.push((path, reason));
            }
        }

        if cancel.is_cancelled() {
            return Err(IndexError::Cancelled);
        }
    }

    // Merge in filename order so duplicate identities resolve the same way every run.
    decoded.sort_by(|a, b| a.0.cmp(&b.0));
    let mut index = Index::new();
    for (path, spec) in decoded {
        if index.insert(spec).is_some() {
            warn!(archive = %path.display(), "duplicate identity; keeping this archive's descriptor");
        }
    }

    Ok((index, failed))
}

fn failure_reason(err: &DecodeError) -> String {
    match err {
        DecodeError::At { source, .. } => source.to_string(),
        other => other.to_string(),
    }
}

/// Tuples of one aggregate, in index order.
pub fn aggregate_tuples(index: &Index, aggregate: Aggregate) -> Vec<SpecTuple> {
    match aggregate {
        Aggregate::Latest => index.latest().into_iter().map(Specification::to_tuple).collect(),
        Aggregate::Full => index.released().map(Specification::to_tuple).collect(),
        Aggregate::Prerelease => index.prereleases().map(Specification::to_tuple).collect(),
    }
}

fn write_artifacts(
    index: &Index,
    layout: &IndexLayout,
    cancel: &CancellationToken,
) -> Result<(), IndexError> {
    let mut basenames = HashSet::with_capacity(index.len());

    for spec in index.iter() {
        if cancel.is_cancelled() {
            return Err(IndexError::Cancelled);
        }
        let basename = spec.basename();
        basenames.insert(basename.to_string());

        let descriptor =
            encode_self_describing(spec).map_err(|e| IndexError::encode(basename, e))?;
        write_compressed(&layout.descriptor_path(basename), &descriptor, deflate)?;

        let compact = encode_compact_tuple(spec).map_err(|e| IndexError::encode(basename, e))?;
        write_compressed(&layout.tuple_path(basename), &compact, deflate)?;
    }

    for aggregate in Aggregate::ALL {
        if cancel.is_cancelled() {
            return Err(IndexError::Cancelled);
        }
        let tuples = aggregate_tuples(index, aggregate);
        let list = encode_list(&tuples).map_err(|e| IndexError::encode(aggregate.as_str(), e))?;
        write_compressed(&layout.aggregate_path(aggregate), &list, gzip)?;
        debug!(%aggregate, entries = tuples.len(), "wrote aggregate");
    }

    if cancel.is_cancelled() {
        return Err(IndexError::Cancelled);
    }
    let catalog = encode_catalog(index.iter()).map_err(|e| IndexError::encode("catalog", e))?;
    write_compressed(&layout.catalog_path(), &catalog, deflate)?;

    remove_stale(&layout.quick_dir(), DESCRIPTOR_SUFFIX, &basenames)?;
    remove_stale(&layout.tuple_dir(), TUPLE_SUFFIX, &basenames)?;
    Ok(())
}

fn write_compressed(
    path: &Path,
    data: &[u8],
    compress: fn(&[u8]) -> io::Result<Vec<u8>>,
) -> Result<(), IndexError> {
    let bytes = compress(data).map_err(|e| IndexError::io(path, e))?;
    write_if_changed(path, &bytes).map_err(|e| IndexError::io(path, e))?;
    Ok(())
}

fn remove_stale(dir: &Path, suffix: &str, keep: &HashSet<String>) -> Result<(), IndexError> {
    for (basename, path) in walk_suffixed(dir, suffix) {
        if !keep.contains(&basename) {
            debug!(path = %path.display(), "removing stale entry");
            std::fs::remove_file(&path).map_err(|e| IndexError::io(&path, e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NullReporter;
    use crate::archive::write_archive;
    use quarry_schema::Version;
    use tempfile::tempdir;

    fn spec(name: &str, version: &str) -> Specification {
        Specification::new(name, Version::parse(version).unwrap(), None).unwrap()
    }

    #[test]
    fn failure_reason_drops_the_path_prefix() {
        let err = DecodeError::MissingMetadata.at("gems/x-1.0.gem");
        assert_eq!(failure_reason(&err), "no metadata entry found");
    }

    #[tokio::test]
    async fn stale_quick_entries_are_removed() {
        let archives = tempdir().unwrap();
        let out = tempdir().unwrap();
        let opts = BuildOptions::new(archives.path(), out.path()).jobs(2);
        let layout = IndexLayout::new(out.path());

        let old = write_archive(archives.path(), &spec("old", "1.0"), &[], false).unwrap();
        write_archive(archives.path(), &spec("kept", "1.0"), &[], false).unwrap();
        build_index(&opts, &NullReporter, &CancellationToken::new())
            .await
            .unwrap();
        assert!(layout.descriptor_path("old-1.0").exists());

        std::fs::remove_file(old).unwrap();
        let output = build_index(&opts, &NullReporter, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(output.report.indexed, 1);
        assert!(!layout.descriptor_path("old-1.0").exists());
        assert!(!layout.tuple_path("old-1.0").exists());
        assert!(layout.tuple_path("kept-1.0").exists());
    }

    #[tokio::test]
    async fn cancelled_build_writes_nothing() {
        let archives = tempdir().unwrap();
        let out = tempdir().unwrap();
        write_archive(archives.path(), &spec("rake", "13.0"), &[], false).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let opts = BuildOptions::new(archives.path(), out.path());
        let err = build_index(&opts, &NullReporter, &cancel).await.unwrap_err();

        assert!(matches!(err, IndexError::Cancelled));
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn missing_archive_dir_is_a_config_error() {
        let out = tempdir().unwrap();
        let opts = BuildOptions::new(out.path().join("nope"), out.path().join("index"));
        let err = build_index(&opts, &NullReporter, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IndexError::Config(ConfigError::MissingDirectory(_))
        ));
    }
}
