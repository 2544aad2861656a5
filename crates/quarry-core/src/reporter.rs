//! Reporter trait for dependency injection
//!
//! Index and mirror runs report progress through this trait so the engine is
//! not coupled to a particular console or log sink.

use std::path::Path;

use quarry_schema::SpecTuple;

use crate::paths::Aggregate;

/// Progress sink for index and mirror runs.
pub trait Reporter: Send + Sync {
    /// Indicates a new section or phase has started (e.g. "Fetching", "Indexing").
    fn section(&self, title: &str);

    /// An archive was decoded and added to the index.
    fn indexed(&self, tuple: &SpecTuple, current: usize, total: usize);

    /// An archive could not be decoded and was skipped.
    fn skipped(&self, path: &Path, reason: &str);

    /// An aggregate index was fetched, or kept from a previous run.
    fn aggregate(&self, aggregate: Aggregate, entries: usize, fresh: bool);

    /// A package archive was downloaded.
    fn fetched(&self, tuple: &SpecTuple, bytes: u64, current: usize, total: usize);

    /// A package archive could not be fetched.
    fn failed(&self, tuple: &SpecTuple, reason: &str);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);

    /// Display a final summary of an operation.
    fn summary(&self, count: usize, action: &str, elapsed_secs: f64);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn section(&self, title: &str) {
        (**self).section(title)
    }
    fn indexed(&self, tuple: &SpecTuple, current: usize, total: usize) {
        (**self).indexed(tuple, current, total)
    }
    fn skipped(&self, path: &Path, reason: &str) {
        (**self).skipped(path, reason)
    }
    fn aggregate(&self, aggregate: Aggregate, entries: usize, fresh: bool) {
        (**self).aggregate(aggregate, entries, fresh)
    }
    fn fetched(&self, tuple: &SpecTuple, bytes: u64, current: usize, total: usize) {
        (**self).fetched(tuple, bytes, current, total)
    }
    fn failed(&self, tuple: &SpecTuple, reason: &str) {
        (**self).failed(tuple, reason)
    }
    fn info(&self, msg: &str) {
        (**self).info(msg)
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg)
    }
    fn summary(&self, count: usize, action: &str, elapsed_secs: f64) {
        (**self).summary(count, action, elapsed_secs)
    }
}

/// A no-op reporter for silent operations (e.g., lookups, testing).
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn section(&self, _: &str) {}
    fn indexed(&self, _: &SpecTuple, _: usize, _: usize) {}
    fn skipped(&self, _: &Path, _: &str) {}
    fn aggregate(&self, _: Aggregate, _: usize, _: bool) {}
    fn fetched(&self, _: &SpecTuple, _: u64, _: usize, _: usize) {}
    fn failed(&self, _: &SpecTuple, _: &str) {}
    fn info(&self, _: &str) {}
    fn warning(&self, _: &str) {}
    fn summary(&self, _: usize, _: &str, _: f64) {}
}
