//! IO modules - side effects (network, filesystem)

pub mod atomic;
pub mod fetch;

pub use atomic::{write_atomic, write_if_changed};
pub use fetch::{FetchConfig, FetchError, FetchOutcome, Fetcher, HttpFetcher};
