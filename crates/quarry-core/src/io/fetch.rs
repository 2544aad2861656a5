//! Conditional, resumable HTTP transfer.
//!
//! [`HttpFetcher`] downloads into `<dest>.part` and renames into place once
//! the body is complete, so an interrupted transfer resumes with a `Range`
//! request on the next attempt. A destination that already exists is
//! revalidated with `If-Modified-Since`; completed files carry the remote
//! `Last-Modified` as their mtime so later runs can skip them.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use filetime::FileTime;
use futures::StreamExt;
use reqwest::header::{CONTENT_LENGTH, IF_MODIFIED_SINCE, LAST_MODIFIED, RANGE, USER_AGENT};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Errors raised while fetching one URL.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The request could not be sent or the body not read.
    #[error("request to {url} failed: {source}")]
    Http {
        /// Requested URL.
        url: String,
        /// Client error.
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with an unusable status.
    #[error("{url} returned HTTP {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Writing the download failed.
    #[error("IO error fetching {url}: {source}")]
    Io {
        /// Requested URL.
        url: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The request exceeded its timeout.
    #[error("timed out fetching {url}")]
    Timeout {
        /// Requested URL.
        url: String,
    },

    /// Every retry failed.
    #[error("giving up on {url} after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Requested URL.
        url: String,
        /// Attempts made.
        attempts: u32,
        /// Failure of the final attempt.
        #[source]
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// The URL that failed.
    pub fn url(&self) -> &str {
        match self {
            Self::Http { url, .. }
            | Self::Status { url, .. }
            | Self::Io { url, .. }
            | Self::Timeout { url }
            | Self::RetriesExhausted { url, .. } => url,
        }
    }

    /// Whether another attempt could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { source, .. } => !source.is_builder(),
            Self::Timeout { .. } => true,
            Self::Status { status, .. } => {
                *status == 408 || *status == 416 || *status == 429 || *status >= 500
            }
            Self::Io { .. } | Self::RetriesExhausted { .. } => false,
        }
    }

    fn from_reqwest(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else {
            Self::Http {
                url: url.to_string(),
                source,
            }
        }
    }

    fn io(url: &str, source: io::Error) -> Self {
        Self::Io {
            url: url.to_string(),
            source,
        }
    }
}

/// Result of a successful fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The whole body was transferred.
    Fetched {
        /// Size of the downloaded file.
        bytes: u64,
    },
    /// A partial download was completed.
    Resumed {
        /// Final file size.
        bytes: u64,
    },
    /// The local copy is current; nothing was transferred.
    Unchanged,
}

impl FetchOutcome {
    /// Size of the file now in place, or zero when unchanged.
    pub fn bytes(&self) -> u64 {
        match self {
            Self::Fetched { bytes } | Self::Resumed { bytes } => *bytes,
            Self::Unchanged => 0,
        }
    }
}

/// Performs conditional, resumable transfers.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Bring `dest` into agreement with the object at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on network failure, a non-success status, a
    /// timeout, or a local I/O failure.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<FetchOutcome, FetchError>;
}

/// Timeout and retry policy for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Per-request timeout, body included.
    pub timeout: Duration,
    /// Additional attempts after the first transient failure.
    pub retries: u32,
    /// Delay before retry `n` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            retries: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

/// [`Fetcher`] over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    config: FetchConfig,
}

impl HttpFetcher {
    /// Build a fetcher with its own client.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new(config: FetchConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(crate::USER_AGENT)
            .build()?;
        Ok(Self { client, config })
    }

    /// Build a fetcher around an existing client.
    pub fn with_client(client: Client, config: FetchConfig) -> Self {
        Self { client, config }
    }

    async fn attempt(&self, url: &str, dest: &Path) -> Result<FetchOutcome, FetchError> {
        let part = part_path(dest);
        let local = local_state(dest).await;
        let partial = tokio::fs::metadata(&part)
            .await
            .map(|m| m.len())
            .unwrap_or(0);

        let mut request = self.client.get(url).header(USER_AGENT, crate::USER_AGENT);
        if partial > 0 {
            debug!(url, partial, "resuming download");
            request = request.header(RANGE, format!("bytes={partial}-"));
        } else if let Some((_, mtime)) = local {
            request = request.header(IF_MODIFIED_SINCE, http_date(mtime));
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED {
            debug!(url, "not modified");
            return Ok(FetchOutcome::Unchanged);
        }
        if status == StatusCode::RANGE_NOT_SATISFIABLE {
            // The partial file no longer matches the remote object.
            remove_if_exists(&part).await.map_err(|e| FetchError::io(url, e))?;
        }
        if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let last_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_http_date);

        if status == StatusCode::OK && partial == 0 {
            let remote_len = response
                .headers()
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            if let (Some((len, mtime)), Some(remote_len), Some(remote_mtime)) =
                (local, remote_len, last_modified)
            {
                if len == remote_len && unix_secs(remote_mtime) <= unix_secs(mtime) {
                    debug!(url, "size and timestamp unchanged");
                    return Ok(FetchOutcome::Unchanged);
                }
            }
        }

        let resumed = status == StatusCode::PARTIAL_CONTENT;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FetchError::io(url, e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(resumed)
            .truncate(!resumed)
            .open(&part)
            .await
            .map_err(|e| FetchError::io(url, e))?;

        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| FetchError::from_reqwest(url, e))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| FetchError::io(url, e))?;
        }
        file.flush().await.map_err(|e| FetchError::io(url, e))?;
        drop(file);

        tokio::fs::rename(&part, dest)
            .await
            .map_err(|e| FetchError::io(url, e))?;
        if let Some(mtime) = last_modified {
            filetime::set_file_mtime(dest, FileTime::from_system_time(mtime))
                .map_err(|e| FetchError::io(url, e))?;
        }

        let bytes = tokio::fs::metadata(dest)
            .await
            .map_err(|e| FetchError::io(url, e))?
            .len();
        Ok(if resumed {
            FetchOutcome::Resumed { bytes }
        } else {
            FetchOutcome::Fetched { bytes }
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<FetchOutcome, FetchError> {
        let attempts = self.config.retries + 1;
        let mut attempt = 1;
        loop {
            match self.attempt(url, dest).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) if attempt >= attempts => {
                    if self.config.retries == 0 {
                        return Err(e);
                    }
                    return Err(FetchError::RetriesExhausted {
                        url: url.to_string(),
                        attempts,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    warn!(url, attempt, error = %e, "retrying fetch");
                    tokio::time::sleep(self.config.backoff * attempt).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Path of the in-progress download for `dest`.
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

async fn local_state(dest: &Path) -> Option<(u64, SystemTime)> {
    let meta = tokio::fs::metadata(dest).await.ok()?;
    if !meta.is_file() {
        return None;
    }
    Some((meta.len(), meta.modified().ok()?))
}

async fn remove_if_exists(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Format a timestamp as an HTTP date.
pub fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).format(HTTP_DATE).to_string()
}

/// Parse an HTTP date.
pub fn parse_http_date(value: &str) -> Option<SystemTime> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| SystemTime::from(dt.with_timezone(&Utc)))
}

fn unix_secs(time: SystemTime) -> i64 {
    DateTime::<Utc>::from(time).timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use tempfile::tempdir;

    fn fetcher(retries: u32) -> HttpFetcher {
        HttpFetcher::new(FetchConfig {
            timeout: Duration::from_secs(5),
            retries,
            backoff: Duration::ZERO,
        })
        .unwrap()
    }

    const STAMP: &str = "Sun, 06 Nov 1994 08:49:37 GMT";

    #[test]
    fn http_dates_round_trip() {
        let t = parse_http_date(STAMP).unwrap();
        assert_eq!(http_date(t), STAMP);
        assert!(parse_http_date("yesterday").is_none());
    }

    #[test]
    fn part_path_appends_suffix() {
        assert_eq!(
            part_path(Path::new("/gems/rake-13.0.gem")),
            Path::new("/gems/rake-13.0.gem.part")
        );
    }

    #[tokio::test]
    async fn fetches_and_stamps_mtime() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/gems/rake-13.0.gem")
            .match_header("if-modified-since", Matcher::Missing)
            .with_status(200)
            .with_header("last-modified", STAMP)
            .with_body("archive bytes")
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("rake-13.0.gem");
        let url = format!("{}/gems/rake-13.0.gem", server.url());

        let outcome = fetcher(0).fetch(&url, &dest).await.unwrap();
        m.assert_async().await;
        assert_eq!(outcome, FetchOutcome::Fetched { bytes: 13 });
        assert_eq!(std::fs::read(&dest).unwrap(), b"archive bytes");
        assert!(!part_path(&dest).exists());

        let mtime = std::fs::metadata(&dest).unwrap().modified().unwrap();
        assert_eq!(http_date(mtime), STAMP);
    }

    #[tokio::test]
    async fn existing_file_is_revalidated() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/latest.1.gz")
            .match_header("if-modified-since", STAMP)
            .with_status(304)
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("latest.1.gz");
        std::fs::write(&dest, b"old").unwrap();
        let stamp = FileTime::from_system_time(parse_http_date(STAMP).unwrap());
        filetime::set_file_mtime(&dest, stamp).unwrap();

        let url = format!("{}/latest.1.gz", server.url());
        let outcome = fetcher(0).fetch(&url, &dest).await.unwrap();
        m.assert_async().await;
        assert_eq!(outcome, FetchOutcome::Unchanged);
        assert_eq!(std::fs::read(&dest).unwrap(), b"old");
    }

    #[tokio::test]
    async fn same_size_and_age_is_unchanged_without_304() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/full.1.gz")
            .with_status(200)
            .with_header("last-modified", STAMP)
            .with_body("abc")
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("full.1.gz");
        std::fs::write(&dest, b"xyz").unwrap();
        let stamp = FileTime::from_system_time(parse_http_date(STAMP).unwrap());
        filetime::set_file_mtime(&dest, stamp).unwrap();

        let url = format!("{}/full.1.gz", server.url());
        let outcome = fetcher(0).fetch(&url, &dest).await.unwrap();
        assert_eq!(outcome, FetchOutcome::Unchanged);
        assert_eq!(std::fs::read(&dest).unwrap(), b"xyz");
    }

    #[tokio::test]
    async fn partial_download_resumes_with_range() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/gems/rack-3.0.gem")
            .match_header("range", "bytes=6-")
            .with_status(206)
            .with_body("world")
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("rack-3.0.gem");
        std::fs::write(part_path(&dest), b"hello ").unwrap();

        let url = format!("{}/gems/rack-3.0.gem", server.url());
        let outcome = fetcher(0).fetch(&url, &dest).await.unwrap();
        m.assert_async().await;
        assert_eq!(outcome, FetchOutcome::Resumed { bytes: 11 });
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello world");
        assert!(!part_path(&dest).exists());
    }

    #[tokio::test]
    async fn full_response_to_range_restarts() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/gems/rack-3.0.gem")
            .with_status(200)
            .with_body("fresh body")
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("rack-3.0.gem");
        std::fs::write(part_path(&dest), b"stale partial").unwrap();

        let url = format!("{}/gems/rack-3.0.gem", server.url());
        let outcome = fetcher(0).fetch(&url, &dest).await.unwrap();
        assert_eq!(outcome, FetchOutcome::Fetched { bytes: 10 });
        assert_eq!(std::fs::read(&dest).unwrap(), b"fresh body");
    }

    #[tokio::test]
    async fn missing_object_is_not_retried() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/gems/gone-1.0.gem")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let url = format!("{}/gems/gone-1.0.gem", server.url());
        let err = fetcher(3)
            .fetch(&url, &dir.path().join("gone-1.0.gem"))
            .await
            .unwrap_err();

        m.assert_async().await;
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
        assert_eq!(err.url(), url);
    }

    #[tokio::test]
    async fn server_errors_exhaust_retries() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/gems/flaky-1.0.gem")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let url = format!("{}/gems/flaky-1.0.gem", server.url());
        let err = fetcher(2)
            .fetch(&url, &dir.path().join("flaky-1.0.gem"))
            .await
            .unwrap_err();

        m.assert_async().await;
        assert!(matches!(err, FetchError::RetriesExhausted { attempts: 3, .. }));
        assert!(err.to_string().contains("flaky-1.0.gem"));
    }
}
