//! Failures raised while fetching listing pages or transferring files.
//!
//! Every variant carries the URL or path it concerns so that failure records
//! and log lines stay actionable after the run.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fetching pages or transferring files.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The connection could not be made or broke down.
    #[error("could not reach {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// No answer within the configured timeout.
    #[error("timeout waiting for {url}")]
    Timeout {
        url: String,
    },

    /// Any status outside 2xx.
    #[error("{url} answered HTTP {status}")]
    HttpStatus {
        url: String,
        status: u16,
    },

    /// The server answered 416 to a ranged request.
    ///
    /// Never surfaced to callers of the downloader: it triggers a restart
    /// from offset zero.
    #[error("range not satisfiable for {url}")]
    RangeNotSatisfiable {
        /// The URL that rejected the range.
        url: String,
    },

    /// A 206 response started at a different offset than requested.
    #[error("server resumed {url} at byte {actual}, expected {expected}")]
    RangeMismatch {
        /// The URL being resumed.
        url: String,
        /// Offset that was requested.
        expected: u64,
        /// Offset the server reported in `Content-Range`.
        actual: u64,
    },

    /// The body stream stopped before the transfer finished.
    #[error("transfer of {url} interrupted: {reason}")]
    Interrupted {
        /// The URL being transferred.
        url: String,
        /// What interrupted it.
        reason: String,
    },

    /// Creating, opening or writing the local file failed.
    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Not an absolute http(s) URL.
    #[error("not a fetchable URL: {url}")]
    InvalidUrl {
        url: String,
    },

    /// The file on disk ended up a different size than the server announced.
    #[error("{path} is incomplete: expected {expected_bytes} bytes, got {actual_bytes}")]
    Integrity {
        path: PathBuf,
        expected_bytes: u64,
        actual_bytes: u64,
    },

    /// The HTTP client itself could not be built (TLS backend, proxy settings).
    #[error("could not set up the HTTP client: {reason}")]
    ClientSetup {
        reason: String,
    },
}

impl DownloadError {
    /// Wraps a reqwest failure with the URL it was fetching.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    pub fn range_not_satisfiable(url: impl Into<String>) -> Self {
        Self::RangeNotSatisfiable { url: url.into() }
    }

    pub fn range_mismatch(url: impl Into<String>, expected: u64, actual: u64) -> Self {
        Self::RangeMismatch {
            url: url.into(),
            expected,
            actual,
        }
    }

    pub fn interrupted(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Interrupted {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    pub fn integrity(path: impl Into<PathBuf>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::Integrity {
            path: path.into(),
            expected_bytes,
            actual_bytes,
        }
    }

    pub fn client_setup(reason: impl Into<String>) -> Self {
        Self::ClientSetup { reason: reason.into() }
    }
}

// No From<reqwest::Error> / From<std::io::Error>: every variant needs the
// url or path, which the source errors do not carry.
