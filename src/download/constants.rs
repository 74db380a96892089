//! Constants for the download module (timeouts, chunking).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default timeout for a whole listing-page fetch or probe (30 seconds).
pub const PAGE_TIMEOUT_SECS: u64 = 30;

/// Default idle read timeout while streaming a download (60 seconds).
pub const DOWNLOAD_READ_TIMEOUT_SECS: u64 = 60;

/// Write buffer size for streamed downloads.
pub(crate) const WRITE_BUFFER_BYTES: usize = 8 * 1024;

/// Timeout bundle used to build an [`super::HttpClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutSettings {
    /// TCP/TLS connect timeout.
    pub connect: Duration,
    /// Total timeout for page fetches and HEAD probes.
    pub page: Duration,
    /// Idle read timeout while a download streams.
    pub read: Duration,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            page: Duration::from_secs(PAGE_TIMEOUT_SECS),
            read: Duration::from_secs(DOWNLOAD_READ_TIMEOUT_SECS),
        }
    }
}
