//! Transport seam between discovery/downloading and the network.
//!
//! Production code uses [`super::HttpClient`]; tests substitute in-memory
//! implementations to count ranged requests or script failures.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

use super::DownloadError;

/// Streamed response body.
pub type ByteStream = BoxStream<'static, Result<Bytes, DownloadError>>;

/// A fetched listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// URL after redirects; relative links resolve against this.
    pub final_url: String,
    /// Raw markup.
    pub markup: String,
}

/// Metadata returned by a HEAD-equivalent probe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeHeaders {
    /// Raw `Content-Disposition` value.
    pub content_disposition: Option<String>,
    /// Raw `Content-Type` value.
    pub content_type: Option<String>,
    /// Declared `Content-Length`.
    pub content_length: Option<u64>,
}

/// An open download response whose body has not been consumed yet.
pub struct TransferResponse {
    /// HTTP status (200 or 206 in practice).
    pub status: u16,
    /// Declared length of this response body.
    pub content_length: Option<u64>,
    /// First byte position from `Content-Range` on 206 responses.
    pub content_range_start: Option<u64>,
    /// The body.
    pub body: ByteStream,
}

impl TransferResponse {
    /// Whether the server honoured a range request.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.status == 206
    }
}

impl std::fmt::Debug for TransferResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .field("content_range_start", &self.content_range_start)
            .finish_non_exhaustive()
    }
}

/// Network operations needed by discovery and downloading.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetches a listing page as text.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] on network failure or non-success status.
    async fn fetch_page(&self, url: &str) -> Result<FetchedPage, DownloadError>;

    /// Issues a metadata-only request.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] on network failure or non-success status.
    async fn probe(&self, url: &str) -> Result<ProbeHeaders, DownloadError>;

    /// Opens a streamed GET, optionally from `range_start` onwards.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::RangeNotSatisfiable`] for HTTP 416 and
    /// [`DownloadError::HttpStatus`] for any other non-success status.
    async fn open(
        &self,
        url: &str,
        range_start: Option<u64>,
    ) -> Result<TransferResponse, DownloadError>;
}
