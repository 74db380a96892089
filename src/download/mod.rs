//! HTTP transport and resumable download engine.
//!
//! This module owns everything between a resolved resource URL and a complete
//! file on disk.
//!
//! # Features
//!
//! - [`Transport`] seam with a `reqwest`-backed [`HttpClient`]
//! - Range-based resume from the current size of a partial file
//! - Unconditional restart when the server answers 416
//! - `2^attempt` backoff for transient failures, capped attempts
//! - Existing-file policy consulted before any network call
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use harvester_core::download::{HttpClient, NoopObserver, ResumableDownloader, RetryPolicy};
//! use harvester_core::policy::ExistingFilePolicy;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new()?;
//! let downloader = ResumableDownloader::new(RetryPolicy::default());
//! let policy = ExistingFilePolicy::overwrite_all();
//! let outcome = downloader
//!     .download(
//!         &client,
//!         "https://example.com/data.zip",
//!         Path::new("./out/data.zip"),
//!         &policy,
//!         &NoopObserver,
//!     )
//!     .await;
//! println!("{}", outcome.status());
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod error;
pub mod filename;
mod resumable;
mod retry;
mod transport;

pub use client::HttpClient;
pub use constants::{
    CONNECT_TIMEOUT_SECS, DOWNLOAD_READ_TIMEOUT_SECS, PAGE_TIMEOUT_SECS, TimeoutSettings,
};
pub use error::DownloadError;
pub use resumable::{
    DownloadOutcome, DownloadState, DownloadStatus, NoopObserver, ResumableDownloader,
    TransferObserver,
};
pub use retry::{DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_error};
pub use transport::{ByteStream, FetchedPage, ProbeHeaders, TransferResponse, Transport};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
