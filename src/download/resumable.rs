//! Resumable downloader with retry/backoff.
//!
//! One call to [`ResumableDownloader::download`] moves a single resource to a
//! single target path:
//!
//! 1. The [`ExistingFilePolicy`] is consulted; `Skip` ends the call with no
//!    network traffic.
//! 2. The resume offset is the current length of the target file.
//! 3. A streamed GET is issued, ranged when the offset is non-zero. A 416
//!    answer restarts from offset zero in truncate mode.
//! 4. The expected total is the response length plus the offset (or the
//!    sidecar value when the server omits a length).
//! 5. Bytes are appended or written fresh, progress is reported per chunk.
//! 6. Transient failures are retried with `2^attempt` backoff; the partial
//!    file left by a failed attempt is the resume point of the next one.
//!
//! Partial files are never deleted, on error or on interruption.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};

use super::constants::WRITE_BUFFER_BYTES;
use super::error::DownloadError;
use super::retry::{RetryDecision, RetryPolicy, classify_error};
use super::transport::{TransferResponse, Transport};
use crate::policy::{ExistingFilePolicy, FileDecision};
use crate::sidecar::{self, ResumeRecord};

/// Receives transfer events; the library itself never draws anything.
pub trait TransferObserver: Send + Sync {
    /// A transfer attempt started at `resumed_from` bytes.
    fn on_start(&self, _path: &Path, _resumed_from: u64, _expected_total: Option<u64>) {}
    /// `bytes` more bytes were written.
    fn on_progress(&self, _bytes: u64) {}
    /// Attempt `failed_attempt` failed; the next one starts after `delay`.
    fn on_retry(&self, _failed_attempt: u32, _delay: Duration, _error: &DownloadError) {}
    /// The call finished (any outcome).
    fn on_finish(&self, _path: &Path) {}
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl TransferObserver for NoopObserver {}

/// Coarse status of a [`DownloadOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    /// File is complete on disk.
    Downloaded,
    /// Existing file left untouched.
    Skipped,
    /// Retries exhausted or a permanent error occurred.
    Failed,
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Downloaded => "downloaded",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        })
    }
}

/// Result of one [`ResumableDownloader::download`] call.
#[derive(Debug)]
pub enum DownloadOutcome {
    /// The file is complete.
    Downloaded {
        /// Target path.
        path: PathBuf,
        /// Final size on disk.
        bytes: u64,
        /// Whether the final attempt appended to existing bytes.
        resumed: bool,
    },
    /// The existing-file policy said skip.
    Skipped {
        /// Target path.
        path: PathBuf,
    },
    /// The last error after all attempts.
    Failed {
        /// Last error observed.
        error: DownloadError,
        /// Attempts made.
        attempts: u32,
    },
}

impl DownloadOutcome {
    /// Coarse status.
    #[must_use]
    pub fn status(&self) -> DownloadStatus {
        match self {
            Self::Downloaded { .. } => DownloadStatus::Downloaded,
            Self::Skipped { .. } => DownloadStatus::Skipped,
            Self::Failed { .. } => DownloadStatus::Failed,
        }
    }

    /// The error, when failed.
    #[must_use]
    pub fn error(&self) -> Option<&DownloadError> {
        match self {
            Self::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Per-call transfer state, owned by the downloader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadState {
    /// Target path.
    pub local_path: PathBuf,
    /// Bytes on disk when the current attempt started.
    pub bytes_on_disk: u64,
    /// Expected total size, when known.
    pub expected_total: Option<u64>,
    /// Current attempt (1-indexed).
    pub attempt: u32,
    /// Ignore existing bytes on the next attempt.
    pub force_fresh: bool,
}

impl DownloadState {
    fn new(local_path: &Path) -> Self {
        Self {
            local_path: local_path.to_path_buf(),
            bytes_on_disk: 0,
            expected_total: None,
            attempt: 1,
            force_fresh: false,
        }
    }
}

/// Streams resources to disk with resume and retry.
#[derive(Debug, Clone, Default)]
pub struct ResumableDownloader {
    retry_policy: RetryPolicy,
}

impl ResumableDownloader {
    /// Creates a downloader with the given retry policy.
    #[must_use]
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self { retry_policy }
    }

    /// Returns the retry policy in use.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Downloads `url` to `target`.
    ///
    /// Never returns an error: failures become [`DownloadOutcome::Failed`] so
    /// the caller can record them and move on.
    #[instrument(skip(self, transport, target, policy, observer), fields(target = %target.display()))]
    pub async fn download(
        &self,
        transport: &dyn Transport,
        url: &str,
        target: &Path,
        policy: &ExistingFilePolicy,
        observer: &dyn TransferObserver,
    ) -> DownloadOutcome {
        // Only files already on disk are put to the policy.
        if tokio::fs::try_exists(target).await.unwrap_or(false)
            && policy.decide(target).await == FileDecision::Skip
        {
            info!(path = %target.display(), "Skipping existing file");
            return DownloadOutcome::Skipped {
                path: target.to_path_buf(),
            };
        }

        let mut state = DownloadState::new(target);
        if let Some(parent) = target.parent()
            && !parent.as_os_str().is_empty()
            && let Err(source) = tokio::fs::create_dir_all(parent).await
        {
            observer.on_finish(target);
            return DownloadOutcome::Failed {
                error: DownloadError::io(parent, source),
                attempts: 0,
            };
        }

        let outcome = loop {
            match self.attempt(transport, url, &mut state, observer).await {
                Ok(resumed) => {
                    if let Err(err) = sidecar::clear(target).await {
                        warn!(error = %err, "Could not remove resume sidecar");
                    }
                    let bytes = current_len(target).await;
                    info!(path = %target.display(), bytes, resumed, "Download complete");
                    break DownloadOutcome::Downloaded {
                        path: target.to_path_buf(),
                        bytes,
                        resumed,
                    };
                }
                Err(error) => {
                    match self
                        .retry_policy
                        .should_retry(classify_error(&error), state.attempt)
                    {
                        RetryDecision::Retry { delay, attempt } => {
                            warn!(
                                error = %error,
                                failed_attempt = state.attempt,
                                delay_ms = delay.as_millis(),
                                "Transfer failed; retrying"
                            );
                            observer.on_retry(state.attempt, delay, &error);
                            tokio::time::sleep(delay).await;
                            state.attempt = attempt;
                        }
                        RetryDecision::DoNotRetry { reason } => {
                            warn!(error = %error, attempts = state.attempt, %reason, "Download failed");
                            break DownloadOutcome::Failed {
                                error,
                                attempts: state.attempt,
                            };
                        }
                    }
                }
            }
        };

        observer.on_finish(target);
        outcome
    }

    /// Runs one attempt; returns whether it appended to existing bytes.
    async fn attempt(
        &self,
        transport: &dyn Transport,
        url: &str,
        state: &mut DownloadState,
        observer: &dyn TransferObserver,
    ) -> Result<bool, DownloadError> {
        let target = state.local_path.clone();
        state.bytes_on_disk = if state.force_fresh {
            0
        } else {
            current_len(&target).await
        };
        state.force_fresh = false;

        let recorded = match sidecar::load(&target).await {
            Ok(record) => record.filter(|r| r.url == url),
            Err(err) => {
                debug!(error = %err, "Ignoring unreadable resume sidecar");
                None
            }
        };

        let offset = state.bytes_on_disk;
        let response = if offset > 0 {
            debug!(offset, "Requesting byte range");
            match transport.open(url, Some(offset)).await {
                Err(DownloadError::RangeNotSatisfiable { .. }) => {
                    info!(offset, "Server rejected range; restarting from zero");
                    state.bytes_on_disk = 0;
                    transport.open(url, None).await?
                }
                other => other?,
            }
        } else {
            transport.open(url, None).await?
        };

        let append = state.bytes_on_disk > 0 && response.is_partial();
        if append
            && let Some(start) = response.content_range_start
            && start != state.bytes_on_disk
        {
            state.force_fresh = true;
            return Err(DownloadError::range_mismatch(url, state.bytes_on_disk, start));
        }
        if state.bytes_on_disk > 0 && !append {
            debug!("Server ignored range; writing fresh");
            state.bytes_on_disk = 0;
        }

        let start = state.bytes_on_disk;
        state.expected_total = match response.content_length {
            Some(remaining) => Some(remaining.saturating_add(start)),
            None if append => recorded.map(|r| r.expected_total),
            None => None,
        };

        if let Some(expected_total) = state.expected_total
            && let Err(err) = sidecar::store(
                &target,
                &ResumeRecord {
                    url: url.to_string(),
                    expected_total,
                },
            )
            .await
        {
            debug!(error = %err, "Could not write resume sidecar");
        }

        observer.on_start(&target, start, state.expected_total);
        let written = stream_to_file(response, &target, append, url, observer).await?;
        let final_len = start.saturating_add(written);

        if let Some(expected) = state.expected_total
            && final_len != expected
        {
            // Longer than announced means the bytes cannot be trusted.
            state.force_fresh = final_len > expected;
            return Err(DownloadError::integrity(&target, expected, final_len));
        }
        Ok(append)
    }
}

/// Streams the response body to `path`, returning bytes written.
///
/// On error whatever was written stays on disk as the next resume point.
async fn stream_to_file(
    response: TransferResponse,
    path: &Path,
    append: bool,
    url: &str,
    observer: &dyn TransferObserver,
) -> Result<u64, DownloadError> {
    let mut options = OpenOptions::new();
    options.create(true);
    if append {
        options.append(true);
    } else {
        options.write(true).truncate(true);
    }
    let file = options
        .open(path)
        .await
        .map_err(|e| DownloadError::io(path, e))?;

    let mut writer = BufWriter::with_capacity(WRITE_BUFFER_BYTES, file);
    let mut body = response.body;
    let mut written: u64 = 0;

    let result = async {
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| DownloadError::io(path, e))?;
            written += chunk.len() as u64;
            observer.on_progress(chunk.len() as u64);
        }
        Ok::<(), DownloadError>(())
    }
    .await;

    // Flush even on failure so the partial file reflects every received byte.
    let flushed = writer.flush().await.map_err(|e| DownloadError::io(path, e));
    if let Err(err) = result {
        debug!(url, written, "Stream failed; partial bytes kept");
        return Err(err);
    }
    flushed?;
    Ok(written)
}

async fn current_len(path: &Path) -> u64 {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.len())
        .unwrap_or(0)
}
