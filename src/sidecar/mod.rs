//! Resume sidecar records stored next to partial downloads.
//!
//! A partial file looks exactly like a complete one on disk. The sidecar
//! `<file>.resume.json` remembers the expected total so that a later run can
//! tell them apart and verify completion even when a resumed response omits
//! its length. The sidecar is removed once the file is verified.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors produced while reading or writing a sidecar.
#[derive(Debug, Error)]
pub enum SidecarError {
    /// I/O error touching the sidecar file.
    #[error("I/O error on resume sidecar: {0}")]
    Io(#[from] std::io::Error),
    /// The sidecar is not valid JSON for [`ResumeRecord`].
    #[error("malformed resume sidecar: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// What is persisted about an in-flight download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeRecord {
    /// Source URL of the partial bytes.
    pub url: String,
    /// Full size the server announced for the resource.
    pub expected_total: u64,
}

/// Derives the sidecar path for a download target.
///
/// `dados.zip` becomes `dados.zip.resume.json`.
#[must_use]
pub fn sidecar_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().map(std::ffi::OsStr::to_os_string).unwrap_or_default();
    name.push(".resume.json");
    target.with_file_name(name)
}

/// Loads the sidecar for `target`, or `None` when there is none.
///
/// # Errors
///
/// Returns [`SidecarError`] when the file exists but cannot be read or parsed.
#[instrument(level = "debug", skip(target), fields(target = %target.display()))]
pub async fn load(target: &Path) -> Result<Option<ResumeRecord>, SidecarError> {
    let path = sidecar_path(target);
    match tokio::fs::read(&path).await {
        Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Writes (or replaces) the sidecar for `target`.
///
/// # Errors
///
/// Returns [`SidecarError`] on serialization or I/O failure.
#[instrument(level = "debug", skip(target, record), fields(target = %target.display()))]
pub async fn store(target: &Path, record: &ResumeRecord) -> Result<(), SidecarError> {
    let path = sidecar_path(target);
    let json = serde_json::to_vec_pretty(record)?;
    tokio::fs::write(&path, json).await?;
    debug!(path = %path.display(), expected_total = record.expected_total, "Resume sidecar written");
    Ok(())
}

/// Removes the sidecar for `target`; a missing sidecar is not an error.
///
/// # Errors
///
/// Returns [`SidecarError`] when removal fails for another reason.
pub async fn clear(target: &Path) -> Result<(), SidecarError> {
    match tokio::fs::remove_file(sidecar_path(target)).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}
