//! Failure classification and the end-of-run failure report.

use std::path::Path;

use tracing::info;

use crate::download::DownloadError;

/// File name of the report written into the output directory.
pub const FAILURE_REPORT_FILE: &str = "failed_downloads.txt";

const SEPARATOR: &str = "----------------------------------------";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FailureCategory {
    Network,
    NotFound,
    Server,
    LocalStorage,
    Other,
}

impl FailureCategory {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Network => "Network",
            Self::NotFound => "Not found",
            Self::Server => "Server",
            Self::LocalStorage => "Local storage",
            Self::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureDescriptor {
    pub category: FailureCategory,
    pub what: &'static str,
    pub fix: &'static str,
}

/// Maps a download error to a category and a one-line remedy.
#[must_use]
pub fn classify_failure(error: &DownloadError) -> FailureDescriptor {
    match error {
        DownloadError::Network { .. } | DownloadError::Timeout { .. } | DownloadError::Interrupted { .. } => {
            FailureDescriptor {
                category: FailureCategory::Network,
                what: "Transfer interrupted",
                fix: "Check connectivity and rerun; partial files resume where they stopped.",
            }
        }
        DownloadError::HttpStatus { status: 404 | 410, .. } => FailureDescriptor {
            category: FailureCategory::NotFound,
            what: "Resource not found",
            fix: "The link is probably stale; check the page for an updated link.",
        },
        DownloadError::HttpStatus { .. } => FailureDescriptor {
            category: FailureCategory::Server,
            what: "Server refused the request",
            fix: "The server may be overloaded or blocking automated access; retry later.",
        },
        DownloadError::RangeNotSatisfiable { .. }
        | DownloadError::RangeMismatch { .. }
        | DownloadError::Integrity { .. } => FailureDescriptor {
            category: FailureCategory::Server,
            what: "Server returned inconsistent byte ranges",
            fix: "Delete the partial file and rerun to download it from scratch.",
        },
        DownloadError::Io { .. } => FailureDescriptor {
            category: FailureCategory::LocalStorage,
            what: "Could not write the file",
            fix: "Check free disk space and permissions on the output directory.",
        },
        DownloadError::InvalidUrl { .. } => FailureDescriptor {
            category: FailureCategory::Other,
            what: "Unusable link",
            fix: "The page links to something that is not an HTTP(S) URL; download it manually.",
        },
        DownloadError::ClientSetup { .. } => FailureDescriptor {
            category: FailureCategory::Other,
            what: "HTTP client unavailable",
            fix: "Check the system TLS and proxy configuration, then rerun.",
        },
    }
}

/// One file that exhausted its retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    /// Grouping key of the page (e.g. the year).
    pub context_label: String,
    /// Storage filename.
    pub filename: String,
    /// Resource URL.
    pub url: String,
    /// Final error message.
    pub error: String,
    /// Classification of the final error.
    pub descriptor: FailureDescriptor,
}

impl FailureRecord {
    /// Builds a record from the final error of a failed download.
    #[must_use]
    pub fn from_error(
        context_label: impl Into<String>,
        filename: impl Into<String>,
        url: impl Into<String>,
        error: &DownloadError,
    ) -> Self {
        Self {
            context_label: context_label.into(),
            filename: filename.into(),
            url: url.into(),
            error: error.to_string(),
            descriptor: classify_failure(error),
        }
    }
}

/// Renders the plain-text report.
#[must_use]
pub fn render_failure_report(records: &[FailureRecord]) -> String {
    let mut out = String::new();
    out.push_str(&format!("Failed downloads ({})\n", records.len()));
    out.push_str(SEPARATOR);
    out.push('\n');
    for record in records {
        out.push_str(&format!("Group: {}\n", record.context_label));
        out.push_str(&format!("File:  {}\n", record.filename));
        out.push_str(&format!("URL:   {}\n", record.url));
        out.push_str(&format!("Error: {}\n", record.error.replace('\n', " ")));
        out.push_str(&format!(
            "Hint:  [{}] {}. {}\n",
            record.descriptor.category.label(),
            record.descriptor.what,
            record.descriptor.fix
        ));
        out.push_str(SEPARATOR);
        out.push('\n');
    }
    out
}

/// Writes the report to `path`; does nothing when there are no failures.
///
/// # Errors
///
/// Returns the underlying I/O error when the file cannot be written.
pub async fn write_failure_report(path: &Path, records: &[FailureRecord]) -> std::io::Result<bool> {
    if records.is_empty() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, render_failure_report(records)).await?;
    info!(path = %path.display(), failures = records.len(), "Failure report written");
    Ok(true)
}
