//! Harvester Core Library
//!
//! This library provides the core functionality for the harvester tool,
//! which finds downloadable files on loosely structured listing pages and
//! transfers them to local storage with resume, retry and overwrite control.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`download`] - HTTP transport, resumable downloader and retry policy
//! - [`discovery`] - Link extraction, filename resolution, targets and fallback rendering
//! - [`policy`] - Existing-file skip/overwrite state machine
//! - [`sidecar`] - Resume sidecar records persisted next to partial files
//! - [`failure`] - Failure records, classification and the end-of-run report
//! - [`run`] - Run orchestration over a list of target pages

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod discovery;
pub mod download;
pub mod failure;
pub mod policy;
pub mod run;
pub mod sidecar;

mod user_agent;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use discovery::{
    CommandRenderer, Discovery, DiscoveryConfig, DiscoveryError, FilenameResolver, LinkExtractor,
    PageDiscovery, PageExtraction, PageRenderer, PageTarget, Resource, ResourceFormat,
    TargetSelection, discover_targets,
};
pub use download::{
    DEFAULT_MAX_RETRIES, DownloadError, DownloadOutcome, FailureType, HttpClient, NoopObserver,
    ResumableDownloader, RetryDecision, RetryPolicy, TransferObserver, Transport, classify_error,
};
pub use failure::{FAILURE_REPORT_FILE, FailureRecord, write_failure_report};
pub use policy::{ExistingFileAnswer, ExistingFilePolicy, FileDecision, PolicyState, transition};
pub use run::{Interrupt, RunOrchestrator, RunSummary};
