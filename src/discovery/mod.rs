//! Resource discovery: from a listing page to canonical (filename, URL) pairs.
//!
//! # Architecture
//!
//! - [`LinkExtractor`] - finds resource items in markup and runs the anchor cascade
//! - [`AnchorStrategy`] / [`AnchorCascade`] - ordered, named anchor heuristics
//! - [`FilenameResolver`] - ordered, named filename heuristics with a guaranteed extension
//! - [`PageRenderer`] - fallback markup source used when a fetch fails
//! - [`Discovery`] - per-page driver: fetch, fallback, empty markers, extraction
//! - [`discover_targets`] / [`TargetSelection`] - index page scanning and selection
//!
//! Markup parsing is synchronous and finishes before any network call, so
//! parsed documents never live across an await point.

mod error;
mod extractor;
mod filename;
mod markup;
mod render;
mod strategy;
mod targets;
mod urls;

pub use error::DiscoveryError;
pub use extractor::{LinkExtractor, PageExtraction};
pub use filename::{
    AnchorTextName, FilenameContext, FilenameResolver, FilenameStrategy, HeaderProbeName,
    QueryParameterName, SiblingTextName, UrlPathName, is_generic_name,
};
pub use render::{CommandRenderer, DEFAULT_RENDER_TIMEOUT_SECS, PageRenderer};
pub use strategy::{
    ActionPhraseStrategy, Anchor, AnchorCascade, AnchorStrategy, DownloadHostStrategy,
    FileExtensionStrategy,
};
pub use targets::{DEFAULT_INDEX_LINK_TEXT, PageTarget, TargetSelection, discover_targets};

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::download::Transport;

/// Default phrases marking an explicit "go to resource" anchor.
pub const DEFAULT_ACTION_PHRASES: [&str; 2] = ["ir para recurso", "go to resource"];

/// Default hosts that only serve downloadable files.
pub const DEFAULT_DOWNLOAD_HOSTS: [&str; 1] = ["cdn.tse.jus.br"];

/// Default path keywords that mark a download endpoint.
pub const DEFAULT_DOWNLOAD_KEYWORDS: [&str; 2] = ["download", "baixar"];

/// Default phrases meaning "page loaded, nothing published".
pub const DEFAULT_EMPTY_MARKERS: [&str; 4] =
    ["não há", "sem dados", "nenhuma publicação", "não existem"];

/// File format derived from the URL path suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceFormat {
    Zip,
    Csv,
    Pdf,
    Txt,
    Xlsx,
    Jpeg,
    Unknown,
}

impl ResourceFormat {
    /// Maps a lowercase extension to a format.
    #[must_use]
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "zip" => Self::Zip,
            "csv" => Self::Csv,
            "pdf" => Self::Pdf,
            "txt" => Self::Txt,
            "xlsx" | "xls" => Self::Xlsx,
            "jpg" | "jpeg" => Self::Jpeg,
            _ => Self::Unknown,
        }
    }

    /// Preferred extension for synthesized names.
    #[must_use]
    pub fn extension(self) -> Option<&'static str> {
        match self {
            Self::Zip => Some("zip"),
            Self::Csv => Some("csv"),
            Self::Pdf => Some("pdf"),
            Self::Txt => Some("txt"),
            Self::Xlsx => Some("xlsx"),
            Self::Jpeg => Some("jpg"),
            Self::Unknown => None,
        }
    }

    /// Display label (`ZIP`, `CSV`, ...).
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Zip => "ZIP",
            Self::Csv => "CSV",
            Self::Pdf => "PDF",
            Self::Txt => "TXT",
            Self::Xlsx => "XLSX",
            Self::Jpeg => "JPEG",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// One discoverable downloadable unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Human label as found on the page; may be empty.
    pub title: String,
    /// Absolute URL.
    pub url: String,
    /// Resolved filename with a recognized extension.
    pub filename: String,
    /// Format from the URL path suffix.
    pub format: ResourceFormat,
    /// Size announced in the page text, in bytes.
    pub declared_size: Option<u64>,
}

/// Heuristic vocabulary used by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Visible-text phrases of explicit "go to resource" anchors (lowercase).
    pub action_phrases: Vec<String>,
    /// Hosts that only serve downloadable files.
    pub download_hosts: Vec<String>,
    /// Path keywords marking a download endpoint.
    pub download_keywords: Vec<String>,
    /// Phrases meaning "nothing published on this page" (lowercase).
    pub empty_markers: Vec<String>,
    /// Extension appended when nothing else names one.
    pub default_extension: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            action_phrases: to_strings(&DEFAULT_ACTION_PHRASES),
            download_hosts: to_strings(&DEFAULT_DOWNLOAD_HOSTS),
            download_keywords: to_strings(&DEFAULT_DOWNLOAD_KEYWORDS),
            empty_markers: to_strings(&DEFAULT_EMPTY_MARKERS),
            default_extension: "pdf".to_string(),
        }
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

/// Outcome of discovering one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageDiscovery {
    /// Page loaded and says nothing is published.
    Empty {
        /// The marker that matched.
        marker: String,
    },
    /// Extraction result (possibly with zero resources).
    Resources(PageExtraction),
}

/// Per-page discovery driver.
pub struct Discovery {
    transport: Arc<dyn Transport>,
    extractor: LinkExtractor,
    renderer: Option<Arc<dyn PageRenderer>>,
    empty_markers: Vec<String>,
}

impl Discovery {
    /// Creates a driver without a fallback renderer.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, config: DiscoveryConfig) -> Self {
        let empty_markers = config
            .empty_markers
            .iter()
            .map(|m| m.trim().to_lowercase())
            .filter(|m| !m.is_empty())
            .collect();
        Self {
            transport,
            extractor: LinkExtractor::new(config),
            renderer: None,
            empty_markers,
        }
    }

    /// Adds the fallback renderer.
    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Discovers the resources listed on `target`.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::Unreachable`] when neither the fetch nor the
    /// renderer produced markup, and [`DiscoveryError::InvalidBaseUrl`] when
    /// the page URL cannot anchor relative links.
    #[instrument(skip(self), fields(key = %target.group_key, url = %target.url))]
    pub async fn discover(&self, target: &PageTarget) -> Result<PageDiscovery, DiscoveryError> {
        let (markup, base_url) = self.load(target).await?;

        let extraction = self
            .extractor
            .extract(self.transport.as_ref(), &markup, &base_url)
            .await?;

        if extraction.resources.is_empty() {
            let text = markup::page_text_lower(&markup);
            if let Some(marker) = self.empty_markers.iter().find(|m| text.contains(m.as_str())) {
                info!(marker = %marker, "Page reports no publications");
                return Ok(PageDiscovery::Empty {
                    marker: marker.clone(),
                });
            }
            warn!("No resources found on page");
        } else {
            info!(resources = extraction.resources.len(), "Resources discovered");
        }
        Ok(PageDiscovery::Resources(extraction))
    }

    async fn load(&self, target: &PageTarget) -> Result<(String, String), DiscoveryError> {
        let fetch_error = match self.transport.fetch_page(&target.url).await {
            Ok(page) if !page.markup.trim().is_empty() => {
                return Ok((page.markup, page.final_url));
            }
            Ok(page) => {
                debug!("Fetched page is blank");
                if self.renderer.is_none() {
                    return Ok((page.markup, page.final_url));
                }
                None
            }
            Err(err) => {
                warn!(error = %err, "Page fetch failed");
                Some(err)
            }
        };

        let Some(renderer) = &self.renderer else {
            return Err(unreachable_error(target, fetch_error));
        };

        info!(renderer = renderer.name(), "Falling back to page renderer");
        match renderer.render(target).await {
            Ok(markup) => Ok((markup, target.url.clone())),
            Err(err) => {
                warn!(error = %err, "Fallback renderer failed");
                Err(unreachable_error(target, fetch_error))
            }
        }
    }
}

fn unreachable_error(
    target: &PageTarget,
    fetch_error: Option<crate::download::DownloadError>,
) -> DiscoveryError {
    match fetch_error {
        Some(source) => DiscoveryError::unreachable(&target.url, source),
        None => DiscoveryError::blank(&target.url),
    }
}

impl std::fmt::Debug for Discovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Discovery")
            .field("extractor", &self.extractor)
            .field("renderer", &self.renderer.as_ref().map(|r| r.name().to_string()))
            .field("empty_markers", &self.empty_markers)
            .finish_non_exhaustive()
    }
}
