//! Discovery error types.

use thiserror::Error;

use crate::download::DownloadError;

/// Errors produced while turning pages into resources.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The page could not be fetched and no fallback produced markup.
    #[error("page unreachable: {url}\n  Cause: {source}")]
    Unreachable {
        /// Page URL.
        url: String,
        /// The fetch failure.
        #[source]
        source: DownloadError,
    },

    /// The page loaded blank and the fallback renderer failed too.
    #[error("page {url} returned no markup")]
    Blank {
        /// Page URL.
        url: String,
    },

    /// The fallback renderer failed.
    #[error("renderer '{renderer}' failed for {url}: {reason}")]
    RenderFailed {
        /// Renderer name.
        renderer: String,
        /// Page URL.
        url: String,
        /// What went wrong.
        reason: String,
    },

    /// The page URL cannot serve as a base for relative links.
    #[error("invalid page URL: {url}")]
    InvalidBaseUrl {
        /// The rejected URL.
        url: String,
    },

    /// A resource item had no anchor any strategy accepted.
    #[error("item {item} ('{title}') has no usable download link")]
    NoUsableLink {
        /// Zero-based position of the item on the page.
        item: usize,
        /// Item title, possibly empty.
        title: String,
    },

    /// A target selection string could not be parsed.
    #[error("invalid selection '{input}': {reason}")]
    InvalidSelection {
        /// Raw selection text.
        input: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl DiscoveryError {
    /// Creates an unreachable-page error.
    #[must_use]
    pub fn unreachable(url: impl Into<String>, source: DownloadError) -> Self {
        Self::Unreachable {
            url: url.into(),
            source,
        }
    }

    /// Creates a blank-page error.
    #[must_use]
    pub fn blank(url: impl Into<String>) -> Self {
        Self::Blank { url: url.into() }
    }

    /// Creates a renderer failure.
    #[must_use]
    pub fn render_failed(
        renderer: impl Into<String>,
        url: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::RenderFailed {
            renderer: renderer.into(),
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid base URL error.
    #[must_use]
    pub fn invalid_base_url(url: impl Into<String>) -> Self {
        Self::InvalidBaseUrl { url: url.into() }
    }

    /// Creates a no-usable-link diagnostic.
    #[must_use]
    pub fn no_usable_link(item: usize, title: impl Into<String>) -> Self {
        Self::NoUsableLink {
            item,
            title: title.into(),
        }
    }

    /// Creates a selection parse error.
    #[must_use]
    pub fn invalid_selection(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSelection {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Returns true when the page itself could not be obtained.
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable { .. } | Self::Blank { .. })
    }
}
