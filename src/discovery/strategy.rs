//! Anchor selection strategies.
//!
//! A resource item usually carries several anchors: a title link to an
//! intermediate page, a preview link, the real file link. Strategies are
//! tried in order and the first one that picks an anchor wins.

use url::Url;

use super::DiscoveryConfig;
use super::urls::{is_download_endpoint, points_at_file};

/// A resolved anchor inside one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    /// Absolute URL.
    pub url: Url,
    /// Visible text, whitespace collapsed.
    pub text: String,
}

/// One named anchor heuristic.
pub trait AnchorStrategy: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Picks an anchor, or `None` when this heuristic does not apply.
    fn select<'a>(&self, anchors: &'a [Anchor]) -> Option<&'a Anchor>;
}

/// Anchor whose visible text contains an explicit action phrase.
#[derive(Debug, Clone)]
pub struct ActionPhraseStrategy {
    phrases: Vec<String>,
}

impl ActionPhraseStrategy {
    /// Creates the strategy; phrases are matched case-insensitively.
    #[must_use]
    pub fn new(phrases: &[String]) -> Self {
        Self {
            phrases: phrases.iter().map(|p| p.to_lowercase()).collect(),
        }
    }
}

impl AnchorStrategy for ActionPhraseStrategy {
    fn name(&self) -> &'static str {
        "action-phrase"
    }

    fn select<'a>(&self, anchors: &'a [Anchor]) -> Option<&'a Anchor> {
        anchors.iter().find(|anchor| {
            let text = anchor.text.to_lowercase();
            self.phrases.iter().any(|p| text.contains(p.as_str()))
        })
    }
}

/// Anchor whose URL path or query names a recognized file.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileExtensionStrategy;

impl AnchorStrategy for FileExtensionStrategy {
    fn name(&self) -> &'static str {
        "file-extension"
    }

    fn select<'a>(&self, anchors: &'a [Anchor]) -> Option<&'a Anchor> {
        anchors.iter().find(|anchor| points_at_file(&anchor.url))
    }
}

/// Anchor pointing at a known download host or download endpoint.
#[derive(Debug, Clone)]
pub struct DownloadHostStrategy {
    hosts: Vec<String>,
    keywords: Vec<String>,
}

impl DownloadHostStrategy {
    /// Creates the strategy.
    #[must_use]
    pub fn new(hosts: &[String], keywords: &[String]) -> Self {
        Self {
            hosts: hosts.to_vec(),
            keywords: keywords.to_vec(),
        }
    }
}

impl AnchorStrategy for DownloadHostStrategy {
    fn name(&self) -> &'static str {
        "download-host"
    }

    fn select<'a>(&self, anchors: &'a [Anchor]) -> Option<&'a Anchor> {
        anchors
            .iter()
            .find(|anchor| is_download_endpoint(&anchor.url, &self.hosts, &self.keywords))
    }
}

/// Ordered strategy list.
pub struct AnchorCascade {
    strategies: Vec<Box<dyn AnchorStrategy>>,
}

impl AnchorCascade {
    /// Creates an empty cascade.
    #[must_use]
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Builds the standard order: action phrase, file extension, download host.
    #[must_use]
    pub fn from_config(config: &DiscoveryConfig) -> Self {
        let mut cascade = Self::new();
        cascade.register(Box::new(ActionPhraseStrategy::new(&config.action_phrases)));
        cascade.register(Box::new(FileExtensionStrategy));
        cascade.register(Box::new(DownloadHostStrategy::new(
            &config.download_hosts,
            &config.download_keywords,
        )));
        cascade
    }

    /// Appends a strategy at the lowest priority.
    pub fn register(&mut self, strategy: Box<dyn AnchorStrategy>) {
        self.strategies.push(strategy);
    }

    /// Runs the strategies in order; returns the winner's name and anchor.
    #[must_use]
    pub fn choose<'a>(&self, anchors: &'a [Anchor]) -> Option<(&'static str, &'a Anchor)> {
        self.strategies
            .iter()
            .find_map(|strategy| strategy.select(anchors).map(|a| (strategy.name(), a)))
    }

    /// Strategy names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }
}

impl Default for AnchorCascade {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AnchorCascade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnchorCascade")
            .field("strategies", &self.names())
            .finish()
    }
}
