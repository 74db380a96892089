//! Index page scanning and page-target selection.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};
use url::Url;

use super::DiscoveryError;
use super::markup;
use super::urls::{compile_static_regex, resolve_href};

/// Default anchor text that marks a per-year page on the index.
pub const DEFAULT_INDEX_LINK_TEXT: &str = "Candidatos";

static YEAR_VALUE_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"\b(19|20)\d{2}\b"));

/// One listing page to process.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageTarget {
    /// Grouping key (e.g. a year); used as the output subdirectory.
    pub group_key: String,
    /// Absolute page URL.
    pub url: String,
}

impl PageTarget {
    /// Creates a target.
    #[must_use]
    pub fn new(group_key: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            group_key: group_key.into(),
            url: url.into(),
        }
    }
}

/// Scans an index page for per-year links.
///
/// An anchor qualifies when its text contains `link_text` (case-insensitive)
/// and a year. The first link per year wins; results are newest first.
///
/// # Errors
///
/// Returns [`DiscoveryError::InvalidBaseUrl`] when `base_url` is not absolute.
pub fn discover_targets(
    markup: &str,
    base_url: &str,
    link_text: &str,
) -> Result<Vec<PageTarget>, DiscoveryError> {
    let base = Url::parse(base_url).map_err(|_| DiscoveryError::invalid_base_url(base_url))?;
    let needle = link_text.trim().to_lowercase();

    let mut seen = HashSet::new();
    let mut targets: Vec<PageTarget> = markup::page_anchors(markup)
        .into_iter()
        .filter(|a| a.text.to_lowercase().contains(&needle))
        .filter_map(|a| {
            let year = YEAR_VALUE_RE.find(&a.text)?.as_str().to_string();
            let url = resolve_href(&a.href, &base)?;
            seen.insert(year.clone())
                .then(|| PageTarget::new(year, url.to_string()))
        })
        .collect();

    targets.sort_by(|a, b| b.group_key.cmp(&a.group_key));
    debug!(count = targets.len(), "Index targets discovered");
    Ok(targets)
}

/// Which of the discovered targets to process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSelection {
    /// Every target.
    All,
    /// The N most recent targets.
    Last(usize),
    /// 1-based positions in the newest-first list.
    Indices(Vec<usize>),
}

impl FromStr for TargetSelection {
    type Err = DiscoveryError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let value = input.trim().to_lowercase();
        if value.is_empty() {
            return Err(DiscoveryError::invalid_selection(input, "empty selection"));
        }
        if value == "all" || value == "a" {
            return Ok(Self::All);
        }

        let last_count = value
            .strip_prefix("last:")
            .or_else(|| value.strip_prefix("last "))
            .or_else(|| value.strip_prefix("l "));
        if let Some(count) = last_count {
            let n: usize = count
                .trim()
                .parse()
                .map_err(|_| DiscoveryError::invalid_selection(input, "expected a count after 'last'"))?;
            if n == 0 {
                return Err(DiscoveryError::invalid_selection(input, "count must be at least 1"));
            }
            return Ok(Self::Last(n));
        }

        let indices = value
            .split(',')
            .map(|part| match part.trim().parse::<usize>() {
                Ok(0) | Err(_) => Err(DiscoveryError::invalid_selection(
                    input,
                    format!("'{}' is not a 1-based position", part.trim()),
                )),
                Ok(n) => Ok(n),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::Indices(indices))
    }
}

impl TargetSelection {
    /// Applies the selection to a newest-first target list.
    ///
    /// Out-of-range positions are skipped with a warning; repeated positions
    /// are processed once.
    #[must_use]
    pub fn apply(&self, targets: &[PageTarget]) -> Vec<PageTarget> {
        match self {
            Self::All => targets.to_vec(),
            Self::Last(n) => targets.iter().take(*n).cloned().collect(),
            Self::Indices(positions) => {
                let mut picked = HashSet::new();
                positions
                    .iter()
                    .filter_map(|&position| {
                        let target = position.checked_sub(1).and_then(|i| targets.get(i));
                        if target.is_none() {
                            warn!(position, available = targets.len(), "Selection position out of range");
                        }
                        target.filter(|_| picked.insert(position)).cloned()
                    })
                    .collect()
            }
        }
    }
}
