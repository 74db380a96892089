//! Filename resolution for discovered resources.
//!
//! Strategies run in order; a candidate that is empty or only a generic
//! action word ("download", "visualizar", ...) is rejected and the next
//! strategy is tried. Whatever wins is guaranteed a recognized extension.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::OnceCell;
use tracing::debug;
use url::Url;

use crate::download::filename::{
    extension_from_content_type, has_recognized_extension, parse_content_disposition,
    split_extension,
};
use crate::download::{ProbeHeaders, Transport};

use super::urls::{compile_static_regex, format_of, is_bare_size};

/// Query parameter names that commonly carry the real filename.
const NAME_PARAMETERS: [&str; 5] = ["arquivo", "file", "filename", "nome", "documento"];

/// Link labels that say what to do, not what the file is.
const GENERIC_WORDS: [&str; 12] = [
    "download",
    "baixar",
    "visualizar",
    "ver",
    "view",
    "abrir",
    "open",
    "acessar",
    "ir para recurso",
    "go to resource",
    "clique aqui",
    "click here",
];

/// Sibling texts shorter than this are labels, not names.
const MIN_SIBLING_TEXT_CHARS: usize = 6;

/// Sibling texts longer than this are descriptions, not names.
const MAX_SIBLING_TEXT_CHARS: usize = 160;

const FALLBACK_STEM: &str = "documento";

static PATH_FILE_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r"(?i)([^/]+\.(?:zip|csv|pdf|txt|xlsx|xls|jpe?g))(?:/|$)")
});

static TEXT_FILE_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r"(?i)[\w\-.()]+\.(?:zip|csv|pdf|txt|xlsx|xls|jpe?g)\b")
});

/// True when `name` is empty or its stem is a generic action word.
#[must_use]
pub fn is_generic_name(name: &str) -> bool {
    let trimmed = name.trim();
    if trimmed.strip_prefix('.').is_some_and(|rest| !rest.contains('.')) {
        return true;
    }
    let (stem, _) = split_extension(trimmed);
    let stem = stem
        .trim()
        .trim_matches(|c: char| c.is_ascii_punctuation())
        .trim()
        .to_lowercase();
    stem.is_empty() || GENERIC_WORDS.contains(&stem.as_str())
}

/// Evidence available for one resource.
///
/// The header probe is issued at most once and only when a strategy asks for it.
pub struct FilenameContext<'a> {
    /// Resolved resource URL.
    pub url: &'a Url,
    /// Visible text of the chosen anchor.
    pub anchor_text: &'a str,
    /// Text blocks around the anchor, in document order.
    pub sibling_texts: &'a [String],
    transport: &'a dyn Transport,
    probe: OnceCell<Option<ProbeHeaders>>,
}

impl<'a> FilenameContext<'a> {
    /// Creates a context; nothing is fetched yet.
    #[must_use]
    pub fn new(
        url: &'a Url,
        anchor_text: &'a str,
        sibling_texts: &'a [String],
        transport: &'a dyn Transport,
    ) -> Self {
        Self {
            url,
            anchor_text,
            sibling_texts,
            transport,
            probe: OnceCell::new(),
        }
    }

    /// Probes the URL once; a failed probe yields `None`.
    pub async fn probe(&self) -> Option<&ProbeHeaders> {
        self.probe
            .get_or_init(|| async {
                match self.transport.probe(self.url.as_str()).await {
                    Ok(headers) => Some(headers),
                    Err(err) => {
                        debug!(url = %self.url, error = %err, "Header probe failed");
                        None
                    }
                }
            })
            .await
            .as_ref()
    }

    fn probed_content_type(&self) -> Option<&str> {
        self.probe.get()?.as_ref()?.content_type.as_deref()
    }
}

/// One named filename heuristic.
#[async_trait]
pub trait FilenameStrategy: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Proposes a raw filename, or `None`.
    async fn candidate(&self, ctx: &FilenameContext<'_>) -> Option<String>;
}

/// `?arquivo=Edital.pdf` style parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryParameterName;

#[async_trait]
impl FilenameStrategy for QueryParameterName {
    fn name(&self) -> &'static str {
        "query-parameter"
    }

    async fn candidate(&self, ctx: &FilenameContext<'_>) -> Option<String> {
        ctx.url.query_pairs().find_map(|(key, value)| {
            let key = key.to_ascii_lowercase();
            let value = value.trim();
            (NAME_PARAMETERS.contains(&key.as_str()) && has_recognized_extension(value)).then(
                || {
                    value
                        .rsplit(['/', '\\'])
                        .next()
                        .unwrap_or(value)
                        .to_string()
                },
            )
        })
    }
}

/// File-looking token in the URL path.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlPathName;

#[async_trait]
impl FilenameStrategy for UrlPathName {
    fn name(&self) -> &'static str {
        "url-path"
    }

    async fn candidate(&self, ctx: &FilenameContext<'_>) -> Option<String> {
        let path = ctx.url.path();
        let decoded = urlencoding::decode(path).map_or_else(|_| path.to_string(), |d| d.into_owned());
        // Script endpoints such as `arquivo.do` or `get.php` are not names.
        PATH_FILE_TOKEN_RE
            .captures(&decoded)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }
}

/// File-looking text next to the anchor.
#[derive(Debug, Clone, Copy, Default)]
pub struct SiblingTextName;

impl SiblingTextName {
    fn file_token(text: &str) -> Option<String> {
        if has_recognized_extension(text) {
            return Some(text.to_string());
        }
        TEXT_FILE_TOKEN_RE.find(text).map(|m| m.as_str().to_string())
    }

    fn plausible_title(text: &str) -> bool {
        let chars = text.chars().count();
        (MIN_SIBLING_TEXT_CHARS..=MAX_SIBLING_TEXT_CHARS).contains(&chars)
            && !is_generic_name(text)
            && !is_bare_size(text)
    }
}

#[async_trait]
impl FilenameStrategy for SiblingTextName {
    fn name(&self) -> &'static str {
        "sibling-text"
    }

    async fn candidate(&self, ctx: &FilenameContext<'_>) -> Option<String> {
        let texts = || ctx.sibling_texts.iter().map(|t| t.trim()).filter(|t| !t.is_empty());
        texts()
            .find_map(Self::file_token)
            .or_else(|| texts().find(|t| Self::plausible_title(t)).map(str::to_string))
    }
}

/// `Content-Disposition` from a HEAD probe.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderProbeName;

#[async_trait]
impl FilenameStrategy for HeaderProbeName {
    fn name(&self) -> &'static str {
        "header-probe"
    }

    async fn candidate(&self, ctx: &FilenameContext<'_>) -> Option<String> {
        ctx.probe()
            .await?
            .content_disposition
            .as_deref()
            .and_then(parse_content_disposition)
    }
}

/// The anchor's own label.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnchorTextName;

#[async_trait]
impl FilenameStrategy for AnchorTextName {
    fn name(&self) -> &'static str {
        "anchor-text"
    }

    async fn candidate(&self, ctx: &FilenameContext<'_>) -> Option<String> {
        let text = ctx.anchor_text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

/// Ordered filename strategies plus the extension guarantee.
pub struct FilenameResolver {
    strategies: Vec<Box<dyn FilenameStrategy>>,
    default_extension: String,
}

impl FilenameResolver {
    /// Creates a resolver with no strategies.
    #[must_use]
    pub fn new(default_extension: impl Into<String>) -> Self {
        Self {
            strategies: Vec::new(),
            default_extension: default_extension.into(),
        }
    }

    /// Builds the standard order: query parameter, URL path, sibling text,
    /// header probe, anchor text.
    #[must_use]
    pub fn standard(default_extension: impl Into<String>) -> Self {
        let mut resolver = Self::new(default_extension);
        resolver.register(Box::new(QueryParameterName));
        resolver.register(Box::new(UrlPathName));
        resolver.register(Box::new(SiblingTextName));
        resolver.register(Box::new(HeaderProbeName));
        resolver.register(Box::new(AnchorTextName));
        resolver
    }

    /// Appends a strategy at the lowest priority.
    pub fn register(&mut self, strategy: Box<dyn FilenameStrategy>) {
        self.strategies.push(strategy);
    }

    /// Strategy names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Picks the most specific name; never empty, never a bare action word,
    /// always ending in a recognized extension.
    pub async fn resolve(&self, ctx: &FilenameContext<'_>) -> String {
        for strategy in &self.strategies {
            let Some(raw) = strategy.candidate(ctx).await else {
                continue;
            };
            let name = tidy(&raw);
            if is_generic_name(&name) {
                debug!(strategy = strategy.name(), candidate = %name, "Generic filename rejected");
                continue;
            }
            debug!(strategy = strategy.name(), filename = %name, "Filename resolved");
            return self.with_extension(name, ctx);
        }
        debug!(url = %ctx.url, "No specific filename; using fallback");
        self.with_extension(FALLBACK_STEM.to_string(), ctx)
    }

    fn with_extension(&self, name: String, ctx: &FilenameContext<'_>) -> String {
        if has_recognized_extension(&name) {
            return name;
        }
        let ext = format_of(ctx.url)
            .extension()
            .or_else(|| ctx.probed_content_type().and_then(extension_from_content_type))
            .unwrap_or(self.default_extension.as_str());
        format!("{}.{ext}", name.trim_end_matches('.'))
    }
}

impl std::fmt::Debug for FilenameResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilenameResolver")
            .field("strategies", &self.names())
            .field("default_extension", &self.default_extension)
            .finish()
    }
}

/// Percent-decodes, drops control characters and surrounding quotes.
fn tidy(raw: &str) -> String {
    let decoded = urlencoding::decode(raw).map_or_else(|_| raw.to_string(), |d| d.into_owned());
    decoded
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_string()
}
