//! URL heuristics shared by the anchor and filename strategies.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::download::filename::has_recognized_extension;

use super::ResourceFormat;

/// Compiles a regex at static init; panics on invalid pattern.
pub(crate) fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

/// A size announced in page text, e.g. `12,5 MB` or `800 kb`.
static DECLARED_SIZE_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?i)\b(\d+(?:[.,]\d+)?)\s*(kb|mb|gb)\b"));

/// Trailing characters that leak into scraped hrefs.
const HREF_ARTIFACTS: &[char] = &['.', ',', ';'];

/// Strips whitespace and trailing punctuation artifacts from a raw href.
#[must_use]
pub(crate) fn clean_href(raw: &str) -> &str {
    raw.trim().trim_end_matches(|c: char| HREF_ARTIFACTS.contains(&c) || c.is_whitespace())
}

/// Resolves `raw` against `base`; rejects fragments, script and mail links.
#[must_use]
pub(crate) fn resolve_href(raw: &str, base: &Url) -> Option<Url> {
    let href = clean_href(raw);
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let lower = href.to_ascii_lowercase();
    if lower.starts_with("javascript:") || lower.starts_with("mailto:") || lower.starts_with("tel:") {
        return None;
    }
    let resolved = base.join(href).ok()?;
    matches!(resolved.scheme(), "http" | "https").then_some(resolved)
}

/// Last path segment, percent-decoded.
#[must_use]
pub(crate) fn last_segment(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.rev().find(|s| !s.is_empty())?;
    let decoded = urlencoding::decode(segment).map_or_else(|_| segment.to_string(), |d| d.into_owned());
    Some(decoded)
}

/// True when the path, or any query value, ends with a recognized extension.
#[must_use]
pub(crate) fn points_at_file(url: &Url) -> bool {
    if last_segment(url).is_some_and(|s| has_recognized_extension(&s)) {
        return true;
    }
    url.query_pairs().any(|(_, value)| has_recognized_extension(value.trim()))
}

/// True when the host is a download host or the path or query carries a
/// download keyword (`sead.do?action=download&id=4`).
#[must_use]
pub(crate) fn is_download_endpoint(url: &Url, hosts: &[String], keywords: &[String]) -> bool {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    if hosts.iter().any(|h| host == h.to_ascii_lowercase()) {
        return true;
    }
    let path = url.path().to_ascii_lowercase();
    let query = url.query().unwrap_or_default().to_ascii_lowercase();
    keywords.iter().map(|k| k.to_ascii_lowercase()).any(|k| path.contains(&k) || query.contains(&k))
}

/// True for intermediate resource pages that list the real file link.
#[must_use]
pub(crate) fn looks_like_resource_page(url: &Url, hosts: &[String], keywords: &[String]) -> bool {
    if points_at_file(url) || is_download_endpoint(url, hosts, keywords) {
        return false;
    }
    let path = url.path().to_ascii_lowercase();
    ["dataset", "resource", "recurso"].iter().any(|k| path.contains(k))
}

/// Format from the URL path suffix.
#[must_use]
pub(crate) fn format_of(url: &Url) -> ResourceFormat {
    last_segment(url)
        .and_then(|s| s.rsplit_once('.').map(|(_, ext)| ResourceFormat::from_extension(ext)))
        .unwrap_or(ResourceFormat::Unknown)
}

/// Parses the first size mention in `text` into bytes (1024 base).
#[must_use]
pub(crate) fn declared_size(text: &str) -> Option<u64> {
    let caps = DECLARED_SIZE_RE.captures(text)?;
    let value: f64 = caps.get(1)?.as_str().replace(',', ".").parse().ok()?;
    let multiplier: f64 = match caps.get(2)?.as_str().to_ascii_lowercase().as_str() {
        "kb" => 1024.0,
        "mb" => 1024.0 * 1024.0,
        "gb" => 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Some((value * multiplier).round() as u64)
}

/// True when `text` is nothing but a size mention such as `2 MB` or `(800 kb)`.
#[must_use]
pub(crate) fn is_bare_size(text: &str) -> bool {
    DECLARED_SIZE_RE.is_match(text)
        && DECLARED_SIZE_RE
            .replace_all(text, "")
            .chars()
            .all(|c| !c.is_alphanumeric())
}
