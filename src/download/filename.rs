//! Filename helpers shared by discovery and storage.
//!
//! Covers the extension allow-list, Content-Disposition parsing, disk-safe
//! sanitisation and per-directory de-duplication of storage names.

use std::collections::HashSet;
use std::path::{Component, Path};

/// Extensions accepted as "a real file", lowercase, without the dot.
pub const RECOGNIZED_EXTENSIONS: [&str; 8] = ["zip", "csv", "pdf", "txt", "xlsx", "xls", "jpg", "jpeg"];

/// Returns the lowercase recognized extension of `name`, if any.
#[must_use]
pub fn recognized_extension(name: &str) -> Option<&'static str> {
    let (_, ext) = name.rsplit_once('.')?;
    let ext = ext.trim().to_ascii_lowercase();
    RECOGNIZED_EXTENSIONS
        .iter()
        .copied()
        .find(|candidate| *candidate == ext)
}

/// Returns true when `name` ends with a recognized extension.
#[must_use]
pub fn has_recognized_extension(name: &str) -> bool {
    recognized_extension(name).is_some()
}

/// Splits `name` into stem and extension when it carries a short alphanumeric extension.
#[must_use]
pub fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            (stem, Some(ext))
        }
        _ => (name, None),
    }
}

/// Maps a Content-Type to a recognized extension.
#[must_use]
pub fn extension_from_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    match mime.as_str() {
        "application/pdf" => Some("pdf"),
        "application/zip" | "application/x-zip-compressed" => Some("zip"),
        "text/csv" => Some("csv"),
        "text/plain" => Some("txt"),
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => Some("xlsx"),
        "application/vnd.ms-excel" => Some("xls"),
        "image/jpeg" => Some("jpg"),
        _ => None,
    }
}

/// Parses a Content-Disposition header to extract the filename.
///
/// Handles:
/// - `attachment; filename="example.pdf"`
/// - `attachment; filename=example.pdf`
/// - `attachment; filename*=UTF-8''example.pdf` (RFC 5987)
#[must_use]
pub fn parse_content_disposition(header: &str) -> Option<String> {
    let lower = header.to_ascii_lowercase();

    if let Some(pos) = lower.find("filename*=") {
        let value = header[pos + 10..].trim();
        if let Some(quote_pos) = value.find("''") {
            let encoded = &value[quote_pos + 2..];
            let end = encoded.find(';').unwrap_or(encoded.len());
            let encoded_name = encoded[..end].trim().trim_matches('"');
            if let Ok(decoded) = urlencoding::decode(encoded_name)
                && !decoded.trim().is_empty()
            {
                return Some(decoded.trim().to_string());
            }
        }
    }

    let mut search_from = 0;
    while let Some(offset) = lower[search_from..].find("filename=") {
        let pos = search_from + offset;
        search_from = pos + 9;
        // Skip the tail of `filename*=`.
        if pos > 0 && lower.as_bytes()[pos - 1] == b'*' {
            continue;
        }
        let value = header[pos + 9..].trim();
        let filename = if let Some(stripped) = value.strip_prefix('"') {
            stripped.find('"').map(|end| &stripped[..end])
        } else if let Some(stripped) = value.strip_prefix('\'') {
            stripped.find('\'').map(|end| &stripped[..end])
        } else {
            let end = value.find(';').unwrap_or(value.len());
            Some(value[..end].trim())
        };
        if let Some(name) = filename.map(str::trim).filter(|n| !n.is_empty()) {
            return Some(name.to_string());
        }
    }

    None
}

/// Reduces a filename to alphanumerics, space, `.`, `_` and `-`.
///
/// Never returns an empty string or a path-traversal segment.
#[must_use]
pub fn storage_name(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '.' | '_' | '-'))
        .collect();
    let trimmed = kept.trim().trim_start_matches('.').trim();
    if trimmed.is_empty() || !is_safe_filename_segment(trimmed) {
        return "documento".to_string();
    }
    trimmed.to_string()
}

/// Returns `name`, or `stem_N.ext` (N from 2) when `name` was already used.
///
/// Comparison is case-insensitive so the result is stable on case-folding
/// filesystems.
pub fn unique_name(used: &mut HashSet<String>, name: &str) -> String {
    if used.insert(name.to_lowercase()) {
        return name.to_string();
    }
    let (stem, ext) = split_extension(name);
    let ext = ext.map(|e| format!(".{e}")).unwrap_or_default();
    let mut suffix = 2_usize;
    loop {
        let candidate = format!("{stem}_{suffix}{ext}");
        if used.insert(candidate.to_lowercase()) {
            return candidate;
        }
        suffix += 1;
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_recognized_extension_is_case_insensitive() {
        assert_eq!(recognized_extension("Dados.ZIP"), Some("zip"));
        assert_eq!(recognized_extension("foto.JPEG"), Some("jpeg"));
        assert_eq!(recognized_extension("page.html"), None);
        assert_eq!(recognized_extension("noext"), None);
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("download.php"), ("download", Some("php")));
        assert_eq!(split_extension("archive"), ("archive", None));
        assert_eq!(split_extension("v1.2 release notes"), ("v1.2 release notes", None));
        assert_eq!(split_extension(".hidden"), (".hidden", None));
    }

    #[test]
    fn test_extension_from_content_type() {
        assert_eq!(extension_from_content_type("application/pdf"), Some("pdf"));
        assert_eq!(extension_from_content_type("text/csv; charset=utf-8"), Some("csv"));
        assert_eq!(extension_from_content_type("text/html"), None);
    }

    #[test]
    fn test_parse_content_disposition_quoted() {
        assert_eq!(
            parse_content_disposition(r#"attachment; filename="edital 12.pdf""#),
            Some("edital 12.pdf".to_string())
        );
    }

    #[test]
    fn test_parse_content_disposition_unquoted() {
        assert_eq!(
            parse_content_disposition("attachment; filename=dados.zip; size=10"),
            Some("dados.zip".to_string())
        );
    }

    #[test]
    fn test_parse_content_disposition_rfc5987() {
        assert_eq!(
            parse_content_disposition("attachment; filename*=UTF-8''publica%C3%A7%C3%A3o.pdf"),
            Some("publicação.pdf".to_string())
        );
    }

    #[test]
    fn test_parse_content_disposition_missing() {
        assert_eq!(parse_content_disposition("inline"), None);
        assert_eq!(parse_content_disposition("attachment; filename=\"\""), None);
    }

    #[test]
    fn test_storage_name_drops_unsafe_characters() {
        assert_eq!(storage_name("Edital 045/2024.pdf"), "Edital 0452024.pdf");
        assert_eq!(storage_name("a:b*c?.csv"), "abc.csv");
        assert_eq!(storage_name("relatório_final-v2.pdf"), "relatório_final-v2.pdf");
    }

    #[test]
    fn test_storage_name_never_empty_or_traversal() {
        assert_eq!(storage_name("///"), "documento");
        assert_eq!(storage_name(".."), "documento");
        assert_eq!(storage_name("../etc.pdf"), "etc.pdf");
    }

    #[test]
    fn test_unique_name_adds_suffix() {
        let mut used = HashSet::new();
        assert_eq!(unique_name(&mut used, "documento.pdf"), "documento.pdf");
        assert_eq!(unique_name(&mut used, "documento.pdf"), "documento_2.pdf");
        assert_eq!(unique_name(&mut used, "DOCUMENTO.pdf"), "DOCUMENTO_3.pdf");
        assert_eq!(unique_name(&mut used, "other.pdf"), "other.pdf");
    }
}
