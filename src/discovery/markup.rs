//! Synchronous markup scanning.
//!
//! Every function here parses, copies what it needs into owned values, and
//! drops the document before returning. `scraper::Html` is not `Send`.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Node, Selector};

/// Parses a static selector; panics on invalid syntax.
fn compile_static_selector(selector: &str) -> Selector {
    Selector::parse(selector).unwrap_or_else(|e| panic!("invalid static selector '{selector}': {e}"))
}

static ITEM_SEL: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("li, tr"));
static ROW_SEL: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("tr"));
static ANCHOR_SEL: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("a[href]"));
static HEADING_SEL: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("[class*=heading], h1, h2, h3, h4, h5, h6"));
static BODY_SEL: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("body"));

/// An anchor as written in the markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawAnchor {
    pub href: String,
    pub text: String,
}

/// One resource item (list entry or table row).
#[derive(Debug, Clone, Default)]
pub(crate) struct RawItem {
    pub anchors: Vec<RawAnchor>,
    pub heading: Option<String>,
    /// Text blocks around the anchors: cells of a row, children of a list entry.
    pub texts: Vec<String>,
    pub full_text: String,
}

/// Everything extraction needs from a page.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScannedPage {
    pub items: Vec<RawItem>,
    pub anchors: Vec<RawAnchor>,
}

/// Scans resource items and page-wide anchors.
pub(crate) fn scan_page(markup: &str) -> ScannedPage {
    let document = Html::parse_document(markup);
    let items = document
        .select(&ITEM_SEL)
        .filter(|el| is_resource_item(*el))
        .map(scan_item)
        .collect();
    ScannedPage {
        items,
        anchors: collect_anchors(document.root_element()),
    }
}

/// All anchors on a page, in document order.
pub(crate) fn page_anchors(markup: &str) -> Vec<RawAnchor> {
    let document = Html::parse_document(markup);
    collect_anchors(document.root_element())
}

/// Visible page text, lowercased, whitespace collapsed.
pub(crate) fn page_text_lower(markup: &str) -> String {
    let document = Html::parse_document(markup);
    let root = document
        .select(&BODY_SEL)
        .next()
        .unwrap_or_else(|| document.root_element());
    element_text(root).to_lowercase()
}

fn is_resource_item(el: ElementRef<'_>) -> bool {
    match el.value().name() {
        "li" => el
            .value()
            .classes()
            .any(|class| class.to_ascii_lowercase().contains("resource")),
        // Rows wrapping nested tables are layout, not items.
        "tr" => el.select(&ROW_SEL).next().is_none() && !is_header_row(el),
        _ => false,
    }
}

/// A row made only of `th` cells labels the columns.
fn is_header_row(row: ElementRef<'_>) -> bool {
    let mut cells = row
        .children()
        .filter_map(ElementRef::wrap)
        .map(|cell| cell.value().name())
        .filter(|name| matches!(*name, "td" | "th"))
        .peekable();
    cells.peek().is_some() && cells.all(|name| name == "th")
}

fn scan_item(el: ElementRef<'_>) -> RawItem {
    let heading = el
        .select(&HEADING_SEL)
        .map(element_text)
        .find(|text| !text.is_empty());

    let texts = if el.value().name() == "tr" {
        el.children()
            .filter_map(ElementRef::wrap)
            .filter(|cell| matches!(cell.value().name(), "td" | "th"))
            .map(element_text)
            .filter(|text| !text.is_empty())
            .collect()
    } else {
        el.children()
            .filter_map(|child| match child.value() {
                Node::Text(text) => Some(collapse(text)),
                Node::Element(_) => ElementRef::wrap(child).map(element_text),
                _ => None,
            })
            .filter(|text| !text.is_empty())
            .collect()
    };

    RawItem {
        anchors: collect_anchors(el),
        heading,
        texts,
        full_text: element_text(el),
    }
}

fn collect_anchors(el: ElementRef<'_>) -> Vec<RawAnchor> {
    el.select(&ANCHOR_SEL)
        .filter_map(|a| {
            let href = a.value().attr("href")?.trim();
            (!href.is_empty()).then(|| RawAnchor {
                href: href.to_string(),
                text: element_text(a),
            })
        })
        .collect()
}

fn element_text(el: ElementRef<'_>) -> String {
    collapse(&el.text().collect::<Vec<_>>().join(" "))
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
