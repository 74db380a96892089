//! Resource extraction from one page of markup.

use std::collections::HashSet;

use tracing::{debug, instrument, warn};
use url::Url;

use crate::download::Transport;

use super::filename::{FilenameContext, FilenameResolver};
use super::markup::{self, RawAnchor, RawItem};
use super::strategy::{Anchor, AnchorCascade};
use super::urls::{clean_href, declared_size, format_of, looks_like_resource_page, points_at_file, resolve_href};
use super::{DiscoveryConfig, DiscoveryError, Resource};

/// Resources found on a page plus the items that were dropped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageExtraction {
    /// Resources in source order.
    pub resources: Vec<Resource>,
    /// One [`DiscoveryError::NoUsableLink`] message per dropped item.
    pub diagnostics: Vec<String>,
}

/// Turns listing markup into [`Resource`]s.
#[derive(Debug)]
pub struct LinkExtractor {
    config: DiscoveryConfig,
    cascade: AnchorCascade,
    filenames: FilenameResolver,
}

/// An anchor chosen for one item, before filename resolution.
struct Chosen {
    url: Url,
    anchor_text: String,
    strategy: &'static str,
}

impl LinkExtractor {
    /// Creates an extractor with the standard strategy cascades.
    #[must_use]
    pub fn new(config: DiscoveryConfig) -> Self {
        let cascade = AnchorCascade::from_config(&config);
        let filenames = FilenameResolver::standard(config.default_extension.clone());
        Self {
            config,
            cascade,
            filenames,
        }
    }

    /// Replaces the anchor cascade.
    #[must_use]
    pub fn with_cascade(mut self, cascade: AnchorCascade) -> Self {
        self.cascade = cascade;
        self
    }

    /// Replaces the filename resolver.
    #[must_use]
    pub fn with_filenames(mut self, filenames: FilenameResolver) -> Self {
        self.filenames = filenames;
        self
    }

    /// Extracts resources from `markup`, resolving links against `base_url`.
    ///
    /// Items without a usable anchor are dropped and reported in
    /// [`PageExtraction::diagnostics`]. At most one secondary page is fetched
    /// per item.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::InvalidBaseUrl`] when `base_url` is not absolute.
    #[instrument(skip(self, transport, markup), fields(base = %base_url))]
    pub async fn extract(
        &self,
        transport: &dyn Transport,
        markup: &str,
        base_url: &str,
    ) -> Result<PageExtraction, DiscoveryError> {
        let base = Url::parse(base_url).map_err(|_| DiscoveryError::invalid_base_url(base_url))?;
        let scanned = markup::scan_page(markup);

        let mut extraction = PageExtraction::default();
        for (index, item) in scanned.items.iter().enumerate() {
            let anchors = resolve_anchors(&item.anchors, &base);
            let Some(chosen) = self.choose(transport, &anchors).await else {
                let title = item_title(item, "");
                if !item.anchors.is_empty() || !title.is_empty() {
                    let diagnostic = DiscoveryError::no_usable_link(index, title);
                    debug!(%diagnostic, "Item dropped");
                    extraction.diagnostics.push(diagnostic.to_string());
                }
                continue;
            };
            debug!(item = index, strategy = chosen.strategy, url = %chosen.url, "Anchor chosen");
            let resource = self.build_resource(transport, item, chosen).await;
            extraction.resources.push(resource);
        }

        if extraction.resources.is_empty() {
            self.page_level_fallback(transport, &scanned.anchors, &base, &mut extraction)
                .await;
        }
        Ok(extraction)
    }

    async fn choose(&self, transport: &dyn Transport, anchors: &[Anchor]) -> Option<Chosen> {
        let (strategy, anchor) = self.cascade.choose(anchors)?;
        let mut chosen = Chosen {
            url: anchor.url.clone(),
            anchor_text: anchor.text.clone(),
            strategy,
        };

        if looks_like_resource_page(
            &chosen.url,
            &self.config.download_hosts,
            &self.config.download_keywords,
        ) && let Some(inner) = self.follow_once(transport, &chosen.url).await
        {
            chosen = inner;
        }
        Some(chosen)
    }

    /// Fetches an intermediate resource page and runs the cascade on it once.
    async fn follow_once(&self, transport: &dyn Transport, page_url: &Url) -> Option<Chosen> {
        let page = match transport.fetch_page(page_url.as_str()).await {
            Ok(page) => page,
            Err(err) => {
                warn!(url = %page_url, error = %err, "Secondary page unavailable; keeping original link");
                return None;
            }
        };
        let base = Url::parse(&page.final_url).unwrap_or_else(|_| page_url.clone());
        let anchors: Vec<Anchor> = resolve_anchors(&markup::page_anchors(&page.markup), &base)
            .into_iter()
            .filter(|a| {
                !looks_like_resource_page(
                    &a.url,
                    &self.config.download_hosts,
                    &self.config.download_keywords,
                )
            })
            .collect();
        let (strategy, anchor) = self.cascade.choose(&anchors)?;
        debug!(from = %page_url, to = %anchor.url, strategy, "Followed secondary page");
        Some(Chosen {
            url: anchor.url.clone(),
            anchor_text: anchor.text.clone(),
            strategy,
        })
    }

    async fn build_resource(
        &self,
        transport: &dyn Transport,
        item: &RawItem,
        chosen: Chosen,
    ) -> Resource {
        let ctx = FilenameContext::new(&chosen.url, &chosen.anchor_text, &item.texts, transport);
        let filename = self.filenames.resolve(&ctx).await;
        Resource {
            title: item_title(item, &chosen.anchor_text),
            url: finalize_url(&chosen.url),
            filename,
            format: format_of(&chosen.url),
            declared_size: declared_size(&item.full_text),
        }
    }

    async fn page_level_fallback(
        &self,
        transport: &dyn Transport,
        anchors: &[RawAnchor],
        base: &Url,
        extraction: &mut PageExtraction,
    ) {
        let mut seen = HashSet::new();
        for anchor in resolve_anchors(anchors, base) {
            if !points_at_file(&anchor.url) || !seen.insert(anchor.url.clone()) {
                continue;
            }
            let ctx = FilenameContext::new(&anchor.url, &anchor.text, &[], transport);
            let filename = self.filenames.resolve(&ctx).await;
            extraction.resources.push(Resource {
                title: anchor.text.clone(),
                url: finalize_url(&anchor.url),
                filename,
                format: format_of(&anchor.url),
                declared_size: None,
            });
        }
        if !extraction.resources.is_empty() {
            debug!(count = extraction.resources.len(), "Page-level fallback found direct links");
        }
    }
}

fn resolve_anchors(raw: &[RawAnchor], base: &Url) -> Vec<Anchor> {
    raw.iter()
        .filter_map(|a| {
            resolve_href(&a.href, base).map(|url| Anchor {
                url,
                text: a.text.clone(),
            })
        })
        .collect()
}

fn item_title(item: &RawItem, anchor_text: &str) -> String {
    item.heading
        .clone()
        .or_else(|| item.texts.first().cloned())
        .unwrap_or_else(|| anchor_text.to_string())
}

fn finalize_url(url: &Url) -> String {
    clean_href(url.as_str()).to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::discovery::ResourceFormat;
    use crate::test_support::page_transport::PageTransport;

    const BASE: &str = "https://portal.example.org/eleicoes/2022/";

    fn extractor() -> LinkExtractor {
        LinkExtractor::new(DiscoveryConfig::default())
    }

    #[tokio::test]
    async fn test_three_items_yield_two_resources_in_order() {
        let markup = r#"<html><body><table>
            <tr><td>Candidatos</td><td><a href="files/candidatos_2022.csv">candidatos_2022.csv</a></td></tr>
            <tr><td>Resultado_2022.csv</td><td><a href="/baixar?id=7">Visualizar</a></td></tr>
            <tr><td>Sem arquivo disponível</td><td></td></tr>
        </table></body></html>"#;
        let transport = PageTransport::new();
        let extraction = extractor().extract(&transport, markup, BASE).await.unwrap();

        let names: Vec<&str> = extraction.resources.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["candidatos_2022.csv", "Resultado_2022.csv"]);
        assert_eq!(
            extraction.resources[0].url,
            "https://portal.example.org/eleicoes/2022/files/candidatos_2022.csv"
        );
        assert_eq!(extraction.resources[0].format, ResourceFormat::Csv);
        assert_eq!(extraction.resources[1].url, "https://portal.example.org/baixar?id=7");
        assert_eq!(extraction.resources[1].format, ResourceFormat::Unknown);
        assert_eq!(extraction.diagnostics.len(), 1);
        assert!(extraction.diagnostics[0].contains("Sem arquivo"));
        assert_eq!(transport.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_download_keyword_in_query_is_a_download_link() {
        let markup = r#"<table>
            <tr><th>Arquivo</th><th>Link</th></tr>
            <tr><td>Caderno 2 Suplemento.pdf</td>
                <td><a href="/doepesquisa/sead.do?action=download&amp;id=4">Visualizar</a></td></tr>
            <tr><td>Caderno 3 Municipios.pdf</td>
                <td><a href="/doepesquisa/sead.do?page=BAIXAR&amp;id=3">Visualizar</a></td></tr>
        </table>"#;
        let transport = PageTransport::new();
        let extraction = extractor().extract(&transport, markup, BASE).await.unwrap();

        let names: Vec<&str> = extraction.resources.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["Caderno 2 Suplemento.pdf", "Caderno 3 Municipios.pdf"]);
        assert_eq!(
            extraction.resources[0].url,
            "https://portal.example.org/doepesquisa/sead.do?action=download&id=4"
        );
        assert!(extraction.diagnostics.is_empty(), "{:?}", extraction.diagnostics);
        assert_eq!(transport.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_resource_list_items_prefer_action_phrase() {
        let markup = r#"<ul class="resource-list">
            <li class="resource-item">
              <a class="heading" href="/dataset/eleitorado/resource/abc">Perfil do eleitorado <span>ZIP</span></a>
              <p>Arquivo compactado, 12,5 MB</p>
              <a href="https://cdn.tse.jus.br/estatistica/perfil_eleitorado_2022.zip.">Ir para recurso</a>
            </li>
        </ul>"#;
        let transport = PageTransport::new();
        let extraction = extractor().extract(&transport, markup, BASE).await.unwrap();

        assert_eq!(extraction.resources.len(), 1);
        let resource = &extraction.resources[0];
        assert_eq!(resource.url, "https://cdn.tse.jus.br/estatistica/perfil_eleitorado_2022.zip");
        assert_eq!(resource.filename, "perfil_eleitorado_2022.zip");
        assert_eq!(resource.title, "Perfil do eleitorado ZIP");
        assert_eq!(resource.format, ResourceFormat::Zip);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let expected = (12.5_f64 * 1024.0 * 1024.0) as u64;
        assert_eq!(resource.declared_size, Some(expected));
    }

    #[tokio::test]
    async fn test_secondary_page_followed_once() {
        let markup = r#"<ul><li class="resource-item">
            <a href="/dataset/votacao/resource/xyz">Ir para recurso</a>
        </li></ul>"#;
        let transport = PageTransport::new().with_page(
            "https://portal.example.org/dataset/votacao/resource/xyz",
            r#"<a href="/dataset/votacao">Voltar</a>
               <a href="https://cdn.tse.jus.br/votacao_2022.zip">Ir para recurso</a>"#,
        );
        let extraction = extractor().extract(&transport, markup, BASE).await.unwrap();

        assert_eq!(extraction.resources.len(), 1);
        assert_eq!(extraction.resources[0].url, "https://cdn.tse.jus.br/votacao_2022.zip");
        assert_eq!(extraction.resources[0].filename, "votacao_2022.zip");
        assert_eq!(transport.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_secondary_page_failure_keeps_original() {
        let markup = r#"<ul><li class="resource-item">
            <span class="heading">Boletim de urna</span>
            <a href="/dataset/bu/resource/1">Ir para recurso</a>
        </li></ul>"#;
        let transport = PageTransport::new();
        let extraction = extractor().extract(&transport, markup, BASE).await.unwrap();

        assert_eq!(extraction.resources.len(), 1);
        let resource = &extraction.resources[0];
        assert_eq!(resource.url, "https://portal.example.org/dataset/bu/resource/1");
        assert_eq!(resource.filename, "Boletim de urna.pdf");
        assert_eq!(transport.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_page_level_fallback_collects_direct_links() {
        let markup = r#"<div>
            <p><a href="docs/ata.pdf">Ata</a> e <a href="docs/ata.pdf">ata (cópia)</a></p>
            <p><a href="/sobre">Sobre</a> <a href="anexo.XLSX">Anexo</a></p>
        </div>"#;
        let transport = PageTransport::new();
        let extraction = extractor().extract(&transport, markup, BASE).await.unwrap();

        let names: Vec<&str> = extraction.resources.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["ata.pdf", "anexo.XLSX"]);
        assert!(extraction.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_base_url() {
        let transport = PageTransport::new();
        let err = extractor()
            .extract(&transport, "<a href='a.pdf'>a</a>", "not a url")
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidBaseUrl { .. }));
    }
}
