//! In-memory [`Transport`] serving canned pages and probe headers.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{StreamExt, stream};

use crate::download::{DownloadError, FetchedPage, ProbeHeaders, TransferResponse, Transport};

#[derive(Default)]
pub(crate) struct PageTransport {
    pages: HashMap<String, String>,
    probes: HashMap<String, ProbeHeaders>,
    files: HashMap<String, Vec<u8>>,
    pub(crate) fetched: Mutex<Vec<String>>,
    pub(crate) probed: Mutex<Vec<String>>,
}

impl PageTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_page(mut self, url: &str, markup: &str) -> Self {
        self.pages.insert(url.to_string(), markup.to_string());
        self
    }

    pub(crate) fn with_probe(mut self, url: &str, headers: ProbeHeaders) -> Self {
        self.probes.insert(url.to_string(), headers);
        self
    }

    /// Served in full with status 200; range requests are ignored.
    pub(crate) fn with_file(mut self, url: &str, content: &[u8]) -> Self {
        self.files.insert(url.to_string(), content.to_vec());
        self
    }

    #[allow(clippy::unwrap_used)]
    pub(crate) fn fetch_count(&self) -> usize {
        self.fetched.lock().unwrap().len()
    }

    #[allow(clippy::unwrap_used)]
    pub(crate) fn probe_count(&self) -> usize {
        self.probed.lock().unwrap().len()
    }
}

#[async_trait]
#[allow(clippy::unwrap_used)]
impl Transport for PageTransport {
    async fn fetch_page(&self, url: &str) -> Result<FetchedPage, DownloadError> {
        self.fetched.lock().unwrap().push(url.to_string());
        self.pages
            .get(url)
            .map(|markup| FetchedPage {
                final_url: url.to_string(),
                markup: markup.clone(),
            })
            .ok_or_else(|| DownloadError::http_status(url, 404))
    }

    async fn probe(&self, url: &str) -> Result<ProbeHeaders, DownloadError> {
        self.probed.lock().unwrap().push(url.to_string());
        self.probes
            .get(url)
            .cloned()
            .ok_or_else(|| DownloadError::http_status(url, 404))
    }

    async fn open(
        &self,
        url: &str,
        _range_start: Option<u64>,
    ) -> Result<TransferResponse, DownloadError> {
        let content = self
            .files
            .get(url)
            .ok_or_else(|| DownloadError::http_status(url, 404))?;
        let chunk: Result<Bytes, DownloadError> = Ok(Bytes::copy_from_slice(content));
        Ok(TransferResponse {
            status: 200,
            content_length: Some(content.len() as u64),
            content_range_start: None,
            body: stream::iter(vec![chunk]).boxed(),
        })
    }
}
