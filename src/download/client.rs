//! `reqwest`-backed [`Transport`] implementation.
//!
//! One client is created per run and reused for every page fetch, probe and
//! download so connections and cookies are pooled.

use std::panic::{AssertUnwindSafe, catch_unwind, set_hook, take_hook};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{
    ACCEPT, ACCEPT_ENCODING, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE,
    HeaderMap, HeaderValue, RANGE,
};
use reqwest::{Client, ClientBuilder, Proxy};
use tracing::{debug, instrument, warn};
use url::Url;

use super::constants::TimeoutSettings;
use super::error::DownloadError;
use super::transport::{FetchedPage, ProbeHeaders, TransferResponse, Transport};
use crate::user_agent::{BROWSER_ACCEPT, BROWSER_USER_AGENT};

/// HTTP client presenting a fixed browser identity.
///
/// # Example
///
/// ```no_run
/// use harvester_core::download::{HttpClient, Transport};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new()?;
/// let page = client.fetch_page("https://example.com/listing").await?;
/// println!("{} bytes of markup", page.markup.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    page_timeout: Duration,
}

impl HttpClient {
    /// Creates a client with default timeouts (30s connect, 30s page, 60s read).
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientSetup`] if the TLS backend or proxy
    /// settings cannot be initialised.
    pub fn new() -> Result<Self, DownloadError> {
        Self::with_timeouts(TimeoutSettings::default())
    }

    /// Creates a client with explicit timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientSetup`] if the builder rejects the
    /// configuration.
    pub fn with_timeouts(timeouts: TimeoutSettings) -> Result<Self, DownloadError> {
        let client = build_client(timeouts)?;
        Ok(Self {
            client,
            page_timeout: timeouts.page,
        })
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<reqwest::Response, DownloadError> {
        let response = request
            .send()
            .await
            .map_err(|e| map_request_error(url, e))?;

        let status = response.status().as_u16();
        if status == 416 {
            return Err(DownloadError::range_not_satisfiable(url));
        }
        if !response.status().is_success() {
            return Err(DownloadError::http_status(url, status));
        }
        Ok(response)
    }
}

#[async_trait]
impl Transport for HttpClient {
    #[instrument(level = "debug", skip(self))]
    async fn fetch_page(&self, url: &str) -> Result<FetchedPage, DownloadError> {
        ensure_http_url(url)?;
        let request = self.client.get(url).timeout(self.page_timeout);
        let response = self.send(request, url).await?;
        let final_url = response.url().to_string();
        let markup = response
            .text()
            .await
            .map_err(|e| map_request_error(url, e))?;
        debug!(final_url = %final_url, bytes = markup.len(), "Fetched page");
        Ok(FetchedPage { final_url, markup })
    }

    #[instrument(level = "debug", skip(self))]
    async fn probe(&self, url: &str) -> Result<ProbeHeaders, DownloadError> {
        ensure_http_url(url)?;
        let request = self.client.head(url).timeout(self.page_timeout);
        let response = self.send(request, url).await?;
        let headers = response.headers();
        Ok(ProbeHeaders {
            content_disposition: header_string(headers, CONTENT_DISPOSITION.as_str()),
            content_type: header_string(headers, CONTENT_TYPE.as_str()),
            content_length: header_string(headers, CONTENT_LENGTH.as_str())
                .and_then(|v| v.parse::<u64>().ok()),
        })
    }

    #[instrument(level = "debug", skip(self))]
    async fn open(
        &self,
        url: &str,
        range_start: Option<u64>,
    ) -> Result<TransferResponse, DownloadError> {
        ensure_http_url(url)?;
        // Byte offsets must match the stored file, so no transfer encoding.
        let mut request = self.client.get(url).header(ACCEPT_ENCODING, "identity");
        if let Some(start) = range_start {
            request = request.header(RANGE, format!("bytes={start}-"));
        }
        let response = self.send(request, url).await?;

        let status = response.status().as_u16();
        let headers = response.headers();
        let content_length = header_string(headers, CONTENT_LENGTH.as_str())
            .and_then(|v| v.parse::<u64>().ok());
        let content_range_start =
            header_string(headers, CONTENT_RANGE.as_str()).and_then(|v| parse_content_range_start(&v));

        let owned_url = url.to_string();
        let body = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| map_stream_error(&owned_url, &e)))
            .boxed();

        Ok(TransferResponse {
            status,
            content_length,
            content_range_start,
            body,
        })
    }
}

fn ensure_http_url(url: &str) -> Result<(), DownloadError> {
    match Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        _ => Err(DownloadError::invalid_url(url)),
    }
}

fn map_request_error(url: &str, error: reqwest::Error) -> DownloadError {
    if error.is_timeout() {
        DownloadError::timeout(url)
    } else {
        DownloadError::network(url, error)
    }
}

fn map_stream_error(url: &str, error: &reqwest::Error) -> DownloadError {
    if error.is_timeout() {
        DownloadError::timeout(url)
    } else {
        DownloadError::interrupted(url, error.to_string())
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Extracts the first byte position from `bytes <start>-<end>/<total>`.
fn parse_content_range_start(value: &str) -> Option<u64> {
    let spec = value.trim().strip_prefix("bytes")?.trim_start();
    let (start, _) = spec.split_once('-')?;
    start.trim().parse::<u64>().ok()
}

fn build_client(timeouts: TimeoutSettings) -> Result<Client, DownloadError> {
    match try_build_client(timeouts, false) {
        Ok(client) => Ok(client),
        Err(BuildClientFailure::Panic) => {
            warn!(
                "HTTP client builder panicked while loading system proxy settings; retrying with env-proxy fallback"
            );
            match try_build_client(timeouts, true) {
                Ok(client) => Ok(client),
                Err(BuildClientFailure::Build(error)) => Err(DownloadError::client_setup(error.to_string())),
                Err(BuildClientFailure::Panic) => Err(DownloadError::client_setup(
                    "builder panicked while applying env-proxy fallback",
                )),
            }
        }
        Err(BuildClientFailure::Build(error)) => Err(DownloadError::client_setup(error.to_string())),
    }
}

enum BuildClientFailure {
    Panic,
    Build(reqwest::Error),
}

// Silences the panic hook while a system-proxy panic is caught, keeping
// stderr clean on the expected recovery path.
static CLIENT_BUILD_PANIC_HOOK_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

fn try_build_client(
    timeouts: TimeoutSettings,
    disable_system_proxy_lookup: bool,
) -> Result<Client, BuildClientFailure> {
    let _hook_guard = CLIENT_BUILD_PANIC_HOOK_LOCK
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let previous_hook = take_hook();
    set_hook(Box::new(|_| {}));
    let outcome = catch_unwind(AssertUnwindSafe(move || {
        let mut builder = base_client_builder(timeouts);
        if disable_system_proxy_lookup {
            builder = apply_env_proxy_fallback(builder.no_proxy());
        }
        builder.build().map_err(BuildClientFailure::Build)
    }));
    set_hook(previous_hook);
    outcome.map_err(|_| BuildClientFailure::Panic)?
}

fn base_client_builder(timeouts: TimeoutSettings) -> ClientBuilder {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
    Client::builder()
        .connect_timeout(timeouts.connect)
        .read_timeout(timeouts.read)
        .gzip(true)
        .cookie_store(true)
        .user_agent(BROWSER_USER_AGENT)
        .default_headers(headers)
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = env_proxy_for_scheme("https")
        && let Ok(resolved) = Proxy::https(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    if let Some(proxy) = env_proxy_for_scheme("http")
        && let Ok(resolved) = Proxy::http(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    builder
}

fn env_proxy_for_scheme(scheme: &str) -> Option<String> {
    let names: &[&str] = match scheme {
        "https" => &["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"],
        "http" => &["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"],
        _ => return None,
    };
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}
