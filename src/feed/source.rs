use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use super::cache::DocumentCache;

const MAX_RETRIES: u32 = 3;
const MAX_DOCUMENT_SIZE: usize = 10 * 1024 * 1024; // 10MB
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const BACKOFF_BASE: Duration = Duration::from_secs(2);

/// Errors that can occur while fetching a document.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Request timed out")]
    Timeout,
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A local-only fetch found nothing in the cache
    #[error("Not cached: {0}")]
    NotCached(String),
    #[error("Unsupported URI scheme: {0}")]
    UnsupportedScheme(String),
    #[error("Document is not valid UTF-8")]
    InvalidUtf8,
}

/// Asynchronous document fetch capability used by the sync engine.
///
/// Implementations decide where bytes come from (network, disk cache, test
/// fixtures). With `local_only` set, an implementation must not touch the
/// network.
#[allow(async_fn_in_trait)]
pub trait FeedSource {
    async fn fetch_document(&self, uri: &Url, local_only: bool) -> Result<Vec<u8>, SourceError>;

    async fn fetch_text(&self, uri: &Url, local_only: bool) -> Result<String, SourceError> {
        let bytes = self.fetch_document(uri, local_only).await?;
        String::from_utf8(bytes).map_err(|_| SourceError::InvalidUtf8)
    }
}

/// Reads `file://` URIs from the local filesystem.
#[derive(Debug, Clone)]
pub struct FileFeedSource {
    max_size: usize,
}

impl Default for FileFeedSource {
    fn default() -> Self {
        Self {
            max_size: MAX_DOCUMENT_SIZE,
        }
    }
}

impl FileFeedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }
}

impl FeedSource for FileFeedSource {
    async fn fetch_document(&self, uri: &Url, _local_only: bool) -> Result<Vec<u8>, SourceError> {
        if uri.scheme() != "file" {
            return Err(SourceError::UnsupportedScheme(uri.scheme().to_string()));
        }
        let path = uri
            .to_file_path()
            .map_err(|_| SourceError::UnsupportedScheme(uri.to_string()))?;
        let meta = tokio::fs::metadata(&path).await?;
        if meta.len() > self.max_size as u64 {
            return Err(SourceError::ResponseTooLarge);
        }
        Ok(tokio::fs::read(&path).await?)
    }
}

/// Fetches documents over HTTP(S), writing each successful response through
/// to an optional [`DocumentCache`]. Local-only fetches are served from that
/// cache. `file://` URIs are delegated to [`FileFeedSource`].
///
/// # Behavior
///
/// - Each request has a timeout (30s by default)
/// - Rate limiting (HTTP 429), 5xx responses and truncated bodies are retried
///   with exponential backoff, up to 3 retries
/// - Response bodies are limited (10MB by default)
#[derive(Debug, Clone)]
pub struct HttpFeedSource {
    client: reqwest::Client,
    cache: Option<DocumentCache>,
    files: FileFeedSource,
    timeout: Duration,
    max_size: usize,
    backoff_base: Duration,
}

impl HttpFeedSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            cache: None,
            files: FileFeedSource::new(),
            timeout: REQUEST_TIMEOUT,
            max_size: MAX_DOCUMENT_SIZE,
            backoff_base: BACKOFF_BASE,
        }
    }

    pub fn with_cache(mut self, cache: DocumentCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self.files = self.files.with_max_size(max_size);
        self
    }

    /// First retry waits `base`, then `2 * base`, then `4 * base`.
    pub fn with_backoff(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    async fn fetch_with_retry(&self, uri: &Url) -> Result<Vec<u8>, SourceError> {
        let mut retry_count = 0;

        loop {
            let response = tokio::time::timeout(self.timeout, self.client.get(uri.as_str()).send())
                .await
                .map_err(|_| SourceError::Timeout)?
                .map_err(SourceError::Network)?;
            let status = response.status();

            // EDGE-004: Handle rate limiting with exponential backoff
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                if retry_count >= MAX_RETRIES {
                    return Err(SourceError::RateLimited(MAX_RETRIES));
                }
                let delay = self.backoff_base * 2u32.pow(retry_count);
                tracing::warn!(
                    uri = %uri,
                    retry = retry_count,
                    delay_ms = delay.as_millis() as u64,
                    "Rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
                retry_count += 1;
                continue;
            }

            if status.is_server_error() {
                if retry_count >= MAX_RETRIES {
                    return Err(SourceError::HttpStatus(status.as_u16()));
                }
                let delay = self.backoff_base * 2u32.pow(retry_count);
                tracing::warn!(
                    uri = %uri,
                    status = %status,
                    retry = retry_count,
                    delay_ms = delay.as_millis() as u64,
                    "Server error, retrying after delay"
                );
                tokio::time::sleep(delay).await;
                retry_count += 1;
                continue;
            }

            // 4xx errors fail immediately
            if !status.is_success() {
                return Err(SourceError::HttpStatus(status.as_u16()));
            }

            match read_limited_bytes(response, self.max_size).await {
                Ok(bytes) => return Ok(bytes),
                Err(SourceError::IncompleteResponse { expected, received }) => {
                    // EDGE-005: Retry truncated downloads
                    if retry_count >= MAX_RETRIES {
                        return Err(SourceError::IncompleteResponse { expected, received });
                    }
                    let delay = self.backoff_base * 2u32.pow(retry_count);
                    tracing::debug!(
                        uri = %uri,
                        expected = expected,
                        received = received,
                        attempt = retry_count + 1,
                        "Retrying incomplete download"
                    );
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl FeedSource for HttpFeedSource {
    async fn fetch_document(&self, uri: &Url, local_only: bool) -> Result<Vec<u8>, SourceError> {
        match uri.scheme() {
            "file" => return self.files.fetch_document(uri, local_only).await,
            "http" | "https" => {}
            scheme => return Err(SourceError::UnsupportedScheme(scheme.to_string())),
        }

        if local_only {
            let cache = self
                .cache
                .as_ref()
                .ok_or_else(|| SourceError::NotCached(uri.to_string()))?;
            return cache
                .load(uri)
                .await?
                .ok_or_else(|| SourceError::NotCached(uri.to_string()));
        }

        let bytes = self.fetch_with_retry(uri).await?;
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.store(uri, &bytes).await {
                tracing::warn!(uri = %uri, error = %e, "Failed to write document to cache");
            }
        }
        Ok(bytes)
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, SourceError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(SourceError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(SourceError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(SourceError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(SourceError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
