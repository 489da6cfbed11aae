//! Request/response types, the upstream network, and the cache-first strategy.

use super::cache::Cache;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Upper bound on a single upstream request, connect through body.
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(15);

/// A request for a root-relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRequest {
    /// Upper-case HTTP method.
    pub method: String,
    /// Root-relative path, including any query string.
    pub path: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl AssetRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: "GET".to_owned(),
            path: path.into(),
            content_type: None,
            body: Vec::new(),
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into().to_ascii_uppercase();
        self
    }

    pub fn with_body(mut self, content_type: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.content_type = Some(content_type.into());
        self.body = body.into();
        self
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }
}

/// A whole response, cheap enough to clone into the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl AssetResponse {
    pub fn ok(content_type: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            content_type: Some(content_type.into()),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Why a fetch failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// No upstream origin is configured.
    Offline,
    /// The upstream could not be reached or the transfer failed.
    Network(String),
    /// The worker task is no longer running.
    WorkerGone,
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Offline => write!(f, "no upstream configured"),
            Self::Network(e) => write!(f, "network error: {e}"),
            Self::WorkerGone => write!(f, "asset worker is not running"),
        }
    }
}

impl std::error::Error for FetchError {}

/// The network side of the worker.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse, FetchError>;
}

/// Upstream used when no origin is configured; every fetch fails.
pub struct OfflineUpstream;

#[async_trait]
impl Upstream for OfflineUpstream {
    async fn fetch(&self, _request: &AssetRequest) -> Result<AssetResponse, FetchError> {
        Err(FetchError::Offline)
    }
}

/// Fetches from an HTTP origin.
pub struct HttpUpstream {
    base: String,
    /// Reused across fetches for connection pooling.
    client: reqwest::Client,
}

impl HttpUpstream {
    pub fn new(base: impl Into<String>) -> reqwest::Result<Self> {
        Self::with_timeout(base, UPSTREAM_TIMEOUT)
    }

    pub fn with_timeout(base: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base: base.into().trim_end_matches('/').to_owned(),
            client,
        })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse, FetchError> {
        let url = format!("{}{}", self.base, request.path);
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| FetchError::Network(format!("bad method {}: {e}", request.method)))?;

        let mut builder = self.client.request(method, &url);
        if let Some(ct) = &request.content_type {
            builder = builder.header(reqwest::header::CONTENT_TYPE, ct);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?
            .to_vec();

        debug!(target: "worker", %url, status, "fetched from upstream");
        Ok(AssetResponse {
            status,
            content_type,
            body,
        })
    }
}

/// Serve `request` cache-first.
///
/// Non-GET requests go straight to the upstream. A GET is answered from
/// the cache when possible; otherwise the network response is returned and
/// a copy is written to the cache in the background. If the network fails,
/// whatever the cache holds by then is used, else the error propagates.
pub async fn cache_first(
    cache: &Cache,
    upstream: &Arc<dyn Upstream>,
    request: AssetRequest,
) -> Result<AssetResponse, FetchError> {
    if !request.is_get() {
        return upstream.fetch(&request).await;
    }

    if let Some(hit) = lookup(cache, &request.path).await {
        debug!(target: "worker", path = %request.path, "cache hit");
        return Ok(hit);
    }

    match upstream.fetch(&request).await {
        Ok(response) => {
            let copy = response.clone();
            let cache = cache.clone();
            let path = request.path.clone();
            tokio::spawn(async move {
                if let Err(e) = cache.put(&path, &copy).await {
                    warn!(target: "worker", %path, error = %e, "failed to cache response");
                }
            });
            Ok(response)
        }
        Err(e) => match lookup(cache, &request.path).await {
            Some(hit) => {
                debug!(target: "worker", path = %request.path, "network failed, serving cached copy");
                Ok(hit)
            }
            None => Err(e),
        },
    }
}

async fn lookup(cache: &Cache, path: &str) -> Option<AssetResponse> {
    match cache.match_path(path).await {
        Ok(hit) => hit,
        Err(e) => {
            warn!(target: "worker", %path, error = %e, "cache read failed");
            None
        }
    }
}
