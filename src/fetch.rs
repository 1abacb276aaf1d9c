//! Cached HTTP fetch
//!
//! Runs a `reqwest` request through [`SubrequestCache::run`]. The response is
//! reduced to a serializable [`CachedResponse`] so it can be stored.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::events::DebugInfo;
use crate::subrequest_cache::{ShouldCache, WithCacheOptions};
use crate::{CacheError, CacheKey, CachingStrategy, SubrequestCache};

/// How the response body should be decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnType {
    #[default]
    Json,
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ResponseBody {
    Json(serde_json::Value),
    Text(String),
}

/// Status, headers and decoded body of an HTTP response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: ResponseBody,
}

impl CachedResponse {
    /// First header with the given name, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Options for [`SubrequestCache::fetch_with_cache`]
#[derive(Clone, Default)]
pub struct FetchCacheOptions {
    /// `GET` requests default to [`CachingStrategy::short`]; other methods
    /// are not cached unless a strategy is given
    pub cache: Option<CachingStrategy>,
    /// Defaults to `[url, method, sorted headers, body]`; required for
    /// streaming bodies to be cached
    pub cache_key: Option<CacheKey>,
    pub should_cache_response: Option<ShouldCache<CachedResponse>>,
    pub return_type: ReturnType,
    pub debug_info: Option<DebugInfo>,
}

/// `false` when a JSON body carries GraphQL `errors`
pub fn check_graphql_errors(response: &CachedResponse) -> bool {
    match &response.body {
        ResponseBody::Json(body) => body.get("errors").is_none_or(|errors| errors.is_null()),
        ResponseBody::Text(_) => true,
    }
}

fn resolve_strategy(method: &Method, explicit: Option<CachingStrategy>) -> CachingStrategy {
    match explicit {
        Some(strategy) => strategy,
        None if method == Method::GET => CachingStrategy::short(),
        None => CachingStrategy::no_store(),
    }
}

/// `[url, method, (header name, header value)..., body]` with headers sorted.
///
/// `None` when the body is a stream that can't be read without consuming it.
fn default_cache_key(request: &reqwest::Request) -> Option<CacheKey> {
    let mut key = CacheKey::new()
        .with(request.url().as_str())
        .with(request.method().as_str());

    let mut headers: Vec<(&str, &[u8])> = request
        .headers()
        .iter()
        .map(|(name, value)| (name.as_str(), value.as_bytes()))
        .collect();
    headers.sort_unstable();
    for (name, value) in headers {
        key = key.with(name).with(value);
    }

    match request.body() {
        None => Some(key),
        Some(body) => body.as_bytes().map(|bytes| key.with(bytes)),
    }
}

/// Key and strategy for a request; without an explicit key, a streaming
/// body disables caching.
fn resolve_cache(
    request: &reqwest::Request,
    explicit_strategy: Option<CachingStrategy>,
    explicit_key: Option<CacheKey>,
) -> (CacheKey, CachingStrategy) {
    let strategy = resolve_strategy(request.method(), explicit_strategy);
    if let Some(key) = explicit_key {
        return (key, strategy);
    }

    match default_cache_key(request) {
        Some(key) => (key, strategy),
        None => {
            debug!(
                "Streaming body for {} {}; not caching without an explicit key",
                request.method(),
                request.url()
            );
            let key = CacheKey::new()
                .with(request.url().as_str())
                .with(request.method().as_str());
            (key, CachingStrategy::no_store())
        }
    }
}

/// Decode as requested, falling back to text
fn decode_body(
    bytes: &[u8],
    return_type: ReturnType,
    status: u16,
    request_id: &str,
) -> Result<ResponseBody, CacheError> {
    if return_type == ReturnType::Json
        && let Ok(value) = serde_json::from_slice::<serde_json::Value>(bytes)
    {
        return Ok(ResponseBody::Json(value));
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => Ok(ResponseBody::Text(text.to_owned())),
        Err(_) => Err(CacheError::InvalidResponseBody {
            status,
            request_id: request_id.to_owned(),
        }),
    }
}

async fn execute(
    client: reqwest::Client,
    request: reqwest::Request,
    return_type: ReturnType,
) -> Result<CachedResponse, CacheError> {
    let response = client.execute(request).await?;
    let status = response.status();
    let headers: Vec<(String, String)> = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_owned(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    let request_id = headers
        .iter()
        .find(|(name, _)| name == "x-request-id")
        .map(|(_, value)| value.clone())
        .unwrap_or_default();

    let bytes = match response.bytes().await {
        Ok(bytes) => bytes,
        Err(_) => {
            return Err(CacheError::InvalidResponseBody {
                status: status.as_u16(),
                request_id,
            });
        }
    };
    let body = decode_body(&bytes, return_type, status.as_u16(), &request_id)?;

    Ok(CachedResponse {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or_default().to_owned(),
        headers,
        body,
    })
}

impl SubrequestCache {
    /// Fetch `request`, serving and storing the response through the cache
    pub async fn fetch_with_cache(
        &self,
        client: &reqwest::Client,
        request: reqwest::Request,
        options: FetchCacheOptions,
    ) -> Result<CachedResponse, CacheError> {
        let (key, strategy) = resolve_cache(&request, options.cache, options.cache_key);
        let client = client.clone();
        let return_type = options.return_type;

        let with_options = WithCacheOptions {
            strategy: Some(strategy),
            should_cache: options.should_cache_response,
            debug_info: options.debug_info,
        };

        self.run(
            key,
            move || execute(client, request, return_type),
            with_options,
        )
        .await
    }
}
