//! HTTP fetch executor.
//!
//! ### Contract
//! - Exactly one network round trip per [`Transport::send`] call; no retries.
//! - Connection and protocol failures surface as `Error::Transport`,
//!   timeouts as `Error::Timeout`. Neither is turned into a status code.
//! - Bodies are decoded as UTF-8, replacing invalid sequences.
//!
//! ### Request bodies
//! - GET requests never carry a body.
//! - Object bodies are sent form-encoded, anything else as JSON.

pub mod url;

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use rescache_core::{AppConfig, Error, Method, RequestDescriptor};
use serde_json::{Map, Value};

pub use self::url::{UrlError, del_query_params, parse, resolve_template, set_query_params, uri_from_url};

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "rescache/0.1")
    pub user_agent: String,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,

    /// Proxy for all requests (default: none)
    pub proxy: Option<String>,

    /// Whether TLS certificates are verified (default: true)
    pub verify_tls: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "rescache/0.1".to_string(),
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
            proxy: None,
            verify_tls: true,
        }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            timeout: config.timeout(),
            max_redirects: config.max_redirects,
            proxy: config.proxy.clone(),
            verify_tls: config.verify_tls,
        }
    }
}

/// What came back from the remote.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers with lowercase names; repeated headers are joined with ", "
    pub headers: BTreeMap<String, String>,
    /// Response body decoded as UTF-8
    pub body: String,
    /// Time taken to fetch in milliseconds
    pub fetch_ms: u64,
}

impl RawResponse {
    pub fn new(status: u16, headers: BTreeMap<String, String>, body: &[u8]) -> Self {
        Self { status, headers, body: String::from_utf8_lossy(body).into_owned(), fetch_ms: 0 }
    }
}

/// Sends a request over the network.
///
/// Injected into the pipeline so callers control the client's lifetime
/// and tests can substitute their own.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &RequestDescriptor) -> Result<RawResponse, Error>;
}

/// reqwest-backed transport.
#[derive(Debug, Clone)]
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let mut builder = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .danger_accept_invalid_certs(!config.verify_tls);

        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy).map_err(|e| Error::Validation(format!("invalid proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }

        let http = builder
            .build()
            .map_err(|e| Error::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

fn transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() { Error::Timeout(err.to_string()) } else { Error::Transport(err.to_string()) }
}

fn form_fields(map: &Map<String, Value>) -> Vec<(String, String)> {
    let mut fields: Vec<(String, String)> = map
        .iter()
        .map(|(name, value)| {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (name.clone(), text)
        })
        .collect();
    fields.sort();
    fields
}

#[async_trait]
impl Transport for FetchClient {
    async fn send(&self, request: &RequestDescriptor) -> Result<RawResponse, Error> {
        let start = Instant::now();

        let mut builder = match request.method {
            Method::Get => self.http.get(&request.url),
            Method::Post => self.http.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if request.method != Method::Get {
            builder = match &request.data {
                Some(Value::Object(map)) => builder.form(&form_fields(map)),
                Some(other) => builder.json(other),
                None => builder,
            };
        }

        let response = builder.send().await.map_err(transport_error)?;

        let status = response.status().as_u16();
        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in response.headers() {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            headers
                .entry(name.as_str().to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }

        let bytes = response.bytes().await.map_err(transport_error)?;
        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            method = %request.method,
            status,
            fetch_ms,
            bytes = bytes.len(),
            "fetched {}",
            request.url
        );

        Ok(RawResponse { fetch_ms, ..RawResponse::new(status, headers, &bytes) })
    }
}
