//! HTTP transport layer
//!
//! Issues single HTTP exchanges, optionally through an upstream proxy. The
//! engine, validator and API-backed sources all talk to the network through
//! [`HttpTransport`], so tests can substitute a scripted transport.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use http::Method;
use tracing::{debug, instrument, warn};

use crate::error::{FetchError, Result};
use crate::models::ProxyRecord;

/// One HTTP exchange as seen by the transport
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    pub proxy: Option<ProxyRecord>,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub follow_redirects: bool,
}

impl TransportRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            proxy: None,
            connect_timeout: timeout,
            read_timeout: timeout,
            follow_redirects: true,
        }
    }

    pub fn with_proxy(mut self, proxy: Option<ProxyRecord>) -> Self {
        self.proxy = proxy;
        self
    }
}

/// A completed HTTP exchange, whatever its status code
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HashMap<String, Vec<String>>,
    pub body: Bytes,
    pub final_url: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get("content-type")
            .and_then(|v| v.first())
            .map(String::as_str)
    }
}

/// Executes HTTP exchanges.
///
/// An `Err` means the exchange itself failed (connect, timeout, I/O); any
/// received response, including 4xx/5xx, is an `Ok`.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse>;

    /// Release pooled connections
    fn close(&self) {}
}

/// reqwest transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub max_idle_per_host: usize,
    /// Cached clients kept before the least recently used is dropped
    pub max_clients: usize,
    pub keep_alive: Duration,
    pub write_timeout: Duration,
    /// Disable TLS certificate verification (testing only)
    pub trust_all_certs: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 200,
            max_clients: 256,
            keep_alive: Duration::from_secs(300),
            write_timeout: Duration::from_secs(60),
            trust_all_certs: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ClientKey {
    proxy: Option<String>,
    credentials: Option<(String, String)>,
    connect_timeout_ms: u128,
    follow_redirects: bool,
}

impl ClientKey {
    fn for_request(request: &TransportRequest) -> Self {
        Self {
            proxy: request.proxy.as_ref().map(ProxyRecord::proxy_url),
            credentials: request.proxy.as_ref().and_then(|p| {
                p.username.clone().zip(p.password.clone())
            }),
            connect_timeout_ms: request.connect_timeout.as_millis(),
            follow_redirects: request.follow_redirects,
        }
    }
}

struct CachedClient {
    client: reqwest::Client,
    last_used: AtomicU64,
}

/// Transport backed by reqwest.
///
/// reqwest binds proxies and connect timeouts at client construction, so one
/// client (and its connection pool) is cached per distinct combination. The
/// cache holds at most `max_clients` entries and evicts the least recently
/// used one beyond that.
pub struct ReqwestTransport {
    config: TransportConfig,
    clients: DashMap<ClientKey, CachedClient>,
    clock: AtomicU64,
}

impl ReqwestTransport {
    pub fn new(config: TransportConfig) -> Self {
        if config.trust_all_certs {
            warn!("TLS certificate verification is disabled; use only for testing");
        }
        Self {
            config,
            clients: DashMap::new(),
            clock: AtomicU64::new(0),
        }
    }

    /// Number of cached clients
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    fn client_for(&self, request: &TransportRequest) -> Result<reqwest::Client> {
        let key = ClientKey::for_request(request);
        if let Some(cached) = self.clients.get(&key) {
            cached.last_used.store(self.tick(), Ordering::Relaxed);
            return Ok(cached.client.clone());
        }

        let client = self.build_client(request)?;
        self.clients.insert(
            key,
            CachedClient {
                client: client.clone(),
                last_used: AtomicU64::new(self.tick()),
            },
        );
        self.evict_over_capacity();
        Ok(client)
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn evict_over_capacity(&self) {
        let max_clients = self.config.max_clients.max(1);
        while self.clients.len() > max_clients {
            let oldest = self
                .clients
                .iter()
                .min_by_key(|entry| entry.last_used.load(Ordering::Relaxed))
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.clients.remove(&key);
                    debug!(proxy = ?key.proxy, "Evicted least recently used HTTP client");
                }
                None => break,
            }
        }
    }

    fn build_client(&self, request: &TransportRequest) -> Result<reqwest::Client> {
        let redirect = if request.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        };

        let mut builder = reqwest::Client::builder()
            .connect_timeout(request.connect_timeout)
            .pool_max_idle_per_host(self.config.max_idle_per_host)
            .pool_idle_timeout(self.config.keep_alive)
            .tcp_keepalive(self.config.keep_alive)
            .redirect(redirect)
            .danger_accept_invalid_certs(self.config.trust_all_certs);

        match &request.proxy {
            Some(proxy) => {
                let mut upstream = reqwest::Proxy::all(proxy.proxy_url())
                    .map_err(|e| FetchError::InvalidProxyAddress(format!("{}: {}", proxy, e)))?;
                if let (Some(username), Some(password)) = (&proxy.username, &proxy.password) {
                    upstream = upstream.basic_auth(username, password);
                }
                builder = builder.proxy(upstream);
            }
            None => {
                builder = builder.no_proxy();
            }
        }

        builder
            .build()
            .map_err(|e| FetchError::Internal(format!("Failed to build HTTP client: {}", e)))
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse> {
        let client = self.client_for(&request)?;

        // reqwest has no separate read/write deadlines per request; bound the
        // whole exchange instead.
        let mut deadline = request.connect_timeout + request.read_timeout;
        if request.body.is_some() {
            deadline += self.config.write_timeout;
        }

        let mut builder = client
            .request(request.method.clone(), &request.url)
            .timeout(deadline);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();

        let mut headers: HashMap<String, Vec<String>> = HashMap::new();
        for (name, value) in response.headers() {
            headers
                .entry(name.as_str().to_string())
                .or_default()
                .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
        }

        let body = response.bytes().await?;
        debug!(status, bytes = body.len(), "Exchange complete");

        Ok(TransportResponse {
            status,
            headers,
            body,
            final_url,
        })
    }

    fn close(&self) {
        let count = self.clients.len();
        self.clients.clear();
        debug!(count, "Closed cached HTTP clients");
    }
}
