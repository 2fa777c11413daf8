//! Fetch engine
//!
//! Runs one logical fetch: rate-limit admission for the destination domain,
//! then up to `retry_count + 1` attempts, each through a freshly selected
//! proxy, with pool feedback after every attempt.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::backoff::BackoffPolicy;
use super::headers::DefaultHeaders;
use super::rate_limit::{extract_domain, DomainRateLimiter};
use crate::error::{FetchError, Result};
use crate::models::{FetchRequest, FetchResponse, ProxyRecord};
use crate::proxy::pool::ProxyProvider;
use crate::proxy::transport::{HttpTransport, TransportRequest, TransportResponse};

/// Fetch engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub follow_redirects: bool,
    /// Route requests through the proxy provider
    pub use_proxy: bool,
    /// Go direct for an attempt when the provider has no proxy
    pub direct_fallback: bool,
    pub retry_count: u32,
    pub retry_interval: Duration,
    pub backoff: BackoffPolicy,
    /// Statuses treated as a failed attempt; empty means status never retries
    pub retry_on_status: HashSet<u16>,
    pub user_agents: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
            follow_redirects: true,
            use_proxy: true,
            direct_fallback: false,
            retry_count: 3,
            retry_interval: Duration::from_secs(1),
            backoff: BackoffPolicy::default(),
            retry_on_status: HashSet::new(),
            user_agents: Vec::new(),
        }
    }
}

/// Outcome of a single attempt
enum Attempt {
    Completed(TransportResponse, Option<ProxyRecord>),
    Failed {
        error: FetchError,
        /// Response kept when the failure was a retryable status
        response: Option<(TransportResponse, Option<ProxyRecord>)>,
    },
}

pub struct FetchEngine {
    config: EngineConfig,
    transport: Arc<dyn HttpTransport>,
    rate_limiter: Arc<DomainRateLimiter>,
    proxy_provider: Option<Arc<dyn ProxyProvider>>,
    headers: DefaultHeaders,
    shutdown: AtomicBool,
}

impl FetchEngine {
    pub fn new(
        config: EngineConfig,
        transport: Arc<dyn HttpTransport>,
        rate_limiter: Arc<DomainRateLimiter>,
    ) -> Self {
        let headers = DefaultHeaders::new(config.user_agents.clone());
        Self {
            config,
            transport,
            rate_limiter,
            proxy_provider: None,
            headers,
            shutdown: AtomicBool::new(false),
        }
    }

    /// Attach a proxy provider; without one the engine runs proxy-less
    pub fn with_proxy_provider(mut self, provider: Arc<dyn ProxyProvider>) -> Self {
        self.proxy_provider = Some(provider);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn rate_limiter(&self) -> &Arc<DomainRateLimiter> {
        &self.rate_limiter
    }

    /// Execute one logical fetch. Never fails: errors come back as a
    /// response with `success == false`.
    #[instrument(skip(self, request), fields(request_id = %request.request_id, url = %request.url))]
    pub async fn fetch(&self, request: FetchRequest) -> FetchResponse {
        let started = Instant::now();

        if self.shutdown.load(Ordering::SeqCst) {
            return FetchResponse::failure(&request, FetchError::EngineShutdown, 0, 0);
        }

        let url = match request.full_url() {
            Ok(url) => url,
            Err(e) => {
                warn!("Rejecting request: {}", e);
                return FetchResponse::failure(&request, e, 0, 0);
            }
        };

        let domain = extract_domain(url.as_str());
        self.rate_limiter.acquire(&domain).await;

        let retry_count = request.retry_count.unwrap_or(self.config.retry_count);
        let retry_interval = request.retry_interval.unwrap_or(self.config.retry_interval);

        let mut last_error = None;
        let mut last_response = None;
        let mut attempts = 0;

        for attempt in 0..=retry_count {
            attempts = attempt.saturating_add(1);

            match self.attempt(&request, &url).await {
                Attempt::Completed(response, proxy) => {
                    debug!(attempt = attempts, status = response.status, "Fetch completed");
                    return self.to_response(&request, response, proxy, started, attempts);
                }
                Attempt::Failed { error, response } => {
                    warn!(
                        domain = %domain,
                        attempt = attempts,
                        max_attempts = retry_count.saturating_add(1),
                        "Fetch attempt failed: {}",
                        error
                    );
                    last_error = Some(error);
                    last_response = response;
                }
            }

            if attempt < retry_count {
                let delay = self.config.backoff.delay(retry_interval, attempt);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        let error = last_error
            .unwrap_or_else(|| FetchError::Internal("fetch finished without an attempt".to_string()));
        info!(attempts, "Fetch failed after retries: {}", error);

        match last_response {
            Some((response, proxy)) => {
                let mut failed = self.to_response(&request, response, proxy, started, attempts);
                failed.success = false;
                failed.error_message = Some(error.to_string());
                failed.error = Some(error);
                failed
            }
            None => FetchResponse::failure(&request, error, elapsed_ms(started), attempts),
        }
    }

    /// Run `fetch` on the runtime and hand back its handle
    pub fn fetch_async(self: &Arc<Self>, request: FetchRequest) -> JoinHandle<FetchResponse> {
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.fetch(request).await })
    }

    /// Fetch all requests concurrently; responses come back in input order
    pub async fn fetch_batch(self: &Arc<Self>, requests: Vec<FetchRequest>) -> Vec<FetchResponse> {
        let handles: Vec<_> = requests
            .into_iter()
            .map(|request| {
                let handle = self.fetch_async(request.clone());
                (request, handle)
            })
            .collect();

        let mut responses = Vec::with_capacity(handles.len());
        for (request, handle) in handles {
            let response = match handle.await {
                Ok(response) => response,
                Err(e) => {
                    warn!(request_id = %request.request_id, "Fetch task failed: {}", e);
                    FetchResponse::failure(
                        &request,
                        FetchError::Internal(format!("fetch task failed: {}", e)),
                        0,
                        0,
                    )
                }
            };
            responses.push(response);
        }
        responses
    }

    /// Refuse new fetches and release transport connections
    pub fn shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::SeqCst) {
            self.transport.close();
            info!("Fetch engine shut down");
        }
    }

    pub fn is_healthy(&self) -> bool {
        !self.shutdown.load(Ordering::SeqCst)
    }

    async fn attempt(&self, request: &FetchRequest, url: &Url) -> Attempt {
        let (proxy, pooled) = match self.select_proxy(request).await {
            Ok(selected) => selected,
            Err(error) => {
                return Attempt::Failed {
                    error,
                    response: None,
                }
            }
        };

        let transport_request = self.build_request(request, url, proxy.clone());
        match self.transport.execute(transport_request).await {
            Ok(response) if self.config.retry_on_status.contains(&response.status) => {
                let error = FetchError::RetryableStatus {
                    status: response.status,
                };
                if let (Some(provider), Some(p), true) = (&self.proxy_provider, &proxy, pooled) {
                    provider.report_failure(p, &error.to_string()).await;
                }
                Attempt::Failed {
                    error,
                    response: Some((response, proxy)),
                }
            }
            Ok(response) => {
                if let (Some(provider), Some(p), true) = (&self.proxy_provider, &proxy, pooled) {
                    provider.report_success(p).await;
                }
                Attempt::Completed(response, proxy)
            }
            Err(error) => {
                if let (Some(provider), Some(p), true) = (&self.proxy_provider, &proxy, pooled) {
                    provider.report_failure(p, &error.to_string()).await;
                }
                Attempt::Failed {
                    error,
                    response: None,
                }
            }
        }
    }

    /// Proxy for one attempt and whether it came from the pool
    async fn select_proxy(&self, request: &FetchRequest) -> Result<(Option<ProxyRecord>, bool)> {
        if let Some(pinned) = &request.proxy {
            return Ok((Some(pinned.clone()), false));
        }
        if !self.config.use_proxy {
            return Ok((None, false));
        }
        let Some(provider) = &self.proxy_provider else {
            return Ok((None, false));
        };

        match provider.get_proxy().await {
            Some(proxy) => {
                debug!(proxy = %proxy.address(), "Using pooled proxy");
                Ok((Some(proxy), true))
            }
            None if self.config.direct_fallback => {
                debug!("No proxy available, going direct");
                Ok((None, false))
            }
            None => Err(FetchError::NoProxiesAvailable),
        }
    }

    fn build_request(&self, request: &FetchRequest, url: &Url, proxy: Option<ProxyRecord>) -> TransportRequest {
        let mut headers = self.headers.merge(&request.headers);
        let has_content_type = headers
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case("content-type"));
        if request.body.is_some() && !has_content_type {
            headers.push(("Content-Type".to_string(), request.content_type.clone()));
        }

        TransportRequest {
            method: request.method.clone(),
            url: url.to_string(),
            headers,
            body: request.body.clone(),
            proxy,
            connect_timeout: request.connect_timeout.unwrap_or(self.config.connect_timeout),
            read_timeout: request.read_timeout.unwrap_or(self.config.read_timeout),
            follow_redirects: request.follow_redirects.unwrap_or(self.config.follow_redirects),
        }
    }

    fn to_response(
        &self,
        request: &FetchRequest,
        response: TransportResponse,
        proxy: Option<ProxyRecord>,
        started: Instant,
        attempts: u32,
    ) -> FetchResponse {
        let success = response.is_success();
        let content_type = response.content_type().map(str::to_string);
        FetchResponse {
            request_id: request.request_id.clone(),
            url: request.url.clone(),
            final_url: Some(response.final_url),
            status_code: Some(response.status),
            headers: response.headers,
            body: response.body,
            content_type,
            response_time_ms: elapsed_ms(started),
            success,
            used_proxy: proxy,
            attempts,
            error_message: (!success).then(|| format!("HTTP status {}", response.status)),
            error: None,
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
