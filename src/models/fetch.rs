use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use http::Method;
use url::Url;

use super::ProxyRecord;
use crate::error::{FetchError, Result};

/// A single logical fetch, possibly spanning several attempts
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub request_id: String,
    pub url: String,
    pub method: Method,
    pub headers: HashMap<String, String>,
    /// Query parameters appended to `url`
    pub params: Vec<(String, String)>,
    pub body: Option<Bytes>,
    pub content_type: String,
    /// Attempts beyond the first; engine default when `None`
    pub retry_count: Option<u32>,
    /// Base delay between attempts; engine default when `None`
    pub retry_interval: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,
    pub follow_redirects: Option<bool>,
    /// Caller-pinned proxy, bypassing the pool for every attempt
    pub proxy: Option<ProxyRecord>,
}

impl FetchRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            url: url.into(),
            method,
            headers: HashMap::new(),
            params: Vec::new(),
            body: None,
            content_type: "application/json".to_string(),
            retry_count: None,
            retry_interval: None,
            connect_timeout: None,
            read_timeout: None,
            follow_redirects: None,
            proxy: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self::new(Method::POST, url).body(body)
    }

    pub fn post_json(url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self::post(url, body).content_type("application/json")
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = Some(retry_count);
        self
    }

    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = Some(interval);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = Some(follow);
        self
    }

    pub fn proxy(mut self, proxy: ProxyRecord) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// `url` with `params` appended to its query string
    pub fn full_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.url)?;
        if url.host_str().is_none() {
            return Err(FetchError::InvalidRequest(format!(
                "URL has no host: {}",
                self.url
            )));
        }
        if !self.params.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(self.params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        Ok(url)
    }
}

/// Terminal result of a fetch. Failures are reported here, never raised.
#[derive(Debug)]
pub struct FetchResponse {
    pub request_id: String,
    pub url: String,
    pub final_url: Option<String>,
    pub status_code: Option<u16>,
    pub headers: HashMap<String, Vec<String>>,
    pub body: Bytes,
    pub content_type: Option<String>,
    /// Elapsed time across all attempts, including backoff
    pub response_time_ms: u64,
    pub success: bool,
    pub used_proxy: Option<ProxyRecord>,
    pub attempts: u32,
    pub error_message: Option<String>,
    pub error: Option<FetchError>,
}

impl FetchResponse {
    pub fn failure(request: &FetchRequest, error: FetchError, response_time_ms: u64, attempts: u32) -> Self {
        Self {
            request_id: request.request_id.clone(),
            url: request.url.clone(),
            final_url: None,
            status_code: None,
            headers: HashMap::new(),
            body: Bytes::new(),
            content_type: None,
            response_time_ms,
            success: false,
            used_proxy: None,
            attempts,
            error_message: Some(error.to_string()),
            error: Some(error),
        }
    }

    /// Body decoded as UTF-8, lossily
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.first())
            .map(String::as_str)
    }
}
