use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{FetchError, Result};

/// Proxy scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyScheme {
    #[default]
    Http,
    Https,
    Socks5,
}

impl ProxyScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyScheme::Http => "http",
            ProxyScheme::Https => "https",
            ProxyScheme::Socks5 => "socks5",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "http" => Some(ProxyScheme::Http),
            "https" => Some(ProxyScheme::Https),
            "socks5" | "socks5h" => Some(ProxyScheme::Socks5),
            _ => None,
        }
    }

    pub fn is_socks(&self) -> bool {
        matches!(self, ProxyScheme::Socks5)
    }
}

impl std::fmt::Display for ProxyScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A candidate upstream proxy and its usage statistics.
///
/// Identity is `(host, port)`; every other field is mutable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyRecord {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub scheme: ProxyScheme,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub fail_count: u64,
    /// Last observed response time in milliseconds
    #[serde(default)]
    pub response_time_ms: u64,
    #[serde(default)]
    pub last_use_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ProxyRecord {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            scheme: ProxyScheme::Http,
            username: None,
            password: None,
            success_count: 0,
            fail_count: 0,
            response_time_ms: 0,
            last_use_time: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_scheme(mut self, scheme: ProxyScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// `host:port`, the identity key used by the blacklist
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn same_identity(&self, other: &ProxyRecord) -> bool {
        self.host == other.host && self.port == other.port
    }

    pub fn is_authenticated(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    /// Success rate in `[0, 1]`; an unused proxy counts as fully healthy
    pub fn success_rate(&self) -> f64 {
        let total = self.success_count + self.fail_count;
        if total == 0 {
            1.0
        } else {
            self.success_count as f64 / total as f64
        }
    }

    pub fn record_success(&mut self) {
        self.success_count += 1;
        self.last_use_time = Some(Utc::now());
    }

    pub fn record_failure(&mut self) {
        self.fail_count += 1;
        self.last_use_time = Some(Utc::now());
    }

    pub fn reset_stats(&mut self) {
        self.success_count = 0;
        self.fail_count = 0;
        self.response_time_ms = 0;
    }

    /// Proxy URL without credentials.
    ///
    /// HTTPS proxies are dialed as plain HTTP CONNECT proxies.
    pub fn proxy_url(&self) -> String {
        let scheme = match self.scheme {
            ProxyScheme::Http | ProxyScheme::Https => "http",
            ProxyScheme::Socks5 => "socks5",
        };
        format!("{}://{}", scheme, self.address())
    }

    /// Parse `host:port`, `host:port:user:pass` or `scheme://[user:pass@]host:port`
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(FetchError::InvalidProxyAddress("empty proxy string".into()));
        }

        if raw.contains("://") {
            return Self::parse_url(raw);
        }

        let parts: Vec<&str> = raw.split(':').collect();
        if parts.len() < 2 || parts[0].is_empty() {
            return Err(FetchError::InvalidProxyAddress(raw.to_string()));
        }

        let port = parse_port(parts[1], raw)?;
        let mut proxy = ProxyRecord::new(parts[0], port);
        if parts.len() >= 4 {
            proxy = proxy.with_credentials(parts[2], parts[3]);
        }
        Ok(proxy)
    }

    fn parse_url(raw: &str) -> Result<Self> {
        let url = Url::parse(raw)
            .map_err(|e| FetchError::InvalidProxyAddress(format!("{}: {}", raw, e)))?;
        let scheme = ProxyScheme::from_str(url.scheme())
            .ok_or_else(|| FetchError::UnsupportedScheme(url.scheme().to_string()))?;
        let host = url
            .host_str()
            .ok_or_else(|| FetchError::InvalidProxyAddress(raw.to_string()))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| FetchError::InvalidProxyAddress(format!("{}: missing port", raw)))?;

        let mut proxy = ProxyRecord::new(host, port).with_scheme(scheme);
        if !url.username().is_empty() {
            proxy.username = Some(url.username().to_string());
            proxy.password = url.password().map(str::to_string);
        }
        Ok(proxy)
    }
}

fn parse_port(value: &str, raw: &str) -> Result<u16> {
    value
        .trim()
        .parse::<u16>()
        .map_err(|_| FetchError::InvalidProxyAddress(format!("{}: invalid port", raw)))
}

impl std::fmt::Display for ProxyRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}", self.scheme, self.address())
    }
}
