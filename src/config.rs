use std::collections::HashSet;
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{FetchError, Result};
use crate::fetch::{BackoffPolicy, EngineConfig};
use crate::proxy::pool::PoolConfig;
use crate::proxy::source::{
    ApiProxySource, JsonFields, ProxyPoolServiceSource, ProxySource, ResponseFormat,
    StaticProxySource,
};
use crate::proxy::transport::{HttpTransport, TransportConfig};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Pool sizing, feedback and sweep settings
    pub pool: PoolConfig,
    /// Validator probe settings
    pub validator: ValidatorConfig,
    /// Prefix for the pool's store keys
    pub key_prefix: String,
    /// Candidate sources
    pub sources: SourcesConfig,
    /// HTTP transport settings
    pub transport: TransportConfig,
    /// Fetch engine settings
    pub engine: EngineConfig,
    /// Per-domain rate limits
    pub rate_limit: RateLimitConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub check_url: String,
    pub check_timeout: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct SourcesConfig {
    /// `host:port[:user:pass]` entries
    pub static_list: Vec<String>,
    pub api: Vec<ApiSourceConfig>,
    pub pool_service: PoolServiceConfig,
}

/// One third-party proxy API, as given in `PROXY_API_SOURCES`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApiSourceConfig {
    pub name: String,
    pub url: String,
    /// `text` or `json`
    #[serde(default = "default_api_format")]
    pub format: String,
    #[serde(default = "default_api_priority")]
    pub priority: i32,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub host_field: Option<String>,
    #[serde(default)]
    pub port_field: Option<String>,
    #[serde(default)]
    pub username_field: Option<String>,
    #[serde(default)]
    pub password_field: Option<String>,
}

fn default_api_format() -> String {
    "text".to_string()
}

fn default_api_priority() -> i32 {
    100
}

impl ApiSourceConfig {
    pub fn response_format(&self) -> Result<ResponseFormat> {
        match self.format.to_lowercase().as_str() {
            "text" | "txt" => Ok(ResponseFormat::Text),
            "json" => {
                let defaults = JsonFields::default();
                Ok(ResponseFormat::Json(JsonFields {
                    host: self.host_field.clone().unwrap_or(defaults.host),
                    port: self.port_field.clone().unwrap_or(defaults.port),
                    username: self.username_field.clone().unwrap_or(defaults.username),
                    password: self.password_field.clone().unwrap_or(defaults.password),
                }))
            }
            other => Err(FetchError::InvalidConfig(format!(
                "proxy API source {} has unsupported format: {}",
                self.name, other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PoolServiceConfig {
    pub enabled: bool,
    pub url: String,
    pub priority: i32,
    pub timeout: Duration,
}

impl Default for PoolServiceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "http://localhost:5010".to_string(),
            priority: 50,
            timeout: Duration::from_secs(10),
        }
    }
}

impl SourcesConfig {
    /// Instantiate every configured source over `transport`
    pub fn build(&self, transport: Arc<dyn HttpTransport>) -> Result<Vec<Arc<dyn ProxySource>>> {
        let mut sources: Vec<Arc<dyn ProxySource>> = Vec::new();

        if !self.static_list.is_empty() {
            sources.push(Arc::new(StaticProxySource::new(
                "static",
                self.static_list.clone(),
                1,
            )));
        }

        for api in &self.api {
            let mut source = ApiProxySource::new(
                api.name.clone(),
                api.url.clone(),
                api.response_format()?,
                api.priority,
                transport.clone(),
            );
            if let Some(timeout_ms) = api.timeout_ms {
                source = source.with_timeout(Duration::from_millis(timeout_ms));
            }
            sources.push(Arc::new(source));
        }

        sources.push(Arc::new(ProxyPoolServiceSource::new(
            self.pool_service.url.clone(),
            self.pool_service.enabled,
            self.pool_service.priority,
            self.pool_service.timeout,
            transport,
        )));

        Ok(sources)
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub default_qps: f64,
    /// Per-domain overrides
    pub domain_qps: Vec<(String, f64)>,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            pool: PoolConfig {
                enabled: parse_env("PROXY_POOL_ENABLED", true)?,
                min_available: parse_env("PROXY_MIN_AVAILABLE", 10)?,
                max_fail_count: parse_env("PROXY_MAX_FAIL_COUNT", 3)?,
                check_interval: env_millis("PROXY_CHECK_INTERVAL_MS", 300_000)?,
                blacklist_ttl: Duration::from_secs(
                    parse_env::<u64>("PROXY_BLACKLIST_EXPIRE_HOURS", 24)? * 60 * 60,
                ),
                validate_concurrency: parse_env("PROXY_VALIDATE_CONCURRENCY", 16)?,
            },
            validator: ValidatorConfig {
                check_url: get_env_or("PROXY_CHECK_URL", "https://www.baidu.com"),
                check_timeout: env_millis("PROXY_CHECK_TIMEOUT_MS", 5_000)?,
            },
            key_prefix: get_env_or("PROXY_KEY_PREFIX", "crawler:proxy"),
            sources: SourcesConfig {
                static_list: split_list(&get_env_or("PROXY_STATIC_LIST", ""), ','),
                api: parse_api_sources(&get_env_or("PROXY_API_SOURCES", ""))?,
                pool_service: PoolServiceConfig {
                    enabled: parse_env("PROXY_POOL_SERVICE_ENABLED", false)?,
                    url: get_env_or("PROXY_POOL_SERVICE_URL", "http://localhost:5010"),
                    priority: parse_env("PROXY_POOL_SERVICE_PRIORITY", 50)?,
                    timeout: env_millis("PROXY_POOL_SERVICE_TIMEOUT_MS", 10_000)?,
                },
            },
            transport: TransportConfig {
                max_idle_per_host: parse_env("FETCH_MAX_IDLE_PER_HOST", 200)?,
                max_clients: parse_env("FETCH_MAX_CLIENTS", 256)?,
                keep_alive: env_millis("FETCH_KEEP_ALIVE_MS", 300_000)?,
                write_timeout: env_millis("FETCH_WRITE_TIMEOUT_MS", 60_000)?,
                trust_all_certs: parse_env("FETCH_TRUST_ALL_CERTS", false)?,
            },
            engine: EngineConfig {
                connect_timeout: env_millis("FETCH_CONNECT_TIMEOUT_MS", 30_000)?,
                read_timeout: env_millis("FETCH_READ_TIMEOUT_MS", 60_000)?,
                follow_redirects: parse_env("FETCH_FOLLOW_REDIRECTS", true)?,
                use_proxy: parse_env("FETCH_USE_PROXY", true)?,
                direct_fallback: parse_env("FETCH_DIRECT_FALLBACK", false)?,
                retry_count: parse_env("FETCH_RETRY_COUNT", 3)?,
                retry_interval: env_millis("FETCH_RETRY_INTERVAL_MS", 1_000)?,
                backoff: BackoffPolicy {
                    multiplier: parse_env("FETCH_BACKOFF_MULTIPLIER", 1.0)?,
                    max_delay: env_millis("FETCH_BACKOFF_MAX_MS", 30_000)?,
                    jitter: parse_env("FETCH_BACKOFF_JITTER", 0.0)?,
                },
                retry_on_status: parse_status_set(&get_env_or("FETCH_RETRY_ON_STATUS", ""))?,
                user_agents: split_list(&get_env_or("FETCH_USER_AGENTS", ""), '|'),
            },
            rate_limit: RateLimitConfig {
                default_qps: parse_env("FETCH_DEFAULT_QPS", 5.0)?,
                domain_qps: parse_domain_qps(&get_env_or("FETCH_DOMAIN_QPS", ""))?,
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "pretty"),
            },
        })
    }
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset or blank
fn parse_env<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|_| {
            FetchError::InvalidConfig(format!("{} has an invalid value: {}", key, raw))
        }),
        _ => Ok(default),
    }
}

fn env_millis(key: &str, default_ms: u64) -> Result<Duration> {
    parse_env(key, default_ms).map(Duration::from_millis)
}

fn split_list(raw: &str, separator: char) -> Vec<String> {
    raw.split(separator)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_api_sources(raw: &str) -> Result<Vec<ApiSourceConfig>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let sources: Vec<ApiSourceConfig> = serde_json::from_str(raw).map_err(|e| {
        FetchError::InvalidConfig(format!("PROXY_API_SOURCES must be a JSON array: {}", e))
    })?;
    for source in &sources {
        source.response_format()?;
    }
    Ok(sources)
}

/// `domain=qps,domain=qps`
fn parse_domain_qps(raw: &str) -> Result<Vec<(String, f64)>> {
    split_list(raw, ',')
        .into_iter()
        .map(|entry| {
            let (domain, qps) = entry.split_once('=').ok_or_else(|| {
                FetchError::InvalidConfig(format!("FETCH_DOMAIN_QPS entry must be domain=qps: {}", entry))
            })?;
            let qps: f64 = qps.trim().parse().map_err(|_| {
                FetchError::InvalidConfig(format!("FETCH_DOMAIN_QPS has an invalid rate: {}", entry))
            })?;
            Ok((domain.trim().to_lowercase(), qps))
        })
        .collect()
}

fn parse_status_set(raw: &str) -> Result<HashSet<u16>> {
    split_list(raw, ',')
        .into_iter()
        .map(|code| match code.parse::<u16>() {
            Ok(status) if (100..600).contains(&status) => Ok(status),
            _ => Err(FetchError::InvalidConfig(format!(
                "FETCH_RETRY_ON_STATUS has an invalid status code: {}",
                code
            ))),
        })
        .collect()
}
