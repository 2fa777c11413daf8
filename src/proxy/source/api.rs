use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::ProxySource;
use crate::models::ProxyRecord;
use crate::proxy::transport::{HttpTransport, TransportRequest};

/// Field names used when reading JSON proxy objects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonFields {
    pub host: String,
    pub port: String,
    pub username: String,
    pub password: String,
}

impl Default for JsonFields {
    fn default() -> Self {
        Self {
            host: "host".to_string(),
            port: "port".to_string(),
            username: "username".to_string(),
            password: "password".to_string(),
        }
    }
}

/// Body format of a proxy API
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseFormat {
    /// One proxy per line
    Text,
    /// JSON array of objects
    Json(JsonFields),
}

/// Source that pulls proxies from a third-party HTTP API
pub struct ApiProxySource {
    name: String,
    url: String,
    format: ResponseFormat,
    priority: i32,
    timeout: Duration,
    transport: Arc<dyn HttpTransport>,
}

impl ApiProxySource {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        format: ResponseFormat,
        priority: i32,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            format,
            priority,
            timeout: Duration::from_secs(10),
            transport,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ProxySource for ApiProxySource {
    async fn fetch(&self) -> Vec<ProxyRecord> {
        let request = TransportRequest::get(&self.url, self.timeout);
        let response = match self.transport.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                error!(source = %self.name, "Proxy API request failed: {}", e);
                return Vec::new();
            }
        };

        if !response.is_success() {
            warn!(source = %self.name, status = response.status, "Proxy API returned error status");
            return Vec::new();
        }

        let body = String::from_utf8_lossy(&response.body);
        let proxies = match &self.format {
            ResponseFormat::Text => parse_text_list(&body),
            ResponseFormat::Json(fields) => parse_json_list(&body, fields),
        };
        info!(source = %self.name, count = proxies.len(), "Fetched proxies from API");
        proxies
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// Parse a newline-delimited proxy list, skipping unparseable lines
pub fn parse_text_list(body: &str) -> Vec<ProxyRecord> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| ProxyRecord::parse(line).ok())
        .collect()
}

/// Parse a JSON array of proxy objects using the given field names
pub fn parse_json_list(body: &str, fields: &JsonFields) -> Vec<ProxyRecord> {
    let items: Vec<Value> = match serde_json::from_str(body) {
        Ok(items) => items,
        Err(e) => {
            warn!("Failed to parse JSON proxy list: {}", e);
            return Vec::new();
        }
    };

    items
        .iter()
        .filter_map(|item| {
            let proxy = parse_json_item(item, fields);
            if proxy.is_none() {
                debug!("Skipping JSON proxy item: {}", item);
            }
            proxy
        })
        .collect()
}

fn parse_json_item(item: &Value, fields: &JsonFields) -> Option<ProxyRecord> {
    let host = item.get(&fields.host)?.as_str()?;
    let port = match item.get(&fields.port)? {
        Value::Number(n) => u16::try_from(n.as_u64()?).ok()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };

    let mut proxy = ProxyRecord::new(host, port);
    let username = item.get(&fields.username).and_then(value_to_string);
    let password = item.get(&fields.password).and_then(value_to_string);
    if let (Some(username), Some(password)) = (username, password) {
        proxy = proxy.with_credentials(username, password);
    }
    Some(proxy)
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}
