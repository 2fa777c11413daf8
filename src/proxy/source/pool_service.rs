use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use super::ProxySource;
use crate::models::{ProxyRecord, ProxyScheme};
use crate::proxy::transport::{HttpTransport, TransportRequest};

const SOURCE_NAME: &str = "proxy-pool";

#[derive(Debug, Deserialize)]
struct PoolServiceItem {
    proxy: Option<String>,
    #[serde(default)]
    https: Option<bool>,
}

/// Source backed by a dedicated proxy-pool service, anonymous proxies only
pub struct ProxyPoolServiceSource {
    base_url: String,
    enabled: bool,
    priority: i32,
    timeout: Duration,
    transport: Arc<dyn HttpTransport>,
}

impl ProxyPoolServiceSource {
    pub fn new(
        base_url: impl Into<String>,
        enabled: bool,
        priority: i32,
        timeout: Duration,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            enabled,
            priority,
            timeout,
            transport,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/all_anonymous/", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ProxySource for ProxyPoolServiceSource {
    async fn fetch(&self) -> Vec<ProxyRecord> {
        if !self.enabled {
            debug!("Proxy pool service source is disabled");
            return Vec::new();
        }

        let request = TransportRequest::get(self.endpoint(), self.timeout);
        match self.transport.execute(request).await {
            Ok(response) if response.is_success() => {
                let proxies = parse_pool_service_list(&String::from_utf8_lossy(&response.body));
                info!(count = proxies.len(), "Fetched anonymous proxies from pool service");
                proxies
            }
            Ok(response) => {
                warn!(status = response.status, "Proxy pool service returned error status");
                Vec::new()
            }
            Err(e) => {
                error!("Proxy pool service request failed: {}", e);
                Vec::new()
            }
        }
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Parse `[{"proxy": "ip:port", "https": bool}, ...]`
pub fn parse_pool_service_list(body: &str) -> Vec<ProxyRecord> {
    let items: Vec<PoolServiceItem> = match serde_json::from_str(body) {
        Ok(items) => items,
        Err(e) => {
            warn!("Failed to parse proxy pool service response: {}", e);
            return Vec::new();
        }
    };

    items
        .into_iter()
        .filter_map(|item| {
            let raw = item.proxy.filter(|p| !p.is_empty())?;
            let (host, port) = raw.split_once(':')?;
            let port = port.split(':').next()?.parse::<u16>().ok()?;
            let scheme = if item.https.unwrap_or(false) {
                ProxyScheme::Https
            } else {
                ProxyScheme::Http
            };
            Some(ProxyRecord::new(host, port).with_scheme(scheme))
        })
        .collect()
}
