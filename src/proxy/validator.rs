//! Live connectivity probes for proxies

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, instrument};

use crate::models::{ProxyRecord, ValidationResult};
use crate::proxy::transport::{HttpTransport, TransportRequest};

/// Probes a single proxy. Implementations never fail; every problem is
/// reported as `valid == false`.
#[async_trait]
pub trait ProxyValidator: Send + Sync {
    async fn validate(&self, proxy: &ProxyRecord) -> ValidationResult;
}

/// Validate proxies concurrently and keep the ones that pass, with their
/// measured latency recorded.
pub async fn validate_batch(
    validator: &dyn ProxyValidator,
    proxies: Vec<ProxyRecord>,
    concurrency: usize,
) -> Vec<ProxyRecord> {
    futures::stream::iter(proxies)
        .map(|mut proxy| async move {
            let result = validator.validate(&proxy).await;
            if result.valid {
                proxy.response_time_ms = result.response_time_ms;
                Some(proxy)
            } else {
                None
            }
        })
        .buffer_unordered(concurrency.max(1))
        .filter_map(|p| async move { p })
        .collect()
        .await
}

/// Validator that issues a GET to a check URL through the proxy
pub struct HttpProbeValidator {
    transport: Arc<dyn HttpTransport>,
    check_url: String,
    timeout: Duration,
}

impl HttpProbeValidator {
    pub fn new(transport: Arc<dyn HttpTransport>, check_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            transport,
            check_url: check_url.into(),
            timeout,
        }
    }

    pub fn check_url(&self) -> &str {
        &self.check_url
    }
}

#[async_trait]
impl ProxyValidator for HttpProbeValidator {
    #[instrument(skip(self, proxy), fields(proxy = %proxy.address()))]
    async fn validate(&self, proxy: &ProxyRecord) -> ValidationResult {
        let request = TransportRequest::get(&self.check_url, self.timeout)
            .with_proxy(Some(proxy.clone()));

        let start = Instant::now();
        let outcome = tokio::time::timeout(self.timeout * 2, self.transport.execute(request)).await;
        let elapsed = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(response)) if response.is_success() => {
                debug!(response_time_ms = elapsed, "Proxy probe succeeded");
                ValidationResult::success(elapsed)
            }
            Ok(Ok(response)) => {
                let message = format!("status code: {}", response.status);
                debug!(response_time_ms = elapsed, "Proxy probe failed: {}", message);
                ValidationResult::failure(message)
            }
            Ok(Err(e)) => {
                debug!(response_time_ms = elapsed, "Proxy probe error: {}", e);
                ValidationResult::failure(e.to_string())
            }
            Err(_) => {
                debug!(response_time_ms = elapsed, "Proxy probe timed out");
                ValidationResult::failure("probe timed out")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::testing::ScriptedTransport;

    fn validator(transport: Arc<ScriptedTransport>) -> HttpProbeValidator {
        HttpProbeValidator::new(transport, "http://check.local/", Duration::from_millis(500))
    }

    #[tokio::test]
    async fn test_probe_success() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond_for("1.1.1.1:80", 200);
        let result = validator(transport.clone())
            .validate(&ProxyRecord::new("1.1.1.1", 80))
            .await;

        assert!(result.valid);
        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].url, "http://check.local/");
        assert_eq!(
            sent[0].proxy.as_ref().map(|p| p.address()),
            Some("1.1.1.1:80".to_string())
        );
    }

    #[tokio::test]
    async fn test_probe_non_2xx_is_invalid() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond_for("1.1.1.1:80", 407);
        let result = validator(transport)
            .validate(&ProxyRecord::new("1.1.1.1", 80))
            .await;

        assert!(!result.valid);
        assert_eq!(result.message, "status code: 407");
    }

    #[tokio::test]
    async fn test_probe_transport_error_is_invalid() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.fail_for("1.1.1.1:80", FetchError::Connect("refused".into()));
        let result = validator(transport)
            .validate(&ProxyRecord::new("1.1.1.1", 80))
            .await;

        assert!(!result.valid);
        assert!(result.message.contains("refused"));
    }

    #[tokio::test]
    async fn test_batch_keeps_only_passing() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond_for("1.1.1.1:80", 200);
        transport.fail_for("2.2.2.2:80", FetchError::Timeout("slow".into()));
        transport.respond_for("3.3.3.3:80", 200);
        let validator = validator(transport);

        let proxies = vec![
            ProxyRecord::new("1.1.1.1", 80),
            ProxyRecord::new("2.2.2.2", 80),
            ProxyRecord::new("3.3.3.3", 80),
        ];
        let mut passing: Vec<String> = validate_batch(&validator, proxies, 4)
            .await
            .iter()
            .map(ProxyRecord::address)
            .collect();
        passing.sort();

        assert_eq!(passing, vec!["1.1.1.1:80", "3.3.3.3:80"]);
    }
}
