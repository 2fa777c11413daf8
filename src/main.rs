//! proxyfetch - Entry Point
//!
//! Builds the proxy pool and fetch engine from the environment, fetches any
//! URLs given on the command line, otherwise keeps the pool healthy until
//! shutdown.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use proxyfetch::config::{Config, LogConfig};
use proxyfetch::fetch::{DomainRateLimiter, FetchEngine};
use proxyfetch::models::FetchRequest;
use proxyfetch::proxy::{HttpProbeValidator, HttpTransport, ProxyPool, ReqwestTransport};
use proxyfetch::repository::ProxyRepository;
use proxyfetch::store::MemoryStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;
    init_tracing(&config.log);

    info!("Starting proxyfetch");

    let transport: Arc<dyn HttpTransport> =
        Arc::new(ReqwestTransport::new(config.transport.clone()));

    let store = Arc::new(MemoryStore::new());
    let repository = ProxyRepository::new(store, &config.key_prefix);
    let validator = Arc::new(HttpProbeValidator::new(
        transport.clone(),
        config.validator.check_url.clone(),
        config.validator.check_timeout,
    ));
    let sources = config.sources.build(transport.clone())?;
    info!("Configured {} proxy sources", sources.len());

    let pool = Arc::new(ProxyPool::new(config.pool.clone(), repository, validator, sources));
    if let Err(e) = pool.start().await {
        error!("Failed to start proxy pool: {}", e);
    }

    let rate_limiter = Arc::new(DomainRateLimiter::new(config.rate_limit.default_qps)?);
    for (domain, qps) in &config.rate_limit.domain_qps {
        rate_limiter.add_rule(domain, *qps)?;
    }

    let engine = Arc::new(
        FetchEngine::new(config.engine.clone(), transport, rate_limiter).with_proxy_provider(pool.clone()),
    );

    let urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        match pool.stats().await {
            Ok(stats) => info!(
                available = stats.available,
                blacklisted = stats.blacklisted,
                "Proxy pool ready, waiting for shutdown signal"
            ),
            Err(e) => warn!("Failed to read pool stats: {}", e),
        }
        shutdown_signal().await;
        info!("Shutdown signal received");
    } else {
        let requests = urls.into_iter().map(FetchRequest::get).collect();
        let responses = engine.fetch_batch(requests).await;

        let succeeded = responses.iter().filter(|r| r.success).count();
        for response in &responses {
            if response.success {
                info!(
                    url = %response.url,
                    status = ?response.status_code,
                    bytes = response.body.len(),
                    elapsed_ms = response.response_time_ms,
                    proxy = ?response.used_proxy.as_ref().map(|p| p.address()),
                    "Fetched"
                );
            } else {
                warn!(
                    url = %response.url,
                    status = ?response.status_code,
                    attempts = response.attempts,
                    "Fetch failed: {}",
                    response.error_message.as_deref().unwrap_or("unknown error")
                );
            }
        }
        info!("Fetched {}/{} URLs", succeeded, responses.len());
    }

    engine.shutdown();
    pool.shutdown().await;

    info!("proxyfetch stopped");
    Ok(())
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("proxyfetch={}", log.level).into());

    if log.format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
