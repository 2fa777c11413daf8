//! Per-domain admission control
//!
//! Uses the governor crate: one direct limiter per destination domain,
//! created on first use from the domain's rule or the default rate.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovRateLimiter};
use tracing::{debug, info};
use url::Url;

use crate::error::{FetchError, Result};

type DirectLimiter = GovRateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Domain used when a URL has no host
pub const DEFAULT_DOMAIN: &str = "default";

#[derive(Debug)]
struct DomainLimiter {
    limiter: Arc<DirectLimiter>,
    last_seen_ms: AtomicU64,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// One permit immediately, then one every `1/qps` seconds
fn quota_for(qps: f64) -> Quota {
    Duration::try_from_secs_f64(1.0 / qps)
        .ok()
        .and_then(Quota::with_period)
        .map(|q| q.allow_burst(NonZeroU32::MIN))
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MAX))
}

fn check_qps(qps: f64) -> Result<f64> {
    if !(qps.is_finite() && qps > 0.0) {
        return Err(FetchError::InvalidConfig(format!("qps must be positive, got {}", qps)));
    }
    // The refill period has to fit in a Duration
    if Duration::try_from_secs_f64(1.0 / qps).is_err() {
        return Err(FetchError::InvalidConfig(format!("qps is too small, got {}", qps)));
    }
    Ok(qps)
}

/// Host of `url` without port, lowercased; [`DEFAULT_DOMAIN`] otherwise
pub fn extract_domain(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
        .unwrap_or_else(|| DEFAULT_DOMAIN.to_string())
}

/// Rate limiter keyed by destination domain
pub struct DomainRateLimiter {
    default_qps: f64,
    rules: DashMap<String, f64>,
    limiters: DashMap<String, DomainLimiter>,
    max_idle: Duration,
}

impl DomainRateLimiter {
    pub fn new(default_qps: f64) -> Result<Self> {
        Ok(Self {
            default_qps: check_qps(default_qps)?,
            rules: DashMap::new(),
            limiters: DashMap::new(),
            max_idle: Duration::from_secs(10 * 60),
        })
    }

    pub fn with_max_idle(mut self, max_idle: Duration) -> Self {
        self.max_idle = max_idle;
        self
    }

    pub fn default_qps(&self) -> f64 {
        self.default_qps
    }

    /// Set the rate for one domain, replacing any live limiter for it
    pub fn add_rule(&self, domain: &str, qps: f64) -> Result<()> {
        let qps = check_qps(qps)?;
        let domain = domain.to_ascii_lowercase();
        self.limiters.remove(&domain);
        self.rules.insert(domain.clone(), qps);
        info!(domain = %domain, qps, "Rate limit rule added");
        Ok(())
    }

    /// Effective rate for a domain
    pub fn qps_for(&self, domain: &str) -> f64 {
        self.rules
            .get(domain)
            .map(|r| *r.value())
            .unwrap_or(self.default_qps)
    }

    /// Wait until `domain` admits one more request
    pub async fn acquire(&self, domain: &str) {
        let limiter = self.get_or_create_limiter(domain);
        if limiter.check().is_err() {
            debug!(domain, "Waiting for rate limit permit");
            limiter.until_ready().await;
        }
    }

    /// Take a permit only if one is available now
    pub fn try_acquire(&self, domain: &str) -> bool {
        self.get_or_create_limiter(domain).check().is_ok()
    }

    /// Wait for a permit for at most `wait`; false on timeout
    pub async fn acquire_timeout(&self, domain: &str, wait: Duration) -> bool {
        let limiter = self.get_or_create_limiter(domain);
        tokio::time::timeout(wait, limiter.until_ready()).await.is_ok()
    }

    fn get_or_create_limiter(&self, domain: &str) -> Arc<DirectLimiter> {
        let now_ms = now_ms();
        let domain = domain.to_ascii_lowercase();
        let qps = self.qps_for(&domain);
        let entry = self.limiters.entry(domain).or_insert_with(|| DomainLimiter {
            limiter: Arc::new(GovRateLimiter::direct(quota_for(qps))),
            last_seen_ms: AtomicU64::new(now_ms),
        });

        entry.last_seen_ms.store(now_ms, Ordering::Relaxed);
        entry.limiter.clone()
    }

    /// Drop limiters idle for longer than the configured window
    pub fn cleanup(&self) {
        let now_ms = now_ms();
        let max_idle_ms = self.max_idle.as_millis() as u64;

        self.limiters.retain(|_, entry| {
            let last_seen = entry.last_seen_ms.load(Ordering::Relaxed);
            now_ms.saturating_sub(last_seen) <= max_idle_ms
        });
    }

    /// Drop every live limiter; rules are kept
    pub fn clear(&self) {
        self.limiters.clear();
    }

    /// Number of domains with a live limiter
    pub fn limiter_count(&self) -> usize {
        self.limiters.len()
    }
}
