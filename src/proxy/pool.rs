//! Self-healing proxy pool
//!
//! Pool state lives in a [`KeyValueStore`](crate::store::KeyValueStore)
//! through [`ProxyRepository`]; this type orchestrates sources, validation,
//! selection and failure feedback on top of it.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, instrument, warn};

use crate::error::Result;
use crate::models::{PoolStats, ProxyRecord};
use crate::proxy::health::{HealthChecker, HealthHandle};
use crate::proxy::rotation::RandomSelector;
use crate::proxy::source::ProxySource;
use crate::proxy::validator::{validate_batch, ProxyValidator};
use crate::repository::{Mutation, ProxyRepository};

/// Proxy pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub enabled: bool,
    /// Below this many available proxies a sweep triggers a refresh
    pub min_available: usize,
    /// Failures at which a proxy is blacklisted
    pub max_fail_count: u64,
    pub check_interval: Duration,
    pub blacklist_ttl: Duration,
    pub validate_concurrency: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_available: 10,
            max_fail_count: 3,
            check_interval: Duration::from_secs(300),
            blacklist_ttl: Duration::from_secs(24 * 60 * 60),
            validate_concurrency: 16,
        }
    }
}

/// What the engine needs from a pool
#[async_trait]
pub trait ProxyProvider: Send + Sync {
    async fn get_proxy(&self) -> Option<ProxyRecord>;

    async fn report_success(&self, proxy: &ProxyRecord);

    async fn report_failure(&self, proxy: &ProxyRecord, reason: &str);
}

enum FailureOutcome {
    Missing,
    Counted(u64),
    Evicting(u64),
}

pub struct ProxyPool {
    config: PoolConfig,
    repository: ProxyRepository,
    sources: Vec<Arc<dyn ProxySource>>,
    validator: Arc<dyn ProxyValidator>,
    selector: RandomSelector,
    refresh_lock: AsyncMutex<()>,
    health: Mutex<Option<HealthHandle>>,
}

impl ProxyPool {
    /// Create a pool; sources are consulted in ascending priority order
    pub fn new(
        config: PoolConfig,
        repository: ProxyRepository,
        validator: Arc<dyn ProxyValidator>,
        mut sources: Vec<Arc<dyn ProxySource>>,
    ) -> Self {
        sources.sort_by_key(|s| s.priority());
        Self {
            config,
            repository,
            sources,
            validator,
            selector: RandomSelector::new(),
            refresh_lock: AsyncMutex::new(()),
            health: Mutex::new(None),
        }
    }

    /// Replace the random source used for selection
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.selector = RandomSelector::from_rng(rng);
        self
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn repository(&self) -> &ProxyRepository {
        &self.repository
    }

    /// Pick a random available proxy, refreshing once if the pool is empty
    pub async fn get_proxy(&self) -> Result<Option<ProxyRecord>> {
        if !self.config.enabled {
            return Ok(None);
        }

        let mut proxies = self.repository.get_all().await?;
        if proxies.is_empty() {
            proxies = self.refresh_if_empty().await?;
        }

        let Some(proxy) = self.selector.choose(&proxies) else {
            warn!("No proxies available after refresh");
            return Ok(None);
        };

        let mut proxy = proxy.clone();
        proxy.last_use_time = Some(Utc::now());
        Ok(Some(proxy))
    }

    /// Up to `count` distinct proxies in random order
    pub async fn get_proxies(&self, count: usize) -> Result<Vec<ProxyRecord>> {
        if !self.config.enabled || count == 0 {
            return Ok(Vec::new());
        }

        let mut proxies = self.repository.get_all().await?;
        let mut seen = HashSet::new();
        proxies.retain(|p| seen.insert(p.address()));
        Ok(self.selector.sample(&proxies, count))
    }

    /// Count a success against a pooled proxy. Returns false when the proxy
    /// is not in the pool.
    pub async fn report_success(&self, proxy: &ProxyRecord) -> Result<bool> {
        let found = self
            .repository
            .update(|proxies| match proxies.iter_mut().find(|p| p.same_identity(proxy)) {
                Some(p) => {
                    p.record_success();
                    Mutation::Write(true)
                }
                None => Mutation::Skip(false),
            })
            .await?;

        if !found {
            debug!(proxy = %proxy.address(), "Success reported for proxy not in pool");
        }
        Ok(found)
    }

    /// Count a failure against a pooled proxy. Returns true when this call
    /// moved the proxy to the blacklist.
    pub async fn report_failure(&self, proxy: &ProxyRecord, reason: &str) -> Result<bool> {
        let max_fail_count = self.config.max_fail_count;
        let outcome = self
            .repository
            .update(|proxies| {
                let Some(idx) = proxies.iter().position(|p| p.same_identity(proxy)) else {
                    return Mutation::Skip(FailureOutcome::Missing);
                };
                let fail_count = proxies[idx].fail_count.saturating_add(1);
                if fail_count >= max_fail_count {
                    return Mutation::Skip(FailureOutcome::Evicting(fail_count));
                }
                proxies[idx].record_failure();
                Mutation::Write(FailureOutcome::Counted(fail_count))
            })
            .await?;

        let address = proxy.address();
        match outcome {
            FailureOutcome::Missing => {
                debug!(proxy = %address, "Failure reported for proxy not in pool");
                Ok(false)
            }
            FailureOutcome::Counted(fail_count) => {
                debug!(proxy = %address, fail_count, reason, "Proxy failure recorded");
                Ok(false)
            }
            FailureOutcome::Evicting(fail_count) => {
                // Blacklist first so a concurrent refresh cannot re-add it
                self.repository
                    .add_to_blacklist(&address, self.config.blacklist_ttl)
                    .await?;
                let removed = self.repository.remove(proxy).await?;
                if removed {
                    warn!(proxy = %address, fail_count, reason, "Proxy blacklisted");
                }
                Ok(removed)
            }
        }
    }

    /// Pull candidates from every enabled source, validate them and add the
    /// passing ones. Returns how many proxies were added.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<usize> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    async fn refresh_if_empty(&self) -> Result<Vec<ProxyRecord>> {
        let _guard = self.refresh_lock.lock().await;
        let proxies = self.repository.get_all().await?;
        if !proxies.is_empty() {
            return Ok(proxies);
        }

        info!("Proxy pool is empty, refreshing");
        self.refresh_locked().await?;
        self.repository.get_all().await
    }

    async fn refresh_locked(&self) -> Result<usize> {
        if !self.config.enabled {
            return Ok(0);
        }

        let mut seen: HashSet<String> = self
            .repository
            .get_all()
            .await?
            .iter()
            .map(ProxyRecord::address)
            .collect();

        let mut candidates = Vec::new();
        for source in self.sources.iter().filter(|s| s.is_enabled()) {
            let fetched = source.fetch().await;
            debug!(source = source.name(), count = fetched.len(), "Fetched proxy candidates");

            for proxy in fetched {
                let address = proxy.address();
                if !seen.insert(address.clone()) {
                    continue;
                }
                if self.repository.is_blacklisted(&address).await? {
                    debug!(proxy = %address, "Skipping blacklisted proxy");
                    continue;
                }
                candidates.push(proxy);
            }
        }

        if candidates.is_empty() {
            warn!("No new proxy candidates from any source");
            return Ok(0);
        }

        let total = candidates.len();
        let valid = validate_batch(
            self.validator.as_ref(),
            candidates,
            self.config.validate_concurrency,
        )
        .await;

        let mut added = 0;
        for proxy in &valid {
            if self.repository.add_unless_blacklisted(proxy).await? {
                added += 1;
            }
        }

        info!(candidates = total, valid = valid.len(), added, "Proxy pool refreshed");
        Ok(added)
    }

    /// Re-validate every available proxy and refresh if the pool runs low
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }

        let proxies = self.repository.get_all().await?;
        info!("Checking health of {} proxies", proxies.len());

        let validator = self.validator.as_ref();
        let results = futures::stream::iter(proxies)
            .map(|proxy| async move {
                let result = validator.validate(&proxy).await;
                (proxy, result)
            })
            .buffer_unordered(self.config.validate_concurrency.max(1))
            .collect::<Vec<_>>()
            .await;

        let mut unhealthy = 0;
        for (proxy, result) in &results {
            if result.valid {
                let response_time_ms = result.response_time_ms;
                let updated = self
                    .repository
                    .update(|proxies| match proxies.iter_mut().find(|p| p.same_identity(proxy)) {
                        Some(p) => {
                            p.response_time_ms = response_time_ms;
                            Mutation::Write(())
                        }
                        None => Mutation::Skip(()),
                    })
                    .await;
                if let Err(e) = updated {
                    warn!(proxy = %proxy.address(), "Failed to record response time: {}", e);
                }
            } else {
                unhealthy += 1;
                if let Err(e) = self.report_failure(proxy, &result.message).await {
                    warn!(proxy = %proxy.address(), "Failed to record health failure: {}", e);
                }
            }
        }

        let available = self.get_available_count().await?;
        info!(
            "Health check complete: {} healthy, {} unhealthy, {} available",
            results.len() - unhealthy,
            unhealthy,
            available
        );

        if available < self.config.min_available {
            info!(
                available,
                min_available = self.config.min_available,
                "Proxy pool below minimum, refreshing"
            );
            self.refresh().await?;
        }
        Ok(())
    }

    pub async fn get_available_count(&self) -> Result<usize> {
        self.repository.count().await
    }

    /// Drop every available proxy; blacklist entries expire on their own
    pub async fn clear(&self) -> Result<()> {
        self.repository.clear().await?;
        info!("Proxy pool cleared");
        Ok(())
    }

    pub async fn stats(&self) -> Result<PoolStats> {
        let proxies = self.repository.get_all().await?;
        let blacklisted = self.repository.blacklist_count().await?;
        Ok(PoolStats::from_records(&proxies, blacklisted))
    }

    /// Fill the pool if it is short and start the periodic health sweep
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if !self.config.enabled {
            info!("Proxy pool disabled");
            return Ok(());
        }
        if self.health.lock().is_some() {
            return Ok(());
        }

        if self.get_available_count().await? < self.config.min_available {
            self.refresh().await?;
        }

        let checker = HealthChecker::new(Arc::clone(self), self.config.check_interval);
        let mut health = self.health.lock();
        if health.is_none() {
            *health = Some(checker.spawn());
        }
        info!(
            interval_ms = self.config.check_interval.as_millis() as u64,
            "Proxy pool started"
        );
        Ok(())
    }

    /// Stop the health sweep, waiting briefly for an in-flight round
    pub async fn shutdown(&self) {
        let handle = self.health.lock().take();
        if let Some(handle) = handle {
            handle.stop().await;
            info!("Proxy pool stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.health.lock().is_some()
    }
}

#[async_trait]
impl ProxyProvider for ProxyPool {
    async fn get_proxy(&self) -> Option<ProxyRecord> {
        ProxyPool::get_proxy(self).await.unwrap_or_else(|e| {
            error!("Failed to get proxy: {}", e);
            None
        })
    }

    async fn report_success(&self, proxy: &ProxyRecord) {
        if let Err(e) = ProxyPool::report_success(self, proxy).await {
            error!(proxy = %proxy.address(), "Failed to report proxy success: {}", e);
        }
    }

    async fn report_failure(&self, proxy: &ProxyRecord, reason: &str) {
        if let Err(e) = ProxyPool::report_failure(self, proxy, reason).await {
            error!(proxy = %proxy.address(), "Failed to report proxy failure: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::{ScriptedSource, ScriptedValidator};
    use rand::SeedableRng;

    fn pool(
        config: PoolConfig,
        validator: Arc<ScriptedValidator>,
        sources: Vec<Arc<dyn ProxySource>>,
    ) -> ProxyPool {
        let repository = ProxyRepository::new(Arc::new(MemoryStore::new()), "test:proxy");
        ProxyPool::new(config, repository, validator, sources)
    }

    fn dyn_source(source: &Arc<ScriptedSource>) -> Arc<dyn ProxySource> {
        source.clone()
    }

    fn config(min_available: usize, max_fail_count: u64) -> PoolConfig {
        PoolConfig {
            min_available,
            max_fail_count,
            ..PoolConfig::default()
        }
    }

    #[tokio::test]
    async fn test_three_failures_blacklist_proxy() {
        let pool = pool(config(0, 3), Arc::new(ScriptedValidator::default()), Vec::new());
        let proxy = ProxyRecord::new("1.1.1.1", 80);
        pool.repository().add(&proxy).await.unwrap();

        assert!(!pool.report_failure(&proxy, "timeout").await.unwrap());
        assert!(!pool.report_failure(&proxy, "timeout").await.unwrap());
        assert_eq!(pool.repository().find(&proxy).await.unwrap().unwrap().fail_count, 2);

        assert!(pool.report_failure(&proxy, "timeout").await.unwrap());
        assert!(pool.repository().find(&proxy).await.unwrap().is_none());
        assert!(pool.repository().is_blacklisted("1.1.1.1:80").await.unwrap());

        // Fourth report leaves the available list alone
        assert!(!pool.report_failure(&proxy, "timeout").await.unwrap());
        assert_eq!(pool.get_available_count().await.unwrap(), 0);
        assert_eq!(pool.repository().blacklist_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_pool_refreshes_once_on_get() {
        let source = Arc::new(ScriptedSource::new("static", 1, &["1.1.1.1:80", "2.2.2.2:80"]));
        let validator = Arc::new(ScriptedValidator::passing(&["1.1.1.1:80", "2.2.2.2:80"]));
        let pool = pool(config(2, 3), validator, vec![dyn_source(&source)]);

        let proxy = pool.get_proxy().await.unwrap();
        assert!(proxy.is_some());
        assert!(proxy.unwrap().last_use_time.is_some());
        assert_eq!(source.fetches(), 1);
        assert_eq!(pool.get_available_count().await.unwrap(), 2);

        pool.get_proxy().await.unwrap();
        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test]
    async fn test_get_proxy_none_when_nothing_validates() {
        let source = Arc::new(ScriptedSource::new("static", 1, &["1.1.1.1:80"]));
        let pool = pool(config(2, 3), Arc::new(ScriptedValidator::default()), vec![dyn_source(&source)]);

        assert!(pool.get_proxy().await.unwrap().is_none());
        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test]
    async fn test_disabled_pool_serves_nothing() {
        let source = Arc::new(ScriptedSource::new("static", 1, &["1.1.1.1:80"]));
        let config = PoolConfig {
            enabled: false,
            ..PoolConfig::default()
        };
        let pool = pool(config, Arc::new(ScriptedValidator::passing(&["1.1.1.1:80"])), vec![dyn_source(&source)]);

        assert!(pool.get_proxy().await.unwrap().is_none());
        assert_eq!(pool.refresh().await.unwrap(), 0);
        assert_eq!(source.fetches(), 0);
    }

    #[tokio::test]
    async fn test_refresh_skips_blacklisted_candidates() {
        let source = Arc::new(ScriptedSource::new("static", 1, &["1.1.1.1:80", "2.2.2.2:80"]));
        let validator = Arc::new(ScriptedValidator::passing(&["1.1.1.1:80", "2.2.2.2:80"]));
        let pool = pool(config(0, 3), validator.clone(), vec![dyn_source(&source)]);
        pool.repository()
            .add_to_blacklist("1.1.1.1:80", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(pool.refresh().await.unwrap(), 1);
        assert_eq!(validator.calls(), 1);
        let all = pool.repository().get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].address(), "2.2.2.2:80");
    }

    #[tokio::test]
    async fn test_refresh_consults_enabled_sources_by_priority() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let late = Arc::new(ScriptedSource::new("late", 10, &["1.1.1.1:80"]).logging_to(log.clone()));
        let early = Arc::new(ScriptedSource::new("early", 1, &["2.2.2.2:80"]).logging_to(log.clone()));
        let off = Arc::new(
            ScriptedSource::new("off", 0, &["3.3.3.3:80"])
                .disabled()
                .logging_to(log.clone()),
        );
        let validator = Arc::new(ScriptedValidator::passing(&["1.1.1.1:80", "2.2.2.2:80", "3.3.3.3:80"]));
        let pool = pool(config(0, 3), validator, vec![dyn_source(&late), dyn_source(&early), dyn_source(&off)]);

        assert_eq!(pool.refresh().await.unwrap(), 2);
        assert_eq!(*log.lock(), vec!["early".to_string(), "late".to_string()]);
        assert_eq!(off.fetches(), 0);
    }

    #[tokio::test]
    async fn test_available_list_has_no_duplicates() {
        let a = Arc::new(ScriptedSource::new("a", 1, &["1.1.1.1:80", "1.1.1.1:80"]));
        let b = Arc::new(ScriptedSource::new("b", 2, &["1.1.1.1:80", "http://u:p@1.1.1.1:80"]));
        let pool = pool(config(0, 3), Arc::new(ScriptedValidator::passing(&["1.1.1.1:80"])), vec![dyn_source(&a), dyn_source(&b)]);

        pool.refresh().await.unwrap();
        pool.refresh().await.unwrap();
        assert_eq!(pool.get_available_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_report_success_on_unknown_proxy_is_noop() {
        let pool = pool(config(0, 3), Arc::new(ScriptedValidator::default()), Vec::new());
        let known = ProxyRecord::new("1.1.1.1", 80);
        pool.repository().add(&known).await.unwrap();

        let stranger = ProxyRecord::new("9.9.9.9", 80);
        assert!(!pool.report_success(&stranger).await.unwrap());
        assert!(!pool.report_success(&stranger).await.unwrap());
        assert_eq!(pool.repository().get_all().await.unwrap(), vec![known.clone()]);

        assert!(pool.report_success(&known).await.unwrap());
        let stored = pool.repository().find(&known).await.unwrap().unwrap();
        assert_eq!(stored.success_count, 1);
        assert!(stored.last_use_time.is_some());
    }

    #[tokio::test]
    async fn test_sweep_routes_failures_through_feedback() {
        let validator = Arc::new(ScriptedValidator::passing(&["1.1.1.1:80"]));
        let pool = pool(config(0, 1), validator, Vec::new());
        pool.repository().add(&ProxyRecord::new("1.1.1.1", 80)).await.unwrap();
        pool.repository().add(&ProxyRecord::new("2.2.2.2", 80)).await.unwrap();

        pool.sweep().await.unwrap();

        let all = pool.repository().get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].address(), "1.1.1.1:80");
        assert_eq!(all[0].response_time_ms, 50);
        assert!(pool.repository().is_blacklisted("2.2.2.2:80").await.unwrap());
    }

    #[tokio::test]
    async fn test_sweep_refreshes_when_below_minimum() {
        let source = Arc::new(ScriptedSource::new("static", 1, &["3.3.3.3:80"]));
        let validator = Arc::new(ScriptedValidator::passing(&["3.3.3.3:80"]));
        let pool = pool(config(5, 3), validator, vec![dyn_source(&source)]);

        pool.sweep().await.unwrap();
        assert_eq!(source.fetches(), 1);
        assert_eq!(pool.get_available_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_seeded_selection_is_deterministic() {
        let addresses = ["1.1.1.1:80", "2.2.2.2:80", "3.3.3.3:80", "4.4.4.4:80"];
        let store = Arc::new(MemoryStore::new());
        let repository = ProxyRepository::new(store, "test:proxy");
        for address in addresses {
            repository.add(&ProxyRecord::parse(address).unwrap()).await.unwrap();
        }

        let make = || {
            ProxyPool::new(
                config(0, 3),
                repository.clone(),
                Arc::new(ScriptedValidator::default()),
                Vec::new(),
            )
            .with_rng(StdRng::seed_from_u64(7))
        };
        let (a, b) = (make(), make());

        let mut picks_a = Vec::new();
        let mut picks_b = Vec::new();
        for _ in 0..8 {
            picks_a.push(a.get_proxy().await.unwrap().unwrap().address());
            picks_b.push(b.get_proxy().await.unwrap().unwrap().address());
        }
        assert_eq!(picks_a, picks_b);

        let subset = a.get_proxies(3).await.unwrap();
        assert_eq!(subset.len(), 3);
        let unique: HashSet<String> = subset.iter().map(ProxyRecord::address).collect();
        assert_eq!(unique.len(), 3);
        assert_eq!(a.get_proxies(10).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_stats_and_clear() {
        let pool = pool(config(0, 3), Arc::new(ScriptedValidator::default()), Vec::new());
        let mut fast = ProxyRecord::new("1.1.1.1", 80);
        fast.response_time_ms = 100;
        let mut slow = ProxyRecord::new("2.2.2.2", 80);
        slow.response_time_ms = 300;
        pool.repository().add(&fast).await.unwrap();
        pool.repository().add(&slow).await.unwrap();
        pool.repository()
            .add_to_blacklist("3.3.3.3:80", Duration::from_secs(60))
            .await
            .unwrap();

        let stats = pool.stats().await.unwrap();
        assert_eq!(stats.available, 2);
        assert_eq!(stats.blacklisted, 1);
        assert_eq!(stats.avg_response_time_ms, 200.0);

        pool.clear().await.unwrap();
        assert_eq!(pool.get_available_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let source = Arc::new(ScriptedSource::new("static", 1, &["1.1.1.1:80"]));
        let config = PoolConfig {
            min_available: 1,
            check_interval: Duration::from_millis(20),
            ..PoolConfig::default()
        };
        let pool = Arc::new(pool(
            config,
            Arc::new(ScriptedValidator::passing(&["1.1.1.1:80"])),
            vec![dyn_source(&source)],
        ));

        pool.start().await.unwrap();
        assert!(pool.is_running());
        assert_eq!(pool.get_available_count().await.unwrap(), 1);

        tokio::time::sleep(Duration::from_millis(80)).await;
        pool.shutdown().await;
        assert!(!pool.is_running());
        assert_eq!(source.fetches(), 1);

        // A second shutdown is harmless
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_provider_swallows_errors() {
        let pool = pool(config(0, 3), Arc::new(ScriptedValidator::default()), Vec::new());
        let provider: &dyn ProxyProvider = &pool;

        assert!(provider.get_proxy().await.is_none());
        provider.report_success(&ProxyRecord::new("1.1.1.1", 80)).await;
        provider.report_failure(&ProxyRecord::new("1.1.1.1", 80), "boom").await;
    }

    /// Adds the candidate through another pool on the same store and fails
    /// it out while the refresh is still validating.
    struct EvictingValidator {
        other: ProxyPool,
    }

    #[async_trait]
    impl ProxyValidator for EvictingValidator {
        async fn validate(&self, proxy: &ProxyRecord) -> crate::models::ValidationResult {
            self.other.repository().add(proxy).await.unwrap();
            assert!(self.other.report_failure(proxy, "refused").await.unwrap());
            crate::models::ValidationResult::success(5)
        }
    }

    #[tokio::test]
    async fn test_refresh_does_not_readd_proxy_blacklisted_during_validation() {
        let store = Arc::new(MemoryStore::new());
        let other = ProxyPool::new(
            config(0, 1),
            ProxyRepository::new(store.clone(), "test:proxy"),
            Arc::new(ScriptedValidator::default()),
            Vec::new(),
        );
        let source = Arc::new(ScriptedSource::new("static", 1, &["1.1.1.1:80"]));
        let pool = ProxyPool::new(
            config(0, 3),
            ProxyRepository::new(store, "test:proxy"),
            Arc::new(EvictingValidator { other }),
            vec![dyn_source(&source)],
        );

        assert_eq!(pool.refresh().await.unwrap(), 0);
        assert!(pool.repository().is_blacklisted("1.1.1.1:80").await.unwrap());
        assert_eq!(pool.get_available_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_blacklisted_proxy_rediscovered_after_ttl() {
        let source = Arc::new(ScriptedSource::new("static", 1, &["1.1.1.1:80"]));
        let validator = Arc::new(ScriptedValidator::passing(&["1.1.1.1:80"]));
        let config = PoolConfig {
            min_available: 0,
            max_fail_count: 1,
            blacklist_ttl: Duration::from_millis(100),
            ..PoolConfig::default()
        };
        let pool = pool(config, validator, vec![dyn_source(&source)]);
        let proxy = ProxyRecord::new("1.1.1.1", 80);

        assert_eq!(pool.refresh().await.unwrap(), 1);
        assert!(pool.report_failure(&proxy, "refused").await.unwrap());

        assert_eq!(pool.refresh().await.unwrap(), 0);
        assert_eq!(pool.get_available_count().await.unwrap(), 0);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!pool.repository().is_blacklisted("1.1.1.1:80").await.unwrap());
        assert_eq!(pool.refresh().await.unwrap(), 1);
        assert!(pool.repository().find(&proxy).await.unwrap().is_some());
    }
}
