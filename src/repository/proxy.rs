use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::{FetchError, Result};
use crate::models::ProxyRecord;
use crate::store::KeyValueStore;

/// Attempts before a contended list write gives up
const MAX_CAS_ATTEMPTS: u32 = 16;

/// Result of a list mutation closure
pub enum Mutation<T> {
    /// Persist the mutated list and return the value
    Write(T),
    /// Leave the stored list untouched and return the value
    Skip(T),
}

/// Repository for proxy pool state held in a key-value store.
///
/// The available list is one JSON value; the blacklist is one set of
/// `host:port` members sharing a single TTL.
#[derive(Clone)]
pub struct ProxyRepository {
    store: Arc<dyn KeyValueStore>,
    list_key: String,
    blacklist_key: String,
}

impl ProxyRepository {
    pub fn new(store: Arc<dyn KeyValueStore>, key_prefix: &str) -> Self {
        Self {
            store,
            list_key: format!("{}:list", key_prefix),
            blacklist_key: format!("{}:blacklist", key_prefix),
        }
    }

    pub fn list_key(&self) -> &str {
        &self.list_key
    }

    pub fn blacklist_key(&self) -> &str {
        &self.blacklist_key
    }

    /// Get all available proxies
    pub async fn get_all(&self) -> Result<Vec<ProxyRecord>> {
        let raw = self.store.get(&self.list_key).await?;
        Ok(self.decode(raw.as_ref()))
    }

    /// Find an available proxy by identity
    pub async fn find(&self, proxy: &ProxyRecord) -> Result<Option<ProxyRecord>> {
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .find(|p| p.same_identity(proxy)))
    }

    pub async fn count(&self) -> Result<usize> {
        Ok(self.get_all().await?.len())
    }

    /// Read-modify-write the available list with a versioned write.
    ///
    /// `mutate` may run several times if another writer wins the race; it
    /// always sees the latest stored list.
    pub async fn update<T, F>(&self, mut mutate: F) -> Result<T>
    where
        F: FnMut(&mut Vec<ProxyRecord>) -> Mutation<T>,
    {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let raw = self.store.get(&self.list_key).await?;
            let mut proxies = self.decode(raw.as_ref());

            let value = match mutate(&mut proxies) {
                Mutation::Skip(value) => return Ok(value),
                Mutation::Write(value) => value,
            };

            if self.write_list(raw, &proxies).await? {
                return Ok(value);
            }

            debug!(attempt, key = %self.list_key, "Proxy list changed concurrently, retrying");
            tokio::task::yield_now().await;
        }

        Err(FetchError::StoreContention {
            key: self.list_key.clone(),
            attempts: MAX_CAS_ATTEMPTS,
        })
    }

    /// Add a proxy unless one with the same identity exists
    pub async fn add(&self, proxy: &ProxyRecord) -> Result<bool> {
        self.update(|proxies| {
            if proxies.iter().any(|p| p.same_identity(proxy)) {
                Mutation::Skip(false)
            } else {
                proxies.push(proxy.clone());
                Mutation::Write(true)
            }
        })
        .await
    }

    /// Add a proxy unless it is already present or blacklisted.
    ///
    /// The blacklist is consulted after the list is read. An eviction that
    /// lands in between changes the list, so the write fails and the check
    /// runs again.
    pub async fn add_unless_blacklisted(&self, proxy: &ProxyRecord) -> Result<bool> {
        let address = proxy.address();
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let raw = self.store.get(&self.list_key).await?;
            let mut proxies = self.decode(raw.as_ref());
            if proxies.iter().any(|p| p.same_identity(proxy)) {
                return Ok(false);
            }
            if self.is_blacklisted(&address).await? {
                debug!(proxy = %address, "Not adding blacklisted proxy");
                return Ok(false);
            }

            proxies.push(proxy.clone());
            if self.write_list(raw, &proxies).await? {
                return Ok(true);
            }

            debug!(attempt, key = %self.list_key, "Proxy list changed concurrently, retrying");
            tokio::task::yield_now().await;
        }

        Err(FetchError::StoreContention {
            key: self.list_key.clone(),
            attempts: MAX_CAS_ATTEMPTS,
        })
    }

    /// Remove a proxy by identity
    pub async fn remove(&self, proxy: &ProxyRecord) -> Result<bool> {
        self.update(|proxies| {
            let before = proxies.len();
            proxies.retain(|p| !p.same_identity(proxy));
            if proxies.len() == before {
                Mutation::Skip(false)
            } else {
                Mutation::Write(true)
            }
        })
        .await
    }

    /// Drop the whole available list
    pub async fn clear(&self) -> Result<()> {
        self.store.delete(&self.list_key).await?;
        Ok(())
    }

    /// Add an address to the blacklist and refresh the blacklist TTL
    pub async fn add_to_blacklist(&self, address: &str, ttl: Duration) -> Result<()> {
        self.store.s_add(&self.blacklist_key, address).await?;
        self.store.expire(&self.blacklist_key, ttl).await?;
        Ok(())
    }

    pub async fn is_blacklisted(&self, address: &str) -> Result<bool> {
        self.store.s_is_member(&self.blacklist_key, address).await
    }

    pub async fn blacklist_count(&self) -> Result<u64> {
        self.store.s_card(&self.blacklist_key).await
    }

    async fn write_list(&self, expected: Option<Bytes>, proxies: &[ProxyRecord]) -> Result<bool> {
        let encoded = Bytes::from(serde_json::to_vec(proxies)?);
        self.store
            .compare_and_swap(&self.list_key, expected, encoded)
            .await
    }

    fn decode(&self, raw: Option<&Bytes>) -> Vec<ProxyRecord> {
        match raw {
            Some(bytes) => serde_json::from_slice(bytes).unwrap_or_else(|e| {
                warn!(key = %self.list_key, "Failed to parse proxy list: {}", e);
                Vec::new()
            }),
            None => Vec::new(),
        }
    }
}
