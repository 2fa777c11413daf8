//! Key-value store abstraction for shared pool state
//!
//! The pool keeps no authoritative state in process memory. Everything lives
//! behind [`KeyValueStore`], which maps onto Redis-style primitives so the
//! same pool state can be shared by several processes.

mod memory;

pub use memory::MemoryStore;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Generic key-value store with set and TTL support
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    async fn set(&self, key: &str, value: Bytes) -> Result<()>;

    /// Returns whether the key existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Atomically replace the value at `key` if it currently equals
    /// `expected` (`None` meaning "absent"). Returns whether the write
    /// happened.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<Bytes>,
        value: Bytes,
    ) -> Result<bool>;

    /// Returns whether the member was newly added
    async fn s_add(&self, key: &str, member: &str) -> Result<bool>;

    async fn s_is_member(&self, key: &str, member: &str) -> Result<bool>;

    async fn s_card(&self, key: &str) -> Result<u64>;

    /// Returns whether the key existed
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;
}
