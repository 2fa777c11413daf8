//! proxyfetch - Resilient HTTP fetching through a rotating proxy pool
//!
//! ## Features
//!
//! - Pluggable proxy sources (static list, text/JSON APIs, proxy-pool service)
//! - Live validation and a periodic self-healing health sweep
//! - Failure feedback with time-bounded blacklisting
//! - Per-domain rate limiting
//! - Retries with proxy failover and configurable backoff
//! - Pool state in a shared key-value store with versioned writes

pub mod config;
pub mod error;
pub mod fetch;
pub mod models;
pub mod proxy;
pub mod repository;
pub mod store;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::{FetchError, Result};
pub use fetch::{DomainRateLimiter, EngineConfig, FetchEngine};
pub use models::{FetchRequest, FetchResponse, PoolStats, ProxyRecord, ProxyScheme, ValidationResult};
pub use proxy::{PoolConfig, ProxyPool, ProxyProvider};
pub use store::{KeyValueStore, MemoryStore};
