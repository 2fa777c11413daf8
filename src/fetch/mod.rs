//! Outbound fetching
//!
//! - Per-domain rate limiting
//! - Retry backoff
//! - Default headers
//! - The fetch engine tying them to the proxy pool

pub mod backoff;
pub mod engine;
pub mod headers;
pub mod rate_limit;

pub use backoff::BackoffPolicy;
pub use engine::{EngineConfig, FetchEngine};
pub use headers::DefaultHeaders;
pub use rate_limit::{extract_domain, DomainRateLimiter};
