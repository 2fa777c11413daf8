//! Proxy pool and its collaborators
//!
//! This module provides:
//! - Pluggable candidate sources
//! - Live validation probes
//! - The self-healing pool with its periodic health sweep
//! - The HTTP transport used by probes, sources and the fetch engine

pub mod health;
pub mod pool;
pub mod rotation;
pub mod source;
pub mod transport;
pub mod validator;

pub use health::{HealthChecker, HealthHandle};
pub use pool::{PoolConfig, ProxyPool, ProxyProvider};
pub use rotation::RandomSelector;
pub use source::{ApiProxySource, ProxyPoolServiceSource, ProxySource, ResponseFormat, StaticProxySource};
pub use transport::{HttpTransport, ReqwestTransport, TransportConfig, TransportRequest, TransportResponse};
pub use validator::{validate_batch, HttpProbeValidator, ProxyValidator};
