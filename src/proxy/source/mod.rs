//! Proxy candidate sources
//!
//! Sources only propose candidates; the pool validates them. A source never
//! fails: transient problems are logged and yield an empty list.

mod api;
mod pool_service;
mod static_list;

pub use api::{parse_json_list, parse_text_list, ApiProxySource, JsonFields, ResponseFormat};
pub use pool_service::{parse_pool_service_list, ProxyPoolServiceSource};
pub use static_list::StaticProxySource;

use async_trait::async_trait;

use crate::models::ProxyRecord;

/// Supplier of raw proxy candidates
#[async_trait]
pub trait ProxySource: Send + Sync {
    /// Best-effort fetch; empty on any error
    async fn fetch(&self) -> Vec<ProxyRecord>;

    fn name(&self) -> &str;

    /// Lower is preferred
    fn priority(&self) -> i32;

    fn is_enabled(&self) -> bool {
        true
    }
}
