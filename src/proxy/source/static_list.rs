use async_trait::async_trait;
use tracing::warn;

use super::ProxySource;
use crate::models::ProxyRecord;

/// Source backed by a fixed list of proxy strings
pub struct StaticProxySource {
    name: String,
    entries: Vec<String>,
    priority: i32,
}

impl StaticProxySource {
    pub fn new(name: impl Into<String>, entries: Vec<String>, priority: i32) -> Self {
        Self {
            name: name.into(),
            entries,
            priority,
        }
    }
}

#[async_trait]
impl ProxySource for StaticProxySource {
    async fn fetch(&self) -> Vec<ProxyRecord> {
        self.entries
            .iter()
            .filter(|e| !e.trim().is_empty())
            .filter_map(|entry| match ProxyRecord::parse(entry) {
                Ok(proxy) => Some(proxy),
                Err(e) => {
                    warn!(source = %self.name, "Skipping static proxy entry: {}", e);
                    None
                }
            })
            .collect()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn is_enabled(&self) -> bool {
        !self.entries.is_empty()
    }
}
