use serde::Serialize;

use super::ProxyRecord;

/// Point-in-time summary of the proxy pool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolStats {
    pub available: usize,
    pub blacklisted: u64,
    pub avg_response_time_ms: f64,
    /// Mean success rate in `[0, 1]`
    pub avg_success_rate: f64,
}

impl PoolStats {
    pub fn from_records(records: &[ProxyRecord], blacklisted: u64) -> Self {
        if records.is_empty() {
            return Self {
                available: 0,
                blacklisted,
                avg_response_time_ms: 0.0,
                avg_success_rate: 0.0,
            };
        }

        let count = records.len() as f64;
        let total_time: u64 = records.iter().map(|p| p.response_time_ms).sum();
        let total_rate: f64 = records.iter().map(|p| p.success_rate()).sum();

        Self {
            available: records.len(),
            blacklisted,
            avg_response_time_ms: total_time as f64 / count,
            avg_success_rate: total_rate / count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_empty_pool() {
        let stats = PoolStats::from_records(&[], 4);
        assert_eq!(stats.available, 0);
        assert_eq!(stats.blacklisted, 4);
        assert_eq!(stats.avg_response_time_ms, 0.0);
    }

    #[test]
    fn test_stats_averages() {
        let mut a = ProxyRecord::new("1.1.1.1", 80);
        a.response_time_ms = 100;
        let mut b = ProxyRecord::new("2.2.2.2", 80);
        b.response_time_ms = 300;
        b.record_failure();

        let stats = PoolStats::from_records(&[a, b], 0);
        assert_eq!(stats.available, 2);
        assert!((stats.avg_response_time_ms - 200.0).abs() < 1e-9);
        assert!((stats.avg_success_rate - 0.5).abs() < 1e-9);
    }
}
