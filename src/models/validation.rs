use serde::{Deserialize, Serialize};

/// Outcome of a single validator probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub response_time_ms: u64,
    pub message: String,
}

impl ValidationResult {
    pub fn success(response_time_ms: u64) -> Self {
        Self {
            valid: true,
            response_time_ms,
            message: "ok".to_string(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            response_time_ms: 0,
            message: message.into(),
        }
    }
}
