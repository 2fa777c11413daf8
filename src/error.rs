use thiserror::Error;

/// Unified error type for the fetch engine and proxy pool
#[derive(Error, Debug)]
pub enum FetchError {
    // Store errors
    #[error("Store error: {0}")]
    Store(String),

    #[error("Store contention on key {key} after {attempts} attempts")]
    StoreContention { key: String, attempts: u32 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Proxy errors
    #[error("No proxies available")]
    NoProxiesAvailable,

    #[error("Invalid proxy address: {0}")]
    InvalidProxyAddress(String),

    #[error("Unsupported proxy scheme: {0}")]
    UnsupportedScheme(String),

    // Transport errors
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Retryable status code {status}")]
    RetryableStatus { status: u16 },

    // Request errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // Lifecycle errors
    #[error("Fetch engine is shut down")]
    EngineShutdown,

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for fetch operations
pub type Result<T> = std::result::Result<T, FetchError>;

impl FetchError {
    /// Whether this error came from the network path of an attempt
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            FetchError::Connect(_)
                | FetchError::Timeout(_)
                | FetchError::Transport(_)
                | FetchError::RetryableStatus { .. }
        )
    }

    /// Whether this error is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout(_))
    }
}

// Convert from reqwest errors
impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(err.to_string())
        } else if err.is_connect() {
            FetchError::Connect(err.to_string())
        } else if err.is_builder() {
            FetchError::InvalidRequest(err.to_string())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}
