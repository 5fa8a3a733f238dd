use thiserror::Error;

#[derive(Error, Debug)]
pub enum PodtagError {
    #[error("Kubernetes error: {0}")]
    KubernetesError(String),

    #[error("Failed to subscribe to pod events for {scope}: {reason}")]
    SubscriptionFailed { scope: String, reason: String },

    #[error("Invalid pod identity {value:?}: expected {expected}")]
    InvalidIdentity { value: String, expected: &'static str },

    #[error("Forwarding failed: {0}")]
    ForwardError(String),

    #[error("Metrics error: {0}")]
    MetricsError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<prometheus::Error> for PodtagError {
    fn from(e: prometheus::Error) -> Self {
        PodtagError::MetricsError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PodtagError>;
