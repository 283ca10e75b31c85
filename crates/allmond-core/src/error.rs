//! Error types for Allmond

/// Result type alias using Allmond's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Allmond operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Model composition failed; the service must not serve inference
    #[error("startup failure: {0}")]
    Startup(String),

    /// Inference requested while no model is loaded
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// A single text could not be classified
    #[error("inference error: {0}")]
    Inference(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new startup error
    pub fn startup(msg: impl Into<String>) -> Self {
        Self::Startup(msg.into())
    }

    /// Create a new service-unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    /// Create a new per-item inference error
    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error must keep the service from answering inference calls
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Startup(_) | Self::Config(_))
    }
}
