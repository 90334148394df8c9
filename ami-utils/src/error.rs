//! Error types for amibridge
//!
//! Provides a unified error type used across all amibridge crates.

/// Main error type for amibridge operations
#[derive(Debug, thiserror::Error)]
pub enum AmiError {
    // === IO Errors ===

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // === Connection Errors ===

    #[error("Not connected to the manager interface")]
    NotConnected,

    #[error("Connection lost before a response arrived")]
    ConnectionLost,

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Action timed out after {seconds}s")]
    Timeout { seconds: u64 },

    // === Session Errors ===

    #[error("Authentication failed: {0}")]
    AuthFailure(String),

    // === Protocol Errors ===

    #[error("Protocol error: {0}")]
    Protocol(String),

    // === Configuration Errors ===

    #[error("Configuration error: {0}")]
    Config(String),

    // === Internal Errors ===

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AmiError {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this error clears on its own once the supervisor reconnects
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NotConnected
                | Self::ConnectionLost
                | Self::Connection(_)
                | Self::Timeout { .. }
        )
    }
}

/// Result type alias using AmiError
pub type Result<T> = std::result::Result<T, AmiError>;
