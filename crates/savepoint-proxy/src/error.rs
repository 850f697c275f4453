//! Proxy error types.

use thiserror::Error;

/// Errors that can occur while proxying connections.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProxyError {
    /// The address does not use the proxy scheme.
    #[error("unsupported address: {0}")]
    UnsupportedAddress(String),

    /// No real driver with the configured name is registered.
    #[error("wrapped driver not found: {0}")]
    WrappedDriverNotFound(String),

    /// Transport-level failure while opening, closing, or querying a real
    /// connection.
    #[error("connection I/O error: {0}")]
    ConnectionIo(String),

    /// The connection has already been closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Proxy or registry configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ProxyError {
    /// Build a [`ProxyError::ConnectionIo`] from any displayable error.
    pub fn io(err: impl std::fmt::Display) -> Self {
        Self::ConnectionIo(err.to_string())
    }

    /// Check if this error is transient and may succeed on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectionIo(_))
    }

    /// Check if this error means the proxy cannot function at all.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::WrappedDriverNotFound(_) | Self::Configuration(_))
    }
}

impl From<std::io::Error> for ProxyError {
    fn from(err: std::io::Error) -> Self {
        Self::ConnectionIo(err.to_string())
    }
}

/// Result type for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;
