//! Error types for the proxy.

use thiserror::Error;

/// Proxy error type.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// CA certificate setup failed.
    #[error("CA error: {0}")]
    Ca(#[from] CaManagerError),

    /// Every port in the range is taken.
    #[error("no available port in range {min}-{max}")]
    NoPortAvailable {
        /// Lowest port tried.
        min: u16,
        /// Highest port tried.
        max: u16,
    },

    /// A relayed body could not be read.
    #[error("Relay error: {0}")]
    Relay(String),

    /// The proxy is already running.
    #[error("proxy is already running")]
    AlreadyRunning,

    /// Proxy server error.
    #[error("Proxy error: {0}")]
    Proxy(String),
}

/// CA manager error type.
#[derive(Debug, Error)]
pub enum CaManagerError {
    /// Failed to generate CA certificate.
    #[error("Failed to generate CA: {0}")]
    Generation(String),

    /// Failed to read CA certificate.
    #[error("Failed to read CA: {0}")]
    Read(#[from] std::io::Error),

    /// Failed to parse CA certificate.
    #[error("Failed to parse CA: {0}")]
    Parse(String),

    /// Failed to write CA certificate.
    #[error("Failed to write CA: {0}")]
    Write(String),
}

/// Result type for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;
