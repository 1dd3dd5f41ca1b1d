//! Error types for the management endpoint.

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::ConfigError;

/// Result type alias for endpoint operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors from starting, stopping and using the management endpoint.
#[derive(Debug, Error)]
pub enum ServerError {
    /// No port was configured.
    #[error("management listener has no port configured")]
    NotConfigured,

    /// The configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// `start` was called on a running listener.
    #[error("management listener already running")]
    AlreadyRunning,

    /// The listener is not running.
    #[error("management listener not running")]
    NotRunning,

    /// The TCP endpoint could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// I/O error on the listening socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Registration or dispatch failed.
    #[error(transparent)]
    Core(#[from] simplemx_core::Error),
}
