//! Plugin service error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors in the plugin configuration. Always fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Listen address is empty.
    #[error("listen address cannot be empty")]
    EmptyEndpoint,

    /// Listen address is not a `unix://` URL.
    #[error("unsupported scheme in listen address {0:?}, expected unix://")]
    UnsupportedScheme(String),

    /// Listen address has no socket path.
    #[error("listen address {0:?} has no socket path")]
    MissingPath(String),

    /// Abstract-namespace sockets are not supported.
    #[error("abstract socket {0:?} is not supported")]
    AbstractSocket(String),

    /// Duration string could not be parsed.
    #[error("invalid duration {0:?}")]
    InvalidDuration(String),

    /// Latency bounds are invalid.
    #[error("{operation} latency: {source}")]
    Latency {
        /// Operation the bounds apply to.
        operation: &'static str,
        /// Underlying error.
        #[source]
        source: mock_kms_latency::LatencyError,
    },
}

/// Errors that can occur while running the plugin service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// `start` was called while the service was already running.
    #[error("plugin service is already running")]
    AlreadyRunning,

    /// Failed to bind the listening socket.
    #[error("failed to listen on {}: {source}", .path.display())]
    Bind {
        /// Socket path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The server stopped serving without being asked to.
    #[error("listener closed unexpectedly")]
    ListenerClosed,

    /// The gRPC server stopped with an error.
    #[error("serve error: {0}")]
    Serve(#[from] tonic::transport::Error),
}
