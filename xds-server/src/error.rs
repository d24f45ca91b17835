//! Error types for the xDS server.

use thiserror::Error;

/// A boxed error returned by collaborators such as the backing store or
/// lifecycle callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error type for the xDS server.
///
/// Every variant is fatal to the stream it was raised on.
#[derive(Debug, Error)]
pub enum Error {
    /// The client sent a request missing a required field.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A watch was closed by the backing store without producing a response.
    #[error("{0} watch failed")]
    WatchFailed(String),

    /// A pending response could not be materialized into a discovery response.
    #[error("failed to materialize response: {0}")]
    Serialization(#[source] BoxError),

    /// A lifecycle callback rejected the stream.
    #[error("stream rejected by callback: {0}")]
    Callback(#[source] BoxError),

    /// The response side of the stream was closed by the peer.
    #[error("stream closed")]
    StreamClosed,

    /// Transport error reported by tonic.
    #[cfg(feature = "transport-tonic")]
    #[error("stream error: {0}")]
    Stream(#[from] tonic::Status),

    /// Invalid configuration value.
    #[error("validation error: {0}")]
    Validation(String),
}

/// Result type alias for xDS server operations.
pub type Result<T> = std::result::Result<T, Error>;
