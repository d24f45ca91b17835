//! Configuration for the xDS server.

use crate::error::{Error, Result};

/// Default capacity of the queue between the request reader and the stream loop.
const DEFAULT_REQUEST_QUEUE_SIZE: usize = 1;

/// Default number of responses buffered towards the transport.
const DEFAULT_RESPONSE_BUFFER_SIZE: usize = 16;

/// Configuration for the xDS server.
///
/// # Example
///
/// ```
/// use xds_server::ServerConfig;
///
/// let config = ServerConfig::default()
///     .with_request_queue_size(4).unwrap()
///     .with_response_buffer_size(32).unwrap();
/// assert_eq!(config.request_queue_size, 4);
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Capacity of the queue feeding client requests into the stream loop.
    ///
    /// Default: 1.
    pub request_queue_size: usize,

    /// Number of responses the tonic transport buffers before a stream waits
    /// on the client.
    ///
    /// Default: 16.
    pub response_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            request_queue_size: DEFAULT_REQUEST_QUEUE_SIZE,
            response_buffer_size: DEFAULT_RESPONSE_BUFFER_SIZE,
        }
    }
}

impl ServerConfig {
    /// Set the request queue capacity.
    ///
    /// # Errors
    ///
    /// Returns an error if `size` is zero.
    pub fn with_request_queue_size(mut self, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::Validation(
                "request_queue_size must be greater than zero".into(),
            ));
        }
        self.request_queue_size = size;
        Ok(self)
    }

    /// Set the response buffer capacity.
    ///
    /// # Errors
    ///
    /// Returns an error if `size` is zero.
    pub fn with_response_buffer_size(mut self, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::Validation(
                "response_buffer_size must be greater than zero".into(),
            ));
        }
        self.response_buffer_size = size;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.request_queue_size, 1);
        assert_eq!(config.response_buffer_size, 16);
    }

    #[test]
    fn test_zero_sizes_rejected() {
        assert!(matches!(
            ServerConfig::default().with_request_queue_size(0),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            ServerConfig::default().with_response_buffer_size(0),
            Err(Error::Validation(_))
        ));
    }
}
