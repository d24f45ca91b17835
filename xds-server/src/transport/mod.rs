//! Provides abstraction for transport layers.

use std::future::Future;

use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::message::{DiscoveryRequest, DiscoveryResponse};

#[cfg(feature = "transport-tonic")]
pub mod tonic;

/// The inbound half of a discovery stream.
///
/// This abstraction allows for different transport implementations:
/// - Tonic-based gRPC transport
/// - In-process channels
/// - Mock transport for testing
pub trait RequestStream: Send + 'static {
    /// Receive the next request from the client.
    ///
    /// Returns:
    /// - `Ok(Some(request))` - Received a request.
    /// - `Ok(None)` - The client closed its side of the stream.
    /// - `Err(_)` - Stream error (connection dropped, undecodable message, etc.)
    fn recv(&mut self) -> impl Future<Output = Result<Option<DiscoveryRequest>>> + Send;
}

/// The outbound half of a discovery stream.
pub trait ResponseSink: Send + 'static {
    /// Write a response to the client.
    ///
    /// An error ends the stream.
    fn send(&mut self, response: DiscoveryResponse) -> impl Future<Output = Result<()>> + Send;
}

impl RequestStream for mpsc::Receiver<DiscoveryRequest> {
    async fn recv(&mut self) -> Result<Option<DiscoveryRequest>> {
        Ok(mpsc::Receiver::recv(self).await)
    }
}

impl ResponseSink for mpsc::Sender<DiscoveryResponse> {
    async fn send(&mut self, response: DiscoveryResponse) -> Result<()> {
        mpsc::Sender::send(self, response)
            .await
            .map_err(|_| Error::StreamClosed)
    }
}
