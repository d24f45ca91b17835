//! Lifecycle hooks invoked by every stream.

use crate::error::BoxError;
use crate::message::{DiscoveryRequest, DiscoveryResponse, Node};
use crate::server::StreamId;

/// Observer of stream lifecycle events.
///
/// All methods have no-op defaults. Methods are called from the stream's own
/// task and should not block.
pub trait Callbacks: Send + Sync + 'static {
    /// Called when a stream opens, before any request is read.
    ///
    /// Returning an error closes the stream with that error.
    fn on_stream_open(&self, stream_id: StreamId, default_type_url: &str) -> Result<(), BoxError> {
        let _ = (stream_id, default_type_url);
        Ok(())
    }

    /// Called exactly once when a stream ends, whatever the cause.
    ///
    /// `node` is the last node the client identified as.
    fn on_stream_closed(&self, stream_id: StreamId, node: &Node) {
        let _ = (stream_id, node);
    }

    /// Called for every request after the node and type URL are resolved.
    ///
    /// Returning an error closes the stream with that error.
    fn on_stream_request(
        &self,
        stream_id: StreamId,
        request: &DiscoveryRequest,
    ) -> Result<(), BoxError> {
        let _ = (stream_id, request);
        Ok(())
    }

    /// Called before a response is written to the stream.
    fn on_stream_response(
        &self,
        stream_id: StreamId,
        request: &DiscoveryRequest,
        response: &DiscoveryResponse,
    ) {
        let _ = (stream_id, request, response);
    }
}
