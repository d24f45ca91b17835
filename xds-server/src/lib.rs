//! A Rust implementation of a state-of-the-world [xDS](https://www.envoyproxy.io/docs/envoy/latest/api-docs/xds_protocol) server.
//!
//! This crate serves discovery streams. For every stream it handles:
//! - Nonce assignment and ACK/NACK reconciliation
//! - One outstanding watch per resource type
//! - Node propagation and aggregated (ADS) vs single-type streams
//! - Cleanup of every watch when the stream ends
//!
//! It does NOT decide what to send. Resource snapshots, versioning and
//! consistency live behind [`ConfigWatcher`], which the server asks for a watch
//! on every accepted request.
//!
//! # Example
//!
//! ```ignore
//! use xds_server::{ConfigWatcher, SotwServer};
//!
//! let server = SotwServer::builder(snapshot_cache)
//!     .callbacks(metrics)
//!     .build();
//!
//! tonic::transport::Server::builder()
//!     .add_service(server.ads_service())
//!     .serve(addr)
//!     .await?;
//! ```
//!
//! # Feature Flags
//!
//! - `transport-tonic`: Serves the aggregated discovery service over `tonic`. This enables `codegen-prost`. Enabled by default.
//! - `codegen-prost`: Enables conversions to and from the `envoy-types` protos. Enabled by default.
//! - `test-util`: Exposes mock implementations of the backing store, transport and callbacks.

pub mod cache;
pub mod codec;
pub mod error;
pub mod message;
pub mod resource;
pub mod server;
pub mod transport;

#[cfg(any(test, feature = "test-util"))]
pub mod testutil;

pub use cache::{
    BoxResponse, CancelWatch, ConfigWatcher, PassthroughResponse, PendingResponse, RawResponse,
    ResponseSender, WatchClosed,
};
pub use error::{BoxError, Error, Result};
pub use message::{DiscoveryRequest, DiscoveryResponse, ErrorDetail, Locality, Node, ResourceAny};
pub use resource::WellKnownType;
pub use server::{Callbacks, ServerConfig, SotwServer, SotwServerBuilder, StreamId, StreamState};
pub use transport::{RequestStream, ResponseSink};

// Tonic transport
#[cfg(feature = "transport-tonic")]
pub use transport::tonic::ResponseStream;
