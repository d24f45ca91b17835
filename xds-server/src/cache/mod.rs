//! Boundary with the backing store that decides what to push.
//!
//! The server does not compute resources. For every accepted request it asks a
//! [`ConfigWatcher`] to open a watch, and the watcher answers through the
//! [`ResponseSender`] it was handed, either right away or once the relevant
//! state changes.

use std::fmt;
use std::sync::Arc;

use crate::error::BoxError;
use crate::message::{DiscoveryRequest, DiscoveryResponse, ResourceAny};
use crate::server::StreamState;

mod sender;

pub use sender::{ResponseSender, WatchClosed};
pub(crate) use sender::{MuxedEvent, WatchId};

/// Action cancelling an open watch.
///
/// Invoked at most once, when the watch is replaced or the stream ends.
pub type CancelWatch = Box<dyn FnOnce() + Send + 'static>;

/// A response produced by the backing store, not yet serialized.
pub type BoxResponse = Box<dyn PendingResponse>;

/// The backing store consulted by every stream.
///
/// A single instance is shared by all streams of a server and must handle
/// concurrent calls.
///
/// # Contract
///
/// After `create_watch` returns, the watcher must eventually do one of:
/// - call [`ResponseSender::send`] once,
/// - have the returned [`CancelWatch`] invoked, after which it drops the sender,
/// - drop the sender without sending, which fails the stream with
///   [`Error::WatchFailed`](crate::Error::WatchFailed).
pub trait ConfigWatcher: Send + Sync + 'static {
    /// Open a watch for `request`.
    ///
    /// `state` describes what the client already holds and may be used to
    /// decide whether a response can be produced immediately. Returns `None`
    /// when there is nothing to cancel.
    fn create_watch(
        &self,
        request: &DiscoveryRequest,
        state: &StreamState,
        sender: ResponseSender,
    ) -> Option<CancelWatch>;
}

impl<T: ConfigWatcher + ?Sized> ConfigWatcher for Arc<T> {
    fn create_watch(
        &self,
        request: &DiscoveryRequest,
        state: &StreamState,
        sender: ResponseSender,
    ) -> Option<CancelWatch> {
        (**self).create_watch(request, state, sender)
    }
}

/// A response bound to the request that caused it.
pub trait PendingResponse: fmt::Debug + Send + Sync + 'static {
    /// The request this response answers.
    fn request(&self) -> &DiscoveryRequest;

    /// The version of the resources carried by this response.
    ///
    /// Defaults to the `version_info` of the materialized response.
    fn version(&self) -> Result<String, BoxError> {
        Ok(self.discovery_response()?.version_info)
    }

    /// Materialize the wire response.
    ///
    /// The nonce is left empty; it is assigned by the stream when sending.
    fn discovery_response(&self) -> Result<DiscoveryResponse, BoxError>;
}

/// A response carrying already serialized resources.
#[derive(Debug, Clone)]
pub struct RawResponse {
    request: DiscoveryRequest,
    version: String,
    resources: Vec<ResourceAny>,
}

impl RawResponse {
    /// Create a response to `request` at `version`.
    pub fn new(
        request: DiscoveryRequest,
        version: impl Into<String>,
        resources: Vec<ResourceAny>,
    ) -> Self {
        Self {
            request,
            version: version.into(),
            resources,
        }
    }

    /// Box this response for a [`ResponseSender`].
    pub fn boxed(self) -> BoxResponse {
        Box::new(self)
    }
}

impl PendingResponse for RawResponse {
    fn request(&self) -> &DiscoveryRequest {
        &self.request
    }

    fn version(&self) -> Result<String, BoxError> {
        Ok(self.version.clone())
    }

    fn discovery_response(&self) -> Result<DiscoveryResponse, BoxError> {
        Ok(DiscoveryResponse {
            version_info: self.version.clone(),
            resources: self.resources.clone(),
            type_url: self.request.type_url.clone(),
            nonce: String::new(),
        })
    }
}

/// A response whose wire form was built by the backing store.
#[derive(Debug, Clone)]
pub struct PassthroughResponse {
    request: DiscoveryRequest,
    response: DiscoveryResponse,
}

impl PassthroughResponse {
    /// Create a response to `request` sending `response` as is.
    pub fn new(request: DiscoveryRequest, response: DiscoveryResponse) -> Self {
        Self { request, response }
    }

    /// Box this response for a [`ResponseSender`].
    pub fn boxed(self) -> BoxResponse {
        Box::new(self)
    }
}

impl PendingResponse for PassthroughResponse {
    fn request(&self) -> &DiscoveryRequest {
        &self.request
    }

    fn discovery_response(&self) -> Result<DiscoveryResponse, BoxError> {
        Ok(self.response.clone())
    }
}
