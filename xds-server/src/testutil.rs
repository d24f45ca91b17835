//! Test doubles for the backing store and lifecycle callbacks.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use crate::cache::{
    BoxResponse, CancelWatch, ConfigWatcher, RawResponse, ResponseSender, WatchClosed,
};
use crate::error::{BoxError, Error, Result};
use crate::message::{DiscoveryRequest, DiscoveryResponse, Node, ResourceAny};
use crate::server::{Callbacks, StreamId, StreamState};
use crate::transport::{RequestStream, ResponseSink};

/// A backing store that hands every watch it is asked for to the test.
///
/// Each call to `create_watch` is reported on the receiver returned by
/// [`MockConfigWatcher::channel`] as a [`CreatedWatch`], through which the test
/// answers, fails, or inspects the watch.
#[derive(Debug, Clone)]
pub struct MockConfigWatcher {
    created: mpsc::UnboundedSender<CreatedWatch>,
}

impl MockConfigWatcher {
    /// Create the store and the receiver of its watches.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<CreatedWatch>) {
        let (created, rx) = mpsc::unbounded_channel();
        (Self { created }, rx)
    }
}

impl ConfigWatcher for MockConfigWatcher {
    fn create_watch(
        &self,
        request: &DiscoveryRequest,
        state: &StreamState,
        sender: ResponseSender,
    ) -> Option<CancelWatch> {
        let cancelled = Arc::new(AtomicUsize::new(0));
        let watch = CreatedWatch {
            request: request.clone(),
            known_resource_names: state.known_resource_names(&request.type_url).cloned(),
            ads: state.is_ads(),
            sender: Some(sender),
            cancelled: Arc::clone(&cancelled),
        };
        let _ = self.created.send(watch);

        Some(Box::new(move || {
            cancelled.fetch_add(1, Ordering::SeqCst);
        }))
    }
}

/// A watch opened on a [`MockConfigWatcher`].
///
/// Dropping it without responding fails the watch, as a real store dropping
/// its sender would.
#[derive(Debug)]
pub struct CreatedWatch {
    /// The request the watch was opened for.
    pub request: DiscoveryRequest,
    /// Names the stream reported as known to the client for this type.
    pub known_resource_names: Option<HashSet<String>>,
    /// Whether the stream is aggregated.
    pub ads: bool,
    sender: Option<ResponseSender>,
    cancelled: Arc<AtomicUsize>,
}

impl CreatedWatch {
    /// Answer the watch with `resources` at `version`.
    pub fn respond(
        &mut self,
        version: &str,
        resources: Vec<ResourceAny>,
    ) -> std::result::Result<(), WatchClosed> {
        let sender = self.sender.take().ok_or(WatchClosed)?;
        sender.send(RawResponse::new(self.request.clone(), version, resources).boxed())
    }

    /// Answer the watch with an arbitrary pending response.
    pub fn respond_with(&mut self, response: BoxResponse) -> std::result::Result<(), WatchClosed> {
        let sender = self.sender.take().ok_or(WatchClosed)?;
        sender.send(response)
    }

    /// Drop the sender without responding.
    pub fn close(&mut self) {
        self.sender.take();
    }

    /// How many times the watch was cancelled.
    pub fn cancel_count(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A request stream fed by the test.
///
/// The stream ends when every sender is dropped.
#[derive(Debug)]
pub struct MockRequestStream {
    rx: mpsc::UnboundedReceiver<Result<DiscoveryRequest>>,
}

impl MockRequestStream {
    /// Create the stream and the sender feeding it.
    pub fn channel() -> (mpsc::UnboundedSender<Result<DiscoveryRequest>>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }
}

impl RequestStream for MockRequestStream {
    async fn recv(&mut self) -> Result<Option<DiscoveryRequest>> {
        self.rx.recv().await.transpose()
    }
}

/// A response sink collecting what the server writes.
#[derive(Debug)]
pub struct MockResponseSink {
    tx: Option<mpsc::UnboundedSender<DiscoveryResponse>>,
}

impl MockResponseSink {
    /// Create the sink and the receiver of written responses.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DiscoveryResponse>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Create a sink whose every write fails.
    pub fn failing() -> Self {
        Self { tx: None }
    }
}

impl ResponseSink for MockResponseSink {
    async fn send(&mut self, response: DiscoveryResponse) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(Error::StreamClosed)?;
        tx.send(response).map_err(|_| Error::StreamClosed)
    }
}

#[derive(Debug, Default)]
struct Recorded {
    opened: Vec<(StreamId, String)>,
    closed: Vec<(StreamId, Node)>,
    requests: Vec<DiscoveryRequest>,
    responses: Vec<DiscoveryResponse>,
}

/// Callbacks recording every event they observe.
#[derive(Debug, Clone, Default)]
pub struct RecordingCallbacks {
    recorded: Arc<Mutex<Recorded>>,
    reject_open: bool,
    reject_requests: bool,
}

impl RecordingCallbacks {
    /// Create callbacks accepting every stream and request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every stream in `on_stream_open`.
    pub fn rejecting_open() -> Self {
        Self {
            reject_open: true,
            ..Self::default()
        }
    }

    /// Reject every request in `on_stream_request`.
    pub fn rejecting_requests() -> Self {
        Self {
            reject_requests: true,
            ..Self::default()
        }
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Streams opened, with their default type URL.
    pub fn opened(&self) -> Vec<(StreamId, String)> {
        self.lock().opened.clone()
    }

    /// Streams closed, with their last node.
    pub fn closed(&self) -> Vec<(StreamId, Node)> {
        self.lock().closed.clone()
    }

    /// Requests observed, after node and type URL resolution.
    pub fn requests(&self) -> Vec<DiscoveryRequest> {
        self.lock().requests.clone()
    }

    /// Responses observed before being written.
    pub fn responses(&self) -> Vec<DiscoveryResponse> {
        self.lock().responses.clone()
    }
}

impl Callbacks for RecordingCallbacks {
    fn on_stream_open(
        &self,
        stream_id: StreamId,
        default_type_url: &str,
    ) -> std::result::Result<(), BoxError> {
        self.lock()
            .opened
            .push((stream_id, default_type_url.to_owned()));
        if self.reject_open {
            return Err("stream refused".into());
        }
        Ok(())
    }

    fn on_stream_closed(&self, stream_id: StreamId, node: &Node) {
        self.lock().closed.push((stream_id, node.clone()));
    }

    fn on_stream_request(
        &self,
        _stream_id: StreamId,
        request: &DiscoveryRequest,
    ) -> std::result::Result<(), BoxError> {
        self.lock().requests.push(request.clone());
        if self.reject_requests {
            return Err("request refused".into());
        }
        Ok(())
    }

    fn on_stream_response(
        &self,
        _stream_id: StreamId,
        _request: &DiscoveryRequest,
        response: &DiscoveryResponse,
    ) {
        self.lock().responses.push(response.clone());
    }
}
