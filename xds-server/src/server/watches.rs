//! Per-stream watch bookkeeping.
//!
//! Well-known types each own a dedicated single-slot channel, held in a fixed
//! array indexed by [`WellKnownType`]. Every other type URL shares one
//! multiplexed channel, with its cancel action and nonce kept in a map.

use std::collections::HashMap;
use std::future::{Future, poll_fn};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::cache::{BoxResponse, CancelWatch, ConfigWatcher, MuxedEvent, ResponseSender, WatchId};
use crate::message::DiscoveryRequest;
use crate::resource::WellKnownType;
use crate::server::StreamState;

/// Outcome of a watch, as observed by the stream loop.
#[derive(Debug)]
pub(crate) enum WatchEvent {
    /// The backing store produced a response for `type_url`.
    Response {
        type_url: String,
        response: BoxResponse,
    },
    /// The watch for `type_url` was closed without a response.
    Failed { type_url: String },
}

#[derive(Default)]
struct WatchSlot {
    rx: Option<oneshot::Receiver<BoxResponse>>,
    cancel: Option<CancelWatch>,
    /// Nonce of the last response sent for this type.
    nonce: String,
}

struct DynamicWatch {
    watch: WatchId,
    cancel: Option<CancelWatch>,
    /// Nonce of the last response sent for this type.
    nonce: String,
}

/// The watches of one stream.
pub(crate) struct Watches {
    slots: [WatchSlot; WellKnownType::COUNT],
    muxed_tx: mpsc::UnboundedSender<MuxedEvent>,
    muxed_rx: mpsc::UnboundedReceiver<MuxedEvent>,
    dynamic: HashMap<String, DynamicWatch>,
    next_watch_id: u64,
}

/// A watch may be replaced before its first response, or by a request
/// acknowledging the last response sent.
fn accepts(last_nonce: &str, request_nonce: &str) -> bool {
    last_nonce.is_empty() || last_nonce == request_nonce
}

impl Watches {
    pub(crate) fn new() -> Self {
        // Unbounded, so capacity is never below the well-known type count and
        // a sender never blocks. Each watch posts at most one event, so
        // occupancy stays within the dynamic watches opened on the stream.
        let (muxed_tx, muxed_rx) = mpsc::unbounded_channel();
        Self {
            slots: std::array::from_fn(|_| WatchSlot::default()),
            muxed_tx,
            muxed_rx,
            dynamic: HashMap::new(),
            next_watch_id: 0,
        }
    }

    /// Open a watch for `request`, replacing the current one for its type.
    ///
    /// Does nothing and returns false when the request carries a nonce other
    /// than the last one sent for its type: the client has not seen that
    /// response yet, so the outstanding watch stays.
    pub(crate) fn watch<C>(
        &mut self,
        cache: &C,
        request: &DiscoveryRequest,
        state: &StreamState,
    ) -> bool
    where
        C: ConfigWatcher + ?Sized,
    {
        let type_url = request.type_url.as_str();
        let nonce = request.response_nonce.as_str();

        if let Some(kind) = WellKnownType::from_type_url(type_url) {
            let slot = &mut self.slots[kind.index()];
            if !accepts(&slot.nonce, nonce) {
                return false;
            }
            if let Some(cancel) = slot.cancel.take() {
                trace!(type_url, "cancelling watch");
                cancel();
            }
            let (tx, rx) = oneshot::channel();
            slot.rx = Some(rx);
            slot.cancel = cache.create_watch(request, state, ResponseSender::dedicated(tx));
            return true;
        }

        let watch = WatchId(self.next_watch_id);
        match self.dynamic.get_mut(type_url) {
            Some(current) => {
                if !accepts(&current.nonce, nonce) {
                    return false;
                }
                if let Some(cancel) = current.cancel.take() {
                    trace!(type_url, "cancelling watch");
                    cancel();
                }
                current.watch = watch;
            }
            None => {
                self.dynamic.insert(
                    type_url.to_owned(),
                    DynamicWatch {
                        watch,
                        cancel: None,
                        nonce: String::new(),
                    },
                );
            }
        }
        self.next_watch_id += 1;

        let sender = ResponseSender::muxed(self.muxed_tx.clone(), type_url.to_owned(), watch);
        let cancel = cache.create_watch(request, state, sender);
        if let Some(current) = self.dynamic.get_mut(type_url) {
            current.cancel = cancel;
        }
        true
    }

    /// Remember the nonce of the response just sent for `type_url`.
    pub(crate) fn record_nonce(&mut self, type_url: &str, nonce: String) {
        match WellKnownType::from_type_url(type_url) {
            Some(kind) => self.slots[kind.index()].nonce = nonce,
            None => {
                if let Some(current) = self.dynamic.get_mut(type_url) {
                    current.nonce = nonce;
                }
            }
        }
    }

    /// Nonce of the last response sent for `type_url`, empty if none.
    pub(crate) fn nonce(&self, type_url: &str) -> &str {
        match WellKnownType::from_type_url(type_url) {
            Some(kind) => &self.slots[kind.index()].nonce,
            None => self
                .dynamic
                .get(type_url)
                .map_or("", |current| current.nonce.as_str()),
        }
    }

    /// Wait for the next watch to produce a response or fail.
    ///
    /// Cancel safe: an event is only taken off its channel when it is returned.
    pub(crate) fn next(&mut self) -> impl Future<Output = WatchEvent> + '_ {
        poll_fn(move |cx| self.poll_next(cx))
    }

    fn poll_next(&mut self, cx: &mut Context<'_>) -> Poll<WatchEvent> {
        for (kind, slot) in WellKnownType::ALL.into_iter().zip(self.slots.iter_mut()) {
            let Some(rx) = slot.rx.as_mut() else {
                continue;
            };
            if let Poll::Ready(received) = Pin::new(rx).poll(cx) {
                // The slot holds a single response; the next one needs a new watch.
                slot.rx = None;
                let type_url = kind.type_url().to_owned();
                return Poll::Ready(match received {
                    Ok(response) => WatchEvent::Response { type_url, response },
                    Err(_) => WatchEvent::Failed { type_url },
                });
            }
        }

        while let Poll::Ready(Some(event)) = self.muxed_rx.poll_recv(cx) {
            match event {
                MuxedEvent::Response {
                    type_url,
                    watch,
                    response,
                } => {
                    if self.is_current(&type_url, watch) {
                        return Poll::Ready(WatchEvent::Response { type_url, response });
                    }
                    trace!(type_url = %type_url, "dropping response of a replaced watch");
                }
                MuxedEvent::Failed { type_url, watch } => {
                    if self.is_current(&type_url, watch) {
                        return Poll::Ready(WatchEvent::Failed { type_url });
                    }
                    trace!(type_url = %type_url, "ignoring closure of a replaced watch");
                }
            }
        }

        Poll::Pending
    }

    fn is_current(&self, type_url: &str, watch: WatchId) -> bool {
        self.dynamic
            .get(type_url)
            .is_some_and(|current| current.watch == watch)
    }

    /// Cancel every open watch. Each cancel action runs at most once.
    pub(crate) fn cancel_all(&mut self) {
        let mut cancelled = 0;
        let fixed = self.slots.iter_mut().filter_map(|slot| slot.cancel.take());
        let dynamic = self
            .dynamic
            .values_mut()
            .filter_map(|current| current.cancel.take());
        for cancel in fixed.chain(dynamic) {
            cancel();
            cancelled += 1;
        }
        debug!(cancelled, "cancelled watches");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::resource::{CLUSTER_TYPE, LISTENER_TYPE};
    use crate::testutil::MockConfigWatcher;

    async fn next_event(watches: &mut Watches) -> Option<WatchEvent> {
        tokio::time::timeout(Duration::from_millis(50), watches.next())
            .await
            .ok()
    }

    #[tokio::test]
    async fn test_fixed_watch_delivers_response() {
        let (cache, mut created) = MockConfigWatcher::channel();
        let mut watches = Watches::new();
        let state = StreamState::new(true);

        let request = DiscoveryRequest::new(CLUSTER_TYPE, ["c1"]);
        assert!(watches.watch(&cache, &request, &state));

        let mut watch = created.recv().await.unwrap();
        watch.respond("v1", vec![]).unwrap();

        match next_event(&mut watches).await.unwrap() {
            WatchEvent::Response { type_url, response } => {
                assert_eq!(type_url, CLUSTER_TYPE);
                assert_eq!(response.version().unwrap(), "v1");
            }
            other => panic!("unexpected event {other:?}"),
        }
        // The slot is spent once it delivered.
        assert!(next_event(&mut watches).await.is_none());
    }

    #[tokio::test]
    async fn test_fixed_watch_closed_without_response() {
        let (cache, mut created) = MockConfigWatcher::channel();
        let mut watches = Watches::new();
        let state = StreamState::new(true);

        watches.watch(&cache, &DiscoveryRequest::new(LISTENER_TYPE, ["l1"]), &state);
        let mut watch = created.recv().await.unwrap();
        watch.close();

        assert!(matches!(
            next_event(&mut watches).await,
            Some(WatchEvent::Failed { type_url }) if type_url == LISTENER_TYPE
        ));
    }

    #[tokio::test]
    async fn test_muxed_watch_closed_without_response() {
        let (cache, mut created) = MockConfigWatcher::channel();
        let mut watches = Watches::new();
        let state = StreamState::new(true);

        watches.watch(&cache, &DiscoveryRequest::new("custom", ["x"]), &state);
        let mut watch = created.recv().await.unwrap();
        watch.close();

        assert!(matches!(
            next_event(&mut watches).await,
            Some(WatchEvent::Failed { type_url }) if type_url == "custom"
        ));
    }

    #[tokio::test]
    async fn test_ack_gating() {
        let (cache, mut created) = MockConfigWatcher::channel();
        let mut watches = Watches::new();
        let state = StreamState::new(true);

        for type_url in [CLUSTER_TYPE, "custom"] {
            let request = DiscoveryRequest::new(type_url, ["a"]);
            assert!(watches.watch(&cache, &request, &state));
            let first = created.recv().await.unwrap();
            watches.record_nonce(type_url, "5".to_string());
            assert_eq!(watches.nonce(type_url), "5");

            // Stale and empty nonces leave the outstanding watch alone.
            assert!(!watches.watch(&cache, &request.clone().with_response_nonce("4"), &state));
            assert!(!watches.watch(&cache, &request, &state));
            assert!(created.try_recv().is_err());
            assert_eq!(first.cancel_count(), 0);

            // Acknowledging the last nonce replaces it.
            assert!(watches.watch(&cache, &request.clone().with_response_nonce("5"), &state));
            let second = created.recv().await.unwrap();
            assert_eq!(first.cancel_count(), 1);
            assert_eq!(second.cancel_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_repeat_request_before_response_replaces_watch() {
        let (cache, mut created) = MockConfigWatcher::channel();
        let mut watches = Watches::new();
        let state = StreamState::new(true);

        let request = DiscoveryRequest::new("custom", ["a"]);
        assert!(watches.watch(&cache, &request, &state));
        let mut first = created.recv().await.unwrap();
        assert!(watches.watch(&cache, &request, &state));
        let mut second = created.recv().await.unwrap();
        assert_eq!(first.cancel_count(), 1);

        // Whatever the replaced watch still produces is dropped.
        first.respond("stale", vec![]).unwrap();
        assert!(next_event(&mut watches).await.is_none());
        second.respond("fresh", vec![]).unwrap();
        match next_event(&mut watches).await.unwrap() {
            WatchEvent::Response { response, .. } => {
                assert_eq!(response.version().unwrap(), "fresh");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancel_all_runs_each_action_once() {
        let (cache, mut created) = MockConfigWatcher::channel();
        let mut watches = Watches::new();
        let state = StreamState::new(true);

        for type_url in [CLUSTER_TYPE, LISTENER_TYPE, "custom-a", "custom-b"] {
            watches.watch(&cache, &DiscoveryRequest::new(type_url, ["a"]), &state);
        }
        let mut all = Vec::new();
        while let Ok(watch) = created.try_recv() {
            all.push(watch);
        }
        assert_eq!(all.len(), 4);

        watches.cancel_all();
        watches.cancel_all();
        for watch in &all {
            assert_eq!(watch.cancel_count(), 1);
        }
    }
}
