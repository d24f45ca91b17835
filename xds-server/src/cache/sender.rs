use std::fmt;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::cache::BoxResponse;

/// Identifies one watch on the shared multiplexed channel of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct WatchId(pub(crate) u64);

/// Element of the shared multiplexed channel.
///
/// The channel is reused by every non well-known type, so a failed watch is
/// reported as a tagged value instead of by closing the channel.
#[derive(Debug)]
pub(crate) enum MuxedEvent {
    Response {
        type_url: String,
        watch: WatchId,
        response: BoxResponse,
    },
    Failed {
        type_url: String,
        watch: WatchId,
    },
}

/// Returned by [`ResponseSender::send`] when the watch is gone, either
/// cancelled or because its stream ended.
#[derive(Debug, Error)]
#[error("watch closed")]
pub struct WatchClosed;

/// Producer end of a single watch.
///
/// Delivers at most one response. Dropping the sender without calling
/// [`send`](Self::send) tells the stream that the watch failed.
pub struct ResponseSender {
    inner: Option<Inner>,
}

enum Inner {
    Dedicated(oneshot::Sender<BoxResponse>),
    Muxed {
        tx: mpsc::UnboundedSender<MuxedEvent>,
        type_url: String,
        watch: WatchId,
    },
}

impl ResponseSender {
    pub(crate) fn dedicated(tx: oneshot::Sender<BoxResponse>) -> Self {
        Self {
            inner: Some(Inner::Dedicated(tx)),
        }
    }

    pub(crate) fn muxed(
        tx: mpsc::UnboundedSender<MuxedEvent>,
        type_url: String,
        watch: WatchId,
    ) -> Self {
        Self {
            inner: Some(Inner::Muxed {
                tx,
                type_url,
                watch,
            }),
        }
    }

    /// Deliver the response for this watch.
    ///
    /// Never waits: every watch has room for exactly one response.
    pub fn send(mut self, response: BoxResponse) -> Result<(), WatchClosed> {
        match self.inner.take() {
            Some(Inner::Dedicated(tx)) => tx.send(response).map_err(|_| WatchClosed),
            Some(Inner::Muxed {
                tx,
                type_url,
                watch,
            }) => tx
                .send(MuxedEvent::Response {
                    type_url,
                    watch,
                    response,
                })
                .map_err(|_| WatchClosed),
            None => Err(WatchClosed),
        }
    }

    /// Returns true if the receiving stream is gone.
    ///
    /// Stores may use this to prune watches of disconnected clients.
    pub fn is_closed(&self) -> bool {
        match &self.inner {
            Some(Inner::Dedicated(tx)) => tx.is_closed(),
            Some(Inner::Muxed { tx, .. }) => tx.is_closed(),
            None => true,
        }
    }
}

impl Drop for ResponseSender {
    fn drop(&mut self) {
        // A dedicated slot observes the dropped oneshot directly.
        if let Some(Inner::Muxed {
            tx,
            type_url,
            watch,
        }) = self.inner.take()
        {
            let _ = tx.send(MuxedEvent::Failed { type_url, watch });
        }
    }
}

impl fmt::Debug for ResponseSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("ResponseSender");
        match &self.inner {
            Some(Inner::Dedicated(_)) => s.field("kind", &"dedicated"),
            Some(Inner::Muxed {
                type_url, watch, ..
            }) => s
                .field("kind", &"muxed")
                .field("type_url", type_url)
                .field("watch", &watch.0),
            None => s.field("kind", &"sent"),
        };
        s.finish()
    }
}
