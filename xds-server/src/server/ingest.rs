//! Reads client requests into the stream loop.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::message::DiscoveryRequest;
use crate::server::StreamId;
use crate::transport::RequestStream;

/// Forwards requests from a [`RequestStream`] onto the queue read by the
/// stream loop.
///
/// The queue is closed when the client stops sending, when reading fails, or
/// when either cancellation token fires. Read errors end the stream quietly:
/// the loop sees the closed queue as a normal end of input.
pub(crate) struct RequestIngestor<R> {
    stream_id: StreamId,
    requests: R,
    queue: mpsc::Sender<DiscoveryRequest>,
    stream_cancel: CancellationToken,
    shutdown: CancellationToken,
}

impl<R: RequestStream> RequestIngestor<R> {
    pub(crate) fn new(
        stream_id: StreamId,
        requests: R,
        capacity: usize,
        stream_cancel: CancellationToken,
        shutdown: CancellationToken,
    ) -> (Self, mpsc::Receiver<DiscoveryRequest>) {
        let (queue, rx) = mpsc::channel(capacity);
        let ingestor = Self {
            stream_id,
            requests,
            queue,
            stream_cancel,
            shutdown,
        };
        (ingestor, rx)
    }

    pub(crate) async fn run(mut self) {
        loop {
            let request = tokio::select! {
                _ = self.stream_cancel.cancelled() => return,
                _ = self.shutdown.cancelled() => return,
                received = self.requests.recv() => match received {
                    Ok(Some(request)) => request,
                    Ok(None) => {
                        debug!(stream_id = %self.stream_id, "client closed request stream");
                        return;
                    }
                    Err(error) => {
                        debug!(stream_id = %self.stream_id, %error, "failed to read request");
                        return;
                    }
                },
            };

            tokio::select! {
                _ = self.stream_cancel.cancelled() => return,
                _ = self.shutdown.cancelled() => return,
                sent = self.queue.send(request) => {
                    if sent.is_err() {
                        return;
                    }
                }
            }
        }
    }
}
