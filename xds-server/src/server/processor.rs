//! The per-stream event loop.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, trace, warn};

use crate::cache::{BoxResponse, ConfigWatcher};
use crate::error::{Error, Result};
use crate::message::{DiscoveryRequest, Node};
use crate::resource::ANY_TYPE;
use crate::server::watches::{WatchEvent, Watches};
use crate::server::{Callbacks, StreamId, StreamState};
use crate::transport::ResponseSink;

/// The last response sent for a type URL.
#[derive(Debug)]
struct LastResponse {
    nonce: String,
    /// Names requested by the request the response answered.
    resources: HashSet<String>,
}

/// Owns all state of one stream and drives it until the stream ends.
///
/// Cancels every open watch and reports the stream closed when dropped, so
/// teardown happens on every exit path.
pub(crate) struct StreamProcessor<C, S> {
    stream_id: StreamId,
    cache: Arc<C>,
    callbacks: Option<Arc<dyn Callbacks>>,
    sink: S,
    default_type_url: String,
    watches: Watches,
    state: StreamState,
    last_responses: HashMap<String, LastResponse>,
    nonce_counter: u64,
    node: Node,
    _stream_guard: DropGuard,
}

impl<C, S> StreamProcessor<C, S>
where
    C: ConfigWatcher,
    S: ResponseSink,
{
    /// `stream_cancel` is cancelled once the processor is dropped.
    pub(crate) fn new(
        stream_id: StreamId,
        cache: Arc<C>,
        callbacks: Option<Arc<dyn Callbacks>>,
        sink: S,
        default_type_url: String,
        stream_cancel: CancellationToken,
    ) -> Self {
        let ads = default_type_url == ANY_TYPE;
        Self {
            stream_id,
            cache,
            callbacks,
            sink,
            default_type_url,
            watches: Watches::new(),
            state: StreamState::new(ads),
            last_responses: HashMap::new(),
            nonce_counter: 0,
            node: Node::default(),
            _stream_guard: stream_cancel.drop_guard(),
        }
    }

    /// Run the stream until the client stops sending, `shutdown` fires, or an
    /// error ends it.
    pub(crate) async fn run(
        mut self,
        mut requests: mpsc::Receiver<DiscoveryRequest>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        if let Some(callbacks) = &self.callbacks {
            callbacks
                .on_stream_open(self.stream_id, &self.default_type_url)
                .map_err(Error::Callback)?;
        }

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    debug!(stream_id = %self.stream_id, "server shutting down, closing stream");
                    return Ok(());
                }
                event = self.watches.next() => match event {
                    WatchEvent::Response { type_url, response } => {
                        let nonce = self.send(response).await?;
                        self.watches.record_nonce(&type_url, nonce);
                    }
                    WatchEvent::Failed { type_url } => {
                        return Err(Error::WatchFailed(type_url));
                    }
                },
                request = requests.recv() => match request {
                    Some(request) => self.handle_request(request)?,
                    None => return Ok(()),
                },
            }
        }
    }

    fn handle_request(&mut self, mut request: DiscoveryRequest) -> Result<()> {
        match &request.node {
            Some(node) => self.node = node.clone(),
            None => {
                trace!(stream_id = %self.stream_id, node_id = %self.node.id, "backfilling node");
                request.node = Some(self.node.clone());
            }
        }

        if request.type_url.is_empty() {
            if self.state.is_ads() {
                return Err(Error::InvalidArgument(
                    "type URL is required for ADS".to_string(),
                ));
            }
            request.type_url = self.default_type_url.clone();
        }

        if let Some(callbacks) = &self.callbacks {
            callbacks
                .on_stream_request(self.stream_id, &request)
                .map_err(Error::Callback)?;
        }

        if let Some(detail) = &request.error_detail {
            warn!(
                stream_id = %self.stream_id,
                type_url = %request.type_url,
                nonce = %request.response_nonce,
                code = detail.code,
                message = %detail.message,
                "client rejected configuration"
            );
        }

        if let Some(last) = self.last_responses.get(&request.type_url) {
            if request.response_nonce.is_empty() || request.response_nonce == last.nonce {
                self.state
                    .set_known_resource_names(request.type_url.clone(), last.resources.clone());
            }
        }

        if self.watches.watch(self.cache.as_ref(), &request, &self.state) {
            debug!(
                stream_id = %self.stream_id,
                type_url = %request.type_url,
                resources = request.resource_names.len(),
                "opened watch"
            );
        } else {
            trace!(
                stream_id = %self.stream_id,
                type_url = %request.type_url,
                nonce = %request.response_nonce,
                "stale nonce, keeping outstanding watch"
            );
        }
        Ok(())
    }

    /// Write `response` to the client, returning the nonce assigned to it.
    async fn send(&mut self, response: BoxResponse) -> Result<String> {
        let mut out = response
            .discovery_response()
            .map_err(Error::Serialization)?;

        self.nonce_counter += 1;
        let nonce = self.nonce_counter.to_string();
        out.nonce = nonce.clone();

        let request = response.request();
        self.last_responses.insert(
            request.type_url.clone(),
            LastResponse {
                nonce: nonce.clone(),
                resources: request.resource_name_set(),
            },
        );

        if let Some(callbacks) = &self.callbacks {
            callbacks.on_stream_response(self.stream_id, request, &out);
        }

        debug!(
            stream_id = %self.stream_id,
            type_url = %out.type_url,
            version = %out.version_info,
            nonce = %nonce,
            resources = out.resources.len(),
            "sending response"
        );
        self.sink.send(out).await?;
        Ok(nonce)
    }
}

impl<C, S> Drop for StreamProcessor<C, S> {
    fn drop(&mut self) {
        self.watches.cancel_all();
        if let Some(callbacks) = &self.callbacks {
            callbacks.on_stream_closed(self.stream_id, &self.node);
        }
        debug!(stream_id = %self.stream_id, "stream closed");
    }
}
