//! State-of-the-world discovery server.
//!
//! A [`SotwServer`] serves any number of concurrent streams against one shared
//! [`ConfigWatcher`]. Each stream runs two halves inside the caller's task: an
//! ingestor reading client requests onto a small queue, and a processor owning
//! every piece of per-stream state.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::ConfigWatcher;
use crate::error::Result;
use crate::transport::{RequestStream, ResponseSink};

mod callbacks;
mod config;
mod ingest;
mod processor;
mod state;
mod watches;


pub use callbacks::Callbacks;
pub use config::ServerConfig;
pub use state::StreamState;

use ingest::RequestIngestor;
use processor::StreamProcessor;

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of a stream within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u64);

impl StreamId {
    pub(crate) fn next() -> Self {
        Self(NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The numeric value of this identifier.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Builder for [`SotwServer`].
pub struct SotwServerBuilder<C> {
    cache: C,
    config: ServerConfig,
    callbacks: Option<Arc<dyn Callbacks>>,
    shutdown: CancellationToken,
}

impl<C: ConfigWatcher> SotwServerBuilder<C> {
    fn new(cache: C) -> Self {
        Self {
            cache,
            config: ServerConfig::default(),
            callbacks: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Use `config` instead of the defaults.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Invoke `callbacks` on every stream lifecycle event.
    pub fn callbacks(mut self, callbacks: impl Callbacks) -> Self {
        self.callbacks = Some(Arc::new(callbacks));
        self
    }

    /// Close every stream when `token` is cancelled.
    ///
    /// Defaults to a fresh token, cancelled by [`SotwServer::shutdown`].
    pub fn shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Build the server.
    pub fn build(self) -> SotwServer<C> {
        SotwServer {
            inner: Arc::new(Inner {
                cache: Arc::new(self.cache),
                config: self.config,
                callbacks: self.callbacks,
                shutdown: self.shutdown,
            }),
        }
    }
}

impl<C> fmt::Debug for SotwServerBuilder<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SotwServerBuilder")
            .field("config", &self.config)
            .field("callbacks", &self.callbacks.is_some())
            .finish_non_exhaustive()
    }
}

struct Inner<C> {
    cache: Arc<C>,
    config: ServerConfig,
    callbacks: Option<Arc<dyn Callbacks>>,
    shutdown: CancellationToken,
}

/// A state-of-the-world discovery server.
///
/// Cloning is cheap: clones share the backing store, the callbacks and the
/// shutdown token.
pub struct SotwServer<C> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for SotwServer<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> fmt::Debug for SotwServer<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SotwServer")
            .field("config", &self.inner.config)
            .field("callbacks", &self.inner.callbacks.is_some())
            .field("shutdown", &self.inner.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<C: ConfigWatcher> SotwServer<C> {
    /// Create a server with the default configuration and no callbacks.
    pub fn new(cache: C) -> Self {
        Self::builder(cache).build()
    }

    /// Start building a server around `cache`.
    pub fn builder(cache: C) -> SotwServerBuilder<C> {
        SotwServerBuilder::new(cache)
    }

    /// Close every open stream. Streams opened afterwards end immediately.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    /// The token closing every stream of this server when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Serve one stream until it ends.
    ///
    /// An empty `default_type_url` ([`ANY_TYPE`](crate::resource::ANY_TYPE))
    /// makes the stream aggregated: every request must name its type URL.
    /// Otherwise requests without one are taken to be for `default_type_url`.
    ///
    /// Returns `Ok(())` when the client stops sending or the server shuts
    /// down, and the error that ended the stream otherwise. Every watch opened
    /// by the stream is cancelled before this returns.
    pub async fn stream_handler<R, S>(
        &self,
        requests: R,
        sink: S,
        default_type_url: impl Into<String>,
    ) -> Result<()>
    where
        R: RequestStream,
        S: ResponseSink,
    {
        let stream_id = StreamId::next();
        let default_type_url = default_type_url.into();
        debug!(stream_id = %stream_id, type_url = %default_type_url, "stream opened");

        let stream_cancel = CancellationToken::new();
        let (ingestor, queue) = RequestIngestor::new(
            stream_id,
            requests,
            self.inner.config.request_queue_size.max(1),
            stream_cancel.clone(),
            self.inner.shutdown.clone(),
        );
        let processor = StreamProcessor::new(
            stream_id,
            Arc::clone(&self.inner.cache),
            self.inner.callbacks.clone(),
            sink,
            default_type_url,
            stream_cancel,
        );

        let ((), result) = tokio::join!(
            ingestor.run(),
            processor.run(queue, self.inner.shutdown.clone())
        );
        if let Err(error) = &result {
            warn!(stream_id = %stream_id, %error, "stream ended with error");
        }
        result
    }
}
