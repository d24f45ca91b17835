//! `tonic` based transport implementation.
//!
//! [`SotwServer`] implements the generated `AggregatedDiscoveryService`, so it
//! can be added to a `tonic::transport::Server` directly:
//!
//! ```ignore
//! let server = SotwServer::new(cache);
//! tonic::transport::Server::builder()
//!     .add_service(server.ads_service())
//!     .serve(addr)
//!     .await?;
//! ```
//!
//! Single-type services (CDS, LDS, ...) can be wired by hand through
//! [`SotwServer::serve_stream`] with their own default type URL.

use envoy_types::pb::envoy::service::discovery::v3 as discovery;
use envoy_types::pb::envoy::service::discovery::v3::aggregated_discovery_service_server::{
    AggregatedDiscoveryService, AggregatedDiscoveryServiceServer,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};

use crate::cache::ConfigWatcher;
use crate::error::{Error, Result};
use crate::message::{DiscoveryRequest, DiscoveryResponse};
use crate::resource::ANY_TYPE;
use crate::server::SotwServer;
use crate::transport::{RequestStream, ResponseSink};

/// Stream of responses returned to tonic for one RPC.
pub type ResponseStream =
    ReceiverStream<std::result::Result<discovery::DiscoveryResponse, Status>>;

impl RequestStream for Streaming<discovery::DiscoveryRequest> {
    async fn recv(&mut self) -> Result<Option<DiscoveryRequest>> {
        Ok(self.message().await?.map(DiscoveryRequest::from))
    }
}

/// Writes responses onto the channel backing a [`ResponseStream`].
#[derive(Debug)]
pub(crate) struct TonicResponseSink {
    tx: mpsc::Sender<std::result::Result<discovery::DiscoveryResponse, Status>>,
}

impl ResponseSink for TonicResponseSink {
    async fn send(&mut self, response: DiscoveryResponse) -> Result<()> {
        self.tx
            .send(Ok(response.into()))
            .await
            .map_err(|_| Error::StreamClosed)
    }
}

impl From<Error> for Status {
    fn from(error: Error) -> Self {
        match error {
            Error::InvalidArgument(message) => Status::invalid_argument(message),
            Error::WatchFailed(type_url) => {
                Status::unavailable(format!("{type_url} watch failed"))
            }
            Error::Serialization(source) | Error::Callback(source) => {
                match source.downcast::<Status>() {
                    Ok(status) => *status,
                    Err(source) => Status::unknown(source.to_string()),
                }
            }
            Error::StreamClosed => Status::cancelled("stream closed"),
            Error::Stream(status) => status,
            Error::Validation(message) => Status::internal(message),
        }
    }
}

impl<C: ConfigWatcher> SotwServer<C> {
    /// Serve `requests` on a spawned task, returning the response stream to
    /// hand back to tonic.
    ///
    /// An error ending the stream is delivered as the final item.
    pub fn serve_stream<R: RequestStream>(
        &self,
        requests: R,
        default_type_url: impl Into<String>,
    ) -> ResponseStream {
        let (tx, rx) = mpsc::channel(self.config().response_buffer_size.max(1));
        let server = self.clone();
        let default_type_url = default_type_url.into();

        tokio::spawn(async move {
            let sink = TonicResponseSink { tx: tx.clone() };
            if let Err(error) = server.stream_handler(requests, sink, default_type_url).await {
                // The client may already be gone.
                let _ = tx.send(Err(error.into())).await;
            }
        });

        ReceiverStream::new(rx)
    }

    /// Wrap this server in the generated aggregated discovery service.
    pub fn ads_service(&self) -> AggregatedDiscoveryServiceServer<Self> {
        AggregatedDiscoveryServiceServer::new(self.clone())
    }
}

#[tonic::async_trait]
impl<C: ConfigWatcher> AggregatedDiscoveryService for SotwServer<C> {
    type StreamAggregatedResourcesStream = ResponseStream;

    async fn stream_aggregated_resources(
        &self,
        request: Request<Streaming<discovery::DiscoveryRequest>>,
    ) -> std::result::Result<Response<Self::StreamAggregatedResourcesStream>, Status> {
        Ok(Response::new(self.serve_stream(request.into_inner(), ANY_TYPE)))
    }

    type DeltaAggregatedResourcesStream = tokio_stream::Empty<
        std::result::Result<discovery::DeltaDiscoveryResponse, Status>,
    >;

    async fn delta_aggregated_resources(
        &self,
        _request: Request<Streaming<discovery::DeltaDiscoveryRequest>>,
    ) -> std::result::Result<Response<Self::DeltaAggregatedResourcesStream>, Status> {
        Err(Status::unimplemented("incremental xDS is not supported"))
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use bytes::{Buf, BufMut, Bytes};
    use http::uri::PathAndQuery;
    use prost::Message;
    use tokio::net::TcpListener;
    use tokio_stream::wrappers::TcpListenerStream;
    use tonic::Code;
    use tonic::client::Grpc;
    use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
    use tonic::transport::Channel;

    use super::*;
    use crate::error::BoxError;
    use crate::message::ResourceAny;
    use crate::resource::CLUSTER_TYPE;
    use crate::testutil::{CreatedWatch, MockConfigWatcher};

    const ADS_PATH: &str =
        "/envoy.service.discovery.v3.AggregatedDiscoveryService/StreamAggregatedResources";

    /// Passes pre-encoded messages through, so the test client speaks raw protobuf.
    #[derive(Debug, Clone, Copy)]
    struct BytesCodec;

    impl Codec for BytesCodec {
        type Encode = Bytes;
        type Decode = Bytes;
        type Encoder = BytesEncoder;
        type Decoder = BytesDecoder;

        fn encoder(&mut self) -> Self::Encoder {
            BytesEncoder
        }

        fn decoder(&mut self) -> Self::Decoder {
            BytesDecoder
        }
    }

    #[derive(Debug)]
    struct BytesEncoder;

    impl Encoder for BytesEncoder {
        type Item = Bytes;
        type Error = Status;

        fn encode(
            &mut self,
            item: Self::Item,
            dst: &mut EncodeBuf<'_>,
        ) -> std::result::Result<(), Self::Error> {
            dst.put_slice(&item);
            Ok(())
        }
    }

    #[derive(Debug)]
    struct BytesDecoder;

    impl Decoder for BytesDecoder {
        type Item = Bytes;
        type Error = Status;

        fn decode(
            &mut self,
            src: &mut DecodeBuf<'_>,
        ) -> std::result::Result<Option<Self::Item>, Self::Error> {
            Ok(Some(src.copy_to_bytes(src.remaining())))
        }
    }

    async fn start_server() -> (SocketAddr, mpsc::UnboundedReceiver<CreatedWatch>) {
        let (cache, created) = MockConfigWatcher::channel();
        let server = SotwServer::new(cache);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            tonic::transport::Server::builder()
                .add_service(server.ads_service())
                .serve_with_incoming(TcpListenerStream::new(listener))
                .await
                .unwrap();
        });

        (addr, created)
    }

    /// Open an ADS stream, sending `first` as its initial request.
    async fn open_stream(
        addr: SocketAddr,
        first: discovery::DiscoveryRequest,
    ) -> (mpsc::Sender<Bytes>, Streaming<Bytes>) {
        let channel = Channel::from_shared(format!("http://{addr}"))
            .unwrap()
            .connect()
            .await
            .unwrap();
        let mut grpc = Grpc::new(channel);
        grpc.ready().await.unwrap();

        let (tx, rx) = mpsc::channel(4);
        tx.send(first.encode_to_vec().into()).await.unwrap();
        let response = grpc
            .streaming(
                Request::new(ReceiverStream::new(rx)),
                PathAndQuery::from_static(ADS_PATH),
                BytesCodec,
            )
            .await
            .unwrap();
        (tx, response.into_inner())
    }

    #[tokio::test]
    async fn test_ads_round_trip() {
        let (addr, mut created) = start_server().await;

        let request = discovery::DiscoveryRequest {
            type_url: CLUSTER_TYPE.to_string(),
            resource_names: vec!["cluster-1".to_string()],
            ..Default::default()
        };
        let (requests, mut responses) = open_stream(addr, request).await;

        let mut watch = created.recv().await.unwrap();
        assert!(watch.ads);
        assert_eq!(watch.request.type_url, CLUSTER_TYPE);
        assert_eq!(watch.request.resource_names, vec!["cluster-1"]);
        watch
            .respond("v1", vec![ResourceAny::new(CLUSTER_TYPE, &b"cluster-bytes"[..])])
            .unwrap();

        let bytes = responses.message().await.unwrap().unwrap();
        let response = discovery::DiscoveryResponse::decode(bytes).unwrap();
        assert_eq!(response.version_info, "v1");
        assert_eq!(response.nonce, "1");
        assert_eq!(response.type_url, CLUSTER_TYPE);
        assert_eq!(response.resources[0].value, b"cluster-bytes");

        // Acknowledge, which opens the next watch.
        let ack = discovery::DiscoveryRequest {
            type_url: CLUSTER_TYPE.to_string(),
            resource_names: vec!["cluster-1".to_string()],
            version_info: "v1".to_string(),
            response_nonce: "1".to_string(),
            ..Default::default()
        };
        requests.send(ack.encode_to_vec().into()).await.unwrap();
        let next = created.recv().await.unwrap();
        assert_eq!(next.request.response_nonce, "1");
        assert_eq!(watch.cancel_count(), 1);
    }

    #[tokio::test]
    async fn test_ads_requires_type_url() {
        let (addr, _created) = start_server().await;

        let request = discovery::DiscoveryRequest {
            resource_names: vec!["cluster-1".to_string()],
            ..Default::default()
        };
        let (_requests, mut responses) = open_stream(addr, request).await;

        let status = responses.message().await.unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
        assert_eq!(status.message(), "type URL is required for ADS");
    }

    #[test]
    fn test_error_to_status() {
        let status = Status::from(Error::WatchFailed(CLUSTER_TYPE.to_string()));
        assert_eq!(status.code(), Code::Unavailable);
        assert_eq!(status.message(), format!("{CLUSTER_TYPE} watch failed"));

        assert_eq!(Status::from(Error::StreamClosed).code(), Code::Cancelled);
        assert_eq!(
            Status::from(Error::Validation("bad".into())).code(),
            Code::Internal
        );

        let passthrough = Status::from(Error::Stream(Status::resource_exhausted("slow down")));
        assert_eq!(passthrough.code(), Code::ResourceExhausted);

        // A callback rejecting with a status keeps it.
        let rejected: BoxError = Box::new(Status::permission_denied("unknown node"));
        let status = Status::from(Error::Callback(rejected));
        assert_eq!(status.code(), Code::PermissionDenied);
        assert_eq!(status.message(), "unknown node");

        let status = Status::from(Error::Serialization("cannot encode".into()));
        assert_eq!(status.code(), Code::Unknown);
        assert_eq!(status.message(), "cannot encode");
    }
}
