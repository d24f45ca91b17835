//! Crate-owned xDS message types.
//!
//! These types are codegen-agnostic and serve as the interface between the
//! stream processing logic and the wire format. With the `codegen-prost`
//! feature, [`crate::codec::prost`] converts them to and from the envoy-types
//! protos.

use std::collections::HashSet;

use bytes::Bytes;

/// A discovery request received from a client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryRequest {
    /// The version_info of the most recent response the client applied,
    /// or empty for the first request.
    pub version_info: String,
    /// The node making the request.
    ///
    /// Clients only send it on the first request of a stream; the server
    /// fills it in on later requests.
    pub node: Option<Node>,
    /// Resource names the client is subscribing to.
    pub resource_names: Vec<String>,
    /// Type URL of the resources being requested.
    pub type_url: String,
    /// Nonce of the response this request acknowledges, or empty.
    pub response_nonce: String,
    /// Present when this request rejects the previous response (NACK).
    pub error_detail: Option<ErrorDetail>,
}

impl DiscoveryRequest {
    /// Create a request for `type_url` subscribing to `resource_names`.
    pub fn new<I, S>(type_url: impl Into<String>, resource_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            type_url: type_url.into(),
            resource_names: resource_names.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Set the nonce being acknowledged.
    pub fn with_response_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.response_nonce = nonce.into();
        self
    }

    /// Set the version being acknowledged.
    pub fn with_version_info(mut self, version: impl Into<String>) -> Self {
        self.version_info = version.into();
        self
    }

    /// Set the node.
    pub fn with_node(mut self, node: Node) -> Self {
        self.node = Some(node);
        self
    }

    /// Mark this request as a NACK.
    pub fn with_error_detail(mut self, error: ErrorDetail) -> Self {
        self.error_detail = Some(error);
        self
    }

    /// Returns the requested resource names as a set.
    pub fn resource_name_set(&self) -> HashSet<String> {
        self.resource_names.iter().cloned().collect()
    }

    /// Returns true if the client is rejecting the previous response.
    pub fn is_nack(&self) -> bool {
        self.error_detail.is_some()
    }
}

/// A discovery response sent to a client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryResponse {
    /// The version of the response data.
    pub version_info: String,
    /// The response resources wrapped as Any protos.
    pub resources: Vec<ResourceAny>,
    /// Type URL of the resources.
    pub type_url: String,
    /// Nonce for this response, echoed back by the client when acknowledging.
    pub nonce: String,
}

/// A resource wrapped as google.protobuf.Any.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceAny {
    /// Type URL of the resource.
    pub type_url: String,
    /// Serialized resource bytes.
    pub value: Bytes,
}

impl ResourceAny {
    /// Wrap serialized resource bytes.
    pub fn new(type_url: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            type_url: type_url.into(),
            value: value.into(),
        }
    }
}

/// Node identification of a connected client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    /// An opaque node identifier.
    pub id: String,
    /// The cluster the node belongs to.
    pub cluster: String,
    /// Locality specifying where the node is running.
    pub locality: Option<Locality>,
    /// Free-form string identifying the client type (e.g., "envoy", "grpc").
    pub user_agent_name: String,
    /// Version of the client.
    pub user_agent_version: String,
}

impl Node {
    /// Create a node with the given identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Set the cluster.
    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = cluster.into();
        self
    }

    /// Set the user agent.
    pub fn with_user_agent(
        mut self,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        self.user_agent_name = name.into();
        self.user_agent_version = version.into();
        self
    }

    /// Set the locality.
    pub fn with_locality(mut self, locality: Locality) -> Self {
        self.locality = Some(locality);
        self
    }
}

/// Locality information identifying where a node is running.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Locality {
    /// Region the node is in.
    pub region: String,
    /// Zone within the region.
    pub zone: String,
    /// Sub-zone within the zone.
    pub sub_zone: String,
}

/// Error details carried by a NACK.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorDetail {
    /// gRPC status code.
    pub code: i32,
    /// Error message.
    pub message: String,
}
