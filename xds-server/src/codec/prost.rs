//! Conversions to and from the envoy-types protos.

use envoy_types::pb::envoy::config::core::v3 as core;
use envoy_types::pb::envoy::service::discovery::v3 as discovery;
use envoy_types::pb::google::protobuf::Any;
use envoy_types::pb::google::rpc::Status;

use crate::message::{
    DiscoveryRequest, DiscoveryResponse, ErrorDetail, Locality, Node, ResourceAny,
};

impl From<discovery::DiscoveryRequest> for DiscoveryRequest {
    fn from(request: discovery::DiscoveryRequest) -> Self {
        Self {
            version_info: request.version_info,
            node: request.node.map(Node::from),
            resource_names: request.resource_names,
            type_url: request.type_url,
            response_nonce: request.response_nonce,
            error_detail: request.error_detail.map(|status| ErrorDetail {
                code: status.code,
                message: status.message,
            }),
        }
    }
}

impl From<DiscoveryRequest> for discovery::DiscoveryRequest {
    fn from(request: DiscoveryRequest) -> Self {
        Self {
            version_info: request.version_info,
            node: request.node.map(core::Node::from),
            resource_names: request.resource_names,
            type_url: request.type_url,
            response_nonce: request.response_nonce,
            error_detail: request.error_detail.map(|e| Status {
                code: e.code,
                message: e.message,
                details: vec![],
            }),
            ..Default::default()
        }
    }
}

impl From<DiscoveryResponse> for discovery::DiscoveryResponse {
    fn from(response: DiscoveryResponse) -> Self {
        Self {
            version_info: response.version_info,
            resources: response
                .resources
                .into_iter()
                .map(|resource| Any {
                    type_url: resource.type_url,
                    value: resource.value.to_vec(),
                })
                .collect(),
            type_url: response.type_url,
            nonce: response.nonce,
            ..Default::default()
        }
    }
}

impl From<discovery::DiscoveryResponse> for DiscoveryResponse {
    fn from(response: discovery::DiscoveryResponse) -> Self {
        Self {
            version_info: response.version_info,
            resources: response
                .resources
                .into_iter()
                .map(|any| ResourceAny {
                    type_url: any.type_url,
                    value: any.value.into(),
                })
                .collect(),
            type_url: response.type_url,
            nonce: response.nonce,
        }
    }
}

impl From<core::Node> for Node {
    fn from(node: core::Node) -> Self {
        // Build versions are not surfaced; only the plain version string is.
        let user_agent_version = match node.user_agent_version_type {
            Some(core::node::UserAgentVersionType::UserAgentVersion(version)) => version,
            _ => String::new(),
        };
        Self {
            id: node.id,
            cluster: node.cluster,
            locality: node.locality.map(|l| Locality {
                region: l.region,
                zone: l.zone,
                sub_zone: l.sub_zone,
            }),
            user_agent_name: node.user_agent_name,
            user_agent_version,
        }
    }
}

impl From<Node> for core::Node {
    fn from(node: Node) -> Self {
        let user_agent_version_type = (!node.user_agent_version.is_empty()).then(|| {
            core::node::UserAgentVersionType::UserAgentVersion(node.user_agent_version)
        });
        Self {
            id: node.id,
            cluster: node.cluster,
            locality: node.locality.map(|l| core::Locality {
                region: l.region,
                zone: l.zone,
                sub_zone: l.sub_zone,
            }),
            user_agent_name: node.user_agent_name,
            user_agent_version_type,
            ..Default::default()
        }
    }
}
