//! Resource type URLs known to the server.
//!
//! The well-known types get a dedicated watch slot on every stream, indexed by
//! [`WellKnownType`]. Every other type URL is served through the shared
//! multiplexed channel.

/// Prefix shared by every protobuf `Any` type URL.
pub const TYPE_PREFIX: &str = "type.googleapis.com/";

/// Type URL marking an aggregated (ADS) stream.
///
/// A stream opened with this default requires every request to carry an
/// explicit type URL.
pub const ANY_TYPE: &str = "";

/// Endpoint assignments (EDS).
pub const ENDPOINT_TYPE: &str =
    "type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment";
/// Clusters (CDS).
pub const CLUSTER_TYPE: &str = "type.googleapis.com/envoy.config.cluster.v3.Cluster";
/// Route configurations (RDS).
pub const ROUTE_TYPE: &str = "type.googleapis.com/envoy.config.route.v3.RouteConfiguration";
/// Scoped route configurations (SRDS).
pub const SCOPED_ROUTE_TYPE: &str =
    "type.googleapis.com/envoy.config.route.v3.ScopedRouteConfiguration";
/// Virtual hosts (VHDS).
pub const VIRTUAL_HOST_TYPE: &str = "type.googleapis.com/envoy.config.route.v3.VirtualHost";
/// Listeners (LDS).
pub const LISTENER_TYPE: &str = "type.googleapis.com/envoy.config.listener.v3.Listener";
/// TLS secrets (SDS).
pub const SECRET_TYPE: &str =
    "type.googleapis.com/envoy.extensions.transport_sockets.tls.v3.Secret";
/// Runtime layers (RTDS).
pub const RUNTIME_TYPE: &str = "type.googleapis.com/envoy.service.runtime.v3.Runtime";
/// Extension configurations (ECDS).
pub const EXTENSION_CONFIG_TYPE: &str =
    "type.googleapis.com/envoy.config.core.v3.TypedExtensionConfig";

/// Resource types with a dedicated watch slot.
///
/// The discriminant doubles as the slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum WellKnownType {
    Endpoint = 0,
    Cluster,
    Route,
    ScopedRoute,
    VirtualHost,
    Listener,
    Secret,
    Runtime,
    ExtensionConfig,
}

impl WellKnownType {
    /// Number of well-known types.
    pub const COUNT: usize = 9;

    /// Every well-known type, in slot order.
    pub const ALL: [WellKnownType; Self::COUNT] = [
        Self::Endpoint,
        Self::Cluster,
        Self::Route,
        Self::ScopedRoute,
        Self::VirtualHost,
        Self::Listener,
        Self::Secret,
        Self::Runtime,
        Self::ExtensionConfig,
    ];

    /// Look up the well-known type for a type URL.
    pub fn from_type_url(type_url: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.type_url() == type_url)
    }

    /// The type URL of this resource type.
    pub fn type_url(self) -> &'static str {
        match self {
            Self::Endpoint => ENDPOINT_TYPE,
            Self::Cluster => CLUSTER_TYPE,
            Self::Route => ROUTE_TYPE,
            Self::ScopedRoute => SCOPED_ROUTE_TYPE,
            Self::VirtualHost => VIRTUAL_HOST_TYPE,
            Self::Listener => LISTENER_TYPE,
            Self::Secret => SECRET_TYPE,
            Self::Runtime => RUNTIME_TYPE,
            Self::ExtensionConfig => EXTENSION_CONFIG_TYPE,
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}
