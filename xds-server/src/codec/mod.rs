//! Conversions between crate-owned messages and generated protobuf types.
//!
//! The stream logic only handles [`DiscoveryRequest`](crate::DiscoveryRequest)
//! and [`DiscoveryResponse`](crate::DiscoveryResponse). Transports decode into
//! their protobuf implementation of choice and convert at the edge, so the core
//! stays independent of codegen.

#[cfg(feature = "codegen-prost")]
pub mod prost;
