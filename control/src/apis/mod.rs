//! Kubernetes API types
//!
//! The operator's own CRDs (GatewayConfig, Dataplane, UDPRoute), the Gateway
//! API status wire types, and controller metrics. GatewayClass and Gateway
//! come from the `gateway_api` crate.

pub mod dataplane;
pub mod gateway_config;
pub mod metrics;
pub mod status;
pub mod udp_route;

pub use dataplane::{Dataplane, DataplaneSpec};
pub use gateway_api::apis::standard::gatewayclasses::GatewayClass;
pub use gateway_api::apis::standard::gateways::Gateway;
pub use gateway_config::{GatewayConfig, GatewayConfigSpec};
pub use udp_route::UDPRoute;
