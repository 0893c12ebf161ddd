//! turngate control plane
//!
//! Renders TURN relay dataplanes (configuration document, Deployment,
//! Service) and Gateway API statuses from Gateway API resources.

pub mod apis;
pub mod config;
pub mod error;
pub mod metrics_server;
pub mod operator;
pub mod renderer;
pub mod store;
pub mod update;

#[cfg(test)]
mod test_fixtures;
