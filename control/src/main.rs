use anyhow::Result;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use turngate_control::config::ControllerConfig;
use turngate_control::metrics_server::serve_metrics;
use turngate_control::operator::Operator;

/// turngate operator
///
/// Watches Gateway API resources and renders TURN relay dataplanes.
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize rustls crypto provider (needed for Kubernetes TLS client)
    rustls::crypto::ring::default_provider()
        .install_default()
        .ok(); // Ignore error if already installed

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ControllerConfig::from_env()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    info!(
        "turngate operator {} starting: controller={}, endpoint_discovery={}, relay_to_cluster_ip={}",
        env!("CARGO_PKG_VERSION"),
        config.controller_name,
        config.enable_endpoint_discovery,
        config.relay_to_cluster_ip()
    );

    let metrics = if config.metrics_addr.is_empty() {
        None
    } else {
        let addr = config.metrics_addr.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = serve_metrics(&addr).await {
                error!("Metrics endpoint error: {}", e);
            }
        }))
    };

    let client = kube::Client::try_default().await?;
    let operator = Operator::new(client, config);

    tokio::select! {
        result = operator.run() => {
            if let Err(e) = result {
                error!("Operator error: {}", e);
            }
        }
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    if let Some(handle) = metrics {
        handle.abort();
    }
    info!("turngate operator stopped");
    Ok(())
}
