// src/main.rs
use anyhow::{Context, Result};
use std::io::Write;
use tracing::{debug, info};

use lb_router::{
    config,
    load_balancer::{create_algorithm, LoadBalancer},
    metrics::MetricsRegistry,
    proxy::{HttpTransport, RequestOptions},
};

/// Usage: lb-router [config.yaml] [METHOD] [PATH] [CLIENT_ID]
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lb_router=debug".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| "config.yaml".to_string());
    let method = args.next().unwrap_or_else(|| "GET".to_string());
    let path = args.next().unwrap_or_else(|| "/".to_string());
    let client_id = args.next();

    info!("Loading configuration from: {}", config_path);
    let config = config::load_config(&config_path).await?;

    let metrics_registry = MetricsRegistry::new()?;
    let transport = HttpTransport::new(Some(config.transport.timeout()))?;
    let balancer = LoadBalancer::new(
        config.backend_pool(),
        create_algorithm(config.algorithm),
        transport,
    )
    .with_metrics(metrics_registry.collector());

    info!(
        "Routing {} {} with {} over {} backends",
        method,
        path,
        balancer.algorithm_name(),
        balancer.backends().len()
    );

    let mut options = RequestOptions::new();
    if let Some(client_id) = client_id {
        options = options.client_id(client_id);
    }

    let response = balancer
        .handle_request(method, path, options)
        .await
        .context("Request failed")?;

    info!("Backend answered with status {}", response.status_code);
    std::io::stdout().write_all(&response.body)?;

    debug!(
        "Metrics:\n{}",
        String::from_utf8_lossy(&metrics_registry.gather()?)
    );

    Ok(())
}
