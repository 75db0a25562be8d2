use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use quarry_bridge::start_server;
use quarry_core::telemetry::init_tracing;
use quarry_core::{Pipeline, QuarryConfig, Topology, WorkspaceCredentials};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing("info,quarry_core=info,quarry_bridge=info");

    let config = Arc::new(QuarryConfig::from_env()?);

    let topology: Topology = std::env::var("QUARRY_TOPOLOGY")
        .unwrap_or_else(|_| "chat".into())
        .parse()?;

    let creds = WorkspaceCredentials::default();
    info!(
        target: "bridge",
        host = %creds.base_url(),
        model = %config.model.endpoint_name,
        index = %config.retriever.index_name,
        %topology,
        "Building pipeline"
    );
    let pipeline = Pipeline::from_config(config, creds, topology)?;

    let addr: SocketAddr = std::env::var("QUARRY_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8000".into())
        .parse()?;

    // Serve until the process is stopped
    start_server(addr, Arc::new(pipeline))
        .await
        .map_err(|e| e.into())
}
