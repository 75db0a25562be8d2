// Create the delta-sync index described by the config, or sync it if it already exists
use tracing::info;

use quarry_core::telemetry::init_tracing;
use quarry_core::{
    DeltaSyncIndexSpec, ProvisionOutcome, QuarryConfig, VectorSearchClient, WorkspaceCredentials,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing("info");

    let config = QuarryConfig::from_env()?;
    let spec = DeltaSyncIndexSpec::from_config(&config)
        .ok_or("config has no `index` section; nothing to provision")?;

    let client = VectorSearchClient::new(WorkspaceCredentials::default(), &config.retriever)?;
    info!(
        target: "provision",
        index = %spec.index_name,
        endpoint = %spec.endpoint_name,
        source_table = %spec.source_table,
        "Ensuring index"
    );

    match client.ensure_index(&spec).await? {
        ProvisionOutcome::Synced => println!("Synced existing index {}", spec.index_name),
        ProvisionOutcome::Created => println!("Created index {}", spec.index_name),
    }
    Ok(())
}
