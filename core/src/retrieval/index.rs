//! Index administration: existence check, sync, and delta-sync creation.

use crate::config::QuarryConfig;
use crate::Result;
use reqwest::StatusCode;
use serde_json::json;
use tracing::{debug, info};

use super::client::{ensure_success, VectorSearchClient};

/// Everything needed to create a delta-sync index over a source table
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaSyncIndexSpec {
    pub endpoint_name: String,
    pub index_name: String,
    pub source_table: String,
    pub primary_key: String,
    pub pipeline_type: String,
    pub embedding_source_column: String,
    pub embedding_model_endpoint_name: String,
    pub columns_to_sync: Vec<String>,
}

impl DeltaSyncIndexSpec {
    /// `None` when the config has no `index` section.
    pub fn from_config(config: &QuarryConfig) -> Option<Self> {
        let index = config.index.as_ref()?;
        let retriever = &config.retriever;
        Some(Self {
            endpoint_name: retriever.endpoint_name.clone(),
            index_name: retriever.index_name.clone(),
            source_table: index.source_table.clone(),
            primary_key: retriever.mapping.primary_key.clone(),
            pipeline_type: index.pipeline_type.clone(),
            embedding_source_column: retriever.mapping.chunk_text.clone(),
            embedding_model_endpoint_name: retriever.embedding_model.clone(),
            columns_to_sync: index
                .columns_to_sync
                .clone()
                .unwrap_or_else(|| retriever.mapping.other_columns.clone()),
        })
    }

    fn to_request(&self) -> serde_json::Value {
        json!({
            "name": self.index_name,
            "endpoint_name": self.endpoint_name,
            "primary_key": self.primary_key,
            "index_type": "DELTA_SYNC",
            "delta_sync_index_spec": {
                "source_table": self.source_table,
                "pipeline_type": self.pipeline_type,
                "embedding_source_columns": [{
                    "name": self.embedding_source_column,
                    "embedding_model_endpoint_name": self.embedding_model_endpoint_name,
                }],
                "columns_to_sync": self.columns_to_sync,
            },
        })
    }
}

/// What `ensure_index` ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Synced,
    Created,
}

impl VectorSearchClient {
    /// Only a not-found answer maps to `false`; every other failure propagates.
    pub async fn index_exists(&self) -> Result<bool> {
        let url = format!("{}/{}", self.indexes_url(), self.index_name);
        debug!(target: "retrieval", index = %self.index_name, "GET {}", url);

        let resp = self.authorized(self.http.get(&url)).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        ensure_success(resp).await?;
        Ok(true)
    }

    /// Trigger a sync of an existing delta-sync index
    pub async fn sync_index(&self) -> Result<()> {
        let url = format!("{}/{}/sync", self.indexes_url(), self.index_name);
        debug!(target: "retrieval", index = %self.index_name, "POST {}", url);

        let resp = self.authorized(self.http.post(&url)).send().await?;
        ensure_success(resp).await?;
        Ok(())
    }

    pub async fn create_delta_sync_index(&self, spec: &DeltaSyncIndexSpec) -> Result<()> {
        let url = self.indexes_url();
        debug!(target: "retrieval", index = %spec.index_name, "POST {}", url);

        let resp = self
            .authorized(self.http.post(&url))
            .json(&spec.to_request())
            .send()
            .await?;
        ensure_success(resp).await?;
        Ok(())
    }

    /// Sync the index if it exists, otherwise create it from `spec`.
    pub async fn ensure_index(&self, spec: &DeltaSyncIndexSpec) -> Result<ProvisionOutcome> {
        if self.index_exists().await? {
            self.sync_index().await?;
            info!(target: "retrieval", index = %self.index_name, "Index exists; sync triggered");
            Ok(ProvisionOutcome::Synced)
        } else {
            self.create_delta_sync_index(spec).await?;
            info!(target: "retrieval", index = %spec.index_name, "Index created");
            Ok(ProvisionOutcome::Created)
        }
    }
}
