use crate::config::{RetrieverConfig, RetrieverMapping, WorkspaceCredentials};
use crate::{QuarryError, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, error};

use super::{value_to_text, DocumentIndex, IndexQuery, RetrievedPassage};

pub(super) const SERVICE: &str = "vector search";

/// HTTP client for the managed vector-search REST API
#[derive(Clone)]
pub struct VectorSearchClient {
    pub(crate) http: Client,
    pub(crate) creds: WorkspaceCredentials,
    pub(crate) endpoint_name: String,
    pub(crate) index_name: String,
    pub(crate) mapping: RetrieverMapping,
}

impl VectorSearchClient {
    pub fn new(creds: WorkspaceCredentials, retriever: &RetrieverConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(creds.request_timeout_ms))
            .build()?;
        Ok(Self {
            http,
            creds,
            endpoint_name: retriever.endpoint_name.clone(),
            index_name: retriever.index_name.clone(),
            mapping: retriever.mapping.clone(),
        })
    }

    pub(super) fn indexes_url(&self) -> String {
        format!("{}/api/2.0/vector-search/indexes", self.creds.base_url())
    }

    pub(super) fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        let req = req.header("content-type", "application/json");
        match &self.creds.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Turn a manifest + data_array response into passages, keeping row order.
    fn rows_to_passages(&self, body: QueryResponse) -> Result<Vec<RetrievedPassage>> {
        let columns: Vec<String> = body.manifest.columns.into_iter().map(|c| c.name).collect();
        let rows = body.result.map(|r| r.data_array).unwrap_or_default();

        rows.into_iter()
            .map(|row| self.row_to_passage(&columns, row))
            .collect()
    }

    fn row_to_passage(&self, columns: &[String], row: Vec<Value>) -> Result<RetrievedPassage> {
        let mut text = None;
        let mut score = None;
        let mut metadata = Map::new();

        for (name, value) in columns.iter().zip(row) {
            if *name == self.mapping.chunk_text {
                text = Some(value_to_text(&value));
            } else if name == "score" {
                score = value.as_f64();
            } else {
                metadata.insert(name.clone(), value);
            }
        }

        let text = text.ok_or_else(|| malformed(format!(
            "row is missing the chunk text column `{}`",
            self.mapping.chunk_text
        )))?;
        for required in [&self.mapping.document_uri, &self.mapping.primary_key] {
            if !metadata.contains_key(required.as_str()) {
                return Err(malformed(format!("row is missing column `{required}`")));
            }
        }

        let passage = RetrievedPassage::new(text, metadata);
        Ok(match score {
            Some(s) => passage.with_score(s),
            None => passage,
        })
    }
}

#[async_trait]
impl DocumentIndex for VectorSearchClient {
    async fn query(&self, query: &IndexQuery) -> Result<Vec<RetrievedPassage>> {
        let url = format!("{}/{}/query", self.indexes_url(), self.index_name);
        debug!(
            target: "retrieval",
            index = %self.index_name,
            k = query.k,
            query_type = %query.query_type,
            "POST {}", url
        );

        let body = json!({
            "query_text": query.query_text,
            "columns": query.columns,
            "num_results": query.k,
            "score_threshold": query.score_threshold,
            "query_type": query.query_type.to_uppercase(),
        });

        let resp = self.authorized(self.http.post(&url)).json(&body).send().await?;
        let raw = ensure_success(resp).await?;
        let parsed: QueryResponse = serde_json::from_str(&raw)
            .map_err(|e| malformed(format!("unexpected query response: {e}")))?;

        let passages = self.rows_to_passages(parsed)?;
        debug!(target: "retrieval", count = passages.len(), "Retrieved passages");
        Ok(passages)
    }

    fn name(&self) -> &str {
        &self.endpoint_name
    }
}

/// Read the body of a successful response, or turn a non-2xx into `Service`.
pub(super) async fn ensure_success(resp: Response) -> Result<String> {
    let status = resp.status();
    let text = resp.text().await?;
    if !status.is_success() {
        error!(target: "retrieval", %status, body = %text, "Vector search error");
        return Err(QuarryError::Service {
            service: SERVICE,
            status: status.as_u16(),
            body: text,
        });
    }
    Ok(text)
}

fn malformed(reason: String) -> QuarryError {
    QuarryError::MalformedResponse {
        service: SERVICE,
        reason,
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    manifest: Manifest,
    #[serde(default)]
    result: Option<QueryResult>,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    columns: Vec<ColumnInfo>,
}

#[derive(Debug, Deserialize)]
struct ColumnInfo {
    name: String,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    data_array: Vec<Vec<Value>>,
}
