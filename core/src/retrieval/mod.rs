//! Retrieval subsystem: passages returned by the vector index.
//!
//! - `DocumentIndex` is the seam to the external index; the pipeline only sees this trait
//! - `VectorSearchClient` is the HTTP implementation for the managed vector-search API
//! - `format_passages` renders passages into the context block handed to the model

mod client;
pub mod format;
mod index;

pub use client::VectorSearchClient;
pub use format::format_passages;
pub use index::{DeltaSyncIndexSpec, ProvisionOutcome};

use crate::config::RetrieverConfig;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One chunk returned by the index.
///
/// The relevance rank is the passage's position in the returned sequence;
/// index 0 is the most relevant. Serialized the way UI consumers read it:
/// `{"page_content": ..., "metadata": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    #[serde(rename = "page_content")]
    pub text: String,
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl RetrievedPassage {
    pub fn new(text: impl Into<String>, metadata: Map<String, Value>) -> Self {
        Self {
            text: text.into(),
            metadata,
            score: None,
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    /// Metadata value rendered as text, see [`value_to_text`].
    pub fn metadata_text(&self, field: &str) -> Option<String> {
        self.metadata.get(field).map(value_to_text)
    }
}

/// Strings lose their quotes; `null` renders as nothing.
pub(crate) fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        v => v.to_string(),
    }
}

/// A single request to the index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexQuery {
    pub query_text: String,
    pub columns: Vec<String>,
    pub k: usize,
    pub score_threshold: f64,
    pub query_type: String,
}

impl IndexQuery {
    /// Build the query the retriever configuration describes for `text`.
    pub fn from_config(text: impl Into<String>, config: &RetrieverConfig) -> Self {
        Self {
            query_text: text.into(),
            columns: config.mapping.all_columns(),
            k: config.parameters.k,
            score_threshold: config.score_threshold,
            query_type: config.parameters.query_type.clone(),
        }
    }
}

/// External document index.
///
/// Implementations return passages in relevance order and must not retry or
/// re-rank; errors are handed back as-is.
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    async fn query(&self, query: &IndexQuery) -> Result<Vec<RetrievedPassage>>;

    /// Get a human-readable name for this index
    fn name(&self) -> &str {
        "document-index"
    }
}
