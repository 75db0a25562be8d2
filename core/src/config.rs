//! Typed configuration for the agent, the generation model and the retriever.
//!
//! The YAML document is parsed into an untyped `serde_yml::Value` first and then
//! decoded section by section. Decoding errors carry the dotted path of the
//! offending field (`retriever.parameters.k`). Unknown keys are kept in each
//! section's `extra` map so newer config files still load.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_yml::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Keys a section did not declare, preserved verbatim.
pub type Extra = BTreeMap<String, Value>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yml::Error),

    #[error("invalid config at `{path}`: {message}")]
    Invalid { path: String, message: String },
}

impl ConfigError {
    /// Dotted path of the field that failed validation, if any.
    pub fn field_path(&self) -> Option<&str> {
        match self {
            ConfigError::Invalid { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Behavioral flags for the agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Replace the message history on every update instead of appending
    #[serde(default)]
    pub streaming: bool,
    #[serde(default)]
    pub experiment_location: Option<String>,
    #[serde(default)]
    pub uc_model_name: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    pub temperature: f64,
    pub max_tokens: u32,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Hosted chat-completion endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub endpoint_name: String,
    pub parameters: ModelParameters,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrieverParameters {
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_query_type")]
    pub query_type: String,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Default for RetrieverParameters {
    fn default() -> Self {
        Self {
            k: default_k(),
            query_type: default_query_type(),
            extra: Extra::new(),
        }
    }
}

/// Which index columns hold the chunk text, the document URI, the primary key
/// and any other metadata worth returning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrieverMapping {
    pub chunk_text: String,
    pub document_uri: String,
    pub primary_key: String,
    pub other_columns: Vec<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl RetrieverMapping {
    /// Columns requested from the index, in the order the index must return them.
    pub fn all_columns(&self) -> Vec<String> {
        let mut columns = vec![
            self.chunk_text.clone(),
            self.document_uri.clone(),
            self.primary_key.clone(),
        ];
        columns.extend(self.other_columns.iter().cloned());
        columns
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrieverConfig {
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_description: Option<String>,
    pub endpoint_name: String,
    pub index_name: String,
    pub embedding_model: String,
    /// Passed through to the index untouched
    #[serde(default)]
    pub score_threshold: f64,
    pub parameters: RetrieverParameters,
    pub mapping: RetrieverMapping,
    #[serde(default = "default_chunk_template")]
    pub chunk_template: String,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Source table settings used when the index has to be created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    pub source_table: String,
    #[serde(default = "default_pipeline_type")]
    pub pipeline_type: String,
    /// Defaults to the mapping's `other_columns`
    #[serde(default)]
    pub columns_to_sync: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Root configuration: `agent`, `model` and `retriever` are required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarryConfig {
    pub agent: AgentConfig,
    pub model: ModelConfig,
    pub retriever: RetrieverConfig,
    #[serde(default)]
    pub index: Option<IndexConfig>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl QuarryConfig {
    /// Validate an untyped mapping (already loaded from YAML) into a config.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        decode(value)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_yml::from_str(yaml)?;
        Self::from_value(value)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml_str(&raw)?;
        debug!(
            target: "config",
            path = %path.display(),
            model = %config.model.endpoint_name,
            index = %config.retriever.index_name,
            streaming = config.agent.streaming,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Load from `QUARRY_CONFIG`, falling back to `./config.yaml`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var("QUARRY_CONFIG")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "config.yaml".to_string());
        Self::from_path(path)
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ConfigError> {
    serde_path_to_error::deserialize(value).map_err(|err| ConfigError::Invalid {
        path: err.path().to_string(),
        message: err.inner().to_string(),
    })
}

fn default_k() -> usize {
    5
}

fn default_query_type() -> String {
    "ann".to_string()
}

fn default_chunk_template() -> String {
    "Passage: {chunk_text}\n Document URI: {document_uri}\n".to_string()
}

fn default_pipeline_type() -> String {
    "TRIGGERED".to_string()
}

/// Workspace host, token and request timeout, read from the environment.
/// Never part of the YAML file.
#[derive(Debug, Clone)]
pub struct WorkspaceCredentials {
    pub host: String, // e.g., https://adb-123.azuredatabricks.net
    pub token: Option<String>,
    pub request_timeout_ms: u64,
}

impl Default for WorkspaceCredentials {
    fn default() -> Self {
        Self {
            host: std::env::var("DATABRICKS_HOST")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "http://localhost:8080".to_string()),
            token: std::env::var("DATABRICKS_TOKEN")
                .ok()
                .filter(|s| !s.is_empty()),
            request_timeout_ms: std::env::var("QUARRY_REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60_000),
        }
    }
}

impl WorkspaceCredentials {
    pub fn new(host: impl Into<String>, token: Option<String>) -> Self {
        Self {
            host: host.into(),
            token,
            request_timeout_ms: 60_000,
        }
    }

    /// Host without a trailing slash, ready for path concatenation
    pub fn base_url(&self) -> &str {
        self.host.trim_end_matches('/')
    }
}
