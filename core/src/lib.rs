// Quarry Core Library
// Retrieval-augmented answer pipeline: retrieve passages, generate, shape the reply

pub mod config;
pub mod generation;
pub mod message;
pub mod pipeline;
pub mod response;
pub mod retrieval;
pub mod telemetry;

// Export core types
pub use config::{
    AgentConfig, ConfigError, IndexConfig, ModelConfig, ModelParameters, QuarryConfig,
    RetrieverConfig, RetrieverMapping, RetrieverParameters, WorkspaceCredentials,
};
pub use generation::{ChatModel, ServingEndpointClient};
pub use message::{last_user_message, Message, Role};
pub use pipeline::{MergeStrategy, Pipeline, PipelineState, Retrieval, StateUpdate, Topology};
pub use response::{ChatChoice, ChatCompletionChunk, ChatCompletionResponse, CustomOutputs};
pub use retrieval::{
    format_passages, DeltaSyncIndexSpec, DocumentIndex, IndexQuery, ProvisionOutcome,
    RetrievedPassage, VectorSearchClient,
};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuarryError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Conversation contains no user message")]
    NoUserMessage,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned status {status}: {body}")]
    Service {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("Malformed response from {service}: {reason}")]
    MalformedResponse {
        service: &'static str,
        reason: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl QuarryError {
    /// True for failures raised by the index or the generation service.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            QuarryError::Http(_) | QuarryError::Service { .. } | QuarryError::MalformedResponse { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, QuarryError>;
