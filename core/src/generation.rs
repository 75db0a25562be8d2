//! Generation: prompt assembly and the hosted chat-completion client.

use crate::config::{ModelConfig, WorkspaceCredentials};
use crate::message::{Message, Role};
use crate::retrieval::format::render;
use crate::{QuarryError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error};

const SERVICE: &str = "serving endpoint";

/// System instruction wrapped around the retrieved context
pub const CONTEXT_PROMPT: &str = "You are a trusted assistant that helps answer questions based only on the provided context. Here is some context which might or might not help you answer: {context}.  If the context is not helpful, you should say you do not know, and summarize the context in one sentence.";

/// Build the messages sent to the model: the context-bearing system message
/// followed by the question.
pub fn context_messages(context: &str, question: &[Message]) -> Vec<Message> {
    let mut messages = Vec::with_capacity(question.len() + 1);
    messages.push(Message::system(render(CONTEXT_PROMPT, &[("context", context)])));
    messages.extend(question.iter().cloned());
    messages
}

/// External text-generation service: ordered messages in, one assistant message out.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn generate(&self, messages: &[Message]) -> Result<Message>;

    /// Get a human-readable name for this model
    fn name(&self) -> &str {
        "chat-model"
    }
}

/// HTTP client for a model serving endpoint speaking the chat-completions format
#[derive(Clone)]
pub struct ServingEndpointClient {
    pub(crate) http: Client,
    pub(crate) creds: WorkspaceCredentials,
    pub(crate) model: ModelConfig,
}

impl ServingEndpointClient {
    pub fn new(creds: WorkspaceCredentials, model: &ModelConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(creds.request_timeout_ms))
            .build()?;
        Ok(Self {
            http,
            creds,
            model: model.clone(),
        })
    }

    fn invocations_url(&self) -> String {
        format!(
            "{}/serving-endpoints/{}/invocations",
            self.creds.base_url(),
            self.model.endpoint_name
        )
    }
}

#[async_trait]
impl ChatModel for ServingEndpointClient {
    async fn generate(&self, messages: &[Message]) -> Result<Message> {
        let url = self.invocations_url();
        debug!(
            target: "generation",
            endpoint = %self.model.endpoint_name,
            messages = messages.len(),
            "POST {}", url
        );

        let mut req = self
            .http
            .post(&url)
            .header("content-type", "application/json");
        if let Some(token) = &self.creds.token {
            req = req.bearer_auth(token);
        }

        let body = json!({
            "messages": messages,
            "temperature": self.model.parameters.temperature,
            "max_tokens": self.model.parameters.max_tokens,
        });

        let resp = req.json(&body).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            error!(target: "generation", %status, body = %text, "Serving endpoint error");
            return Err(QuarryError::Service {
                service: SERVICE,
                status: status.as_u16(),
                body: text,
            });
        }

        let val: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
            QuarryError::MalformedResponse {
                service: SERVICE,
                reason: format!("invalid JSON: {e}"),
            }
        })?;
        let content = extract_text_from_chat_completions(&val).ok_or_else(|| {
            QuarryError::MalformedResponse {
                service: SERVICE,
                reason: "missing choices[0].message.content".into(),
            }
        })?;

        Ok(Message::new(Role::Assistant, content))
    }

    fn name(&self) -> &str {
        &self.model.endpoint_name
    }
}

fn extract_text_from_chat_completions(v: &serde_json::Value) -> Option<String> {
    v.get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(|s| s.to_string())
}
