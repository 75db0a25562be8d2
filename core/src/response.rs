//! Wire-level chat-completion response and the shaper that builds it from a
//! finished pipeline state.

use crate::message::{Message, Role};
use crate::pipeline::{PipelineState, Topology};
use crate::Result;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatChoice {
    pub message: Message,
}

/// Side-channel outputs: everything but the answer.
///
/// Endpoints that omit a field, or send `null`, decode to an empty list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomOutputs {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub message_history: Vec<Message>,
    /// Retrieved passages as plain mappings, in relevance order
    #[serde(default, deserialize_with = "null_as_empty")]
    pub documents: Vec<Value>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<ChatChoice>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub custom_outputs: CustomOutputs,
}

fn null_as_default<'de, D>(deserializer: D) -> std::result::Result<CustomOutputs, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<CustomOutputs>::deserialize(deserializer)?.unwrap_or_default())
}

impl ChatCompletionResponse {
    pub fn new(answer: impl Into<String>, custom_outputs: CustomOutputs) -> Self {
        Self {
            choices: vec![ChatChoice {
                message: Message::new(Role::Assistant, answer),
            }],
            custom_outputs,
        }
    }

    /// Shape a finished state for the topology that produced it.
    pub fn from_state(state: &PipelineState, topology: Topology) -> Result<Self> {
        match topology {
            Topology::Chat => Self::from_chat_state(state),
            Topology::SearchOnly => Self::from_search_state(state),
        }
    }

    /// Answer = last message; history = the rest plus the context as a `tool` turn.
    pub fn from_chat_state(state: &PipelineState) -> Result<Self> {
        let (last, earlier) = match state.messages().split_last() {
            Some((last, earlier)) => (last.content.clone(), earlier),
            None => (String::new(), &[][..]),
        };

        let mut history = earlier.to_vec();
        if let Some(context) = state.context() {
            history.push(Message::tool(context));
        }

        Ok(Self::new(
            last,
            CustomOutputs {
                message_history: history,
                documents: serialize_documents(state)?,
            },
        ))
    }

    /// No assistant turn exists, so the formatted context is the answer.
    pub fn from_search_state(state: &PipelineState) -> Result<Self> {
        Ok(Self::new(
            state.context().unwrap_or_default(),
            CustomOutputs {
                message_history: state.messages().to_vec(),
                documents: serialize_documents(state)?,
            },
        ))
    }

    /// Content of the first choice
    pub fn answer(&self) -> &str {
        self.choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or_default()
    }
}

fn serialize_documents(state: &PipelineState) -> Result<Vec<Value>> {
    state
        .documents()
        .unwrap_or_default()
        .iter()
        .map(|d| serde_json::to_value(d).map_err(Into::into))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub delta: Message,
}

/// Streaming rendition of the same payload: `delta` instead of `message`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub choices: Vec<ChunkChoice>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub custom_outputs: CustomOutputs,
}

impl From<ChatCompletionResponse> for ChatCompletionChunk {
    fn from(resp: ChatCompletionResponse) -> Self {
        Self {
            choices: resp
                .choices
                .into_iter()
                .map(|c| ChunkChoice { delta: c.message })
                .collect(),
            custom_outputs: resp.custom_outputs,
        }
    }
}
