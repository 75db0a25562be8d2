//! Pipeline state and the per-field merge policy.

use crate::message::Message;
use crate::retrieval::RetrievedPassage;
use crate::{QuarryError, Result};

/// How a node's `messages` update is folded into the running state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Concatenate the update onto the current list
    Append,
    /// The update is the complete new list
    Replace,
}

impl MergeStrategy {
    /// Streaming invocations hand back whole histories, batch ones only the delta.
    pub fn for_streaming(streaming: bool) -> Self {
        if streaming {
            MergeStrategy::Replace
        } else {
            MergeStrategy::Append
        }
    }

    pub fn merge<T>(self, current: &mut Vec<T>, update: Vec<T>) {
        match self {
            MergeStrategy::Append => current.extend(update),
            MergeStrategy::Replace => *current = update,
        }
    }
}

/// Output of the retrieval node: the formatted context block and the raw
/// passages it was rendered from. Always written together.
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieval {
    pub context: String,
    pub documents: Vec<RetrievedPassage>,
}

/// Partial update returned by a node; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub messages: Option<Vec<Message>>,
    pub retrieval: Option<Retrieval>,
}

impl StateUpdate {
    pub fn messages(messages: Vec<Message>) -> Self {
        Self {
            messages: Some(messages),
            retrieval: None,
        }
    }

    pub fn retrieval(context: String, documents: Vec<RetrievedPassage>) -> Self {
        Self {
            messages: None,
            retrieval: Some(Retrieval { context, documents }),
        }
    }
}

/// State threaded through one pipeline run. Built fresh per request.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineState {
    messages: Vec<Message>,
    retrieval: Option<Retrieval>,
    messages_merge: MergeStrategy,
}

impl PipelineState {
    /// An empty conversation has no user turn, so it is rejected up front.
    pub fn new(messages: Vec<Message>, messages_merge: MergeStrategy) -> Result<Self> {
        if messages.is_empty() {
            return Err(QuarryError::NoUserMessage);
        }
        Ok(Self {
            messages,
            retrieval: None,
            messages_merge,
        })
    }

    pub fn with_retrieval(mut self, retrieval: Retrieval) -> Self {
        self.retrieval = Some(retrieval);
        self
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn retrieval(&self) -> Option<&Retrieval> {
        self.retrieval.as_ref()
    }

    pub fn context(&self) -> Option<&str> {
        self.retrieval.as_ref().map(|r| r.context.as_str())
    }

    pub fn documents(&self) -> Option<&[RetrievedPassage]> {
        self.retrieval.as_ref().map(|r| r.documents.as_slice())
    }

    /// Fold a node's update into the state.
    ///
    /// `messages` follows the state's merge strategy; retrieval output is
    /// last-writer-wins. A replacement with an empty list is ignored so the
    /// conversation never becomes empty.
    pub fn apply(&mut self, update: StateUpdate) {
        if let Some(messages) = update.messages {
            if !(self.messages_merge == MergeStrategy::Replace && messages.is_empty()) {
                self.messages_merge.merge(&mut self.messages, messages);
            }
        }
        if let Some(retrieval) = update.retrieval {
            self.retrieval = Some(retrieval);
        }
    }
}
