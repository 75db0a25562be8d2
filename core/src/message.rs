//! Chat messages and the normalizer that picks the question to answer.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{QuarryError, Result};

/// Roles for messages in conversation.
///
/// LangChain-style names are accepted on input (`human`, `ai`) but the
/// canonical name is always written back out.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(alias = "human")]
    User,
    #[serde(alias = "ai")]
    Assistant,
    System,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One role/content pair, the unit of a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content)
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

/// Return the most recent `user` message as a one-element sequence.
///
/// Assistant, system and tool messages after it are ignored. A conversation
/// without any user turn is an input error and is never papered over.
pub fn last_user_message(messages: &[Message]) -> Result<Vec<Message>> {
    messages
        .iter()
        .rev()
        .find(|m| m.is_user())
        .map(|m| vec![m.clone()])
        .ok_or(QuarryError::NoUserMessage)
}
