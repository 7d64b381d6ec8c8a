//! Chat message container passed to LLM clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FlowError, Result};

/// Speaker of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Ordered list of turns handed to a [`ChatClient`](super::ChatClient).
///
/// Built by the `chat` node from its system/user inputs plus any history
/// carried in its configuration; serialized as JSON when routed along
/// edges.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Chat {
    pub messages: Vec<ChatMessage>,
}

impl Chat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a system turn.
    pub fn system(mut self, content: impl Into<String>) -> Self {
        self.push(Role::System, content);
        self
    }

    /// Append a user turn.
    pub fn user(mut self, content: impl Into<String>) -> Self {
        self.push(Role::User, content);
        self
    }

    /// Append an assistant turn.
    pub fn assistant(mut self, content: impl Into<String>) -> Self {
        self.push(Role::Assistant, content);
        self
    }

    /// Append a turn in place.
    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(ChatMessage {
            role,
            content: content.into(),
        });
    }

    /// Insert a system turn ahead of everything else.
    pub fn prepend_system(&mut self, content: impl Into<String>) {
        self.messages.insert(
            0,
            ChatMessage {
                role: Role::System,
                content: content.into(),
            },
        );
    }

    /// The most recent user turn, if any.
    pub fn last_user(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    /// Deserialize a chat routed as JSON along an edge.
    pub fn from_value(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| FlowError::Data(format!("not a chat container: {}", e)))
    }

    /// Serialize for routing along an edge.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
