//! Output stream protocol
//!
//! A graph execution produces an asynchronous sequence of
//! [`OutputMessage`]s, multiplexing user-visible content with debug
//! traffic:
//!
//! ```text
//! {type: "content",       content: ChatChunk}
//! {type: "debug",         content: <transformed debug record>}
//! {type: "debug_summary", content: ExecutionSummary}
//! ```
//!
//! [`ChatChunk`] is the language-agnostic chat-completion chunk envelope:
//! `{id, model, choices: [{delta: {content}, finish_reason}], extras?}`.
//! `extras` is the sideband channel for structured payloads (citations
//! etc.) attached by `send_message` nodes.

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::debug::ExecutionSummary;
use crate::value::FlowValue;

/// Boxed stream of output messages returned by the executor.
pub type OutputStream = Pin<Box<dyn Stream<Item = OutputMessage> + Send>>;

/// One message on the caller-facing output stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum OutputMessage {
    /// A user-visible streaming chunk.
    Content(ChatChunk),
    /// A transformed debug record (shape depends on the event kind).
    Debug(Value),
    /// The final execution summary, emitted once at graph end.
    DebugSummary(ExecutionSummary),
}

impl OutputMessage {
    /// Extract the chunk text, if this is a content message with text.
    pub fn content_text(&self) -> Option<&str> {
        match self {
            Self::Content(chunk) => chunk.text(),
            _ => None,
        }
    }
}

/// Incremental message delta inside a chunk choice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// One choice inside a chunk. The engine always produces a single choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub index: u32,
    pub delta: ChunkDelta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Chat-completion chunk envelope streamed to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChunk {
    pub id: String,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extras: Option<Value>,
}

impl ChatChunk {
    /// Build a chunk carrying a piece of assistant text.
    pub fn text_chunk(model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: format!("chunk-{}", Uuid::new_v4()),
            model: model.into(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta {
                    role: Some("assistant".to_string()),
                    content: Some(content.into()),
                },
                finish_reason: None,
            }],
            extras: None,
        }
    }

    /// Build the closing chunk with a finish reason and no content.
    pub fn finish(model: impl Into<String>) -> Self {
        Self {
            id: format!("chunk-{}", Uuid::new_v4()),
            model: model.into(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta::default(),
                finish_reason: Some("stop".to_string()),
            }],
            extras: None,
        }
    }

    /// Attach a sideband extras payload.
    pub fn with_extras(mut self, extras: Value) -> Self {
        self.extras = Some(extras);
        self
    }

    /// Borrow the delta text of the first choice, if any.
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.delta.content.as_deref())
    }

    /// Interpret a routed value as a chunk: chunk-shaped JSON passes
    /// through, anything else is wrapped as a text chunk.
    pub fn from_flow_value(value: &FlowValue) -> Self {
        if let Some(json) = value.as_json() {
            if json.is_object() && json.get("choices").is_some() {
                if let Ok(chunk) = serde_json::from_value::<ChatChunk>(json.clone()) {
                    return chunk;
                }
            }
        }
        Self::text_chunk("agentflow", value.display_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_with_type_tag() {
        let msg = OutputMessage::Content(ChatChunk::text_chunk("m", "hi"));
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["type"], "content");
        assert_eq!(v["content"]["choices"][0]["delta"]["content"], "hi");
    }

    #[test]
    fn chunk_roundtrips_through_flow_value() {
        let chunk = ChatChunk::text_chunk("fake-model", "hello").with_extras(json!({"k": 1}));
        let value = FlowValue::json(serde_json::to_value(&chunk).unwrap());
        let back = ChatChunk::from_flow_value(&value);
        assert_eq!(back.text(), Some("hello"));
        assert_eq!(back.extras, Some(json!({"k": 1})));
        assert_eq!(back.model, "fake-model");
    }

    #[test]
    fn plain_text_becomes_a_chunk() {
        let back = ChatChunk::from_flow_value(&FlowValue::text("raw"));
        assert_eq!(back.text(), Some("raw"));
    }
}
