//! The provider-agnostic chat client trait.
//!
//! Implementations handle message conversion, API calls, and response
//! parsing for their particular provider. The engine only contracts that
//! a client can produce a complete result or a finite stream of
//! [`ChatChunk`]s. Clients are shared-read: multiple `llm` nodes may hold
//! the same `Arc<dyn ChatClient>` and invoke it concurrently.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::output::ChatChunk;

use super::Chat;

/// Finite stream of completion chunks produced by `stream_generate`.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatChunk>> + Send>>;

/// Generation parameters forwarded to the provider.
///
/// Provider-specific knobs go into `extra`; known fields are first-class.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GenerateParams {
    /// Parse params out of a node's free-form configuration map.
    pub fn from_config(config: &Map<String, Value>) -> Self {
        serde_json::from_value(Value::Object(config.clone())).unwrap_or_default()
    }
}

/// Result of a non-streaming generate call.
#[derive(Debug, Clone)]
pub struct ChatResult {
    /// Complete assistant response text.
    pub content: String,
    /// Model that produced the response.
    pub model: String,
    /// Sideband structured payload, if the provider returned one.
    pub extras: Option<Value>,
}

/// Chat-based language model client.
///
/// Both methods take the chat container and generation parameters; the
/// streaming variant yields chunks in production order and terminates with
/// a finish chunk.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Generate a complete response.
    async fn generate(&self, chat: &Chat, params: &GenerateParams) -> Result<ChatResult>;

    /// Stream a response chunk by chunk.
    async fn stream_generate(&self, chat: &Chat, params: &GenerateParams) -> Result<ChunkStream>;

    /// Short provider/model name used in debug snapshots.
    fn name(&self) -> &str;

    /// Clone into a boxed trait object.
    fn clone_box(&self) -> Box<dyn ChatClient>;
}

impl Clone for Box<dyn ChatClient> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
