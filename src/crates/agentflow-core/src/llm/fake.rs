//! Scripted client for tests and offline runs.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::output::ChatChunk;

use super::{Chat, ChatClient, ChatResult, ChunkStream, GenerateParams};

/// A [`ChatClient`] that replays a fixed list of chunks.
///
/// Configured from a `client` node's data map:
///
/// ```json
/// {"provider": "fake", "chunks": ["Hel", "lo"], "model": "fake-model"}
/// ```
///
/// With no `chunks` configured it echoes the last user turn, which keeps
/// pure graphs deterministic end to end.
#[derive(Debug, Clone)]
pub struct FakeClient {
    chunks: Option<Vec<String>>,
    model: String,
}

#[derive(Deserialize, Default)]
struct FakeConfig {
    chunks: Option<Vec<String>>,
    model: Option<String>,
}

impl FakeClient {
    /// Client that replays the given chunks.
    pub fn scripted(chunks: Vec<String>) -> Self {
        Self {
            chunks: Some(chunks),
            model: "fake-model".to_string(),
        }
    }

    /// Client that echoes the last user turn as a single chunk.
    pub fn echo() -> Self {
        Self {
            chunks: None,
            model: "fake-model".to_string(),
        }
    }

    /// Build from a `client` node's configuration map.
    pub fn from_config(config: &Map<String, Value>) -> Self {
        let cfg: FakeConfig =
            serde_json::from_value(Value::Object(config.clone())).unwrap_or_default();
        Self {
            chunks: cfg.chunks,
            model: cfg.model.unwrap_or_else(|| "fake-model".to_string()),
        }
    }

    fn pieces(&self, chat: &Chat) -> Vec<String> {
        match &self.chunks {
            Some(chunks) => chunks.clone(),
            None => vec![chat.last_user().unwrap_or_default().to_string()],
        }
    }
}

#[async_trait]
impl ChatClient for FakeClient {
    async fn generate(&self, chat: &Chat, _params: &GenerateParams) -> Result<ChatResult> {
        Ok(ChatResult {
            content: self.pieces(chat).concat(),
            model: self.model.clone(),
            extras: None,
        })
    }

    async fn stream_generate(&self, chat: &Chat, _params: &GenerateParams) -> Result<ChunkStream> {
        let model = self.model.clone();
        let chunks: Vec<Result<ChatChunk>> = self
            .pieces(chat)
            .into_iter()
            .map(|piece| Ok(ChatChunk::text_chunk(model.clone(), piece)))
            .chain(std::iter::once(Ok(ChatChunk::finish(model.clone()))))
            .collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    fn name(&self) -> &str {
        &self.model
    }

    fn clone_box(&self) -> Box<dyn ChatClient> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn scripted_chunks_stream_in_order() {
        let client = FakeClient::scripted(vec!["a".into(), "b".into()]);
        let chat = Chat::new().user("hi");
        let mut stream = client
            .stream_generate(&chat, &GenerateParams::default())
            .await
            .unwrap();

        let mut texts = Vec::new();
        while let Some(chunk) = stream.next().await {
            if let Some(t) = chunk.unwrap().text() {
                texts.push(t.to_string());
            }
        }
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn echo_returns_last_user_turn() {
        let client = FakeClient::echo();
        let chat = Chat::new().system("s").user("question");
        let result = client
            .generate(&chat, &GenerateParams::default())
            .await
            .unwrap();
        assert_eq!(result.content, "question");
    }
}
