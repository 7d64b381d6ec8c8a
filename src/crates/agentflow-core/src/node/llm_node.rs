//! LLM invocation node.
//!
//! Takes a client handle and a chat container, invokes the model, and
//! streams chunks to the caller as `content` events while they arrive.
//! The terminal event carries the aggregated response text.
//!
//! Inputs use the hyphenated reserved handles: `handle-client-provider`,
//! `handle-chat`, optional `handle-system-context`.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Map, Value};

use crate::error::{FlowError, Result};
use crate::event::Event;
use crate::llm::{Chat, GenerateParams};
use crate::value::FlowValue;

use super::{EventSender, FlowNode, InvokeContext, NodeBase};

/// Input handle carrying the client produced by a `client` node.
pub const HANDLE_CLIENT: &str = "handle-client-provider";
/// Input handle carrying the chat container.
pub const HANDLE_CHAT: &str = "handle-chat";
/// Optional input handle carrying extra system context.
pub const HANDLE_SYSTEM_CONTEXT: &str = "handle-system-context";

pub struct LlmNode {
    base: NodeBase,
}

impl LlmNode {
    pub fn new(id: impl Into<String>, config: Map<String, Value>) -> Self {
        Self {
            base: NodeBase::new(id, "llm", config),
        }
    }

    fn streaming(&self) -> bool {
        self.base
            .config
            .get("stream")
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }
}

#[async_trait]
impl FlowNode for LlmNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    async fn run(&mut self, ctx: &InvokeContext, emit: EventSender) -> Result<()> {
        let client = self
            .base
            .require_input(HANDLE_CLIENT)?
            .as_client()
            .ok_or_else(|| {
                FlowError::config(&self.base.id, "client input is not a client handle")
            })?;
        let chat_value = self
            .base
            .require_input(HANDLE_CHAT)?
            .as_json()
            .cloned()
            .ok_or_else(|| FlowError::Data("chat input is not JSON".to_string()))?;
        let mut chat = Chat::from_value(&chat_value)?;

        if let Some(system) = self.base.input(HANDLE_SYSTEM_CONTEXT) {
            chat.prepend_system(system.display_text());
        }

        let params = GenerateParams::from_config(&self.base.config);
        let mut full_text = String::new();

        if self.streaming() {
            let mut stream = tokio::select! {
                _ = ctx.cancel.cancelled() => return Err(FlowError::Cancelled),
                res = client.stream_generate(&chat, &params) => res?,
            };
            loop {
                let chunk = tokio::select! {
                    _ = ctx.cancel.cancelled() => return Err(FlowError::Cancelled),
                    next = stream.next() => match next {
                        Some(chunk) => chunk?,
                        None => break,
                    },
                };
                if let Some(text) = chunk.text() {
                    full_text.push_str(text);
                }
                // Bare finish chunks carry nothing routable.
                if chunk.text().is_some() || chunk.extras.is_some() {
                    let _ = emit
                        .send(Event::content(
                            &self.base.id,
                            FlowValue::json(serde_json::to_value(&chunk)?),
                        ))
                        .await;
                }
            }
        } else {
            let result = tokio::select! {
                _ = ctx.cancel.cancelled() => return Err(FlowError::Cancelled),
                res = client.generate(&chat, &params) => res?,
            };
            full_text = result.content;
        }

        self.base.internal = Some(json!({
            "client": client.name(),
            "streamed": self.streaming(),
        }));
        let _ = emit
            .send(Event::end(&self.base.id, FlowValue::text(full_text)))
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatClient, ClientRegistry, FakeClient};
    use crate::node::invoke;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn node_with_client(chunks: Vec<&str>, config: Map<String, Value>) -> Box<dyn FlowNode> {
        let client: Arc<dyn ChatClient> =
            Arc::new(FakeClient::scripted(chunks.iter().map(|s| s.to_string()).collect()));
        let chat = Chat::new().user("Hi");
        let mut node = LlmNode::new("llm", config);
        node.base_mut()
            .bind_input(HANDLE_CLIENT, FlowValue::Client(client));
        node.base_mut()
            .bind_input(HANDLE_CHAT, FlowValue::json(chat.to_value()));
        Box::new(node)
    }

    #[tokio::test]
    async fn streams_chunks_then_aggregates() {
        let (tx, mut rx) = mpsc::channel(16);
        let ctx = InvokeContext::new(tx, Arc::new(ClientRegistry::with_defaults()));
        let mut node = node_with_client(vec!["Hel", "lo"], Map::new());

        let outcome = invoke(&mut node, &ctx).await;
        assert!(outcome.error.is_none());

        let content: Vec<&Event> = outcome.events.iter().filter(|e| e.is_content()).collect();
        assert_eq!(content.len(), 2);
        let end = outcome.events.last().unwrap();
        assert_eq!(end.payload.value.as_str(), Some("Hello"));

        // Chunks were forwarded to the caller while streaming.
        assert_eq!(rx.recv().await.unwrap().content_text(), Some("Hel"));
        assert_eq!(rx.recv().await.unwrap().content_text(), Some("lo"));
    }

    #[tokio::test]
    async fn non_streaming_emits_only_end() {
        let (tx, _rx) = mpsc::channel(16);
        let ctx = InvokeContext::new(tx, Arc::new(ClientRegistry::with_defaults()));
        let mut config = Map::new();
        config.insert("stream".to_string(), json!(false));
        let mut node = node_with_client(vec!["all at once"], config);

        let outcome = invoke(&mut node, &ctx).await;
        assert!(outcome.events.iter().all(|e| !e.is_content()));
        assert_eq!(
            outcome.events.last().unwrap().payload.value.as_str(),
            Some("all at once")
        );
    }

    #[tokio::test]
    async fn missing_client_is_an_input_error() {
        let (tx, _rx) = mpsc::channel(16);
        let ctx = InvokeContext::new(tx, Arc::new(ClientRegistry::with_defaults()));
        let mut node: Box<dyn FlowNode> = Box::new(LlmNode::new("llm", Map::new()));

        let outcome = invoke(&mut node, &ctx).await;
        assert_eq!(outcome.error.unwrap().kind(), "input");
    }
}
