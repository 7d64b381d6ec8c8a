//! Entry node: the single user-input point of a graph.
//!
//! The compiler seeds the initial message and attachments into this
//! node's configuration. On execution it assigns the chat log for the
//! invocation and emits three typed outputs - message, files, images -
//! plus the terminal event carrying the message with the chat identity as
//! metadata.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::error::Result;
use crate::event::Event;
use crate::value::FlowValue;

use super::{EventSender, FlowNode, InvokeContext, NodeBase};

/// Output handle for the user message text.
pub const HANDLE_USER_MESSAGE: &str = "handle_user_message";
/// Output handle for file attachments.
pub const HANDLE_USER_FILES: &str = "handle_user_files";
/// Output handle for image attachments.
pub const HANDLE_USER_IMAGES: &str = "handle_user_images";

pub struct UserInputNode {
    base: NodeBase,
}

impl UserInputNode {
    pub fn new(id: impl Into<String>, config: Map<String, Value>) -> Self {
        Self {
            base: NodeBase::new(id, "user_input", config),
        }
    }

    fn message(&self) -> String {
        self.base
            .config_str("message")
            .unwrap_or_default()
            .to_string()
    }

    fn attachment_list(&self, key: &str) -> Value {
        self.base
            .config
            .get(key)
            .cloned()
            .unwrap_or_else(|| json!([]))
    }
}

#[async_trait]
impl FlowNode for UserInputNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    async fn run(&mut self, ctx: &InvokeContext, emit: EventSender) -> Result<()> {
        let chat_log = ctx.assign_chat_log().clone();
        let message = self.message();

        let _ = emit
            .send(Event::typed(
                HANDLE_USER_MESSAGE,
                &self.base.id,
                FlowValue::text(message.clone()),
            ))
            .await;
        let _ = emit
            .send(Event::typed(
                HANDLE_USER_FILES,
                &self.base.id,
                FlowValue::json(self.attachment_list("files")),
            ))
            .await;
        let _ = emit
            .send(Event::typed(
                HANDLE_USER_IMAGES,
                &self.base.id,
                FlowValue::json(self.attachment_list("images")),
            ))
            .await;
        let _ = emit
            .send(Event::end(
                &self.base.id,
                FlowValue::json(json!({
                    "message": message,
                    "chat_id": chat_log.chat_id,
                    "thread_id": chat_log.thread_id,
                })),
            ))
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ClientRegistry;
    use crate::node::invoke;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn emits_three_typed_outputs_and_end() {
        let (tx, _rx) = mpsc::channel(8);
        let ctx = InvokeContext::new(tx, Arc::new(ClientRegistry::with_defaults()));
        let mut config = Map::new();
        config.insert("message".to_string(), json!("Hi"));
        config.insert("files".to_string(), json!(["report.pdf"]));
        let mut node: Box<dyn FlowNode> = Box::new(UserInputNode::new("in", config));

        let outcome = invoke(&mut node, &ctx).await;
        let types: Vec<&str> = outcome
            .events
            .iter()
            .map(|e| e.source_type.as_str())
            .collect();
        assert_eq!(
            types,
            vec![
                HANDLE_USER_MESSAGE,
                HANDLE_USER_FILES,
                HANDLE_USER_IMAGES,
                "end"
            ]
        );
        assert_eq!(outcome.events[0].payload.value.as_str(), Some("Hi"));
        assert_eq!(
            outcome.events[1].payload.value.as_json(),
            Some(&json!(["report.pdf"]))
        );

        // The entry node assigned the chat log for this execution.
        assert!(ctx.chat_log().is_some());
    }
}
