//! Final message delivery node.
//!
//! Takes an assembled message and streams it to the caller as a content
//! chunk, attaching any sideband extras payload (citations, structured
//! data) to the chunk's `extras` field and re-publishing it on the
//! dedicated output handle.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::event::Event;
use crate::output::ChatChunk;
use crate::value::FlowValue;

use super::{EventSender, FlowNode, InvokeContext, NodeBase};

/// Input/output handle for sideband extras.
pub const HANDLE_SEND_EXTRA: &str = "handle_send_extra";

pub struct SendMessageNode {
    base: NodeBase,
}

impl SendMessageNode {
    pub fn new(id: impl Into<String>, config: Map<String, Value>) -> Self {
        Self {
            base: NodeBase::new(id, "send_message", config),
        }
    }

    fn model(&self) -> String {
        self.base
            .config_str("model")
            .unwrap_or("agentflow")
            .to_string()
    }
}

#[async_trait]
impl FlowNode for SendMessageNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    async fn run(&mut self, _ctx: &InvokeContext, emit: EventSender) -> Result<()> {
        let message = self
            .base
            .input("message")
            .or_else(|| self.base.inputs.first())
            .ok_or_else(|| crate::error::FlowError::input(&self.base.id, "message"))?
            .display_text();
        let extras = self
            .base
            .input(HANDLE_SEND_EXTRA)
            .map(|v| v.snapshot())
            .or_else(|| self.base.input("extra").map(|v| v.snapshot()));

        let mut chunk = ChatChunk::text_chunk(self.model(), message.clone());
        if let Some(extras_value) = extras.clone() {
            chunk = chunk.with_extras(extras_value);
        }
        let _ = emit
            .send(Event::content(
                &self.base.id,
                FlowValue::json(serde_json::to_value(&chunk)?),
            ))
            .await;

        if let Some(extras_value) = extras {
            let _ = emit
                .send(Event::typed(
                    HANDLE_SEND_EXTRA,
                    &self.base.id,
                    FlowValue::json(extras_value),
                ))
                .await;
        }
        let _ = emit
            .send(Event::end(&self.base.id, FlowValue::text(message)))
            .await;
        Ok(())
    }
}
