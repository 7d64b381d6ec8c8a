//! Static text node: emits its configured text on the terminal output.

use async_trait::async_trait;
use serde_json::Map;

use crate::error::Result;
use crate::event::Event;
use crate::value::FlowValue;

use super::{EventSender, FlowNode, InvokeContext, NodeBase};

pub struct TextNode {
    base: NodeBase,
}

impl TextNode {
    pub fn new(id: impl Into<String>, config: Map<String, serde_json::Value>) -> Self {
        Self {
            base: NodeBase::new(id, "text", config),
        }
    }
}

#[async_trait]
impl FlowNode for TextNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    async fn run(&mut self, _ctx: &InvokeContext, emit: EventSender) -> Result<()> {
        let text = self.base.require_config_str("text")?.to_string();
        let _ = emit
            .send(Event::end(&self.base.id, FlowValue::text(text)))
            .await;
        Ok(())
    }
}
