//! Template parser node.
//!
//! Renders a configured template against the node's inputs and emits the
//! result on the terminal output. The merge strategy for the render
//! context follows the node configuration (`merge: "flat" | "namespaced"`,
//! namespaced by default so input keys address their own values).

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::error::Result;
use crate::event::Event;
use crate::template;
use crate::value::FlowValue;

use super::{EventSender, FlowNode, InvokeContext, NodeBase};

pub struct ParserNode {
    base: NodeBase,
}

impl ParserNode {
    pub fn new(id: impl Into<String>, config: Map<String, Value>) -> Self {
        Self {
            base: NodeBase::new(id, "parser", config),
        }
    }
}

#[async_trait]
impl FlowNode for ParserNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    async fn run(&mut self, _ctx: &InvokeContext, emit: EventSender) -> Result<()> {
        let template_src = self.base.require_config_str("template")?.to_string();
        let context = match self.base.config_str("merge") {
            Some("flat") => template::flat_context(&self.base.inputs),
            _ => template::namespaced_context(&self.base.inputs),
        };
        let rendered = template::render(&template_src, &context)?;

        self.base.internal = Some(json!({"rendered_length": rendered.len()}));
        let _ = emit
            .send(Event::end(&self.base.id, FlowValue::text(rendered)))
            .await;
        Ok(())
    }
}
