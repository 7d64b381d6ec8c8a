//! Terminal node: passes its input through as the graph's result.
//!
//! Multiple `end` nodes are permitted; branching flows terminate
//! independently.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::event::Event;
use crate::value::FlowValue;

use super::{EventSender, FlowNode, InvokeContext, NodeBase};

pub struct EndNode {
    base: NodeBase,
}

impl EndNode {
    pub fn new(id: impl Into<String>, config: Map<String, Value>) -> Self {
        Self {
            base: NodeBase::new(id, "end", config),
        }
    }
}

#[async_trait]
impl FlowNode for EndNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    async fn run(&mut self, _ctx: &InvokeContext, emit: EventSender) -> Result<()> {
        let value = self
            .base
            .input("message")
            .or_else(|| self.base.inputs.first())
            .cloned()
            .unwrap_or(FlowValue::Json(Value::Null));
        let _ = emit.send(Event::end(&self.base.id, value)).await;
        Ok(())
    }
}
