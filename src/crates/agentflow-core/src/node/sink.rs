//! The auto-inserted sink node.
//!
//! Every edge compiled without a target handle is rewritten to point here
//! under the reserved `void` key. The sink absorbs whatever arrives and
//! completes silently.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::event::Event;
use crate::value::FlowValue;

use super::{EventSender, FlowNode, InvokeContext, NodeBase};

pub struct SinkNode {
    base: NodeBase,
}

impl SinkNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            base: NodeBase::new(id, "void", Map::new()),
        }
    }
}

#[async_trait]
impl FlowNode for SinkNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    async fn run(&mut self, _ctx: &InvokeContext, emit: EventSender) -> Result<()> {
        let _ = emit
            .send(Event::end(&self.base.id, FlowValue::Json(Value::Null)))
            .await;
        Ok(())
    }
}
