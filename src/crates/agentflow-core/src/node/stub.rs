//! Fallback node for unknown type tags.
//!
//! Compilation never fails on an unrecognized node type: the stub emits a
//! no-op terminal event so downstream routing continues, and raises a
//! configuration error that surfaces on the debug stream.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{FlowError, Result};
use crate::event::Event;
use crate::value::FlowValue;

use super::{EventSender, FlowNode, InvokeContext, NodeBase};

pub struct StubNode {
    base: NodeBase,
    unknown_type: String,
}

impl StubNode {
    pub fn new(
        id: impl Into<String>,
        unknown_type: impl Into<String>,
        config: Map<String, Value>,
    ) -> Self {
        let unknown_type = unknown_type.into();
        Self {
            base: NodeBase::new(id, unknown_type.clone(), config),
            unknown_type,
        }
    }
}

#[async_trait]
impl FlowNode for StubNode {
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
        Err(FlowError::config(
            &self.base.id,
            format!("unknown node type '{}'", self.unknown_type),
        ))
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
    async fn emits_end_and_reports_the_unknown_type() {
        let (tx, _rx) = mpsc::channel(8);
        let ctx = InvokeContext::new(tx, Arc::new(ClientRegistry::with_defaults()));
        let mut node: Box<dyn FlowNode> = Box::new(StubNode::new("x", "frobnicate", Map::new()));

        let outcome = invoke(&mut node, &ctx).await;
        // Execution continues: the end event routed even though the error
        // is reported.
        assert_eq!(outcome.events.len(), 1);
        assert!(outcome.events[0].is_terminal());
        let err = outcome.error.unwrap();
        assert_eq!(err.kind(), "config");
        assert!(err.to_string().contains("frobnicate"));
    }
}
