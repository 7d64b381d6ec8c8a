//! Conditional branch node.
//!
//! Evaluates a user-supplied template over its merged inputs; the rendered
//! string names the outgoing source type to follow. The executor bypasses
//! every other outgoing edge once the selection event lands. The terminal
//! event carries the selection metadata and never participates in bypass.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::error::Result;
use crate::event::Event;
use crate::template;
use crate::value::FlowValue;

use super::{EventSender, FlowNode, InvokeContext, NodeBase};

pub struct ConditionalNode {
    base: NodeBase,
}

impl ConditionalNode {
    pub fn new(id: impl Into<String>, config: Map<String, Value>) -> Self {
        Self {
            base: NodeBase::new(id, "conditional", config),
        }
    }
}

#[async_trait]
impl FlowNode for ConditionalNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn routes_exclusively(&self) -> bool {
        true
    }

    async fn run(&mut self, _ctx: &InvokeContext, emit: EventSender) -> Result<()> {
        let condition = self.base.require_config_str("condition")?.to_string();
        let context = match self.base.config_str("merge") {
            Some("namespaced") => template::namespaced_context(&self.base.inputs),
            // Flat is the default: conditions address top-level keys of
            // their inputs directly.
            _ => template::flat_context(&self.base.inputs),
        };
        let selected = template::render(&condition, &context)?.trim().to_string();

        self.base.internal = Some(json!({
            "selected": selected,
            "context_keys": self.base.inputs.keys(),
        }));

        let _ = emit
            .send(Event::typed(
                selected.clone(),
                &self.base.id,
                FlowValue::json(context.into_json()),
            ))
            .await;
        let _ = emit
            .send(Event::end(
                &self.base.id,
                FlowValue::json(json!({"selected": selected})),
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

    fn ctx() -> InvokeContext {
        let (tx, _rx) = mpsc::channel(8);
        InvokeContext::new(tx, Arc::new(ClientRegistry::with_defaults()))
    }

    #[tokio::test]
    async fn selection_event_precedes_end_metadata() {
        let mut config = Map::new();
        config.insert(
            "condition".to_string(),
            json!("{% if age >= 18 %}adult{% else %}minor{% endif %}"),
        );
        let mut node = ConditionalNode::new("cond", config);
        node.base_mut()
            .bind_input("data", FlowValue::text(r#"{"age": 16}"#));
        let mut node: Box<dyn FlowNode> = Box::new(node);

        let outcome = invoke(&mut node, &ctx()).await;
        assert!(outcome.error.is_none());
        assert_eq!(outcome.events[0].source_type, "minor");
        assert!(outcome.events[1].is_terminal());
        assert_eq!(
            outcome.events[1].payload.value.as_json().unwrap()["selected"],
            "minor"
        );
    }

    #[tokio::test]
    async fn missing_condition_is_a_config_error() {
        let mut node: Box<dyn FlowNode> = Box::new(ConditionalNode::new("cond", Map::new()));
        let outcome = invoke(&mut node, &ctx()).await;
        assert_eq!(outcome.error.unwrap().kind(), "config");
    }
}
