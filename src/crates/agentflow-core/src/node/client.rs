//! Client provider node.
//!
//! Builds an LLM client from the provider registry and publishes the
//! shared handle on its terminal output. Built once per execution (no
//! `iterate`): downstream `llm` nodes inside a loop re-use the same
//! client across iterations.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::event::Event;
use crate::value::FlowValue;

use super::{EventSender, FlowNode, InvokeContext, NodeBase};

pub struct ClientNode {
    base: NodeBase,
}

impl ClientNode {
    pub fn new(id: impl Into<String>, config: Map<String, Value>) -> Self {
        Self {
            base: NodeBase::new(id, "client", config),
        }
    }
}

#[async_trait]
impl FlowNode for ClientNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    async fn run(&mut self, ctx: &InvokeContext, emit: EventSender) -> Result<()> {
        let provider = self.base.require_config_str("provider")?;
        let client = ctx.registry.build(provider, &self.base.config)?;
        let _ = emit
            .send(Event::end(&self.base.id, FlowValue::Client(client)))
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ClientRegistry;
    use crate::node::invoke;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn ctx() -> InvokeContext {
        let (tx, _rx) = mpsc::channel(8);
        InvokeContext::new(tx, Arc::new(ClientRegistry::with_defaults()))
    }

    #[tokio::test]
    async fn builds_the_fake_provider() {
        let mut config = Map::new();
        config.insert("provider".to_string(), json!("fake"));
        let mut node: Box<dyn FlowNode> = Box::new(ClientNode::new("c", config));

        let outcome = invoke(&mut node, &ctx()).await;
        assert!(outcome.error.is_none());
        assert!(outcome.events[0].payload.value.as_client().is_some());
    }

    #[tokio::test]
    async fn unknown_provider_surfaces_as_config_error() {
        let mut config = Map::new();
        config.insert("provider".to_string(), json!("not-registered"));
        let mut node: Box<dyn FlowNode> = Box::new(ClientNode::new("c", config));

        let outcome = invoke(&mut node, &ctx()).await;
        assert_eq!(outcome.error.unwrap().kind(), "config");
        assert!(outcome.events.is_empty());
    }
}
