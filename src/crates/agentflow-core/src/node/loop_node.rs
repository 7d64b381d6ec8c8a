//! Loop expansion node.
//!
//! The scheduler intercepts nodes of this type and delegates to the loop
//! executor, which replays the iteration subgraph once per list element
//! and then drives the aggregation subgraph with the collected results
//! (see `exec::loop_exec`). The node itself holds the configuration and
//! the list/feedback input contract.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{FlowError, Result};
use crate::event::Event;
use crate::value::FlowValue;

use super::{EventSender, FlowNode, InvokeContext, NodeBase};

/// Primary input key carrying the list to iterate.
pub const HANDLE_LIST: &str = "list";
/// Alternate spelling used by visual editors.
pub const HANDLE_LIST_ALT: &str = "handle_list";
/// Feedback input key collecting per-iteration results.
pub const HANDLE_LOOP: &str = "loop";
/// Alternate spelling used by visual editors.
pub const HANDLE_LOOP_ALT: &str = "handle_loop";

pub struct LoopNode {
    base: NodeBase,
}

impl LoopNode {
    pub fn new(id: impl Into<String>, config: Map<String, Value>) -> Self {
        Self {
            base: NodeBase::new(id, "loop", config),
        }
    }

    /// Parse the list input off a loop node's base state. Accepts a JSON
    /// array directly or a JSON string that parses to one.
    pub fn parse_list(base: &NodeBase) -> Result<Vec<Value>> {
        let value = base
            .input(HANDLE_LIST)
            .or_else(|| base.input(HANDLE_LIST_ALT))
            .ok_or_else(|| FlowError::input(&base.id, HANDLE_LIST))?;
        let json = value
            .as_json()
            .ok_or_else(|| FlowError::Data("list input is not JSON".to_string()))?;
        let parsed = match json {
            Value::String(s) => serde_json::from_str::<Value>(s)
                .map_err(|e| FlowError::Data(format!("list input is not valid JSON: {}", e)))?,
            other => other.clone(),
        };
        match parsed {
            Value::Array(items) => Ok(items),
            other => Err(FlowError::Data(format!(
                "loop input is not list-shaped: {}",
                kind_name(&other)
            ))),
        }
    }

    /// Take the per-iteration feedback value bound since the last call.
    pub fn take_feedback(base: &mut NodeBase) -> Option<FlowValue> {
        let key = if base.has_input(HANDLE_LOOP) {
            HANDLE_LOOP
        } else if base.has_input(HANDLE_LOOP_ALT) {
            HANDLE_LOOP_ALT
        } else {
            return None;
        };
        // Remove so the next iteration's arrival is observable.
        let resolved = base.rebound(key).to_string();
        base.inputs.remove(&resolved)
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[async_trait]
impl FlowNode for LoopNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    /// Fallback when the node runs outside the loop executor: emit the
    /// parsed list unchanged.
    async fn run(&mut self, _ctx: &InvokeContext, emit: EventSender) -> Result<()> {
        let items = Self::parse_list(&self.base)?;
        let _ = emit
            .send(Event::end(&self.base.id, FlowValue::json(Value::Array(items))))
            .await;
        Ok(())
    }
}
