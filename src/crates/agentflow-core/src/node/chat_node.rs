//! Chat assembly node.
//!
//! Builds the [`Chat`] container handed to the LLM: configured history,
//! then the `system` input as a system turn, then the current user turn
//! (the `user` input, falling back to the message the compiler seeded into
//! the configuration).

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::event::Event;
use crate::llm::{Chat, ChatMessage};
use crate::value::FlowValue;

use super::{EventSender, FlowNode, InvokeContext, NodeBase};

/// Input handle carrying the system prompt.
pub const HANDLE_SYSTEM: &str = "system";
/// Input handle carrying the user turn.
pub const HANDLE_USER: &str = "user";

pub struct ChatNode {
    base: NodeBase,
}

impl ChatNode {
    pub fn new(id: impl Into<String>, config: Map<String, Value>) -> Self {
        Self {
            base: NodeBase::new(id, "chat", config),
        }
    }

    fn history(&self) -> Vec<ChatMessage> {
        self.base
            .config
            .get("history")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }
}

#[async_trait]
impl FlowNode for ChatNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    async fn run(&mut self, _ctx: &InvokeContext, emit: EventSender) -> Result<()> {
        let mut chat = Chat {
            messages: self.history(),
        };

        if let Some(system) = self.base.input(HANDLE_SYSTEM) {
            chat.prepend_system(system.display_text());
        }

        let user_turn = self
            .base
            .input(HANDLE_USER)
            .map(|v| v.display_text())
            .or_else(|| self.base.config_str("message").map(str::to_string));
        match user_turn {
            Some(turn) => chat.push(crate::llm::Role::User, turn),
            None => return Err(crate::error::FlowError::input(&self.base.id, HANDLE_USER)),
        }

        let _ = emit
            .send(Event::end(&self.base.id, FlowValue::json(chat.to_value())))
            .await;
        Ok(())
    }
}
