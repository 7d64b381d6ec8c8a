//! Nested graph host node.
//!
//! An `inner` node owns a sub-graph compiled once at build time from its
//! `magic_flow` spec and re-used per invocation of the host. On execution
//! it forwards its input message into the nested entry node, drives the
//! nested graph with a fresh executor, and re-emits the nested content
//! stream as its own - so the caller sees the nested chunks inline -
//! while aggregating them into the `execution_content` output and
//! collecting sideband extras into `execution_extras`. Inners nest
//! arbitrarily.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;

use crate::error::{FlowError, Result};
use crate::event::Event;
use crate::exec::{drive_graph, ExecuteOptions};
use crate::graph::Graph;
use crate::output::OutputMessage;
use crate::value::FlowValue;

use super::{EventSender, FlowNode, InvokeContext, NodeBase};

/// Output handle carrying the aggregated nested content.
pub const EXECUTION_CONTENT: &str = "execution_content";
/// Output handle carrying collected sideband extras.
pub const EXECUTION_EXTRAS: &str = "execution_extras";

pub struct InnerNode {
    base: NodeBase,
    nested: Option<Graph>,
}

impl InnerNode {
    pub fn new(
        id: impl Into<String>,
        config: Map<String, Value>,
        nested: Option<Graph>,
    ) -> Self {
        Self {
            base: NodeBase::new(id, "inner", config),
            nested,
        }
    }
}

#[async_trait]
impl FlowNode for InnerNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    async fn run(&mut self, ctx: &InvokeContext, emit: EventSender) -> Result<()> {
        let message = self
            .base
            .input("message")
            .or_else(|| self.base.inputs.first())
            .ok_or_else(|| FlowError::input(&self.base.id, "message"))?
            .display_text();
        let nested = self
            .nested
            .as_mut()
            .ok_or_else(|| FlowError::config(&self.base.id, "inner node without magic_flow"))?;

        // Re-seed the nested entry with the forwarded message; the graph
        // was compiled once and may be on a repeat run.
        nested.reset_runtime();
        let master = nested.master.clone();
        if let Some(entry) = nested.node_mut(&master) {
            entry
                .base_mut()
                .config
                .insert("message".to_string(), json!(message));
        }

        let mut opts = ExecuteOptions::default()
            .with_cancel(ctx.cancel.child_token())
            .with_registry(ctx.registry.clone());
        // The nested run continues this execution's conversation.
        if let Some(chat) = ctx.chat_log() {
            opts = opts.with_chat(chat.clone());
        }

        let (tx, mut rx) = mpsc::channel::<OutputMessage>(32);
        let mut content = String::new();
        let mut extras: Vec<Value> = Vec::new();
        {
            let run_fut = drive_graph(nested, tx, opts);
            tokio::pin!(run_fut);
            let mut finished = false;
            loop {
                tokio::select! {
                    _ = &mut run_fut, if !finished => {
                        finished = true;
                    }
                    message = rx.recv() => match message {
                        Some(OutputMessage::Content(chunk)) => {
                            if let Some(text) = chunk.text() {
                                content.push_str(text);
                            }
                            if let Some(extra) = &chunk.extras {
                                extras.push(extra.clone());
                            }
                            // The nested stream surfaces on the host graph.
                            let _ = emit
                                .send(Event::content(
                                    &self.base.id,
                                    FlowValue::json(serde_json::to_value(&chunk)?),
                                ))
                                .await;
                        }
                        Some(OutputMessage::Debug(record)) => {
                            let _ = ctx.out.send(OutputMessage::Debug(record)).await;
                        }
                        // One summary per execution: the host's.
                        Some(OutputMessage::DebugSummary(_)) => {}
                        None => break,
                    }
                }
            }
        }

        self.base.internal = Some(json!({
            "nested_graph": self.nested.as_ref().map(|g| g.name.clone()),
            "content_length": content.len(),
        }));

        let _ = emit
            .send(Event::typed(
                EXECUTION_CONTENT,
                &self.base.id,
                FlowValue::text(content.clone()),
            ))
            .await;
        if !extras.is_empty() {
            let _ = emit
                .send(Event::typed(
                    EXECUTION_EXTRAS,
                    &self.base.id,
                    FlowValue::json(Value::Array(extras)),
                ))
                .await;
        }
        let _ = emit
            .send(Event::end(&self.base.id, FlowValue::text(content)))
            .await;
        Ok(())
    }
}
