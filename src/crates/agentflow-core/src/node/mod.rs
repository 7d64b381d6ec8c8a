//! Node runtime protocol
//!
//! Every node conforms to one lifecycle contract: configured at
//! construction, inputs bound by the executor, one invocation producing a
//! finite async sequence of events, result cached for re-use, debug state
//! exposed on demand.
//!
//! The async-generator contract is rendered as a task pushing into a
//! bounded channel: [`FlowNode::run`] receives an [`EventSender`] and
//! yields by sending. The runtime wrapper ([`invoke`]) drives the run
//! future and drains the channel concurrently, forwarding `content`
//! events to the caller's stream the moment they arrive, so a streaming
//! LLM node reaches the user without waiting for its own completion.
//!
//! Caching: a second invocation returns the cached terminal event without
//! re-executing. Nodes flagged `iterate` (in their `data` map) opt out, so
//! a loop-scoped node re-runs per list item.

mod chat_node;
mod client;
mod conditional;
mod end;
mod fetch;
mod inner;
mod llm_node;
mod loop_node;
mod parser;
mod send_message;
mod sink;
mod stub;
mod text;
mod user_input;

pub use chat_node::{ChatNode, HANDLE_SYSTEM, HANDLE_USER};
pub use client::ClientNode;
pub use conditional::ConditionalNode;
pub use end::EndNode;
pub use fetch::FetchNode;
pub use inner::{InnerNode, EXECUTION_CONTENT, EXECUTION_EXTRAS};
pub use llm_node::{LlmNode, HANDLE_CHAT, HANDLE_CLIENT, HANDLE_SYSTEM_CONTEXT};
pub use loop_node::{LoopNode, HANDLE_LIST, HANDLE_LIST_ALT, HANDLE_LOOP, HANDLE_LOOP_ALT};
pub use parser::ParserNode;
pub use send_message::{SendMessageNode, HANDLE_SEND_EXTRA};
pub use sink::SinkNode;
pub use stub::StubNode;
pub use text::TextNode;
pub use user_input::{UserInputNode, HANDLE_USER_FILES, HANDLE_USER_IMAGES, HANDLE_USER_MESSAGE};

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::chatlog::ChatLog;
use crate::debug::NodeDebugState;
use crate::error::{FlowError, Result};
use crate::event::Event;
use crate::llm::ClientRegistry;
use crate::output::{ChatChunk, OutputMessage};
use crate::value::FlowValue;

/// Channel half a node yields events into.
pub type EventSender = mpsc::Sender<Event>;

/// Small ordered map for node inputs and outputs.
///
/// Insertion order is significant: the flat merge strategy resolves key
/// collisions by arrival order, and debug snapshots list keys the way they
/// arrived. A second arrival on the same key overwrites in place.
#[derive(Debug, Clone, Default)]
pub struct InputMap {
    entries: Vec<(String, FlowValue)>,
}

impl InputMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a value, overwriting in place if the key is present.
    pub fn bind(&mut self, key: impl Into<String>, value: FlowValue) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&FlowValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FlowValue)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Remove and return a bound value.
    pub fn remove(&mut self, key: &str) -> Option<FlowValue> {
        let position = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(position).1)
    }

    /// JSON snapshot for debug capture.
    pub fn snapshot(&self) -> Map<String, Value> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.snapshot()))
            .collect()
    }

    /// First bound value, if any. Pass-through nodes use this when no
    /// well-known key matched.
    pub fn first(&self) -> Option<&FlowValue> {
        self.entries.first().map(|(_, v)| v)
    }
}

/// State shared by every node implementation.
#[derive(Debug)]
pub struct NodeBase {
    pub id: String,
    pub type_tag: String,
    /// Frozen configuration from the spec's `data` field.
    pub config: Map<String, Value>,
    pub inputs: InputMap,
    pub outputs: InputMap,
    /// Cached terminal event from the last invocation.
    pub cached: Option<Event>,
    pub bypassed: bool,
    /// Disables caching so the node re-runs per loop iteration.
    pub iterate: bool,
    /// Opt-in internal-variable snapshot for debug capture.
    pub internal: Option<Value>,
    /// Incoming handle rebind map from `data.handles`.
    handles: HashMap<String, String>,
}

impl NodeBase {
    pub fn new(id: impl Into<String>, type_tag: impl Into<String>, config: Map<String, Value>) -> Self {
        let iterate = config
            .get("iterate")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let handles = config
            .get("handles")
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            id: id.into(),
            type_tag: type_tag.into(),
            config,
            inputs: InputMap::new(),
            outputs: InputMap::new(),
            cached: None,
            bypassed: false,
            iterate,
            internal: None,
            handles,
        }
    }

    /// Resolve an incoming handle through the rebind map.
    pub fn rebound<'a>(&'a self, key: &'a str) -> &'a str {
        self.handles.get(key).map(String::as_str).unwrap_or(key)
    }

    /// Bind an input under its (possibly rebound) key.
    pub fn bind_input(&mut self, key: &str, value: FlowValue) {
        let key = self.rebound(key).to_string();
        self.inputs.bind(key, value);
    }

    pub fn has_input(&self, key: &str) -> bool {
        self.inputs.contains(self.rebound(key))
    }

    pub fn input(&self, key: &str) -> Option<&FlowValue> {
        self.inputs.get(self.rebound(key))
    }

    /// Fetch a required input or raise the corresponding error.
    pub fn require_input(&self, key: &str) -> Result<&FlowValue> {
        self.input(key)
            .ok_or_else(|| FlowError::input(&self.id, key))
    }

    /// String-valued configuration accessor.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }

    /// A required string configuration entry.
    pub fn require_config_str(&self, key: &str) -> Result<&str> {
        self.config_str(key)
            .ok_or_else(|| FlowError::config(&self.id, format!("missing '{}'", key)))
    }

    pub fn record_output(&mut self, source_type: &str, value: FlowValue) {
        self.outputs.bind(source_type, value);
    }

    /// Reset for the next loop iteration: cached result and outputs go,
    /// inputs stay (the loop rebinds the item).
    pub fn reset_iteration(&mut self) {
        self.cached = None;
        self.outputs.clear();
        self.internal = None;
    }

    /// Full reset for re-driving a nested graph.
    pub fn reset_runtime(&mut self) {
        self.reset_iteration();
        self.inputs.clear();
        self.bypassed = false;
    }

    /// Capture debug state.
    pub fn debug_state(&self, was_executed: bool, elapsed_ms: u64) -> NodeDebugState {
        NodeDebugState {
            inputs: self.inputs.snapshot(),
            outputs: self.outputs.snapshot(),
            internal_variables: self.internal.clone(),
            was_executed,
            was_bypassed: self.bypassed,
            elapsed_ms,
        }
    }
}

/// Per-execution context handed to every node invocation.
#[derive(Clone)]
pub struct InvokeContext {
    /// Chat log, assigned once by the master entry node.
    pub chat: Arc<OnceLock<ChatLog>>,
    /// Cancellation token; nodes propagate it into transport calls.
    pub cancel: CancellationToken,
    /// Caller-facing output stream.
    pub out: mpsc::Sender<OutputMessage>,
    /// Client provider registry for `client` nodes.
    pub registry: Arc<ClientRegistry>,
}

impl InvokeContext {
    pub fn new(out: mpsc::Sender<OutputMessage>, registry: Arc<ClientRegistry>) -> Self {
        Self {
            chat: Arc::new(OnceLock::new()),
            cancel: CancellationToken::new(),
            out,
            registry,
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_chat(self, chat: ChatLog) -> Self {
        let _ = self.chat.set(chat);
        self
    }

    /// The chat log, once the entry node has assigned it.
    pub fn chat_log(&self) -> Option<&ChatLog> {
        self.chat.get()
    }

    /// Assign the chat log if unset; returns the effective record.
    pub fn assign_chat_log(&self) -> &ChatLog {
        self.chat.get_or_init(ChatLog::new)
    }
}

/// The node lifecycle contract.
#[async_trait]
pub trait FlowNode: Send {
    fn base(&self) -> &NodeBase;
    fn base_mut(&mut self) -> &mut NodeBase;

    /// Produce this invocation's event sequence by sending into `emit`.
    ///
    /// An error return is captured by the runtime wrapper and converted
    /// into a debug record; events already sent still route.
    async fn run(&mut self, ctx: &InvokeContext, emit: EventSender) -> Result<()>;

    /// True for nodes that select exactly one outgoing branch, which makes
    /// the executor bypass the unselected edges after execution.
    fn routes_exclusively(&self) -> bool {
        false
    }

    fn id(&self) -> &str {
        &self.base().id
    }

    fn type_tag(&self) -> &str {
        &self.base().type_tag
    }

    fn iterate(&self) -> bool {
        self.base().iterate
    }

    fn mark_bypassed(&mut self) {
        self.base_mut().bypassed = true;
    }
}

/// Result of one node invocation.
pub struct InvokeOutcome {
    /// Events in production order (content events were already forwarded).
    pub events: Vec<Event>,
    /// Error captured from the run, if any.
    pub error: Option<FlowError>,
    pub elapsed_ms: u64,
    /// True when the cached terminal event was replayed.
    pub from_cache: bool,
}

/// Drive one node invocation: run the node, drain its event channel,
/// forward content to the caller, record outputs, cache the terminal
/// event.
pub async fn invoke(node: &mut Box<dyn FlowNode>, ctx: &InvokeContext) -> InvokeOutcome {
    let started = Instant::now();

    if !node.iterate() {
        if let Some(cached) = node.base().cached.clone() {
            return InvokeOutcome {
                events: vec![cached],
                error: None,
                elapsed_ms: 0,
                from_cache: true,
            };
        }
    }

    let (tx, mut rx) = mpsc::channel::<Event>(16);
    let mut events: Vec<Event> = Vec::new();
    let mut error = None;
    {
        let cancel = ctx.cancel.clone();
        let run_fut = node.run(ctx, tx);
        tokio::pin!(run_fut);
        let mut done: Option<Result<()>> = None;
        loop {
            tokio::select! {
                _ = cancel.cancelled(), if done.is_none() => {
                    error = Some(FlowError::Cancelled);
                    break;
                }
                res = &mut run_fut, if done.is_none() => {
                    done = Some(res);
                }
                maybe_event = rx.recv() => match maybe_event {
                    Some(event) => {
                        if event.is_content() {
                            let chunk = ChatChunk::from_flow_value(&event.payload.value);
                            let _ = ctx.out.send(OutputMessage::Content(chunk)).await;
                        }
                        events.push(event);
                    }
                    None => break,
                }
            }
        }
        if let Some(Err(e)) = done {
            error = Some(e);
        }
    }

    for event in &events {
        node.base_mut()
            .record_output(&event.source_type, event.payload.value.clone());
    }
    if let Some(last) = events.iter().rev().find(|e| e.is_terminal()) {
        node.base_mut().cached = Some(last.clone());
    }

    InvokeOutcome {
        events,
        error,
        elapsed_ms: started.elapsed().as_millis() as u64,
        from_cache: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct CountingNode {
        base: NodeBase,
        runs: usize,
    }

    #[async_trait]
    impl FlowNode for CountingNode {
        fn base(&self) -> &NodeBase {
            &self.base
        }
        fn base_mut(&mut self) -> &mut NodeBase {
            &mut self.base
        }
        async fn run(&mut self, _ctx: &InvokeContext, emit: EventSender) -> Result<()> {
            self.runs += 1;
            let _ = emit
                .send(Event::content(&self.base.id, FlowValue::text("chunk")))
                .await;
            let _ = emit
                .send(Event::end(
                    &self.base.id,
                    FlowValue::json(json!(self.runs)),
                ))
                .await;
            Ok(())
        }
    }

    fn ctx() -> (InvokeContext, mpsc::Receiver<OutputMessage>) {
        let (tx, rx) = mpsc::channel(16);
        (
            InvokeContext::new(tx, Arc::new(ClientRegistry::with_defaults())),
            rx,
        )
    }

    #[tokio::test]
    async fn content_is_forwarded_and_terminal_cached() {
        let (ctx, mut rx) = ctx();
        let mut node: Box<dyn FlowNode> = Box::new(CountingNode {
            base: NodeBase::new("n", "test", Map::new()),
            runs: 0,
        });

        let outcome = invoke(&mut node, &ctx).await;
        assert!(outcome.error.is_none());
        assert_eq!(outcome.events.len(), 2);
        assert!(node.base().cached.is_some());
        assert_eq!(
            node.base().outputs.get("end").unwrap().as_json(),
            Some(&json!(1))
        );

        let forwarded = rx.recv().await.unwrap();
        assert_eq!(forwarded.content_text(), Some("chunk"));
    }

    #[tokio::test]
    async fn second_invocation_replays_cache() {
        let (ctx, _rx) = ctx();
        let mut node: Box<dyn FlowNode> = Box::new(CountingNode {
            base: NodeBase::new("n", "test", Map::new()),
            runs: 0,
        });

        invoke(&mut node, &ctx).await;
        let outcome = invoke(&mut node, &ctx).await;
        assert!(outcome.from_cache);
        assert_eq!(outcome.events.len(), 1);
        // Run body did not execute again.
        assert_eq!(
            node.base().outputs.get("end").unwrap().as_json(),
            Some(&json!(1))
        );
    }

    #[tokio::test]
    async fn iterate_nodes_rerun() {
        let (ctx, _rx) = ctx();
        let mut config = Map::new();
        config.insert("iterate".to_string(), json!(true));
        let mut node: Box<dyn FlowNode> = Box::new(CountingNode {
            base: NodeBase::new("n", "test", config),
            runs: 0,
        });

        invoke(&mut node, &ctx).await;
        let outcome = invoke(&mut node, &ctx).await;
        assert!(!outcome.from_cache);
        assert_eq!(
            node.base().outputs.get("end").unwrap().as_json(),
            Some(&json!(2))
        );
    }

    #[test]
    fn rebind_map_renames_incoming_handles() {
        let mut config = Map::new();
        config.insert("handles".to_string(), json!({"outer": "inner"}));
        let mut base = NodeBase::new("n", "test", config);
        base.bind_input("outer", FlowValue::text("v"));
        assert!(base.has_input("outer"));
        assert!(base.inputs.contains("inner"));
        assert_eq!(base.input("outer").unwrap().as_str(), Some("v"));
    }

    #[test]
    fn input_map_overwrites_in_place() {
        let mut map = InputMap::new();
        map.bind("a", FlowValue::text("1"));
        map.bind("b", FlowValue::text("2"));
        map.bind("a", FlowValue::text("3"));
        assert_eq!(map.len(), 2);
        assert_eq!(map.keys(), vec!["a", "b"]);
        assert_eq!(map.get("a").unwrap().as_str(), Some("3"));
    }
}
