//! The linear ready-queue scheduler.
//!
//! State per execution: a node-state map (unset / executed / bypassed),
//! the edge bypass bits, the per-node set of produced source types, and
//! `pending`, the edge worklist. Each pass over the worklist processes
//! every edge whose source has executed, executes sources whose
//! dependencies are satisfied, and retires bypassed edges. A pass that
//! moves nothing triggers the ready-node fallback scan (merge targets
//! whose edges were consumed out of order); if that also finds nothing,
//! the scheduler reports a deadlock and stops.
//!
//! Ordering: events from one source route downstream in production order;
//! `content` events are forwarded to the caller the moment their producer
//! yields them; nothing is guaranteed across independent branches.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::chatlog::ChatLog;
use crate::debug::{DebugCallback, DebugEvent, DebugPipeline, ExecutionSummary};
use crate::error::FlowError;
use crate::event::{is_terminal_type, source_types_match, Event};
use crate::graph::{Graph, NodeId};
use crate::llm::ClientRegistry;
use crate::node::{self, InvokeContext, InvokeOutcome};
use crate::output::OutputMessage;
use crate::value::FlowValue;

/// Execution wiring: cancellation, client providers, debug callback, and
/// an optional pre-assigned chat log (used when a nested graph continues
/// its host's conversation).
#[derive(Clone)]
pub struct ExecuteOptions {
    pub cancel: CancellationToken,
    pub registry: Arc<ClientRegistry>,
    pub callback: Option<DebugCallback>,
    pub chat: Option<ChatLog>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            cancel: CancellationToken::new(),
            registry: Arc::new(ClientRegistry::with_defaults()),
            callback: None,
            chat: None,
        }
    }
}

impl ExecuteOptions {
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_registry(mut self, registry: Arc<ClientRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_callback(mut self, callback: DebugCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn with_chat(mut self, chat: ChatLog) -> Self {
        self.chat = Some(chat);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeState {
    Unset,
    Executed,
    Bypassed,
}

pub(crate) struct Scheduler<'g> {
    pub(crate) graph: &'g mut Graph,
    pub(crate) state: HashMap<NodeId, NodeState>,
    pub(crate) edge_bypassed: Vec<bool>,
    pub(crate) outputs_seen: HashMap<NodeId, HashSet<String>>,
    pub(crate) pending: Vec<usize>,
    pub(crate) ctx: InvokeContext,
    pub(crate) debug: DebugPipeline,
    started: Instant,
}

impl<'g> Scheduler<'g> {
    pub fn new(
        graph: &'g mut Graph,
        out: mpsc::Sender<OutputMessage>,
        opts: &ExecuteOptions,
    ) -> Self {
        let mut ctx =
            InvokeContext::new(out, opts.registry.clone()).with_cancel(opts.cancel.clone());
        if let Some(chat) = &opts.chat {
            ctx = ctx.with_chat(chat.clone());
        }
        let debug = DebugPipeline::new(graph.debug, &graph.debug_config, opts.callback.clone());
        let edge_count = graph.edges.len();
        Self {
            graph,
            state: HashMap::new(),
            edge_bypassed: vec![false; edge_count],
            outputs_seen: HashMap::new(),
            pending: (0..edge_count).collect(),
            ctx,
            debug,
            started: Instant::now(),
        }
    }

    pub(crate) fn node_state(&self, id: &str) -> NodeState {
        self.state.get(id).copied().unwrap_or(NodeState::Unset)
    }

    #[tracing::instrument(skip(self), fields(graph = %self.graph.name))]
    pub async fn run(mut self) {
        tracing::info!(nodes = self.graph.order.len(), "starting graph execution");

        let name = self.graph.name.clone();
        self.debug
            .emit(
                DebugEvent::GraphStart {
                    graph: name.clone(),
                    at: Utc::now(),
                },
                &self.ctx.out.clone(),
            )
            .await;

        // Build-time validation failures surface first, then execution
        // proceeds so node-level errors are still reported.
        for issue in self.graph.issues.clone() {
            self.debug
                .emit(
                    DebugEvent::Validation {
                        message: issue.message,
                        offenders: issue.offenders,
                    },
                    &self.ctx.out.clone(),
                )
                .await;
        }

        self.drive(None).await;

        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        self.debug
            .emit(
                DebugEvent::GraphEnd {
                    graph: name.clone(),
                    elapsed_ms,
                },
                &self.ctx.out.clone(),
            )
            .await;

        if self.graph.debug {
            let summary = self.summary(name, elapsed_ms);
            let _ = self
                .ctx
                .out
                .send(OutputMessage::DebugSummary(summary))
                .await;
        }
        tracing::info!(elapsed_ms, "graph execution finished");
    }

    fn summary(&self, graph: String, elapsed_ms: u64) -> ExecutionSummary {
        let mut executed = Vec::new();
        let mut bypassed = Vec::new();
        for id in &self.graph.order {
            match self.node_state(id) {
                NodeState::Executed => executed.push(id.clone()),
                NodeState::Bypassed => bypassed.push(id.clone()),
                NodeState::Unset => {} // unreached nodes are omitted
            }
        }
        ExecutionSummary {
            graph,
            executed,
            bypassed,
            error_count: self.debug.error_count(),
            elapsed_ms,
        }
    }

    /// True when an edge participates in the current (possibly restricted)
    /// drive. Restricted drives keep edges leaving the subset pending for
    /// the outer drive to finish.
    fn in_scope(&self, idx: usize, subset: Option<(&HashSet<NodeId>, &str)>) -> bool {
        match subset {
            None => true,
            Some((nodes, host)) => {
                let edge = &self.graph.edges[idx];
                nodes.contains(&edge.source)
                    && (nodes.contains(&edge.target) || edge.target == host)
            }
        }
    }

    /// A node is ready when every non-bypassed incoming edge has an
    /// executed source and a populated input. A loop node's feedback
    /// input is exempt: the feedback edge closes a cycle by design and is
    /// satisfied per iteration by the loop executor itself.
    pub(crate) fn ready(&self, id: &str) -> bool {
        let Some(node) = self.graph.node(id) else {
            return false;
        };
        let is_loop = node.type_tag() == "loop";
        for (idx, edge) in self.graph.incoming(id) {
            if self.edge_bypassed[idx] {
                continue;
            }
            if is_loop
                && matches!(
                    edge.target_key.as_str(),
                    crate::node::HANDLE_LOOP | crate::node::HANDLE_LOOP_ALT
                )
            {
                continue;
            }
            if self.node_state(&edge.source) != NodeState::Executed {
                return false;
            }
            if !node.base().has_input(&edge.target_key) {
                return false;
            }
        }
        true
    }

    /// Drive the worklist until it drains, deadlocks, or is cancelled.
    /// `subset` restricts execution to a node set (loop iteration replay);
    /// `subset.1` is the loop node, a permitted edge target but never
    /// executed here.
    pub(crate) async fn drive(&mut self, subset: Option<(&HashSet<NodeId>, &str)>) {
        loop {
            if self.ctx.cancel.is_cancelled() || self.ctx.out.is_closed() {
                tracing::debug!("execution cancelled");
                return;
            }

            let snapshot: Vec<usize> = self
                .pending
                .iter()
                .copied()
                .filter(|idx| self.in_scope(*idx, subset))
                .collect();
            if snapshot.is_empty() {
                return;
            }

            let mut progressed = false;
            for idx in snapshot {
                if !self.pending.contains(&idx) {
                    continue; // retired earlier in this pass
                }
                let source = self.graph.edges[idx].source.clone();
                let target = self.graph.edges[idx].target.clone();

                if self.edge_bypassed[idx] || self.node_state(&source) == NodeState::Bypassed {
                    if !self.edge_bypassed[idx] {
                        self.bypass_edge_and_propagate(idx).await;
                    }
                    self.retire(idx);
                    progressed = true;
                    self.try_execute_ready(&target, subset).await;
                    continue;
                }

                match self.node_state(&source) {
                    NodeState::Unset => {
                        if self.ready(&source) && self.permitted(&source, subset) {
                            self.execute_node(&source).await;
                            progressed = true;
                        }
                    }
                    NodeState::Executed => {
                        self.retire(idx);
                        progressed = true;
                        self.try_execute_ready(&target, subset).await;
                    }
                    NodeState::Bypassed => unreachable!("handled above"),
                }
            }

            if !progressed {
                // Merge targets can become ready through bypassed edges
                // consumed in earlier passes; scan before giving up.
                if let Some(id) = self.find_ready_unset(subset) {
                    self.execute_node(&id).await;
                    continue;
                }
                let remaining: Vec<String> = self
                    .pending
                    .iter()
                    .filter(|idx| self.in_scope(**idx, subset))
                    .map(|idx| self.graph.edges[*idx].describe())
                    .collect();
                tracing::warn!(remaining = remaining.len(), "scheduler deadlocked");
                self.debug
                    .emit(
                        DebugEvent::Deadlock {
                            remaining_edges: remaining,
                        },
                        &self.ctx.out.clone(),
                    )
                    .await;
                return;
            }
        }
    }

    fn permitted(&self, id: &str, subset: Option<(&HashSet<NodeId>, &str)>) -> bool {
        match subset {
            None => true,
            Some((nodes, _)) => nodes.contains(id),
        }
    }

    fn find_ready_unset(&self, subset: Option<(&HashSet<NodeId>, &str)>) -> Option<NodeId> {
        self.graph
            .order
            .iter()
            .find(|id| {
                self.node_state(id) == NodeState::Unset
                    && self.permitted(id, subset)
                    && self.graph.incoming(id).next().is_some()
                    && self.ready(id)
            })
            .cloned()
    }

    fn retire(&mut self, idx: usize) {
        self.pending.retain(|i| *i != idx);
    }

    async fn try_execute_ready(&mut self, id: &str, subset: Option<(&HashSet<NodeId>, &str)>) {
        if self.node_state(id) == NodeState::Unset && self.permitted(id, subset) && self.ready(id) {
            self.execute_node(id).await;
        }
    }

    /// Execute one node: invoke it (or delegate to the loop executor),
    /// route its events, apply conditional pruning, capture debug state.
    pub(crate) async fn execute_node(&mut self, id: &str) {
        if self.node_state(id) != NodeState::Unset {
            return;
        }
        let Some(node) = self.graph.node(id) else {
            return;
        };
        let node_type = node.type_tag().to_string();

        if node_type == "loop" {
            // Boxed: the loop executor re-enters drive(), and the cycle
            // must not inline into one future type.
            Box::pin(super::loop_exec::run_loop(self, id)).await;
            return;
        }

        tracing::debug!(node = id, node_type = %node_type, "executing node");
        self.debug
            .emit(
                DebugEvent::NodeStart {
                    node: id.to_string(),
                    node_type: node_type.clone(),
                },
                &self.ctx.out.clone(),
            )
            .await;

        let outcome = {
            let ctx = self.ctx.clone();
            let node = self
                .graph
                .node_mut(id)
                .expect("node existence checked above");
            node::invoke(node, &ctx).await
        };

        for event in &outcome.events {
            self.outputs_seen
                .entry(id.to_string())
                .or_default()
                .insert(event.source_type.clone());
            self.route_event(id, event);
        }
        self.state.insert(id.to_string(), NodeState::Executed);

        if let Some(error) = &outcome.error {
            self.report_node_error(id, error).await;
        }

        let routes_exclusively = self
            .graph
            .node(id)
            .map(|n| n.routes_exclusively())
            .unwrap_or(false);
        if routes_exclusively {
            self.apply_exclusive_routing(id, &outcome).await;
        }

        let state = self
            .graph
            .node(id)
            .map(|n| n.base().debug_state(true, outcome.elapsed_ms));
        if let Some(state) = state {
            self.debug
                .emit(
                    DebugEvent::NodeEnd {
                        node: id.to_string(),
                        node_type,
                        state,
                    },
                    &self.ctx.out.clone(),
                )
                .await;
        }
    }

    /// Write an event's payload into every matching, non-bypassed edge's
    /// target input, in edge order.
    pub(crate) fn route_event(&mut self, source: &str, event: &Event) {
        let bindings: Vec<(NodeId, String, FlowValue)> = self
            .graph
            .outgoing(source)
            .filter(|(idx, edge)| {
                !self.edge_bypassed[*idx]
                    && source_types_match(&edge.source_type, &event.source_type)
            })
            .map(|(_, edge)| {
                (
                    edge.target.clone(),
                    edge.target_key.clone(),
                    event.payload.value.clone(),
                )
            })
            .collect();
        for (target, key, value) in bindings {
            if let Some(node) = self.graph.node_mut(&target) {
                node.base_mut().bind_input(&key, value);
            }
        }
    }

    pub(crate) async fn report_node_error(&mut self, id: &str, error: &FlowError) {
        let context = self
            .graph
            .node(id)
            .map(|n| {
                serde_json::json!({
                    "inputs": n.base().inputs.snapshot(),
                    "config_keys": n.base().config.keys().collect::<Vec<_>>(),
                    "keys_available": n.base().inputs.keys(),
                })
            })
            .unwrap_or(serde_json::Value::Null);
        self.debug
            .emit(
                DebugEvent::NodeError {
                    node: id.to_string(),
                    kind: error.kind().to_string(),
                    message: error.to_string(),
                    context,
                },
                &self.ctx.out.clone(),
            )
            .await;
    }

    /// After a conditional executes, bypass every outgoing edge that does
    /// not match the selected branch. The terminal metadata edge stays
    /// live. A selection with no matching edge is a routing error and
    /// bypasses all outputs; so does a conditional that failed before
    /// selecting.
    async fn apply_exclusive_routing(&mut self, id: &str, outcome: &InvokeOutcome) {
        let selected = outcome
            .events
            .iter()
            .find(|e| !e.is_terminal() && !e.is_content())
            .map(|e| e.source_type.clone());

        let to_bypass: Vec<usize> = match &selected {
            Some(branch) => {
                let has_match = self
                    .graph
                    .outgoing(id)
                    .any(|(_, e)| source_types_match(&e.source_type, branch));
                if has_match {
                    self.graph
                        .outgoing(id)
                        .filter(|(idx, e)| {
                            !self.edge_bypassed[*idx]
                                && !is_terminal_type(&e.source_type)
                                && !source_types_match(&e.source_type, branch)
                        })
                        .map(|(idx, _)| idx)
                        .collect()
                } else {
                    self.report_node_error(id, &FlowError::routing(id, branch.clone()))
                        .await;
                    self.graph
                        .outgoing(id)
                        .filter(|(idx, _)| !self.edge_bypassed[*idx])
                        .map(|(idx, _)| idx)
                        .collect()
                }
            }
            None => self
                .graph
                .outgoing(id)
                .filter(|(idx, _)| !self.edge_bypassed[*idx])
                .map(|(idx, _)| idx)
                .collect(),
        };

        for idx in to_bypass {
            self.bypass_edge_and_propagate(idx).await;
        }
    }
}
