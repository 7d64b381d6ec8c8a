//! Graph compiler
//!
//! Turns a [`FlowSpec`] plus the initial user message into an executable
//! [`Graph`]. The build is pure and synchronous: no I/O happens here, and
//! validation failures are embedded in the graph rather than raised, so
//! the executor can surface them as debug events and still report
//! node-level problems.
//!
//! Pipeline:
//!
//! 1. sort nodes so the entry node is first; stable-sort edges so edges
//!    from earlier nodes come first (a debuggability nicety - correctness
//!    does not rely on it),
//! 2. insert the sink node and rewrite every edge without a target handle
//!    to point at it under the reserved `void` key,
//! 3. seed the user message and attachments into the entry node (and the
//!    current turn into any `chat` node),
//! 4. instantiate runtime nodes by type tag (unknown tags become stubs),
//!    recursing into `inner` nodes' `magic_flow` sub-specs with the same
//!    message,
//! 5. validate and embed any issues.

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::event::VOID_KEY;
use crate::graph::{Edge, Graph, NodeId};
use crate::node::{
    ChatNode, ClientNode, ConditionalNode, EndNode, FetchNode, FlowNode, InnerNode, LlmNode,
    LoopNode, ParserNode, SendMessageNode, SinkNode, StubNode, TextNode, UserInputNode,
};
use crate::spec::{FlowSpec, NodeSpec};
use crate::validate;

/// File and image attachments accompanying the user message.
#[derive(Debug, Clone, Default)]
pub struct Attachments {
    pub files: Vec<Value>,
    pub images: Vec<Value>,
}

/// Inputs to a build: the user message and attachments. (The client
/// provider registry is execution wiring and travels with
/// `ExecuteOptions` instead; build stays pure.)
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// The initial user message seeded into the entry node.
    pub message: String,
    pub attachments: Attachments,
}

impl BuildOptions {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            attachments: Attachments::default(),
        }
    }

    pub fn with_attachments(mut self, attachments: Attachments) -> Self {
        self.attachments = attachments;
        self
    }
}

/// Compile a spec into an executable graph.
#[tracing::instrument(skip_all, fields(flow = %spec.flow_type, nodes = spec.nodes.len()))]
pub fn build(spec: &FlowSpec, opts: &BuildOptions) -> Graph {
    build_graph(spec, opts, None)
}

fn build_graph(spec: &FlowSpec, opts: &BuildOptions, host: Option<NodeId>) -> Graph {
    // Entry selection: explicit master, else the sole user_input node.
    let entry_id: Option<String> = spec.master.clone().or_else(|| {
        spec.nodes
            .iter()
            .find(|n| n.node_type == "user_input")
            .map(|n| n.id.clone())
    });

    // Sort nodes entry-first, then edges by source position (stable).
    let mut node_specs: Vec<NodeSpec> = spec.nodes.clone();
    node_specs.sort_by_key(|n| Some(&n.id) != entry_id.as_ref());
    let position: HashMap<&str, usize> = node_specs
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();
    let mut edge_specs = spec.edges.clone();
    edge_specs.sort_by_key(|e| position.get(e.source.as_str()).copied().unwrap_or(usize::MAX));

    // Sink insertion: unkeyed edges route there under the void key. The
    // id is fresh with respect to the spec but deterministic, so two
    // builds of one spec are structurally identical.
    let mut sink_id = "__void__".to_string();
    while spec.nodes.iter().any(|n| n.id == sink_id) {
        sink_id.push('_');
    }
    let edges: Vec<Edge> = edge_specs
        .iter()
        .map(|e| match e.target_handle.as_deref() {
            Some(key) if !key.is_empty() => Edge {
                source: e.source.clone(),
                source_type: e.source_handle.clone(),
                target: e.target.clone(),
                target_key: key.to_string(),
            },
            _ => Edge {
                source: e.source.clone(),
                source_type: e.source_handle.clone(),
                target: sink_id.clone(),
                target_key: VOID_KEY.to_string(),
            },
        })
        .collect();

    // Seed the message and attachments into configurations.
    for node_spec in &mut node_specs {
        let is_entry = Some(&node_spec.id) == entry_id.as_ref();
        if is_entry && node_spec.node_type == "user_input" {
            node_spec
                .data
                .insert("message".to_string(), json!(opts.message));
            node_spec
                .data
                .insert("files".to_string(), Value::Array(opts.attachments.files.clone()));
            node_spec
                .data
                .insert("images".to_string(), Value::Array(opts.attachments.images.clone()));
        }
        if node_spec.node_type == "chat" {
            node_spec
                .data
                .insert("message".to_string(), json!(opts.message));
        }
    }

    let issues = validate::validate(&node_specs, &edges, &sink_id);

    // Unknown references were flagged above; keeping them would only
    // stall the scheduler, so they are dropped from the runtime edge set.
    let known: std::collections::HashSet<&str> = node_specs
        .iter()
        .map(|n| n.id.as_str())
        .chain(std::iter::once(sink_id.as_str()))
        .collect();
    let edges: Vec<Edge> = edges
        .into_iter()
        .filter(|e| known.contains(e.source.as_str()) && known.contains(e.target.as_str()))
        .collect();

    let mut nodes: HashMap<NodeId, Box<dyn FlowNode>> = HashMap::new();
    let mut order: Vec<NodeId> = Vec::new();
    for node_spec in &node_specs {
        if nodes.contains_key(&node_spec.id) {
            continue; // duplicate ids were flagged; first wins
        }
        order.push(node_spec.id.clone());
        nodes.insert(node_spec.id.clone(), instantiate(node_spec, opts));
    }
    order.push(sink_id.clone());
    nodes.insert(sink_id.clone(), Box::new(SinkNode::new(sink_id.clone())));

    let master = entry_id
        .or_else(|| order.first().cloned())
        .unwrap_or_default();

    Graph {
        name: if spec.flow_type.is_empty() {
            "flow".to_string()
        } else {
            spec.flow_type.clone()
        },
        nodes,
        order,
        edges,
        master,
        sink: sink_id,
        debug: spec.debug,
        debug_config: spec.debug_config.clone().unwrap_or_default(),
        issues,
        host,
    }
}

/// Dispatch a node spec to its runtime factory.
fn instantiate(spec: &NodeSpec, opts: &BuildOptions) -> Box<dyn FlowNode> {
    let id = spec.id.clone();
    let data = spec.data.clone();
    match spec.node_type.as_str() {
        "user_input" => Box::new(UserInputNode::new(id, data)),
        "text" => Box::new(TextNode::new(id, data)),
        "parser" => Box::new(ParserNode::new(id, data)),
        "fetch" => Box::new(FetchNode::new(id, data)),
        "client" => Box::new(ClientNode::new(id, data)),
        "llm" => Box::new(LlmNode::new(id, data)),
        "chat" => Box::new(ChatNode::new(id, data)),
        "send_message" => Box::new(SendMessageNode::new(id, data)),
        "end" => Box::new(EndNode::new(id, data)),
        "void" => Box::new(SinkNode::new(id)),
        "loop" => Box::new(LoopNode::new(id, data)),
        "conditional" => Box::new(ConditionalNode::new(id, data)),
        "inner" => {
            let nested = spec
                .magic_flow
                .as_ref()
                .map(|sub| build_graph(sub, opts, Some(spec.id.clone())));
            Box::new(InnerNode::new(id, data, nested))
        }
        other => Box::new(StubNode::new(id, other, data)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::FlowSpec;

    fn spec(json: &str) -> FlowSpec {
        FlowSpec::from_json(json).unwrap()
    }

    #[test]
    fn entry_node_sorts_first_and_sink_is_appended() {
        let spec = spec(
            r#"{
                "type": "t",
                "nodes": [
                    {"id": "late", "type": "end"},
                    {"id": "in", "type": "user_input"}
                ],
                "edges": [
                    {"source": "in", "sourceHandle": "handle_user_message",
                     "target": "late", "targetHandle": "message"}
                ]
            }"#,
        );
        let graph = build(&spec, &BuildOptions::message("Hi"));
        assert_eq!(graph.order[0], "in");
        assert_eq!(graph.master, "in");
        assert_eq!(graph.order.last().unwrap(), &graph.sink);
        assert!(graph.issues.is_empty());
    }

    #[test]
    fn unkeyed_edges_are_rewritten_to_the_sink() {
        let spec = spec(
            r#"{
                "type": "t",
                "nodes": [
                    {"id": "in", "type": "user_input"},
                    {"id": "t1", "type": "text", "data": {"text": "x"}}
                ],
                "edges": [
                    {"source": "t1", "sourceHandle": "end", "target": "t1"}
                ]
            }"#,
        );
        let graph = build(&spec, &BuildOptions::message("Hi"));
        let rewritten = &graph.edges[0];
        assert_eq!(rewritten.target, graph.sink);
        assert_eq!(rewritten.target_key, "void");
    }

    #[test]
    fn message_is_seeded_into_entry_and_chat_nodes() {
        let spec = spec(
            r#"{
                "type": "t",
                "nodes": [
                    {"id": "in", "type": "user_input"},
                    {"id": "c", "type": "chat"}
                ],
                "edges": []
            }"#,
        );
        let graph = build(&spec, &BuildOptions::message("Hello there"));
        assert_eq!(
            graph.node("in").unwrap().base().config_str("message"),
            Some("Hello there")
        );
        assert_eq!(
            graph.node("c").unwrap().base().config_str("message"),
            Some("Hello there")
        );
    }

    #[test]
    fn unknown_types_become_stubs_and_build_never_fails() {
        let spec = spec(
            r#"{
                "type": "t",
                "nodes": [
                    {"id": "in", "type": "user_input"},
                    {"id": "x", "type": "quantum_resolver"}
                ],
                "edges": []
            }"#,
        );
        let graph = build(&spec, &BuildOptions::message("Hi"));
        assert_eq!(graph.node("x").unwrap().type_tag(), "quantum_resolver");
    }

    #[test]
    fn validation_issues_are_embedded_not_raised() {
        let spec = spec(
            r#"{
                "type": "t",
                "nodes": [{"id": "a", "type": "text", "data": {"text": "x"}}],
                "edges": []
            }"#,
        );
        let graph = build(&spec, &BuildOptions::message("Hi"));
        assert_eq!(graph.issues.len(), 1);
        assert!(graph.issues[0].message.contains("no user_input"));
    }

    #[test]
    fn nested_specs_compile_recursively() {
        let spec = spec(
            r#"{
                "type": "outer",
                "nodes": [
                    {"id": "in", "type": "user_input"},
                    {"id": "sub", "type": "inner", "magic_flow": {
                        "type": "nested",
                        "nodes": [{"id": "in2", "type": "user_input"}],
                        "edges": []
                    }}
                ],
                "edges": []
            }"#,
        );
        let graph = build(&spec, &BuildOptions::message("Hi"));
        assert_eq!(graph.node("sub").unwrap().type_tag(), "inner");
    }

    #[test]
    fn builds_are_structurally_deterministic() {
        let source = r#"{
            "type": "t",
            "nodes": [
                {"id": "in", "type": "user_input"},
                {"id": "b", "type": "text", "data": {"text": "x"}},
                {"id": "a", "type": "end"}
            ],
            "edges": [
                {"source": "b", "sourceHandle": "end", "target": "a", "targetHandle": "message"},
                {"source": "in", "sourceHandle": "handle_user_message", "target": "a", "targetHandle": "user"}
            ]
        }"#;
        let g1 = build(&spec(source), &BuildOptions::message("Hi"));
        let g2 = build(&spec(source), &BuildOptions::message("Hi"));
        assert_eq!(g1.structure(), g2.structure());
        // Edges are stable-sorted by source position: entry first.
        assert_eq!(g1.edges[0].source, "in");
    }

    #[test]
    fn sink_id_avoids_user_collisions() {
        let spec = spec(
            r#"{
                "type": "t",
                "nodes": [
                    {"id": "in", "type": "user_input"},
                    {"id": "__void__", "type": "text", "data": {"text": "x"}}
                ],
                "edges": []
            }"#,
        );
        let graph = build(&spec, &BuildOptions::message("Hi"));
        assert_ne!(graph.sink, "__void__");
        assert!(graph.nodes.contains_key(&graph.sink));
    }
}
