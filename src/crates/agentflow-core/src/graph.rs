//! Compiled graph model
//!
//! A [`Graph`] is the output of the compiler: an ordered set of runtime
//! nodes, the edge list, the designated master entry node, and any
//! validation issues the build embedded instead of raising. Node
//! cross-references are by id, not pointer, which keeps ownership acyclic
//! and lets nested graphs live inside their host `inner` node.
//!
//! Graphs are built once, mutated during one execution, and discarded
//! (nested graphs reset themselves between host iterations).

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use serde_json::{json, Value};

use crate::debug::DebugConfig;
use crate::node::FlowNode;

/// Node identifier, unique within its enclosing graph.
pub type NodeId = String;

/// A routed connection between two node handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub source: NodeId,
    /// Matched against event source types (with `end`/`default` aliased).
    pub source_type: String,
    pub target: NodeId,
    /// Input key the payload is stored under on the target.
    pub target_key: String,
}

impl Edge {
    /// Compact description used in debug events and validation messages.
    pub fn describe(&self) -> String {
        format!(
            "{}[{}] -> {}[{}]",
            self.source, self.source_type, self.target, self.target_key
        )
    }
}

/// A validation failure embedded at build time and surfaced as a debug
/// event when execution starts.
#[derive(Debug, Clone, Serialize)]
pub struct SpecIssue {
    pub message: String,
    pub offenders: Vec<String>,
}

/// The compiled, executable graph.
pub struct Graph {
    /// Graph name (the spec's `type` tag, or the host node id for nested
    /// graphs).
    pub name: String,
    pub nodes: HashMap<NodeId, Box<dyn FlowNode>>,
    /// Node ids in compile order (entry node first).
    pub order: Vec<NodeId>,
    pub edges: Vec<Edge>,
    /// The single user-input entry node.
    pub master: NodeId,
    /// The auto-inserted sink absorbing unwired outputs.
    pub sink: NodeId,
    pub debug: bool,
    pub debug_config: DebugConfig,
    /// Validation failures collected at build time.
    pub issues: Vec<SpecIssue>,
    /// Set when this graph is nested inside an `inner` node.
    pub host: Option<NodeId>,
}

impl Graph {
    pub fn node(&self, id: &str) -> Option<&dyn FlowNode> {
        self.nodes.get(id).map(|n| n.as_ref())
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Box<dyn FlowNode>> {
        self.nodes.get_mut(id)
    }

    /// Outgoing edges of a node with their indices into `edges`.
    pub fn outgoing<'a>(&'a self, id: &'a str) -> impl Iterator<Item = (usize, &'a Edge)> + 'a {
        self.edges
            .iter()
            .enumerate()
            .filter(move |(_, e)| e.source == id)
    }

    /// Incoming edges of a node with their indices into `edges`.
    pub fn incoming<'a>(&'a self, id: &'a str) -> impl Iterator<Item = (usize, &'a Edge)> + 'a {
        self.edges
            .iter()
            .enumerate()
            .filter(move |(_, e)| e.target == id)
    }

    /// Clear all runtime state so the graph can be driven again (used by
    /// `inner` hosts between iterations).
    pub fn reset_runtime(&mut self) {
        for node in self.nodes.values_mut() {
            node.base_mut().reset_runtime();
        }
    }

    /// Structural fingerprint: node ids/types and edges, independent of
    /// runtime state. Two builds of the same spec produce equal
    /// structures.
    pub fn structure(&self) -> Value {
        let nodes: Vec<Value> = self
            .order
            .iter()
            .filter_map(|id| self.node(id))
            .map(|n| json!({"id": n.id(), "type": n.type_tag()}))
            .collect();
        let edges: Vec<Value> = self
            .edges
            .iter()
            .map(|e| {
                json!({
                    "source": e.source,
                    "source_type": e.source_type,
                    "target": e.target,
                    "target_key": e.target_key,
                })
            })
            .collect();
        json!({"name": self.name, "master": self.master, "nodes": nodes, "edges": edges})
    }

    /// Render the topology as Mermaid flowchart text.
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("flowchart TD\n");
        for id in &self.order {
            if let Some(node) = self.node(id) {
                out.push_str(&format!("    {}[\"{} ({})\"]\n", sanitize(id), id, node.type_tag()));
            }
        }
        for edge in &self.edges {
            out.push_str(&format!(
                "    {} -->|{}| {}\n",
                sanitize(&edge.source),
                edge.source_type,
                sanitize(&edge.target)
            ));
        }
        out
    }
}

fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("name", &self.name)
            .field("nodes", &self.order)
            .field("edges", &self.edges.len())
            .field("master", &self.master)
            .field("issues", &self.issues.len())
            .finish()
    }
}
