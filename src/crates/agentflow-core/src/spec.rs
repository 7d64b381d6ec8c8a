//! Graph specification wire format
//!
//! The caller hands the engine a tree-shaped JSON record describing nodes
//! and edges. Field names follow the wire format exactly (`sourceHandle`,
//! `targetHandle`, `magic_flow`), so specs produced by visual editors
//! deserialize without translation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::debug::DebugConfig;
use crate::error::Result;

/// Top-level graph specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSpec {
    /// Free-form tag, e.g. `"chat"`. Used as the graph name in debug
    /// output.
    #[serde(rename = "type", default)]
    pub flow_type: String,

    /// Enable the debug pipeline for this graph.
    #[serde(default)]
    pub debug: bool,

    /// Debug pipeline configuration; defaults apply when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_config: Option<DebugConfig>,

    /// Entry node id; defaults to the sole `user_input` node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master: Option<String>,

    #[serde(default)]
    pub nodes: Vec<NodeSpec>,

    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
}

/// One node entry in a spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Unique within the enclosing graph.
    pub id: String,

    /// One of the built-in tags or a user tag. Unknown tags compile to a
    /// stub node.
    #[serde(rename = "type")]
    pub node_type: String,

    /// Type-specific configuration, including the optional `handles`
    /// rebind map.
    #[serde(default)]
    pub data: Map<String, Value>,

    /// Nested spec; only meaningful for `type = "inner"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magic_flow: Option<Box<FlowSpec>>,
}

/// One edge entry in a spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub source: String,
    #[serde(rename = "sourceHandle")]
    pub source_handle: String,
    pub target: String,
    /// Absent target handles are rewritten at compile time to the sink
    /// node under the reserved `void` key.
    #[serde(rename = "targetHandle", default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

impl FlowSpec {
    /// Parse a spec from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse a spec from a JSON value.
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}
