//! Debug event kinds captured from the executor and node runtime.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// Per-node state captured on each `node_end`.
#[derive(Debug, Clone, Serialize)]
pub struct NodeDebugState {
    /// Inputs bound by the executor (client handles snapshot as
    /// placeholders).
    pub inputs: Map<String, Value>,
    /// Outputs recorded from the node's events.
    pub outputs: Map<String, Value>,
    /// Opt-in internal variable snapshot set by the node itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_variables: Option<Value>,
    pub was_executed: bool,
    pub was_bypassed: bool,
    pub elapsed_ms: u64,
}

/// A lifecycle or diagnostic event on the debug stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DebugEvent {
    GraphStart {
        graph: String,
        at: DateTime<Utc>,
    },
    GraphEnd {
        graph: String,
        elapsed_ms: u64,
    },
    NodeStart {
        node: String,
        node_type: String,
    },
    NodeEnd {
        node: String,
        node_type: String,
        state: NodeDebugState,
    },
    NodeError {
        node: String,
        kind: String,
        message: String,
        /// Contextual snapshot: inputs, configuration excerpts, keys
        /// available.
        context: Value,
    },
    /// A build-time validation failure, surfaced at graph start.
    Validation {
        message: String,
        offenders: Vec<String>,
    },
    /// The scheduler stopped making progress with edges still pending.
    Deadlock {
        remaining_edges: Vec<String>,
    },
}

impl DebugEvent {
    /// Machine-readable kind tag, used by include/exclude filters.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GraphStart { .. } => "graph_start",
            Self::GraphEnd { .. } => "graph_end",
            Self::NodeStart { .. } => "node_start",
            Self::NodeEnd { .. } => "node_end",
            Self::NodeError { .. } => "node_error",
            Self::Validation { .. } => "validation",
            Self::Deadlock { .. } => "deadlock",
        }
    }

    /// Errors bypass sampling and survive the minimal presets.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::NodeError { .. } | Self::Validation { .. } | Self::Deadlock { .. }
        )
    }
}

/// Final summary emitted once per execution as a `debug_summary` message.
///
/// Contains exactly the nodes that reached the executed or bypassed state;
/// unreached nodes are omitted.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionSummary {
    pub graph: String,
    pub executed: Vec<String>,
    pub bypassed: Vec<String>,
    pub error_count: usize,
    pub elapsed_ms: u64,
}
