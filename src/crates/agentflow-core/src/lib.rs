//! # agentflow-core - Directed dataflow executor for LLM-agent graphs
//!
//! Users supply a declarative graph of nodes connected by typed edges;
//! the engine compiles it, validates it, and streams results while
//! enforcing data dependencies, conditional bypass propagation, loop
//! expansion, and nested sub-graph execution.
//!
//! ## Core Concepts
//!
//! - **Events and handles**: nodes produce finite async sequences of
//!   typed [`Event`]s; edges match on the event's `source_type` and store
//!   the payload under the target's input key. `content` events stream to
//!   the caller as they are produced; `end` (alias `default`) is the
//!   canonical terminal output.
//! - **Compilation**: [`build`] parses and validates the spec, injects
//!   the sink node, seeds the user message, instantiates runtime nodes
//!   (unknown types become stubs), and recursively compiles nested
//!   `inner` graphs. Build is pure; validation failures embed in the
//!   graph and surface as debug events at execution start.
//! - **Execution**: [`execute`] runs a cooperative ready-queue scheduler
//!   over the edge worklist - one ready node at a time, dependency order
//!   enforced, bypass pruning for conditionals, per-item replay for
//!   loops, deadlock detection when nothing can advance.
//! - **Observability**: with `debug: true` in the spec, a capture →
//!   transform → emit pipeline interleaves lifecycle events with content
//!   and closes with an execution summary.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use agentflow_core::{build, execute_default, BuildOptions, FlowSpec};
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let spec = FlowSpec::from_json(r#"{
//!     "type": "chat",
//!     "debug": true,
//!     "nodes": [
//!         {"id": "in",  "type": "user_input"},
//!         {"id": "sys", "type": "text", "data": {"text": "You are terse."}},
//!         {"id": "cli", "type": "client", "data": {"provider": "fake"}},
//!         {"id": "chat", "type": "chat"},
//!         {"id": "llm", "type": "llm"},
//!         {"id": "out", "type": "end"}
//!     ],
//!     "edges": [
//!         {"source": "sys", "sourceHandle": "end", "target": "chat", "targetHandle": "system"},
//!         {"source": "in", "sourceHandle": "handle_user_message", "target": "chat", "targetHandle": "user"},
//!         {"source": "cli", "sourceHandle": "end", "target": "llm", "targetHandle": "handle-client-provider"},
//!         {"source": "chat", "sourceHandle": "end", "target": "llm", "targetHandle": "handle-chat"},
//!         {"source": "llm", "sourceHandle": "end", "target": "out", "targetHandle": "message"}
//!     ]
//! }"#)?;
//!
//! let graph = build(&spec, &BuildOptions::message("Hi"));
//! let mut stream = execute_default(graph);
//! while let Some(message) = stream.next().await {
//!     if let Some(text) = message.content_text() {
//!         print!("{}", text);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod build;
pub mod chatlog;
pub mod debug;
pub mod error;
pub mod event;
pub mod exec;
pub mod graph;
pub mod llm;
pub mod node;
pub mod output;
pub mod spec;
pub mod template;
pub mod validate;
pub mod value;

// Re-export main types
pub use build::{build, Attachments, BuildOptions};
pub use chatlog::ChatLog;
pub use debug::{DebugCallback, DebugConfig, DebugEvent, DebugPreset, ExecutionSummary};
pub use error::{FlowError, Result};
pub use event::{
    is_terminal_type, source_types_match, Event, EventPayload, SOURCE_CONTENT, SOURCE_DEFAULT,
    SOURCE_END, VOID_KEY,
};
pub use exec::{execute, execute_default, ExecuteOptions};
pub use graph::{Edge, Graph, NodeId, SpecIssue};
pub use llm::{
    Chat, ChatClient, ChatMessage, ChatResult, ChunkStream, ClientBuilder, ClientRegistry,
    FakeClient, GenerateParams, Role,
};
pub use output::{ChatChunk, ChunkChoice, ChunkDelta, OutputMessage, OutputStream};
pub use spec::{EdgeSpec, FlowSpec, NodeSpec};
pub use value::FlowValue;
