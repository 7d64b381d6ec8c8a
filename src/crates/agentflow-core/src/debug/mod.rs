//! Debug event pipeline: capture → transform → emit
//!
//! Active only when the spec requests debug mode. Lifecycle hooks in the
//! executor and node runtime produce [`DebugEvent`]s; an ordered list of
//! transform stages filters, redacts, truncates and samples them; the emit
//! stage fans out to the caller's stream (`debug` / `debug_summary`
//! messages), the `tracing` log backend, and an optional user callback.

mod config;
mod event;
mod pipeline;
mod transform;

pub use config::{DebugConfig, DebugPreset};
pub use event::{DebugEvent, ExecutionSummary, NodeDebugState};
pub use pipeline::{DebugCallback, DebugPipeline};
pub use transform::Stage;
