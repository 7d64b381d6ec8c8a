//! Emit stage: fan-out of transformed debug records.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::output::OutputMessage;

use super::config::DebugConfig;
use super::event::DebugEvent;
use super::transform::Stage;

/// Optional user callback invoked with every captured event (before
/// transforms).
pub type DebugCallback = Arc<dyn Fn(&DebugEvent) + Send + Sync>;

/// The assembled capture → transform → emit chain for one execution.
pub struct DebugPipeline {
    enabled: bool,
    stages: Vec<Stage>,
    callback: Option<DebugCallback>,
    error_count: usize,
}

impl DebugPipeline {
    pub fn new(enabled: bool, config: &DebugConfig, callback: Option<DebugCallback>) -> Self {
        Self {
            enabled,
            stages: config.stages(),
            callback,
            error_count: 0,
        }
    }

    /// A pipeline that only counts errors and logs via `tracing`.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            stages: Vec::new(),
            callback: None,
            error_count: 0,
        }
    }

    /// Errors captured so far (counted whether or not emission is enabled).
    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// Capture an event: count, log, invoke the callback, and (when debug
    /// mode is on) transform and send it to the caller's stream.
    ///
    /// Returns `false` when the caller has dropped the stream, which the
    /// scheduler treats as cancellation.
    pub async fn emit(&mut self, event: DebugEvent, out: &mpsc::Sender<OutputMessage>) -> bool {
        if event.is_error() {
            self.error_count += 1;
            tracing::warn!(target: "agentflow::debug", kind = event.kind(), "debug event");
        } else {
            tracing::debug!(target: "agentflow::debug", kind = event.kind(), "debug event");
        }

        if let Some(callback) = &self.callback {
            callback(&event);
        }

        if !self.enabled {
            return true;
        }

        let kind = event.kind();
        let is_error = event.is_error();
        let mut record = match serde_json::to_value(&event) {
            Ok(v) => v,
            Err(_) => return true,
        };
        for stage in &self.stages {
            match stage.apply(record, kind, is_error) {
                Some(next) => record = next,
                None => return true,
            }
        }

        out.send(OutputMessage::Debug(record)).await.is_ok()
    }
}
