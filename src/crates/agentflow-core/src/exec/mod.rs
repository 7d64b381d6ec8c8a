//! Graph execution
//!
//! [`execute`] spawns the scheduler onto a task and hands the caller a
//! bounded stream of [`OutputMessage`]s. Dropping the stream closes the
//! channel, which the scheduler observes and treats as cancellation;
//! an explicit [`CancellationToken`] cascades into every node invocation
//! and its transport calls.
//!
//! The scheduler itself (`scheduler` module) is a cooperative
//! single-logical-thread ready-queue over the edge worklist; `loop_exec`
//! holds the loop-node specialization and `bypass` the conditional bypass
//! propagation.

mod bypass;
mod loop_exec;
mod scheduler;

pub use scheduler::ExecuteOptions;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::graph::Graph;
use crate::output::{OutputMessage, OutputStream};

use scheduler::Scheduler;

/// Execute a compiled graph, returning the caller-facing message stream.
///
/// The graph is consumed: nodes are mutated during the run and discarded
/// with it.
pub fn execute(graph: Graph, opts: ExecuteOptions) -> OutputStream {
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        let mut graph = graph;
        drive_graph(&mut graph, tx, opts).await;
    });
    Box::pin(ReceiverStream::new(rx))
}

/// Execute with default options.
pub fn execute_default(graph: Graph) -> OutputStream {
    execute(graph, ExecuteOptions::default())
}

/// Drive a graph to completion inline, sending messages into `out`.
/// Used by `inner` nodes, which own their nested graph and must not move
/// it onto a task.
pub(crate) async fn drive_graph(
    graph: &mut Graph,
    out: mpsc::Sender<OutputMessage>,
    opts: ExecuteOptions,
) {
    Scheduler::new(graph, out, &opts).run().await;
}
