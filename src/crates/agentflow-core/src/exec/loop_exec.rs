//! Loop-node execution.
//!
//! The subtree below a loop node splits in two: the *iteration subgraph*
//! (everything reachable from the per-item `content` output) and the
//! *aggregation subgraph* (reachable from the terminal output). Per list
//! element the iteration subgraph is replayed under a restricted drive -
//! `iterate` nodes with fresh caches, everything else served from cache -
//! and whatever lands on the loop's `loop` feedback input is accumulated
//! and surfaced to the caller as a per-item content chunk. After the last
//! element the accumulator publishes on the terminal output and the
//! ordinary worklist drives the aggregation side.

use std::collections::HashSet;
use std::time::Instant;

use serde_json::Value;

use crate::debug::DebugEvent;
use crate::event::{Event, SOURCE_CONTENT, SOURCE_END};
use crate::exec::scheduler::{NodeState, Scheduler};
use crate::graph::NodeId;
use crate::node::LoopNode;
use crate::output::{ChatChunk, OutputMessage};
use crate::value::FlowValue;

pub(crate) async fn run_loop(sched: &mut Scheduler<'_>, id: &str) {
    let started = Instant::now();
    sched
        .debug
        .emit(
            DebugEvent::NodeStart {
                node: id.to_string(),
                node_type: "loop".to_string(),
            },
            &sched.ctx.out.clone(),
        )
        .await;

    let parsed = sched
        .graph
        .node(id)
        .map(|n| LoopNode::parse_list(n.base()))
        .unwrap_or_else(|| Err(crate::error::FlowError::input(id, "list")));

    // The loop counts as executed from here on: its per-item output is
    // what satisfies the iteration subgraph's readiness checks.
    sched.state.insert(id.to_string(), NodeState::Executed);

    let items = match parsed {
        Ok(items) => items,
        Err(error) => {
            sched.report_node_error(id, &error).await;
            emit_node_end(sched, id, started).await;
            return;
        }
    };

    let iteration_set = iteration_subgraph(sched, id);
    tracing::debug!(
        node = id,
        items = items.len(),
        iteration_nodes = iteration_set.len(),
        "expanding loop"
    );

    let mut accumulator: Vec<Value> = Vec::new();
    for item in items {
        if sched.ctx.cancel.is_cancelled() || sched.ctx.out.is_closed() {
            break;
        }

        // Reset the iteration subgraph: every node re-enters scheduling;
        // only `iterate` nodes lose their caches.
        for node_id in &iteration_set {
            if sched.node_state(node_id) == NodeState::Bypassed {
                continue;
            }
            sched.state.insert(node_id.clone(), NodeState::Unset);
            if let Some(node) = sched.graph.node_mut(node_id) {
                if node.iterate() {
                    node.base_mut().reset_iteration();
                }
            }
        }
        let requeue: Vec<usize> = sched
            .graph
            .edges
            .iter()
            .enumerate()
            .filter(|(idx, e)| {
                !sched.edge_bypassed[*idx]
                    && iteration_set.contains(&e.source)
                    && (iteration_set.contains(&e.target) || e.target == id)
            })
            .map(|(idx, _)| idx)
            .collect();
        for idx in requeue {
            if !sched.pending.contains(&idx) {
                sched.pending.push(idx);
            }
        }

        // Publish the element on the per-item output and drive the subset.
        let event = Event::content(id, FlowValue::json(item.clone()));
        if let Some(node) = sched.graph.node_mut(id) {
            node.base_mut()
                .record_output(SOURCE_CONTENT, event.payload.value.clone());
        }
        sched
            .outputs_seen
            .entry(id.to_string())
            .or_default()
            .insert(SOURCE_CONTENT.to_string());
        sched.route_event(id, &event);

        sched.drive(Some((&iteration_set, id))).await;

        // Per-iteration feedback: accumulate and surface to the caller.
        let feedback = sched
            .graph
            .node_mut(id)
            .and_then(|n| LoopNode::take_feedback(n.base_mut()));
        if let Some(value) = feedback {
            accumulator.push(value.snapshot());
            let chunk = ChatChunk::from_flow_value(&value);
            let _ = sched.ctx.out.send(OutputMessage::Content(chunk)).await;
        }
    }

    // Publish the aggregated list once; the main worklist drives the
    // aggregation subgraph from here.
    let aggregated = FlowValue::json(Value::Array(accumulator));
    if let Some(node) = sched.graph.node_mut(id) {
        node.base_mut().record_output(SOURCE_END, aggregated.clone());
    }
    sched
        .outputs_seen
        .entry(id.to_string())
        .or_default()
        .insert(SOURCE_END.to_string());
    let event = Event::end(id, aggregated);
    sched.route_event(id, &event);

    emit_node_end(sched, id, started).await;
}

async fn emit_node_end(sched: &mut Scheduler<'_>, id: &str, started: Instant) {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    let event = sched.graph.node(id).map(|n| DebugEvent::NodeEnd {
        node: id.to_string(),
        node_type: "loop".to_string(),
        state: n.base().debug_state(true, elapsed_ms),
    });
    if let Some(event) = event {
        sched.debug.emit(event, &sched.ctx.out.clone()).await;
    }
}

/// Forward closure from the loop's per-item output.
fn iteration_subgraph(sched: &Scheduler<'_>, loop_id: &str) -> HashSet<NodeId> {
    let mut set = HashSet::new();
    let mut stack: Vec<NodeId> = sched
        .graph
        .outgoing(loop_id)
        .filter(|(_, e)| e.source_type == SOURCE_CONTENT)
        .map(|(_, e)| e.target.clone())
        .collect();
    while let Some(node_id) = stack.pop() {
        if node_id == loop_id || !set.insert(node_id.clone()) {
            continue;
        }
        for (_, edge) in sched.graph.outgoing(&node_id) {
            stack.push(edge.target.clone());
        }
    }
    set
}
