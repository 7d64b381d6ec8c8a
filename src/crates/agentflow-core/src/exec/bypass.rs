//! Bypass propagation.
//!
//! Marking an edge bypassed removes it from readiness accounting and
//! suppresses data propagation along it. A node whose incoming edges are
//! all bypassed (and that has at least one) is itself bypassed, and the
//! mark propagates depth-first through its outgoing edges. A node with
//! any live parent stops the walk - which is what lets merge nodes run on
//! partial inputs.

use crate::debug::DebugEvent;
use crate::exec::scheduler::{NodeState, Scheduler};

impl Scheduler<'_> {
    /// Bypass one edge and propagate node auto-bypass from its target.
    pub(crate) async fn bypass_edge_and_propagate(&mut self, idx: usize) {
        if self.edge_bypassed[idx] {
            return;
        }
        self.edge_bypassed[idx] = true;
        let target = self.graph.edges[idx].target.clone();
        self.auto_bypass(&target).await;
    }

    /// Depth-first all-parents-bypassed propagation.
    pub(crate) async fn auto_bypass(&mut self, start: &str) {
        let mut stack = vec![start.to_string()];
        while let Some(id) = stack.pop() {
            if self.node_state(&id) != NodeState::Unset {
                continue;
            }
            let incoming: Vec<usize> = self.graph.incoming(&id).map(|(edge_idx, _)| edge_idx).collect();
            if incoming.is_empty() {
                continue; // sourceless nodes are never auto-bypassed
            }
            if incoming.iter().any(|&edge_idx| !self.edge_bypassed[edge_idx]) {
                continue; // live parent
            }

            self.state.insert(id.clone(), NodeState::Bypassed);
            if let Some(node) = self.graph.node_mut(&id) {
                node.mark_bypassed();
            }
            tracing::debug!(node = %id, "node bypassed");

            let event = self.graph.node(&id).map(|n| DebugEvent::NodeEnd {
                node: id.clone(),
                node_type: n.type_tag().to_string(),
                state: n.base().debug_state(false, 0),
            });
            if let Some(event) = event {
                self.debug.emit(event, &self.ctx.out.clone()).await;
            }

            let downstream: Vec<(usize, String)> = self
                .graph
                .outgoing(&id)
                .filter(|(edge_idx, _)| !self.edge_bypassed[*edge_idx])
                .map(|(edge_idx, edge)| (edge_idx, edge.target.clone()))
                .collect();
            for (edge_idx, target) in downstream {
                self.edge_bypassed[edge_idx] = true;
                stack.push(target);
            }
        }
    }
}
