//! Graph specification validation
//!
//! Three rules, applied to every graph (nested specs recurse through the
//! compiler and get the same treatment):
//!
//! - **single entry** - exactly one `user_input` node,
//! - **no duplicate edges** - the full `(source, target, source_type,
//!   target_key)` tuple must be unique; same endpoints on different
//!   handles are allowed,
//! - **known references** - edges must connect nodes that exist.
//!
//! Failures never abort the build: they are embedded in the graph as
//! [`SpecIssue`]s and surfaced as debug events when execution starts.

use std::collections::{HashMap, HashSet};

use crate::graph::{Edge, SpecIssue};
use crate::spec::NodeSpec;

/// Validate a graph's node specs and compiled edges. `sink` is the
/// auto-inserted sink id, always a valid target.
pub fn validate(nodes: &[NodeSpec], edges: &[Edge], sink: &str) -> Vec<SpecIssue> {
    let mut issues = Vec::new();

    // Single entry node.
    let entries: Vec<&str> = nodes
        .iter()
        .filter(|n| n.node_type == "user_input")
        .map(|n| n.id.as_str())
        .collect();
    match entries.len() {
        0 => issues.push(SpecIssue {
            message: "no user_input entry node".to_string(),
            offenders: Vec::new(),
        }),
        1 => {}
        _ => issues.push(SpecIssue {
            message: format!("{} user_input nodes, expected exactly one", entries.len()),
            offenders: entries.iter().map(|s| s.to_string()).collect(),
        }),
    }

    // Duplicate node ids.
    let mut seen_ids = HashSet::new();
    let duplicate_ids: Vec<String> = nodes
        .iter()
        .filter(|n| !seen_ids.insert(n.id.as_str()))
        .map(|n| n.id.clone())
        .collect();
    if !duplicate_ids.is_empty() {
        issues.push(SpecIssue {
            message: "duplicate node ids".to_string(),
            offenders: duplicate_ids,
        });
    }

    // Duplicate edges over the full tuple.
    let mut counts: HashMap<(&str, &str, &str, &str), Vec<String>> = HashMap::new();
    for edge in edges {
        counts
            .entry((
                edge.source.as_str(),
                edge.target.as_str(),
                edge.source_type.as_str(),
                edge.target_key.as_str(),
            ))
            .or_default()
            .push(edge.describe());
    }
    for (_, offenders) in counts {
        if offenders.len() > 1 {
            issues.push(SpecIssue {
                message: "duplicate edge".to_string(),
                offenders,
            });
        }
    }

    // Edges must reference known nodes.
    let known: HashSet<&str> = nodes
        .iter()
        .map(|n| n.id.as_str())
        .chain(std::iter::once(sink))
        .collect();
    let unknown: Vec<String> = edges
        .iter()
        .filter(|e| !known.contains(e.source.as_str()) || !known.contains(e.target.as_str()))
        .map(|e| e.describe())
        .collect();
    if !unknown.is_empty() {
        issues.push(SpecIssue {
            message: "edge references unknown node".to_string(),
            offenders: unknown,
        });
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn node(id: &str, node_type: &str) -> NodeSpec {
        NodeSpec {
            id: id.to_string(),
            node_type: node_type.to_string(),
            data: Map::new(),
            magic_flow: None,
        }
    }

    fn edge(source: &str, source_type: &str, target: &str, target_key: &str) -> Edge {
        Edge {
            source: source.to_string(),
            source_type: source_type.to_string(),
            target: target.to_string(),
            target_key: target_key.to_string(),
        }
    }

    #[test]
    fn accepts_a_well_formed_graph() {
        let nodes = vec![node("in", "user_input"), node("out", "end")];
        let edges = vec![edge("in", "end", "out", "message")];
        assert!(validate(&nodes, &edges, "sink").is_empty());
    }

    #[test]
    fn missing_entry_is_flagged() {
        let issues = validate(&[node("a", "text")], &[], "sink");
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("no user_input"));
    }

    #[test]
    fn multiple_entries_list_all_offenders() {
        let nodes = vec![node("in1", "user_input"), node("in2", "user_input")];
        let issues = validate(&nodes, &[], "sink");
        assert_eq!(issues[0].offenders, vec!["in1", "in2"]);
    }

    #[test]
    fn duplicate_edges_are_flagged_with_both_descriptions() {
        let nodes = vec![node("a", "user_input"), node("b", "end")];
        let edges = vec![
            edge("a", "out", "b", "in"),
            edge("a", "out", "b", "in"),
        ];
        let issues = validate(&nodes, &edges, "sink");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].offenders.len(), 2);
    }

    #[test]
    fn same_endpoints_on_different_handles_are_allowed() {
        let nodes = vec![node("a", "user_input"), node("b", "end")];
        let edges = vec![
            edge("a", "out", "b", "in_a"),
            edge("a", "out", "b", "in_b"),
        ];
        assert!(validate(&nodes, &edges, "sink").is_empty());
    }

    #[test]
    fn unknown_references_are_flagged() {
        let nodes = vec![node("a", "user_input")];
        let edges = vec![edge("a", "out", "ghost", "in")];
        let issues = validate(&nodes, &edges, "sink");
        assert!(issues
            .iter()
            .any(|i| i.message.contains("unknown node")));
    }
}
