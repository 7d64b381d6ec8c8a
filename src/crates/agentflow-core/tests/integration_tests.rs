//! End-to-end scenarios for the compile + execute engine.
//!
//! Every graph here uses the scripted fake client, so runs are pure and
//! deterministic: identical specs produce identical content streams.

use agentflow_core::{
    build, execute, execute_default, BuildOptions, ExecuteOptions, ExecutionSummary, FlowSpec,
    OutputMessage,
};
use futures::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

async fn run(spec_json: &str, message: &str) -> Vec<OutputMessage> {
    let spec = FlowSpec::from_json(spec_json).expect("spec parses");
    let graph = build(&spec, &BuildOptions::message(message));
    let mut stream = execute_default(graph);
    let mut messages = Vec::new();
    while let Some(message) = stream.next().await {
        messages.push(message);
    }
    messages
}

fn content_texts(messages: &[OutputMessage]) -> Vec<String> {
    messages
        .iter()
        .filter_map(|m| m.content_text().map(str::to_string))
        .collect()
}

fn summary(messages: &[OutputMessage]) -> &ExecutionSummary {
    messages
        .iter()
        .filter_map(|m| match m {
            OutputMessage::DebugSummary(s) => Some(s),
            _ => None,
        })
        .next_back()
        .expect("debug summary present")
}

fn debug_records<'a>(messages: &'a [OutputMessage], event: &str) -> Vec<&'a Value> {
    messages
        .iter()
        .filter_map(|m| match m {
            OutputMessage::Debug(record) if record["event"] == event => Some(record),
            _ => None,
        })
        .collect()
}

const LINEAR_CHAT: &str = r#"{
    "type": "chat",
    "debug": true,
    "nodes": [
        {"id": "in",   "type": "user_input"},
        {"id": "sys",  "type": "text", "data": {"text": "You are terse."}},
        {"id": "cli",  "type": "client", "data": {"provider": "fake", "chunks": ["Hel", "lo", "!"]}},
        {"id": "chat", "type": "chat"},
        {"id": "llm",  "type": "llm"},
        {"id": "out",  "type": "end"}
    ],
    "edges": [
        {"source": "sys",  "sourceHandle": "end", "target": "chat", "targetHandle": "system"},
        {"source": "in",   "sourceHandle": "handle_user_message", "target": "chat", "targetHandle": "user"},
        {"source": "cli",  "sourceHandle": "end", "target": "llm", "targetHandle": "handle-client-provider"},
        {"source": "chat", "sourceHandle": "end", "target": "llm", "targetHandle": "handle-chat"},
        {"source": "llm",  "sourceHandle": "end", "target": "out", "targetHandle": "message"}
    ]
}"#;

#[tokio::test]
async fn linear_chat_streams_chunks_in_order() {
    let messages = run(LINEAR_CHAT, "Hi").await;

    assert_eq!(content_texts(&messages), vec!["Hel", "lo", "!"]);

    let summary = summary(&messages);
    assert_eq!(summary.executed.len(), 6);
    assert!(summary.bypassed.is_empty());
    assert_eq!(summary.error_count, 0);
    for id in ["in", "sys", "cli", "chat", "llm", "out"] {
        assert!(summary.executed.iter().any(|e| e == id), "missing {}", id);
    }
}

#[tokio::test]
async fn executing_a_pure_graph_twice_yields_identical_streams() {
    let first = content_texts(&run(LINEAR_CHAT, "Hi").await);
    let second = content_texts(&run(LINEAR_CHAT, "Hi").await);
    assert_eq!(first, second);
}

const CONDITIONAL_SPLIT: &str = r#"{
    "type": "split",
    "debug": true,
    "nodes": [
        {"id": "in",   "type": "user_input"},
        {"id": "cond", "type": "conditional",
         "data": {"condition": "{% if age >= 18 %}adult{% else %}minor{% endif %}"}},
        {"id": "text_adult", "type": "text", "data": {"text": "grown up"}},
        {"id": "text_minor", "type": "text", "data": {"text": "still young"}},
        {"id": "end_a", "type": "end"},
        {"id": "end_m", "type": "end"}
    ],
    "edges": [
        {"source": "in", "sourceHandle": "handle_user_message", "target": "cond", "targetHandle": "data"},
        {"source": "cond", "sourceHandle": "adult", "target": "text_adult", "targetHandle": "trigger"},
        {"source": "cond", "sourceHandle": "minor", "target": "text_minor", "targetHandle": "trigger"},
        {"source": "text_adult", "sourceHandle": "end", "target": "end_a", "targetHandle": "message"},
        {"source": "text_minor", "sourceHandle": "end", "target": "end_m", "targetHandle": "message"}
    ]
}"#;

#[tokio::test]
async fn conditional_executes_only_the_selected_branch() {
    let messages = run(CONDITIONAL_SPLIT, r#"{"age": 16}"#).await;

    let summary = summary(&messages);
    assert_eq!(summary.executed.len(), 4);
    assert!(summary.executed.iter().any(|e| e == "text_minor"));
    assert!(summary.executed.iter().any(|e| e == "end_m"));

    assert_eq!(summary.bypassed.len(), 2);
    assert!(summary.bypassed.iter().any(|e| e == "text_adult"));
    assert!(summary.bypassed.iter().any(|e| e == "end_a"));

    // Bypassed nodes still appear in per-node debug output.
    let ends = debug_records(&messages, "node_end");
    assert!(ends
        .iter()
        .any(|r| r["node"] == "text_adult" && r["state"]["was_bypassed"] == true));
}

const LOOP_AGGREGATION: &str = r#"{
    "type": "looped",
    "debug": true,
    "nodes": [
        {"id": "in", "type": "user_input"},
        {"id": "lp", "type": "loop"},
        {"id": "item_parser", "type": "parser",
         "data": {"template": "Item: {{ item }}", "iterate": true}},
        {"id": "agg_parser", "type": "parser",
         "data": {"template": "Count: {{ results | length }}"}},
        {"id": "out", "type": "end"}
    ],
    "edges": [
        {"source": "in", "sourceHandle": "handle_user_message", "target": "lp", "targetHandle": "list"},
        {"source": "lp", "sourceHandle": "content", "target": "item_parser", "targetHandle": "item"},
        {"source": "item_parser", "sourceHandle": "end", "target": "lp", "targetHandle": "loop"},
        {"source": "lp", "sourceHandle": "end", "target": "agg_parser", "targetHandle": "results"},
        {"source": "agg_parser", "sourceHandle": "end", "target": "out", "targetHandle": "message"}
    ]
}"#;

#[tokio::test]
async fn loop_replays_iteration_subgraph_per_item() {
    let messages = run(LOOP_AGGREGATION, r#"["a","b","c"]"#).await;

    // One content chunk per element, in order.
    assert_eq!(
        content_texts(&messages),
        vec!["Item: a", "Item: b", "Item: c"]
    );

    // The aggregation parser saw the accumulated list exactly once.
    let ends = debug_records(&messages, "node_end");
    let agg = ends
        .iter()
        .find(|r| r["node"] == "agg_parser")
        .expect("aggregation parser ran");
    assert_eq!(agg["state"]["outputs"]["end"], "Count: 3");

    let out = ends.iter().find(|r| r["node"] == "out").expect("end ran");
    assert_eq!(out["state"]["inputs"]["message"], "Count: 3");

    // The iterating parser re-ran per element: its last output is the
    // final item, and the loop's end output carries all three results.
    let item = ends
        .iter()
        .filter(|r| r["node"] == "item_parser")
        .next_back()
        .unwrap();
    assert_eq!(item["state"]["outputs"]["end"], "Item: c");
    let lp = ends.iter().find(|r| r["node"] == "lp").unwrap();
    assert_eq!(
        lp["state"]["outputs"]["end"],
        serde_json::json!(["Item: a", "Item: b", "Item: c"])
    );
}

#[tokio::test]
async fn empty_list_skips_iteration_and_aggregates_empty() {
    let messages = run(LOOP_AGGREGATION, "[]").await;

    assert!(content_texts(&messages).is_empty());

    let ends = debug_records(&messages, "node_end");
    let agg = ends.iter().find(|r| r["node"] == "agg_parser").unwrap();
    assert_eq!(agg["state"]["outputs"]["end"], "Count: 0");
    // The iteration parser never ran.
    assert!(ends.iter().all(|r| r["node"] != "item_parser"));
}

#[tokio::test]
async fn non_list_loop_input_is_a_data_error() {
    let messages = run(LOOP_AGGREGATION, r#"{"not": "a list"}"#).await;

    let errors = debug_records(&messages, "node_error");
    assert!(errors
        .iter()
        .any(|r| r["node"] == "lp" && r["kind"] == "data"));
    assert!(content_texts(&messages).is_empty());
}

#[tokio::test]
async fn duplicate_edges_surface_as_validation_debug_events() {
    let spec = r#"{
        "type": "dup",
        "debug": true,
        "nodes": [
            {"id": "a", "type": "user_input"},
            {"id": "b", "type": "end"}
        ],
        "edges": [
            {"source": "a", "sourceHandle": "out", "target": "b", "targetHandle": "in"},
            {"source": "a", "sourceHandle": "out", "target": "b", "targetHandle": "in"}
        ]
    }"#;
    let messages = run(spec, "Hi").await;

    let validations = debug_records(&messages, "validation");
    assert_eq!(validations.len(), 1);
    let offenders = validations[0]["offenders"].as_array().unwrap();
    assert_eq!(offenders.len(), 2);

    // Execution still ran; nothing streamed.
    assert!(content_texts(&messages).is_empty());
    assert!(summary(&messages).executed.iter().any(|e| e == "a"));
}

#[tokio::test]
async fn nested_inner_surfaces_the_nested_stream_on_the_outer_graph() {
    let spec = format!(
        r#"{{
            "type": "outer",
            "debug": true,
            "nodes": [
                {{"id": "in", "type": "user_input"}},
                {{"id": "sub", "type": "inner", "magic_flow": {}}},
                {{"id": "out", "type": "end"}}
            ],
            "edges": [
                {{"source": "in", "sourceHandle": "handle_user_message",
                  "target": "sub", "targetHandle": "message"}},
                {{"source": "sub", "sourceHandle": "execution_content",
                  "target": "out", "targetHandle": "message"}}
            ]
        }}"#,
        LINEAR_CHAT
    );
    let messages = run(&spec, "Hi").await;

    // The nested chat's chunks arrive on the outer stream.
    assert_eq!(content_texts(&messages), vec!["Hel", "lo", "!"]);

    // The aggregated nested content landed on the outer end node.
    let ends = debug_records(&messages, "node_end");
    let out = ends.iter().find(|r| r["node"] == "out").unwrap();
    assert_eq!(out["state"]["inputs"]["message"], "Hello!");

    // Debug shows both graphs.
    let starts = debug_records(&messages, "graph_start");
    assert_eq!(starts.len(), 2);
    let names: Vec<&str> = starts.iter().filter_map(|r| r["graph"].as_str()).collect();
    assert!(names.contains(&"outer"));
    assert!(names.contains(&"chat"));

    // One summary, for the host graph.
    let summaries: Vec<_> = messages
        .iter()
        .filter(|m| matches!(m, OutputMessage::DebugSummary(_)))
        .collect();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summary(&messages).graph, "outer");
}

const MERGE_CONVERGENCE: &str = r#"{
    "type": "merge",
    "debug": true,
    "nodes": [
        {"id": "in", "type": "user_input"},
        {"id": "cond", "type": "conditional",
         "data": {"condition": "{% if pick == 'a' %}branch_a{% else %}branch_b{% endif %}"}},
        {"id": "merge", "type": "parser",
         "data": {"template": "{% if input_a %}from-a{% else %}from-b{% endif %}"}},
        {"id": "out", "type": "end"}
    ],
    "edges": [
        {"source": "in", "sourceHandle": "handle_user_message", "target": "cond", "targetHandle": "data"},
        {"source": "cond", "sourceHandle": "branch_a", "target": "merge", "targetHandle": "input_a"},
        {"source": "cond", "sourceHandle": "branch_b", "target": "merge", "targetHandle": "input_b"},
        {"source": "merge", "sourceHandle": "end", "target": "out", "targetHandle": "message"}
    ]
}"#;

#[tokio::test]
async fn merge_node_runs_with_one_live_and_one_bypassed_parent() {
    let messages = run(MERGE_CONVERGENCE, r#"{"pick": "a"}"#).await;

    let summary = summary(&messages);
    assert!(summary.executed.iter().any(|e| e == "merge"));
    assert!(summary.executed.iter().any(|e| e == "out"));
    assert!(summary.bypassed.is_empty());

    let ends = debug_records(&messages, "node_end");
    let merge = ends.iter().find(|r| r["node"] == "merge").unwrap();
    // input_b never arrived; the template read it as absent.
    assert!(merge["state"]["inputs"].get("input_b").is_none());
    assert_eq!(merge["state"]["outputs"]["end"], "from-a");
}

#[tokio::test]
async fn routing_miss_bypasses_all_conditional_outputs() {
    let spec = r#"{
        "type": "misroute",
        "debug": true,
        "nodes": [
            {"id": "in", "type": "user_input"},
            {"id": "cond", "type": "conditional", "data": {"condition": "nowhere"}},
            {"id": "t", "type": "text", "data": {"text": "unreachable"}},
            {"id": "out", "type": "end"}
        ],
        "edges": [
            {"source": "in", "sourceHandle": "handle_user_message", "target": "cond", "targetHandle": "data"},
            {"source": "cond", "sourceHandle": "somewhere", "target": "t", "targetHandle": "trigger"},
            {"source": "t", "sourceHandle": "end", "target": "out", "targetHandle": "message"}
        ]
    }"#;
    let messages = run(spec, "anything").await;

    let errors = debug_records(&messages, "node_error");
    assert!(errors
        .iter()
        .any(|r| r["node"] == "cond" && r["kind"] == "routing"));

    let summary = summary(&messages);
    assert!(summary.bypassed.iter().any(|e| e == "t"));
    assert!(summary.bypassed.iter().any(|e| e == "out"));
}

#[tokio::test]
async fn cycles_terminate_with_a_deadlock_event() {
    let spec = r#"{
        "type": "cyclic",
        "debug": true,
        "nodes": [
            {"id": "in", "type": "user_input"},
            {"id": "a", "type": "text", "data": {"text": "a"}},
            {"id": "b", "type": "text", "data": {"text": "b"}}
        ],
        "edges": [
            {"source": "in", "sourceHandle": "handle_user_message", "target": "a", "targetHandle": "seed"},
            {"source": "a", "sourceHandle": "end", "target": "b", "targetHandle": "from_a"},
            {"source": "b", "sourceHandle": "end", "target": "a", "targetHandle": "from_b"}
        ]
    }"#;
    let messages = run(spec, "Hi").await;

    let deadlocks = debug_records(&messages, "deadlock");
    assert_eq!(deadlocks.len(), 1);
    assert!(!deadlocks[0]["remaining_edges"].as_array().unwrap().is_empty());

    // Neither cycle member executed; both are unreached, so the summary
    // omits them.
    let summary = summary(&messages);
    assert!(summary.executed.iter().all(|e| e != "a" && e != "b"));
    assert!(summary.bypassed.is_empty());
}

#[tokio::test]
async fn node_failures_stall_their_subtree_without_killing_the_run() {
    // The text node is misconfigured (no text); its dependents never run,
    // but the graph still terminates and reports.
    let spec = r#"{
        "type": "failing",
        "debug": true,
        "nodes": [
            {"id": "in", "type": "user_input"},
            {"id": "broken", "type": "text"},
            {"id": "after", "type": "end"},
            {"id": "ok", "type": "end"}
        ],
        "edges": [
            {"source": "in", "sourceHandle": "handle_user_message", "target": "ok", "targetHandle": "message"},
            {"source": "in", "sourceHandle": "end", "target": "broken", "targetHandle": "seed"},
            {"source": "broken", "sourceHandle": "end", "target": "after", "targetHandle": "message"}
        ]
    }"#;
    let messages = run(spec, "Hi").await;

    let errors = debug_records(&messages, "node_error");
    assert!(errors
        .iter()
        .any(|r| r["node"] == "broken" && r["kind"] == "config"));

    let summary = summary(&messages);
    // The healthy branch completed.
    assert!(summary.executed.iter().any(|e| e == "ok"));
    // The broken node is executed (its failure was captured); its
    // dependent never became ready.
    assert!(summary.executed.iter().any(|e| e == "broken"));
    assert!(summary.executed.iter().all(|e| e != "after"));
}

#[tokio::test]
async fn cancellation_stops_execution_but_still_closes_the_stream() {
    let spec = FlowSpec::from_json(LINEAR_CHAT).unwrap();
    let graph = build(&spec, &BuildOptions::message("Hi"));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut stream = execute(graph, ExecuteOptions::default().with_cancel(cancel));

    let mut messages = Vec::new();
    while let Some(message) = stream.next().await {
        messages.push(message);
    }

    assert!(content_texts(&messages).is_empty());
    // The final graph_end event is still emitted.
    assert_eq!(debug_records(&messages, "graph_end").len(), 1);
    assert!(summary(&messages).executed.is_empty());
}

#[tokio::test]
async fn unkeyed_outputs_flow_into_the_sink() {
    let spec = r#"{
        "type": "sinky",
        "debug": true,
        "nodes": [
            {"id": "in", "type": "user_input"},
            {"id": "t", "type": "text", "data": {"text": "ignored"}}
        ],
        "edges": [
            {"source": "in", "sourceHandle": "handle_user_message", "target": "t", "targetHandle": "seed"},
            {"source": "t", "sourceHandle": "end", "target": "t"}
        ]
    }"#;
    let messages = run(spec, "Hi").await;

    let summary = summary(&messages);
    // in, t, and the injected sink all executed.
    assert_eq!(summary.executed.len(), 3);
    assert!(summary.error_count == 0);
}
