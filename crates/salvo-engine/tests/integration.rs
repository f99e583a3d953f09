//! End-to-end integration tests for the Salvo script runner.
//!
//! Each test drives a whole script: parse -> validate -> seed store -> run
//! operations -> inspect the report and the final store.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::Instant;

use salvo_engine::{
    default_registry, validate, ActionHandler, ActionStatus, HandlerContext, HandlerRegistry,
    RunConfig, RunEvent, RunReport, ScriptRunner, Severity,
};
use salvo_script::{Action, ActionType, Script};
use salvo_types::{ActionOutcome, Result};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn script(value: Value) -> Script {
    serde_json::from_value(value).expect("script should deserialize")
}

/// Run `script` with the built-in handlers inside `dir`.
async fn run_in(dir: &std::path::Path, script: &Script) -> RunReport {
    ScriptRunner::with_default_registry()
        .run(script, &RunConfig::new(dir))
        .await
        .expect("run should succeed")
}

/// Answers print-message actions with their own values as data.
struct EchoValues;

#[async_trait]
impl ActionHandler for EchoValues {
    fn action_type(&self) -> ActionType {
        ActionType::PrintMessage
    }

    async fn execute(&self, action: &Action, _ctx: &HandlerContext) -> Result<ActionOutcome> {
        Ok(ActionOutcome::data(action.values.clone()))
    }
}

fn echo_registry() -> HandlerRegistry {
    let mut registry = default_registry();
    registry.register(EchoValues);
    registry
}

// ---------------------------------------------------------------------------
// Test 1: increment across iterations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn increment_accumulates_across_iterations() {
    let dir = tempfile::tempdir().unwrap();
    let s = script(json!({
        "name": "counter",
        "operations": [{
            "name": "count",
            "iterations": 2,
            "actions": [{"name": "inc", "type": "set-var",
                "values": {"target": "count", "value": 1, "op": "increment"}}]
        }]
    }));

    let report = run_in(dir.path(), &s).await;
    assert_eq!(report.final_store["count"], json!(2));
    assert_eq!(report.actions.len(), 2);
    assert_eq!(report.actions[1].iteration, 1);
}

// ---------------------------------------------------------------------------
// Test 2: substitution reads values written by earlier actions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn substitution_sees_earlier_writes() {
    let dir = tempfile::tempdir().unwrap();
    let s = script(json!({
        "name": "greeting",
        "operations": [{
            "name": "greet",
            "actions": [
                {"name": "word", "type": "set-var", "values": {"target": "greeting", "data": "hello"}},
                {"name": "msg", "type": "set-var",
                    "values": {"target": "msg", "data": "}>}greeting{<{ world"}},
                {"name": "file", "type": "write-file",
                    "values": {"fileLocation": "greeting.txt", "data": "}>}msg{<{"}}
            ]
        }]
    }));

    let report = run_in(dir.path(), &s).await;
    assert_eq!(report.final_store["msg"], json!("hello world"));
    let written = std::fs::read_to_string(dir.path().join("greeting.txt")).unwrap();
    assert_eq!(written, "hello world");
    assert_eq!(report.failed(), 0);
}

// ---------------------------------------------------------------------------
// Test 3: an iteration count runs the action list exactly that many times
// ---------------------------------------------------------------------------

#[tokio::test]
async fn iteration_count_is_exact() {
    let dir = tempfile::tempdir().unwrap();
    let s = script(json!({
        "name": "thrice",
        "operations": [
            {"name": "setup", "actions": [
                {"name": "n", "type": "set-var", "values": {"target": "times", "data": 3}}
            ]},
            {"name": "loop", "iterations": "}>}times{<{", "actions": [
                {"name": "tick", "type": "set-var", "values": {"target": "ticks", "value": "x", "op": "append"}}
            ]}
        ]
    }));

    let report = run_in(dir.path(), &s).await;
    assert_eq!(report.final_store["ticks"], json!(["x", "x", "x"]));
    let looped = report.actions.iter().filter(|r| r.operation == "loop").count();
    assert_eq!(looped, 3);
}

#[tokio::test]
async fn zero_iterations_run_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let s = script(json!({
        "name": "none",
        "operations": [{"name": "skip", "iterations": 0, "actions": [
            {"name": "v", "type": "set-var", "values": {"target": "ran", "data": true}}
        ]}]
    }));

    let report = run_in(dir.path(), &s).await;
    assert!(report.actions.is_empty());
    assert!(!report.final_store.contains_key("ran"));
}

// ---------------------------------------------------------------------------
// Test 4: for-each-in-array binds the iteratee per iteration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn for_each_in_array_binds_iteratee() {
    let dir = tempfile::tempdir().unwrap();
    let s = script(json!({
        "name": "each",
        "operations": [{
            "name": "letters",
            "iterations": {"type": "for-each-in-array", "iteratee": "x", "source": ["a", "b"]},
            "actions": [{"name": "seen", "type": "set-var",
                "values": {"target": "seen", "data": "}>}x{<{", "action": "append"}}]
        }]
    }));

    let report = run_in(dir.path(), &s).await;
    assert_eq!(report.final_store["seen"], json!(["a", "b"]));
    // The iteratee keeps its last binding after the loop.
    assert_eq!(report.final_store["x"], json!("b"));
}

// ---------------------------------------------------------------------------
// Test 5: for-each-file walks matching files in path order
// ---------------------------------------------------------------------------

#[tokio::test]
async fn for_each_file_visits_matching_files() {
    let dir = tempfile::tempdir().unwrap();
    let inbox = dir.path().join("in");
    std::fs::create_dir(&inbox).unwrap();
    std::fs::write(inbox.join("b.txt"), "b").unwrap();
    std::fs::write(inbox.join("a.txt"), "a").unwrap();
    std::fs::write(inbox.join("c.log"), "c").unwrap();

    let s = script(json!({
        "name": "files",
        "operations": [{
            "name": "walk",
            "iterations": {"type": "for-each-file", "iteratee": "f", "directory": "in", "pattern": "*.txt"},
            "actions": [{"name": "collect", "type": "set-var",
                "values": {"target": "files", "data": "}>}f{<{", "action": "append"}}]
        }]
    }));

    let report = run_in(dir.path(), &s).await;
    let files = report.final_store["files"].as_array().unwrap();
    assert_eq!(files.len(), 2);
    assert!(files[0].as_str().unwrap().ends_with("a.txt"));
    assert!(files[1].as_str().unwrap().ends_with("b.txt"));
}

// ---------------------------------------------------------------------------
// Test 6: a false condition skips the action but keeps its delays
// ---------------------------------------------------------------------------

#[tokio::test]
async fn false_condition_skips_but_still_delays() {
    tokio::time::pause();
    let dir = tempfile::tempdir().unwrap();
    let s = script(json!({
        "name": "gated",
        "operations": [{
            "name": "op",
            "actions": [
                {"name": "gated", "type": "set-var",
                    "post_delay": "3s",
                    "conditions": [{"type": "equals", "varName": "mode", "checkValue": "prod"}],
                    "values": {"target": "deployed", "data": true}},
                {"name": "after", "type": "set-var",
                    "conditions": ["datetimeRun > 0"],
                    "values": {"target": "after", "data": true}}
            ]
        }]
    }));

    let start = Instant::now();
    let report = run_in(dir.path(), &s).await;
    assert!(start.elapsed() >= Duration::from_secs(3));
    assert_eq!(report.actions[0].status, ActionStatus::Skipped);
    assert!(!report.final_store.contains_key("deployed"));
    assert_eq!(report.final_store["after"], json!(true));
}

// ---------------------------------------------------------------------------
// Test 7: append captures accumulate across iterations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn append_capture_accumulates() {
    let dir = tempfile::tempdir().unwrap();
    let s = script(json!({
        "name": "capture",
        "operations": [{
            "name": "collect",
            "iterations": {"type": "for-each-in-array", "iteratee": "n", "source": [1, 2]},
            "actions": [{
                "name": "echo",
                "type": "print-message",
                "values": {"text": "item", "id": "}>}n{<{"},
                "capture": [
                    {"type": "path", "source": "id", "captureType": "append", "target": "ids"},
                    {"type": "path", "source": "id", "forceType": "NUMBER", "target": "last"}
                ]
            }]
        }]
    }));

    let report = ScriptRunner::new(echo_registry())
        .run(&s, &RunConfig::new(dir.path()))
        .await
        .unwrap();
    assert_eq!(report.final_store["ids"], json!(["1", "2"]));
    assert_eq!(report.final_store["last"], json!(2));
    assert_eq!(report.with_data(), 2);
}

// ---------------------------------------------------------------------------
// Test 8: event stream brackets the run
// ---------------------------------------------------------------------------

#[tokio::test]
async fn events_follow_run_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let s = script(json!({
        "name": "events",
        "operations": [{
            "name": "op",
            "iterations": 2,
            "actions": [{
                "name": "echo",
                "type": "print-message",
                "values": {"text": "hi"},
                "capture": {"type": "path", "source": "text", "target": "said"}
            }]
        }]
    }));

    let runner = ScriptRunner::new(echo_registry());
    let mut rx = runner.events().subscribe();
    let report = runner.run(&s, &RunConfig::new(dir.path())).await.unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert!(matches!(events.first(), Some(RunEvent::RunStarted { operation_count: 1, .. })));
    assert!(matches!(events.last(), Some(RunEvent::RunCompleted { actions: 2, .. })));
    let iterations = events
        .iter()
        .filter(|e| matches!(e, RunEvent::IterationStarted { .. }))
        .count();
    assert_eq!(iterations, 2);
    let captured = events
        .iter()
        .filter(|e| matches!(e, RunEvent::Captured { target, .. } if target == "said"))
        .count();
    assert_eq!(captured, 2);
    assert_eq!(report.final_store["said"], json!("hi"));
}

// ---------------------------------------------------------------------------
// Test 9: a failing action does not stop the run
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_action_does_not_abort_run() {
    let dir = tempfile::tempdir().unwrap();
    let s = script(json!({
        "name": "resilient",
        "operations": [{
            "name": "op",
            "actions": [
                {"name": "boom", "type": "update-file",
                    "values": {"fileLocation": "missing.json", "fileType": "json",
                        "data": [{"path": "a", "value": 1}]},
                    "capture": {"target": "never"}},
                {"name": "after", "type": "set-var", "values": {"target": "after", "data": "ok"}}
            ]
        }]
    }));

    let report = run_in(dir.path(), &s).await;
    assert_eq!(report.failed(), 1);
    assert!(!report.final_store.contains_key("never"));
    assert_eq!(report.final_store["after"], json!("ok"));
}

// ---------------------------------------------------------------------------
// Test 10: validation reports every problem before anything runs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn validation_collects_errors() {
    let s = script(json!({
        "name": "",
        "operations": [{"name": "op", "actions": [
            {"name": "v", "type": "set-var", "values": {}},
            {"name": "c", "type": "print-message", "conditions": ["count >"]}
        ]}]
    }));

    let errors: Vec<_> = validate(&s)
        .into_iter()
        .filter(|d| d.severity == Severity::Error)
        .collect();
    assert!(errors.len() >= 3, "expected name, payload and condition errors: {errors:?}");
}
