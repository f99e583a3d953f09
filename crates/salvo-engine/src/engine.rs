//! Script execution engine: the operation scheduler loop.
//!
//! Lifecycle: validate, seed the store, merge preloads, then drive every
//! operation in declared order. Within an operation each iteration runs the
//! action list through the [`Dispatcher`], strictly one action at a time.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use salvo_capabilities::{ExecutionEnvironment, HttpClient, LocalExecutionEnvironment, MailTransport, SmtpMailer};
use salvo_script::{load_preload, Operation, Script};
use salvo_types::{Result, Store};
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

use crate::dispatcher::{ActionRecord, ActionStatus, Dispatcher};
use crate::events::{EventEmitter, RunEvent};
use crate::handler::{default_registry, HandlerContext, HandlerRegistry};
use crate::iteration::resolve_iterations;
use crate::schedule::{delay_until, resolve_run_at};
use crate::template::render;
use crate::validation::validate_or_raise;

pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(300);

/// Placeholder credential seeded into every run.
pub const ACCESS_TOKEN_PLACEHOLDER: &str = "TEMPORARY_TOKEN";

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Drives scripts to completion. Owns the handler registry and the external
/// collaborators handed to handlers.
pub struct ScriptRunner {
    registry: HandlerRegistry,
    events: EventEmitter,
    http: HttpClient,
    mailer: Arc<dyn MailTransport>,
    env: Option<Arc<dyn ExecutionEnvironment>>,
}

/// Configuration for a script run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Base for relative file paths, preloads, directory iteration and shell commands.
    pub working_dir: PathBuf,
    /// Bound on every external capability call.
    pub action_timeout: Duration,
    pub dry_run: bool,
}

impl RunConfig {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            ..Self::default()
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("."),
            action_timeout: DEFAULT_ACTION_TIMEOUT,
            dry_run: false,
        }
    }
}

/// The result of a completed script run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub script: String,
    pub actions: Vec<ActionRecord>,
    pub final_store: HashMap<String, Value>,
    pub duration_ms: u64,
}

impl RunReport {
    fn count(&self, pred: impl Fn(&ActionStatus) -> bool) -> usize {
        self.actions.iter().filter(|r| pred(&r.status)).count()
    }

    pub fn completed(&self) -> usize {
        self.count(|s| {
            matches!(
                s,
                ActionStatus::CompletedWithData | ActionStatus::CompletedWithoutData
            )
        })
    }

    pub fn with_data(&self) -> usize {
        self.count(|s| matches!(s, ActionStatus::CompletedWithData))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, ActionStatus::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(ActionStatus::is_failed)
    }

    /// One-line summary for terminal output.
    pub fn summary(&self) -> String {
        format!(
            "{}: {} actions ({} completed, {} with data, {} skipped, {} failed) in {}ms",
            self.script,
            self.actions.len(),
            self.completed(),
            self.with_data(),
            self.skipped(),
            self.failed(),
            self.duration_ms
        )
    }
}

// ---------------------------------------------------------------------------
// ScriptRunner
// ---------------------------------------------------------------------------

impl ScriptRunner {
    /// Create a runner with the given handler registry.
    pub fn new(registry: HandlerRegistry) -> Self {
        Self {
            registry,
            events: EventEmitter::default(),
            http: HttpClient::new(),
            mailer: Arc::new(SmtpMailer),
            env: None,
        }
    }

    /// Create a runner pre-loaded with the default built-in handlers.
    pub fn with_default_registry() -> Self {
        Self::new(default_registry())
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn MailTransport>) -> Self {
        self.mailer = mailer;
        self
    }

    pub fn with_http_client(mut self, http: HttpClient) -> Self {
        self.http = http;
        self
    }

    /// Use `env` instead of a local environment rooted at the working directory.
    pub fn with_environment(mut self, env: Arc<dyn ExecutionEnvironment>) -> Self {
        self.env = Some(env);
        self
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    /// Validate and run `script` to completion.
    ///
    /// Only load and validation problems are returned as errors; anything that
    /// goes wrong inside an action is recorded in the report and the run
    /// carries on.
    pub async fn run(&self, script: &Script, config: &RunConfig) -> Result<RunReport> {
        validate_or_raise(script)?;

        let start = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let env: Arc<dyn ExecutionEnvironment> = match &self.env {
            Some(env) => env.clone(),
            None => Arc::new(LocalExecutionEnvironment::new(&config.working_dir)),
        };

        let store = Store::new();
        seed_store(&store, &config.working_dir).await;
        for preload in &script.preloads {
            let path = resolve_path(&config.working_dir, preload);
            let values = load_preload(&path)?;
            tracing::info!(preload = %path.display(), keys = values.len(), "Merged preload");
            store.merge(values).await;
        }

        tracing::info!(script = %script.name, run_id = %run_id, operations = script.operations.len(), "Starting run");
        self.events.emit(RunEvent::RunStarted {
            run_id: run_id.clone(),
            script: script.name.clone(),
            operation_count: script.operations.len(),
        });

        let ctx = HandlerContext {
            store: store.clone(),
            env,
            http: self.http.clone(),
            mailer: self.mailer.clone(),
            timeout: config.action_timeout,
            dry_run: config.dry_run,
        };
        let dispatcher = Dispatcher {
            registry: &self.registry,
            ctx: &ctx,
            events: &self.events,
        };

        let mut records = Vec::new();
        for (index, operation) in script.operations.iter().enumerate() {
            self.run_operation(operation, index, &dispatcher, &mut records)
                .await;
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(script = %script.name, actions = records.len(), duration_ms, "Run completed");
        self.events.emit(RunEvent::RunCompleted {
            run_id: run_id.clone(),
            script: script.name.clone(),
            actions: records.len(),
            duration_ms,
        });

        Ok(RunReport {
            run_id,
            script: script.name.clone(),
            actions: records,
            final_store: store.snapshot().await,
            duration_ms,
        })
    }

    async fn run_operation(
        &self,
        operation: &Operation,
        index: usize,
        dispatcher: &Dispatcher<'_>,
        records: &mut Vec<ActionRecord>,
    ) {
        let start = Instant::now();
        let store = &dispatcher.ctx.store;
        tracing::info!(operation = %operation.name, index, "Starting operation");
        self.events.emit(RunEvent::OperationStarted {
            operation: operation.name.clone(),
            index,
        });

        let bindings = store.snapshot().await;
        let waited = match &operation.run_at {
            Some(run_at) => wait_for_run_at(&render(run_at, &bindings), &operation.name).await,
            None => false,
        };
        if !waited {
            sleep_for(operation.pre_delay_op).await;
        }

        let bindings = store.snapshot().await;
        let plan = resolve_iterations(&operation.iterations, &bindings, dispatcher.ctx.env.as_ref()).await;
        for iteration in 0..plan.len() {
            let binding = plan.binding(iteration);
            if let Some((name, value)) = binding {
                store.set(name, value.clone()).await;
            }
            tracing::info!(operation = %operation.name, iteration, "Starting iteration");
            self.events.emit(RunEvent::IterationStarted {
                operation: operation.name.clone(),
                iteration,
                binding: binding.map(|(_, v)| v.clone()),
            });

            sleep_for(operation.pre_delay_loop).await;
            for action in &operation.actions {
                records.push(dispatcher.dispatch(action, &operation.name, iteration).await);
            }
            sleep_for(operation.post_delay_loop).await;
        }

        sleep_for(operation.post_delay_op).await;
        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(operation = %operation.name, iterations = plan.len(), duration_ms, "Operation completed");
        self.events.emit(RunEvent::OperationCompleted {
            operation: operation.name.clone(),
            iterations: plan.len(),
            duration_ms,
        });
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Seed the keys every run starts with.
async fn seed_store(store: &Store, working_dir: &Path) {
    store
        .set("datetimeRun", Value::from(chrono::Utc::now().timestamp_millis()))
        .await;
    store
        .set("access_token", Value::String(ACCESS_TOKEN_PLACEHOLDER.into()))
        .await;
    store
        .set("curDir", Value::String(working_dir.to_string_lossy().to_string()))
        .await;
}

fn resolve_path(base: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}

/// Sleep until a future `run_at`. Returns whether any waiting happened.
async fn wait_for_run_at(run_at: &Value, operation: &str) -> bool {
    let now = Local::now();
    match resolve_run_at(run_at, now) {
        Ok(target) => {
            let wait = delay_until(target, now);
            if wait.is_zero() {
                return false;
            }
            tracing::info!(operation = %operation, start_at = %target, "Waiting for scheduled start");
            tokio::time::sleep(wait).await;
            true
        }
        Err(e) => {
            tracing::warn!(operation = %operation, error = %e, "Unusable run_at; starting now");
            false
        }
    }
}

async fn sleep_for(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use salvo_types::SalvoError;
    use serde_json::json;

    fn script(value: Value) -> Script {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn seeds_store_and_merges_preloads() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("vars.json"), r#"{"base": "https://api", "access_token": "real"}"#).unwrap();
        let s = script(json!({"name": "seed", "preloads": ["vars.json"], "operations": []}));

        let report = ScriptRunner::with_default_registry()
            .run(&s, &RunConfig::new(dir.path()))
            .await
            .unwrap();
        assert_eq!(report.final_store["base"], json!("https://api"));
        assert_eq!(report.final_store["access_token"], json!("real"));
        assert!(report.final_store["datetimeRun"].is_i64());
        assert_eq!(
            report.final_store["curDir"],
            json!(dir.path().to_string_lossy())
        );
    }

    #[tokio::test]
    async fn missing_preload_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let s = script(json!({"name": "seed", "preloads": ["absent.json"], "operations": []}));
        let err = ScriptRunner::with_default_registry()
            .run(&s, &RunConfig::new(dir.path()))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn invalid_script_fails_before_running() {
        let dir = tempfile::tempdir().unwrap();
        let s = script(json!({
            "name": "bad",
            "operations": [{"name": "op", "actions": [
                {"name": "w", "type": "write-file", "values": {"fileLocation": "x.txt", "data": "x"}},
                {"name": "v", "type": "set-var", "values": {}}
            ]}]
        }));
        let err = ScriptRunner::with_default_registry()
            .run(&s, &RunConfig::new(dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, SalvoError::ValidationError(_)));
        assert!(!dir.path().join("x.txt").exists());
    }

    #[tokio::test]
    async fn past_run_at_then_pre_delay_op() {
        tokio::time::pause();
        let dir = tempfile::tempdir().unwrap();
        let s = script(json!({
            "name": "timed",
            "operations": [{
                "name": "op",
                "run_at": "2001-01-01T00:00:00Z",
                "pre_delay_op": "2s",
                "actions": [{"name": "v", "type": "set-var", "values": {"target": "ran", "data": true}}]
            }]
        }));
        let before = Instant::now();
        let report = ScriptRunner::with_default_registry()
            .run(&s, &RunConfig::new(dir.path()))
            .await
            .unwrap();
        assert!(before.elapsed() >= Duration::from_secs(2));
        assert_eq!(report.final_store["ran"], json!(true));
    }

    #[test]
    fn report_counts() {
        let record = |status| ActionRecord {
            operation: "op".into(),
            iteration: 0,
            action: "a".into(),
            action_type: "print-message".into(),
            status,
            duration_ms: 0,
        };
        let report = RunReport {
            run_id: "r".into(),
            script: "s".into(),
            actions: vec![
                record(ActionStatus::CompletedWithData),
                record(ActionStatus::CompletedWithoutData),
                record(ActionStatus::Skipped),
                record(ActionStatus::Failed { reason: "x".into() }),
            ],
            final_store: HashMap::new(),
            duration_ms: 5,
        };
        assert_eq!(report.completed(), 2);
        assert_eq!(report.with_data(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(
            report.summary(),
            "s: 4 actions (2 completed, 1 with data, 1 skipped, 1 failed) in 5ms"
        );
    }
}
