//! Per-action state machine.
//!
//! ```text
//! PENDING -> PRE_DELAY -> CONDITION_CHECK -> EXECUTING -> CAPTURE -> POST_DELAY -> DONE
//!                                |
//!                                +-> POST_DELAY -> SKIPPED
//! ```
//!
//! The action template is rendered against the store right before its
//! pre-delay; the template itself is never modified.

use std::fmt;
use std::time::Duration;

use salvo_script::Action;
use salvo_types::ActionOutcome;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::time::Instant;

use crate::capture::apply_captures;
use crate::condition::conditions_hold;
use crate::events::{EventEmitter, RunEvent};
use crate::expr::Bindings;
use crate::handler::{HandlerContext, HandlerRegistry};
use crate::template::render;

// ---------------------------------------------------------------------------
// State and result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionState {
    Pending,
    PreDelay,
    ConditionCheck,
    Executing,
    Capture,
    PostDelay,
    Done,
    Skipped,
}

/// How an action ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum ActionStatus {
    CompletedWithData,
    CompletedWithoutData,
    Skipped,
    Failed { reason: String },
}

impl ActionStatus {
    fn from_outcome(outcome: &ActionOutcome) -> Self {
        match outcome {
            ActionOutcome::Data { .. } => ActionStatus::CompletedWithData,
            ActionOutcome::NoData => ActionStatus::CompletedWithoutData,
            ActionOutcome::Failed { reason } => ActionStatus::Failed {
                reason: reason.clone(),
            },
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ActionStatus::Failed { .. })
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionStatus::CompletedWithData => write!(f, "completed with data"),
            ActionStatus::CompletedWithoutData => write!(f, "completed"),
            ActionStatus::Skipped => write!(f, "skipped"),
            ActionStatus::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub operation: String,
    pub iteration: usize,
    pub action: String,
    pub action_type: String,
    pub status: ActionStatus,
    pub duration_ms: u64,
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render_via_json<T: Serialize + DeserializeOwned + Clone>(item: &T, bindings: &Bindings) -> T {
    let rendered = serde_json::to_value(item)
        .map(|v| render(&v, bindings))
        .and_then(serde_json::from_value);
    match rendered {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "Rendered template no longer fits its shape; using it unrendered");
            item.clone()
        }
    }
}

/// Render an action's values, conditions and captures. Name, type, delays and
/// timeout are taken from the template as written.
pub fn render_action(template: &Action, bindings: &Bindings) -> Action {
    let mut action = template.clone();
    action.values = render(&template.values, bindings);
    action.conditions = render_via_json(&template.conditions, bindings);
    action.capture = render_via_json(&template.capture, bindings);
    action
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

pub struct Dispatcher<'a> {
    pub registry: &'a HandlerRegistry,
    pub ctx: &'a HandlerContext,
    pub events: &'a EventEmitter,
}

impl Dispatcher<'_> {
    fn enter(&self, operation: &str, action: &str, state: ActionState) {
        tracing::debug!(operation = %operation, action = %action, state = ?state, "Action state");
        self.events.emit(RunEvent::ActionStateChanged {
            operation: operation.to_string(),
            action: action.to_string(),
            state,
        });
    }

    /// Drive one action from `PENDING` to `DONE` or `SKIPPED`.
    pub async fn dispatch(&self, template: &Action, operation: &str, iteration: usize) -> ActionRecord {
        let start = Instant::now();
        let name = template.name.as_str();
        self.enter(operation, name, ActionState::Pending);

        let action = render_action(template, &self.ctx.store.snapshot().await);

        self.enter(operation, name, ActionState::PreDelay);
        sleep_for(action.pre_delay).await;

        self.enter(operation, name, ActionState::ConditionCheck);
        let run = action.conditions.is_empty()
            || conditions_hold(&action.conditions, &self.ctx.store.snapshot().await);

        let (status, terminal) = if run {
            self.enter(operation, name, ActionState::Executing);
            let outcome = self.execute(&action).await;

            if !action.capture.is_empty() {
                self.enter(operation, name, ActionState::Capture);
                match outcome.capture_payload() {
                    Some(payload) => {
                        let written = apply_captures(&action.capture, &payload, &self.ctx.store).await;
                        for captured in written {
                            self.events.emit(RunEvent::Captured {
                                action: name.to_string(),
                                target: captured.target,
                                value: captured.value,
                            });
                        }
                    }
                    None => {
                        tracing::debug!(action = %name, "Action failed; capture skipped");
                    }
                }
            }
            (ActionStatus::from_outcome(&outcome), ActionState::Done)
        } else {
            tracing::info!(operation = %operation, action = %name, "Conditions not met; skipping action");
            (ActionStatus::Skipped, ActionState::Skipped)
        };

        self.enter(operation, name, ActionState::PostDelay);
        sleep_for(action.post_delay).await;
        self.enter(operation, name, terminal);

        let record = ActionRecord {
            operation: operation.to_string(),
            iteration,
            action: name.to_string(),
            action_type: action.action_type.clone(),
            status,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        self.events.emit(RunEvent::ActionFinished {
            record: record.clone(),
        });
        record
    }

    async fn execute(&self, action: &Action) -> ActionOutcome {
        let Some(kind) = action.kind() else {
            tracing::warn!(action = %action.name, action_type = %action.action_type, "Unknown action type; nothing to do");
            return ActionOutcome::NoData;
        };
        let Some(handler) = self.registry.get(kind) else {
            tracing::warn!(action = %action.name, action_type = %kind, "No handler registered; nothing to do");
            return ActionOutcome::NoData;
        };

        let timeout = action.timeout.unwrap_or(self.ctx.timeout);
        let mut ctx = self.ctx.clone();
        ctx.timeout = timeout;

        tracing::info!(action = %action.name, action_type = %kind, "Executing action");
        match tokio::time::timeout(timeout, handler.execute(action, &ctx)).await {
            Ok(Ok(outcome)) => {
                if let ActionOutcome::Failed { reason } = &outcome {
                    tracing::warn!(action = %action.name, reason = %reason, "Action failed");
                }
                outcome
            }
            Ok(Err(e)) => {
                tracing::warn!(action = %action.name, error = %e, "Action failed");
                ActionOutcome::failed(e.to_string())
            }
            Err(_) => {
                tracing::warn!(action = %action.name, timeout_ms = timeout.as_millis() as u64, "Action timed out");
                ActionOutcome::failed(format!("timed out after {}ms", timeout.as_millis()))
            }
        }
    }
}

async fn sleep_for(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
