//! Run event system for observability.
//!
//! Emits [`RunEvent`]s via a [`tokio::sync::broadcast`] channel so that
//! observers (loggers, progress displays, tests) can follow a script run
//! without coupling to the engine internals.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dispatcher::{ActionRecord, ActionState};

/// Events emitted during a script run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RunEvent {
    RunStarted {
        run_id: String,
        script: String,
        operation_count: usize,
    },
    OperationStarted {
        operation: String,
        index: usize,
    },
    IterationStarted {
        operation: String,
        iteration: usize,
        binding: Option<Value>,
    },
    ActionStateChanged {
        operation: String,
        action: String,
        state: ActionState,
    },
    ActionFinished {
        record: ActionRecord,
    },
    Captured {
        action: String,
        target: String,
        value: Value,
    },
    OperationCompleted {
        operation: String,
        iterations: usize,
        duration_ms: u64,
    },
    RunCompleted {
        run_id: String,
        script: String,
        actions: usize,
        duration_ms: u64,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<RunEvent>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    pub fn emit(&self, event: RunEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}
