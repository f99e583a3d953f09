//! Action handler trait, dynamic dispatch wrapper, and handler registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use salvo_capabilities::{ExecutionEnvironment, HttpClient, MailTransport};
use salvo_script::{Action, ActionType};
use salvo_types::{ActionOutcome, Result, Store};

// ---------------------------------------------------------------------------
// HandlerContext
// ---------------------------------------------------------------------------

/// Everything a handler may touch while executing one action.
#[derive(Clone)]
pub struct HandlerContext {
    pub store: Store,
    pub env: Arc<dyn ExecutionEnvironment>,
    pub http: HttpClient,
    pub mailer: Arc<dyn MailTransport>,
    /// Bound for any external call the handler makes.
    pub timeout: Duration,
    /// When set, handlers with side effects log instead of acting.
    pub dry_run: bool,
}

// ---------------------------------------------------------------------------
// ActionHandler trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// The action type this handler serves.
    fn action_type(&self) -> ActionType;

    /// Execute an already-rendered action.
    ///
    /// Errors are reported by the dispatcher as a failed action; they never
    /// abort the run.
    async fn execute(&self, action: &Action, ctx: &HandlerContext) -> Result<ActionOutcome>;
}

// ---------------------------------------------------------------------------
// DynHandler: object-safe wrapper
// ---------------------------------------------------------------------------

pub struct DynHandler(Box<dyn ActionHandler>);

impl DynHandler {
    pub fn new(handler: impl ActionHandler + 'static) -> Self {
        Self(Box::new(handler))
    }

    pub fn action_type(&self) -> ActionType {
        self.0.action_type()
    }

    pub async fn execute(&self, action: &Action, ctx: &HandlerContext) -> Result<ActionOutcome> {
        self.0.execute(action, ctx).await
    }
}

// ---------------------------------------------------------------------------
// HandlerRegistry
// ---------------------------------------------------------------------------

pub struct HandlerRegistry {
    handlers: HashMap<ActionType, DynHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler, replacing any handler already serving its type.
    pub fn register(&mut self, handler: impl ActionHandler + 'static) {
        let t = handler.action_type();
        self.handlers.insert(t, DynHandler::new(handler));
    }

    pub fn get(&self, action_type: ActionType) -> Option<&DynHandler> {
        self.handlers.get(&action_type)
    }

    pub fn has(&self, action_type: ActionType) -> bool {
        self.handlers.contains_key(&action_type)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Default registry factory
// ---------------------------------------------------------------------------

pub fn default_registry() -> HandlerRegistry {
    let mut reg = HandlerRegistry::new();
    reg.register(crate::handlers::ShellHandler);
    reg.register(crate::handlers::HttpHandler);
    reg.register(crate::handlers::WriteFileHandler);
    reg.register(crate::handlers::UpdateFileHandler);
    reg.register(crate::handlers::EmailHandler);
    reg.register(crate::handlers::SetVariableHandler);
    reg.register(crate::handlers::PrintHandler);
    reg.register(crate::handlers::ReplaceTextHandler);
    reg
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned;

    #[async_trait]
    impl ActionHandler for Canned {
        fn action_type(&self) -> ActionType {
            ActionType::PrintMessage
        }

        async fn execute(&self, _action: &Action, _ctx: &HandlerContext) -> Result<ActionOutcome> {
            Ok(ActionOutcome::data(serde_json::json!("canned")))
        }
    }

    #[test]
    fn default_registry_covers_every_type() {
        let reg = default_registry();
        for t in ActionType::ALL {
            assert!(reg.has(t), "missing handler for {}", t);
            assert_eq!(reg.get(t).map(|h| h.action_type()), Some(t));
        }
        assert_eq!(reg.len(), ActionType::ALL.len());
    }

    #[test]
    fn register_replaces_existing_handler() {
        let mut reg = default_registry();
        reg.register(Canned);
        assert_eq!(reg.len(), ActionType::ALL.len());
        assert!(reg.has(ActionType::PrintMessage));
    }

    #[test]
    fn empty_registry() {
        let reg = HandlerRegistry::new();
        assert!(reg.is_empty());
        assert!(reg.get(ActionType::SendEmail).is_none());
    }
}
