//! Script execution engine, action handlers, and validation.
//!
//! This crate implements the Salvo operation runner: token substitution, the
//! sandboxed expression language, extraction and capture into the store,
//! conditions, the per-action state machine, the iteration controller,
//! `run_at` scheduling and the structural lint rules.

pub mod capture;
pub mod condition;
pub mod dispatcher;
pub mod engine;
pub mod events;
pub mod expr;
pub mod extract;
pub mod handler;
pub mod handlers;
pub mod iteration;
pub mod schedule;
pub mod template;
pub mod validation;

pub use capture::{apply_captures, capture_value, CapturedValue};
pub use condition::{conditions_hold, evaluate_condition};
pub use dispatcher::{render_action, ActionRecord, ActionState, ActionStatus, Dispatcher};
pub use engine::{RunConfig, RunReport, ScriptRunner, DEFAULT_ACTION_TIMEOUT};
pub use events::{EventEmitter, RunEvent};
pub use expr::{evaluate, parse_expression, Bindings, Expr};
pub use extract::{coerce, extract};
pub use handler::{default_registry, ActionHandler, DynHandler, HandlerContext, HandlerRegistry};
pub use handlers::{
    EmailHandler, HttpHandler, PrintHandler, ReplaceTextHandler, SetVariableHandler, ShellHandler,
    UpdateFileHandler, WriteFileHandler,
};
pub use iteration::{resolve_iterations, IterationPlan};
pub use schedule::{delay_until, resolve_run_at};
pub use template::{render, render_str};
pub use validation::{validate, validate_or_raise, Diagnostic, LintRule, Severity};
