//! Script validation: lint rules and diagnostics.
//!
//! Structural problems are reported before any operation runs. Call
//! [`validate`] for advisory diagnostics or [`validate_or_raise`] to fail on
//! any `Error`-severity issue.

use std::fmt;

use chrono::Local;
use regex::Regex;
use salvo_script::payload::check_payload;
use salvo_script::{Condition, ExtractionMethod, IterationStrategy, Iterations, Script};
use salvo_types::{Result, SalvoError};
use serde_json::Value;

use crate::expr::parse_expression;
use crate::iteration::parse_source_array;
use crate::schedule::resolve_run_at;
use crate::template::{has_tokens, value_has_tokens};

// ---------------------------------------------------------------------------
// Diagnostic types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub rule: String,
    pub severity: Severity,
    pub message: String,
    /// Where in the script, e.g. `operations[1].actions[0]`.
    pub location: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
            Severity::Info => f.write_str("info"),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.severity, self.rule)?;
        if let Some(location) = &self.location {
            write!(f, " {}", location)?;
        }
        write!(f, ": {}", self.message)
    }
}

// ---------------------------------------------------------------------------
// LintRule trait
// ---------------------------------------------------------------------------

pub trait LintRule: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, script: &Script) -> Vec<Diagnostic>;
}

fn diag(rule: &dyn LintRule, severity: Severity, location: Option<String>, message: String) -> Diagnostic {
    Diagnostic {
        rule: rule.name().into(),
        severity,
        message,
        location,
    }
}

fn op_loc(op: usize) -> String {
    format!("operations[{}]", op)
}

fn action_loc(op: usize, action: usize) -> String {
    format!("operations[{}].actions[{}]", op, action)
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

struct ScriptNameRule;
impl LintRule for ScriptNameRule {
    fn name(&self) -> &str { "script_name" }
    fn apply(&self, script: &Script) -> Vec<Diagnostic> {
        if script.name.trim().is_empty() {
            vec![diag(self, Severity::Error, None, "Script has an empty name".into())]
        } else {
            vec![]
        }
    }
}

struct OperationsPresentRule;
impl LintRule for OperationsPresentRule {
    fn name(&self) -> &str { "operations_present" }
    fn apply(&self, script: &Script) -> Vec<Diagnostic> {
        if script.operations.is_empty() {
            vec![diag(self, Severity::Warning, None, "Script has no operations; nothing will run".into())]
        } else {
            vec![]
        }
    }
}

struct ActionTypeKnownRule;
impl LintRule for ActionTypeKnownRule {
    fn name(&self) -> &str { "action_type_known" }
    fn apply(&self, script: &Script) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for (i, op) in script.operations.iter().enumerate() {
            for (j, action) in op.actions.iter().enumerate() {
                if action.kind().is_none() {
                    out.push(diag(
                        self,
                        Severity::Warning,
                        Some(action_loc(i, j)),
                        format!("Unknown action type '{}'; the action will do nothing", action.action_type),
                    ));
                }
            }
        }
        out
    }
}

struct ActionPayloadRule;
impl LintRule for ActionPayloadRule {
    fn name(&self) -> &str { "action_payload" }
    fn apply(&self, script: &Script) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for (i, op) in script.operations.iter().enumerate() {
            for (j, action) in op.actions.iter().enumerate() {
                let Some(kind) = action.kind() else { continue };
                if let Err(e) = check_payload(kind, &action.values) {
                    out.push(diag(
                        self,
                        Severity::Error,
                        Some(action_loc(i, j)),
                        format!("Values of '{}' do not fit a {} action: {}", action.name, kind, e),
                    ));
                }
            }
        }
        out
    }
}

struct IterationSpecRule;
impl LintRule for IterationSpecRule {
    fn name(&self) -> &str { "iteration_spec" }
    fn apply(&self, script: &Script) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for (i, op) in script.operations.iter().enumerate() {
            let Iterations::Spec(spec) = &op.iterations else { continue };
            let mut problem = |message: String| {
                out.push(diag(self, Severity::Error, Some(op_loc(i)), message));
            };
            if spec.iteratee.trim().is_empty() {
                problem(format!("{} in '{}' has an empty iteratee", spec.strategy, op.name));
            }
            match spec.strategy {
                IterationStrategy::ForEachFile => {
                    if spec.directory.as_deref().map_or(true, |d| d.trim().is_empty()) {
                        problem(format!("for-each-file in '{}' has no directory", op.name));
                    }
                }
                IterationStrategy::ForEachInArray => match &spec.source_array {
                    None | Some(Value::Null) => {
                        problem(format!("for-each-in-array in '{}' has no sourceArray", op.name));
                    }
                    Some(source) if !value_has_tokens(source) && parse_source_array(source).is_none() => {
                        problem(format!(
                            "sourceArray in '{}' is neither a list nor a JSON-encoded list",
                            op.name
                        ));
                    }
                    Some(_) => {}
                },
            }
        }
        out
    }
}

struct CaptureSpecRule;
impl LintRule for CaptureSpecRule {
    fn name(&self) -> &str { "capture_spec" }
    fn apply(&self, script: &Script) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for (i, op) in script.operations.iter().enumerate() {
            for (j, action) in op.actions.iter().enumerate() {
                for capture in &action.capture {
                    if capture.target.trim().is_empty() {
                        out.push(diag(
                            self,
                            Severity::Error,
                            Some(action_loc(i, j)),
                            format!("A capture on '{}' has an empty target", action.name),
                        ));
                    }
                    let extractions = std::iter::once(&capture.extraction)
                        .chain(capture.fields.iter().map(|f| &f.extraction));
                    for extraction in extractions {
                        if extraction.method != ExtractionMethod::Regex {
                            continue;
                        }
                        let Some(Value::String(pattern)) = &extraction.source else { continue };
                        if has_tokens(pattern) {
                            continue;
                        }
                        if let Err(e) = Regex::new(pattern) {
                            out.push(diag(
                                self,
                                Severity::Error,
                                Some(action_loc(i, j)),
                                format!("Capture pattern '{}' does not compile: {}", pattern, e),
                            ));
                        }
                    }
                }
            }
        }
        out
    }
}

struct ConditionExpressionRule;
impl LintRule for ConditionExpressionRule {
    fn name(&self) -> &str { "condition_expression" }
    fn apply(&self, script: &Script) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for (i, op) in script.operations.iter().enumerate() {
            for (j, action) in op.actions.iter().enumerate() {
                for condition in &action.conditions {
                    let Condition::Expression(src) = condition else { continue };
                    if has_tokens(src) {
                        continue;
                    }
                    if let Err(e) = parse_expression(src) {
                        out.push(diag(
                            self,
                            Severity::Error,
                            Some(action_loc(i, j)),
                            format!("Condition '{}' does not parse: {}", src, e),
                        ));
                    }
                }
            }
        }
        out
    }
}

struct RunAtRule;
impl LintRule for RunAtRule {
    fn name(&self) -> &str { "run_at" }
    fn apply(&self, script: &Script) -> Vec<Diagnostic> {
        let now = Local::now();
        script
            .operations
            .iter()
            .enumerate()
            .filter_map(|(i, op)| {
                let run_at = op.run_at.as_ref()?;
                if value_has_tokens(run_at) {
                    return None;
                }
                resolve_run_at(run_at, now).err().map(|e| {
                    diag(self, Severity::Error, Some(op_loc(i)), format!("run_at of '{}': {}", op.name, e))
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run all built-in lint rules and return collected diagnostics.
pub fn validate(script: &Script) -> Vec<Diagnostic> {
    let rules: Vec<Box<dyn LintRule>> = vec![
        Box::new(ScriptNameRule),
        Box::new(OperationsPresentRule),
        Box::new(ActionTypeKnownRule),
        Box::new(ActionPayloadRule),
        Box::new(IterationSpecRule),
        Box::new(CaptureSpecRule),
        Box::new(ConditionExpressionRule),
        Box::new(RunAtRule),
    ];

    let mut diagnostics = Vec::new();
    for rule in &rules {
        diagnostics.extend(rule.apply(script));
    }
    diagnostics
}

/// Run all lint rules; return `Err` if any `Error`-severity diagnostic found.
pub fn validate_or_raise(script: &Script) -> Result<Vec<Diagnostic>> {
    let diagnostics = validate(script);
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .collect();
    if !errors.is_empty() {
        let messages: Vec<_> = errors.iter().map(|d| d.message.clone()).collect();
        return Err(SalvoError::ValidationError(messages.join("; ")));
    }
    Ok(diagnostics)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
