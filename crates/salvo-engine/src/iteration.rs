//! Resolve an operation's `iterations` into a concrete plan.

use std::path::Path;

use salvo_capabilities::ExecutionEnvironment;
use salvo_script::{IterationSpec, IterationStrategy, Iterations};
use serde_json::Value;

use crate::expr::Bindings;
use crate::template::{render, render_str};

/// How many times an operation's actions run, and what each pass binds.
#[derive(Debug, Clone, PartialEq)]
pub enum IterationPlan {
    /// Run `n` times with nothing bound.
    Count(u64),
    /// Run once per item, binding it under `iteratee`.
    Each { iteratee: String, items: Vec<Value> },
}

impl IterationPlan {
    pub fn len(&self) -> usize {
        match self {
            IterationPlan::Count(n) => *n as usize,
            IterationPlan::Each { items, .. } => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The store binding for pass `index`, if this plan binds anything.
    pub fn binding(&self, index: usize) -> Option<(&str, &Value)> {
        match self {
            IterationPlan::Count(_) => None,
            IterationPlan::Each { iteratee, items } => {
                if iteratee.is_empty() {
                    return None;
                }
                items.get(index).map(|item| (iteratee.as_str(), item))
            }
        }
    }
}

/// Render and resolve `iterations` against the store as it is now.
///
/// Capability failures (an unreadable directory, a source that is not a list)
/// are logged and produce an empty plan; they never abort the run.
pub async fn resolve_iterations(
    iterations: &Iterations,
    bindings: &Bindings,
    env: &dyn ExecutionEnvironment,
) -> IterationPlan {
    match iterations {
        Iterations::Count(n) => IterationPlan::Count(*n),
        Iterations::Text(text) => {
            let rendered = render_str(text, bindings);
            match rendered.trim().parse::<u64>() {
                Ok(n) => IterationPlan::Count(n),
                Err(_) => {
                    tracing::warn!(iterations = %rendered, "Iteration count is not a non-negative integer; running once");
                    IterationPlan::Count(1)
                }
            }
        }
        Iterations::Spec(spec) => {
            let spec = render_spec(spec, bindings);
            let items = match spec.strategy {
                IterationStrategy::ForEachFile => list_files(&spec, env).await,
                IterationStrategy::ForEachInArray => array_items(&spec),
            };
            IterationPlan::Each {
                iteratee: spec.iteratee,
                items,
            }
        }
    }
}

fn render_spec(spec: &IterationSpec, bindings: &Bindings) -> IterationSpec {
    let rendered = serde_json::to_value(spec)
        .map(|v| render(&v, bindings))
        .and_then(serde_json::from_value);
    match rendered {
        Ok(spec) => spec,
        Err(e) => {
            tracing::warn!(error = %e, "Rendered iteration spec is malformed; using it unrendered");
            spec.clone()
        }
    }
}

async fn list_files(spec: &IterationSpec, env: &dyn ExecutionEnvironment) -> Vec<Value> {
    let Some(directory) = spec.directory.as_deref() else {
        tracing::warn!(iteratee = %spec.iteratee, "for-each-file without a directory; nothing to iterate");
        return Vec::new();
    };
    match env
        .list_directory(Path::new(directory), spec.pattern.as_deref())
        .await
    {
        Ok(entries) => entries
            .into_iter()
            .map(|e| Value::String(e.path.to_string_lossy().to_string()))
            .collect(),
        Err(e) => {
            tracing::warn!(directory = %directory, error = %e, "Cannot list directory; nothing to iterate");
            Vec::new()
        }
    }
}

/// A literal sequence, or a string holding a JSON-encoded sequence.
pub fn parse_source_array(source: &Value) -> Option<Vec<Value>> {
    match source {
        Value::Array(items) => Some(items.clone()),
        Value::String(text) => serde_json::from_str::<Vec<Value>>(text).ok(),
        _ => None,
    }
}

fn array_items(spec: &IterationSpec) -> Vec<Value> {
    let source = spec.source_array.as_ref().unwrap_or(&Value::Null);
    parse_source_array(source).unwrap_or_else(|| {
        tracing::warn!(iteratee = %spec.iteratee, source = %source, "sourceArray is not a list; nothing to iterate");
        Vec::new()
    })
}
