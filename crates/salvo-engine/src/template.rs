//! Token substitution over action templates.
//!
//! Two token families are recognised inside string values:
//!
//! - `}>}key{<{` is replaced by the display form of the store value under `key`.
//! - `}ev}expr{ev{` is replaced by the result of evaluating `expr` with the
//!   sandboxed expression language in [`crate::expr`].
//!
//! Rendering is pure: [`render`] returns a new value and never touches the
//! template or the bindings.

use salvo_types::value::display_string;
use serde_json::Value;

use crate::expr::{evaluate, Bindings};

pub const VAR_OPEN: &str = "}>}";
pub const VAR_CLOSE: &str = "{<{";
pub const EVAL_OPEN: &str = "}ev}";
pub const EVAL_CLOSE: &str = "{ev{";

/// Upper bound on replacements within one string.
pub const MAX_REWRITES: usize = 1000;

/// Render every string inside `template`, depth first. Non-string scalars and
/// mapping keys are copied unchanged.
pub fn render(template: &Value, bindings: &Bindings) -> Value {
    match template {
        Value::String(s) => Value::String(render_str(s, bindings)),
        Value::Array(items) => Value::Array(items.iter().map(|v| render(v, bindings)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render(v, bindings)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Render one string: variable tokens first, then evaluation tokens.
pub fn render_str(text: &str, bindings: &Bindings) -> String {
    if !has_tokens(text) {
        return text.to_string();
    }
    let substituted = rewrite(text, VAR_OPEN, VAR_CLOSE, |key| {
        bindings.get(key).map(display_string)
    });
    rewrite(&substituted, EVAL_OPEN, EVAL_CLOSE, |expr| {
        match evaluate(expr, bindings) {
            Ok(value) => Some(display_string(&value)),
            Err(e) => {
                tracing::warn!(expression = %expr, error = %e, "Leaving unevaluable expression in place");
                None
            }
        }
    })
}

/// True when `text` contains the opening delimiter of either token family.
pub fn has_tokens(text: &str) -> bool {
    text.contains(VAR_OPEN) || text.contains(EVAL_OPEN)
}

/// True when any string anywhere inside `value` contains a token.
pub fn value_has_tokens(value: &Value) -> bool {
    match value {
        Value::String(s) => has_tokens(s),
        Value::Array(items) => items.iter().any(value_has_tokens),
        Value::Object(map) => map.values().any(value_has_tokens),
        _ => false,
    }
}

/// Replace `open inner close` tokens innermost first.
///
/// The scan finds the first closing delimiter, then the nearest opening
/// delimiter before it, so nested tokens resolve from the inside out. When
/// `resolve` declines a token it is kept verbatim and the scan moves past it.
fn rewrite(
    text: &str,
    open: &str,
    close: &str,
    mut resolve: impl FnMut(&str) -> Option<String>,
) -> String {
    let mut out = text.to_string();
    let mut search_from = 0;
    let mut rewrites = 0;

    while rewrites < MAX_REWRITES {
        let Some(rel) = out[search_from..].find(close) else {
            break;
        };
        let close_at = search_from + rel;
        let after_close = close_at + close.len();

        let Some(open_at) = out[..close_at].rfind(open) else {
            search_from = after_close;
            continue;
        };
        let inner = &out[open_at + open.len()..close_at];

        match resolve(inner) {
            Some(replacement) => {
                out.replace_range(open_at..after_close, &replacement);
                rewrites += 1;
                search_from = open_at;
            }
            None => search_from = after_close,
        }
    }

    if rewrites >= MAX_REWRITES {
        tracing::warn!(limit = MAX_REWRITES, "Substitution stopped at the rewrite limit");
    }
    out
}
