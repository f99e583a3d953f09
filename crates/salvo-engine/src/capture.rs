//! Write extracted values into the store after an action completes.

use salvo_script::{CaptureMode, CaptureSpec};
use salvo_types::Store;
use serde_json::{Map, Value};

use crate::extract::extract;

/// One store write made by a capture.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedValue {
    pub target: String,
    pub mode: CaptureMode,
    pub value: Value,
}

/// The value a single capture produces from `payload`: one extraction, or a
/// mapping with one extraction per field.
pub fn capture_value(spec: &CaptureSpec, payload: &Value) -> Value {
    if spec.fields.is_empty() {
        return extract(payload, &spec.extraction);
    }
    let mut fields = Map::new();
    for field in &spec.fields {
        fields.insert(field.key.clone(), extract(payload, &field.extraction));
    }
    Value::Object(fields)
}

/// Run every capture against `payload`, in order, and write the results.
pub async fn apply_captures(
    specs: &[CaptureSpec],
    payload: &Value,
    store: &Store,
) -> Vec<CapturedValue> {
    let mut written = Vec::with_capacity(specs.len());
    for spec in specs {
        if spec.target.trim().is_empty() {
            tracing::warn!("Skipping capture without a target");
            continue;
        }
        let value = capture_value(spec, payload);
        match spec.capture_type {
            CaptureMode::Replace => store.set(spec.target.clone(), value.clone()).await,
            CaptureMode::Append => {
                store.append(&spec.target, value.clone()).await;
            }
        }
        tracing::debug!(target = %spec.target, mode = ?spec.capture_type, "Captured value");
        written.push(CapturedValue {
            target: spec.target.clone(),
            mode: spec.capture_type,
            value,
        });
    }
    written
}
