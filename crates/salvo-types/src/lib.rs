//! Shared types, errors, store, and outcomes for the Salvo script runner.
//!
//! This crate provides the foundational types used across all other Salvo crates:
//! - `SalvoError`: unified error taxonomy
//! - `Store`: run-scoped key-value store shared by substitution, conditions and captures
//! - `ActionOutcome`: tri-state result of executing an action handler
//! - `value`: display, coercion and equality helpers over `serde_json::Value`

pub mod value;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unified error type for all Salvo subsystems.
#[derive(Debug, thiserror::Error)]
pub enum SalvoError {
    // === Load-time Errors ===
    #[error("Failed to parse script {path}: {message}")]
    ScriptParse { path: String, message: String },

    #[error("Script validation failed: {0}")]
    ValidationError(String),

    #[error("Failed to load preload '{source_path}': {message}")]
    Preload {
        source_path: String,
        message: String,
    },

    // === Run-time Errors ===
    #[error("Capability '{capability}' failed: {message}")]
    Capability { capability: String, message: String },

    #[error("Expression error: {0}")]
    Expression(String),

    #[error("Command timed out after {timeout_ms}ms")]
    CommandTimeout { timeout_ms: u64 },

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl SalvoError {
    /// Shorthand for a capability failure.
    pub fn capability(capability: impl Into<String>, message: impl Into<String>) -> Self {
        SalvoError::Capability {
            capability: capability.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if the error must abort the run before any operation executes.
    ///
    /// Everything raised while an action executes is demoted to a failed outcome
    /// by the dispatcher instead.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SalvoError::ScriptParse { .. }
                | SalvoError::ValidationError(_)
                | SalvoError::Preload { .. }
        )
    }
}

/// A convenience alias for `Result<T, SalvoError>`.
pub type Result<T> = std::result::Result<T, SalvoError>;

// ---------------------------------------------------------------------------
// Store: run-scoped key-value state
// ---------------------------------------------------------------------------

/// Run-scoped key-value store shared by every component of one script run.
///
/// Cloning a `Store` yields another handle to the **same** inner state. Keys are
/// never deleted; the last write wins. All writes go through the inner lock, so
/// a caller that runs iterations concurrently still gets serialized mutation.
#[derive(Clone)]
pub struct Store {
    inner: Arc<tokio::sync::RwLock<HashMap<String, Value>>>,
}

impl Store {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(tokio::sync::RwLock::new(HashMap::new())),
        }
    }

    /// Insert or overwrite a key.
    pub async fn set(&self, key: impl Into<String>, value: Value) {
        self.inner.write().await.insert(key.into(), value);
    }

    /// Read a value by key (cloned).
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().await.get(key).cloned()
    }

    /// Returns `true` if the key has ever been written.
    pub async fn contains(&self, key: &str) -> bool {
        self.inner.read().await.contains_key(key)
    }

    /// Push `value` onto the sequence stored under `key`.
    ///
    /// An absent key (or an explicit null) starts a new empty sequence. A scalar
    /// or mapping already stored under the key becomes the first element.
    /// Returns the new length of the sequence.
    pub async fn append(&self, key: &str, value: Value) -> usize {
        let mut guard = self.inner.write().await;
        let slot = guard.entry(key.to_string()).or_insert(Value::Null);
        match slot {
            Value::Array(items) => {
                items.push(value);
                items.len()
            }
            Value::Null => {
                *slot = Value::Array(vec![value]);
                1
            }
            _ => {
                tracing::warn!(key = %key, "Appending to a non-sequence value; wrapping it");
                let previous = slot.take();
                *slot = Value::Array(vec![previous, value]);
                2
            }
        }
    }

    /// Add `by` to the value under `key` and return the result.
    ///
    /// When either side is a string the two are concatenated. Otherwise both
    /// sides are coerced to numbers, with an absent key counting as zero.
    pub async fn increment(&self, key: &str, by: &Value) -> Value {
        let mut guard = self.inner.write().await;
        let current = guard.get(key).cloned().unwrap_or(Value::Null);
        let next = value::add(&current, by);
        guard.insert(key.to_string(), next.clone());
        next
    }

    /// Shallow copy of the current values map.
    pub async fn snapshot(&self) -> HashMap<String, Value> {
        self.inner.read().await.clone()
    }

    /// Merge `updates` into the store. Existing keys not present in `updates`
    /// are preserved.
    pub async fn merge(&self, updates: impl IntoIterator<Item = (String, Value)>) {
        let mut guard = self.inner.write().await;
        guard.extend(updates);
    }

    /// Number of keys currently stored.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// ActionOutcome: tri-state result of an action handler
// ---------------------------------------------------------------------------

/// What an action handler produced.
///
/// `Data` carries the payload that capture extracts from, plus optional
/// transport metadata (HTTP status and headers) that capture never sees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionOutcome {
    Data {
        payload: Value,
        transport: Option<Value>,
    },
    NoData,
    Failed {
        reason: String,
    },
}

impl ActionOutcome {
    /// A successful outcome carrying `payload`.
    pub fn data(payload: Value) -> Self {
        ActionOutcome::Data {
            payload,
            transport: None,
        }
    }

    /// A successful outcome carrying `payload` and transport metadata.
    pub fn with_transport(payload: Value, transport: Value) -> Self {
        ActionOutcome::Data {
            payload,
            transport: Some(transport),
        }
    }

    /// A failed outcome with the given reason.
    pub fn failed(reason: impl Into<String>) -> Self {
        ActionOutcome::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ActionOutcome::Failed { .. })
    }

    /// The payload capture should extract from: the data for `Data`, null for
    /// `NoData`, and nothing at all for `Failed`.
    pub fn capture_payload(&self) -> Option<Value> {
        match self {
            ActionOutcome::Data { payload, .. } => Some(payload.clone()),
            ActionOutcome::NoData => Some(Value::Null),
            ActionOutcome::Failed { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_display_script_parse() {
        let err = SalvoError::ScriptParse {
            path: "salvo.json".into(),
            message: "expected value at line 1".into(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to parse script salvo.json: expected value at line 1"
        );
    }

    #[test]
    fn error_display_capability() {
        let err = SalvoError::capability("http", "connection refused");
        assert_eq!(err.to_string(), "Capability 'http' failed: connection refused");
    }

    #[test]
    fn error_display_timeout() {
        let err = SalvoError::CommandTimeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "Command timed out after 5000ms");
    }

    #[test]
    fn fatal_errors_are_load_time_only() {
        assert!(SalvoError::ValidationError("bad".into()).is_fatal());
        assert!(SalvoError::Preload {
            source_path: "a.json".into(),
            message: "missing".into()
        }
        .is_fatal());
        assert!(!SalvoError::capability("shell", "boom").is_fatal());
        assert!(!SalvoError::Expression("x".into()).is_fatal());
        assert!(!SalvoError::CommandTimeout { timeout_ms: 1 }.is_fatal());
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: SalvoError = io_err.into();
        assert!(matches!(err, SalvoError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    // --- Store ---

    #[tokio::test]
    async fn store_set_and_get_round_trip() {
        let store = Store::new();
        store.set("key", json!("hello")).await;
        assert_eq!(store.get("key").await, Some(json!("hello")));
        assert_eq!(store.get("missing").await, None);
    }

    #[tokio::test]
    async fn store_clone_shares_state() {
        let store = Store::new();
        let handle = store.clone();
        handle.set("a", json!(1)).await;
        assert_eq!(store.get("a").await, Some(json!(1)));
    }

    #[tokio::test]
    async fn append_creates_sequence_when_absent() {
        let store = Store::new();
        assert_eq!(store.append("list", json!("x")).await, 1);
        assert_eq!(store.get("list").await, Some(json!(["x"])));
    }

    #[tokio::test]
    async fn append_accumulates_in_call_order() {
        let store = Store::new();
        store.append("list", json!(1)).await;
        store.append("list", json!(2)).await;
        store.append("list", json!(3)).await;
        assert_eq!(store.get("list").await, Some(json!([1, 2, 3])));
    }

    #[tokio::test]
    async fn append_wraps_existing_scalar() {
        let store = Store::new();
        store.set("v", json!("first")).await;
        assert_eq!(store.append("v", json!("second")).await, 2);
        assert_eq!(store.get("v").await, Some(json!(["first", "second"])));
    }

    #[tokio::test]
    async fn increment_from_absent_counts_from_zero() {
        let store = Store::new();
        assert_eq!(store.increment("count", &json!(1)).await, json!(1));
        assert_eq!(store.increment("count", &json!(1)).await, json!(2));
        assert_eq!(store.get("count").await, Some(json!(2)));
    }

    #[tokio::test]
    async fn increment_concatenates_strings() {
        let store = Store::new();
        store.set("s", json!("ab")).await;
        assert_eq!(store.increment("s", &json!(1)).await, json!("ab1"));
    }

    #[tokio::test]
    async fn merge_overwrites_and_preserves() {
        let store = Store::new();
        store.set("keep", json!("old")).await;
        store.set("overwrite", json!("old")).await;

        let mut updates = HashMap::new();
        updates.insert("overwrite".to_string(), json!("new"));
        updates.insert("added".to_string(), json!("fresh"));
        store.merge(updates).await;

        assert_eq!(store.get("keep").await, Some(json!("old")));
        assert_eq!(store.get("overwrite").await, Some(json!("new")));
        assert_eq!(store.get("added").await, Some(json!("fresh")));
        assert_eq!(store.len().await, 3);
    }

    // --- ActionOutcome ---

    #[test]
    fn capture_payload_per_status() {
        assert_eq!(
            ActionOutcome::with_transport(json!({"a": 1}), json!({"status": 200})).capture_payload(),
            Some(json!({"a": 1}))
        );
        assert_eq!(ActionOutcome::NoData.capture_payload(), Some(Value::Null));
        assert_eq!(ActionOutcome::failed("nope").capture_payload(), None);
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(ActionOutcome::failed("boom")).unwrap();
        assert_eq!(json, json!({"status": "failed", "reason": "boom"}));
        let json = serde_json::to_value(ActionOutcome::NoData).unwrap();
        assert_eq!(json, json!({"status": "no_data"}));
    }
}
