use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Sentinel `source` meaning "the entire payload".
pub const ALL_SENTINEL: &str = "$$all$$";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    pub name: String,
    #[serde(default)]
    pub preloads: Vec<String>,
    pub operations: Vec<Operation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    #[serde(default)]
    pub name: String,
    #[serde(default, with = "crate::delay_serde")]
    pub pre_delay_op: Duration,
    #[serde(default, with = "crate::delay_serde")]
    pub post_delay_op: Duration,
    #[serde(default, with = "crate::delay_serde")]
    pub pre_delay_loop: Duration,
    #[serde(default, with = "crate::delay_serde")]
    pub post_delay_loop: Duration,
    #[serde(default)]
    pub iterations: Iterations,
    /// Absolute or recurring time expression; a string or epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_at: Option<Value>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

// ---------------------------------------------------------------------------
// Iterations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Iterations {
    Count(u64),
    /// A count written as text, typically a template such as `"}>}retries{<{"`.
    Text(String),
    Spec(IterationSpec),
}

impl Default for Iterations {
    fn default() -> Self {
        Iterations::Count(1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationSpec {
    #[serde(rename = "type")]
    pub strategy: IterationStrategy,
    #[serde(default, alias = "iterateeName")]
    pub iteratee: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    /// Glob filter applied to directory entry names (for-each-file only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(
        default,
        rename = "sourceArray",
        alias = "source",
        skip_serializing_if = "Option::is_none"
    )]
    pub source_array: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IterationStrategy {
    #[serde(rename = "for-each-file")]
    ForEachFile,
    #[serde(rename = "for-each-in-array")]
    ForEachInArray,
}

impl fmt::Display for IterationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IterationStrategy::ForEachFile => f.write_str("for-each-file"),
            IterationStrategy::ForEachInArray => f.write_str("for-each-in-array"),
        }
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub values: Value,
    #[serde(default, with = "crate::delay_serde")]
    pub pre_delay: Duration,
    #[serde(default, with = "crate::delay_serde")]
    pub post_delay: Duration,
    /// Overrides the run-wide bound on external calls for this action.
    #[serde(
        default,
        with = "crate::delay_serde::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub capture: Vec<CaptureSpec>,
}

impl Action {
    /// The known type this action dispatches to, if any.
    pub fn kind(&self) -> Option<ActionType> {
        ActionType::from_name(&self.action_type)
    }
}

/// The closed set of action types the engine knows how to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionType {
    InvokeShellCommand,
    InvokeHttpCall,
    WriteFile,
    ReadModifyWriteFile,
    SendEmail,
    SetStoreVariable,
    PrintMessage,
    ReplaceTextInFile,
}

impl ActionType {
    pub const ALL: [ActionType; 8] = [
        ActionType::InvokeShellCommand,
        ActionType::InvokeHttpCall,
        ActionType::WriteFile,
        ActionType::ReadModifyWriteFile,
        ActionType::SendEmail,
        ActionType::SetStoreVariable,
        ActionType::PrintMessage,
        ActionType::ReplaceTextInFile,
    ];

    /// Resolve a canonical type name or one of its legacy aliases.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "invoke-shell-command" | "terminal" => Some(ActionType::InvokeShellCommand),
            "invoke-http-call" | "web-call" => Some(ActionType::InvokeHttpCall),
            "write-file" | "make-file" => Some(ActionType::WriteFile),
            "read-modify-write-file" | "update-file" => Some(ActionType::ReadModifyWriteFile),
            "send-email" => Some(ActionType::SendEmail),
            "set-store-variable" | "set-var" => Some(ActionType::SetStoreVariable),
            "print-message" | "print-statement" => Some(ActionType::PrintMessage),
            "replace-text-in-file" | "replace-file-text" => Some(ActionType::ReplaceTextInFile),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::InvokeShellCommand => "invoke-shell-command",
            ActionType::InvokeHttpCall => "invoke-http-call",
            ActionType::WriteFile => "write-file",
            ActionType::ReadModifyWriteFile => "read-modify-write-file",
            ActionType::SendEmail => "send-email",
            ActionType::SetStoreVariable => "set-store-variable",
            ActionType::PrintMessage => "print-message",
            ActionType::ReplaceTextInFile => "replace-text-in-file",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    Compare {
        #[serde(rename = "type")]
        kind: CompareKind,
        #[serde(rename = "varName")]
        var_name: String,
        #[serde(rename = "checkValue", default)]
        check_value: Value,
    },
    /// A boolean expression in the sandboxed expression language.
    Expression(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareKind {
    #[serde(rename = "equals", alias = "does-var-equal")]
    Equals,
    #[serde(rename = "not-equals", alias = "does-var-not-equal")]
    NotEquals,
}

// ---------------------------------------------------------------------------
// Captures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureSpec {
    #[serde(flatten)]
    pub extraction: Extraction,
    #[serde(rename = "captureType", default)]
    pub capture_type: CaptureMode,
    #[serde(default)]
    pub target: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldSpec>,
}

/// One named sub-extraction of a composite capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub key: String,
    #[serde(flatten)]
    pub extraction: Extraction,
}

/// How to pull a value out of an action's payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    #[serde(rename = "type", default)]
    pub method: ExtractionMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Value>,
    #[serde(
        rename = "regexGroup",
        alias = "regexIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub regex_group: Option<usize>,
    #[serde(rename = "forceType", default, skip_serializing_if = "Option::is_none")]
    pub force_type: Option<ForceType>,
}

impl Extraction {
    pub fn new(method: ExtractionMethod, source: Option<Value>) -> Self {
        Self {
            method,
            source,
            regex_group: None,
            force_type: None,
        }
    }

    /// Returns `true` when the source is the whole-payload sentinel.
    pub fn is_all(&self) -> bool {
        matches!(&self.source, Some(Value::String(s)) if s == ALL_SENTINEL)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    #[default]
    String,
    #[serde(alias = "object")]
    Path,
    #[serde(alias = "array")]
    Index,
    Regex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ForceType {
    Number,
    String,
    Json,
}

impl FromStr for ForceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "number" => Ok(ForceType::Number),
            "string" => Ok(ForceType::String),
            "json" | "jsonstringify" => Ok(ForceType::Json),
            other => Err(format!("unknown forceType '{}'", other)),
        }
    }
}

impl TryFrom<String> for ForceType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ForceType> for String {
    fn from(value: ForceType) -> Self {
        match value {
            ForceType::Number => "number".into(),
            ForceType::String => "string".into(),
            ForceType::Json => "json".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureMode {
    #[default]
    #[serde(rename = "replace", alias = "set")]
    Replace,
    #[serde(rename = "append", alias = "push")]
    Append,
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

/// Accept a single object, a list of objects, or null.
fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(match Option::<OneOrMany<T>>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::Many(items)) => items,
        Some(OneOrMany::One(item)) => vec![item],
    })
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
