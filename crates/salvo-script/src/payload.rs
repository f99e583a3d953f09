//! Typed `values` payloads for each known action type.
//!
//! Actions carry their payload as free-form JSON so that substitution can run
//! over it; handlers decode it into one of these structs after rendering.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::ActionType;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShellPayload {
    pub text: String,
    #[serde(default)]
    pub arguments: Vec<ShellArgument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShellArgument {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: Value,
}

impl ShellPayload {
    /// The full command line: `text` followed by ` key+value` for each argument.
    pub fn command_line(&self) -> String {
        let mut line = self.text.clone();
        for arg in &self.arguments {
            line.push(' ');
            line.push_str(&arg.key);
            if !arg.value.is_null() {
                line.push_str(&salvo_types::value::display_string(&arg.value));
            }
        }
        line
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpPayload {
    pub target: String,
    #[serde(default = "default_method")]
    pub method: String,
    /// Values for `${name}` placeholders in `target`.
    #[serde(default)]
    pub path: BTreeMap<String, Value>,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    #[serde(default)]
    pub headers: BTreeMap<String, Value>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub attachment: Option<Attachment>,
}

fn default_method() -> String {
    "GET".into()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteFilePayload {
    #[serde(rename = "fileLocation")]
    pub file_location: String,
    #[serde(default)]
    pub data: Value,
    #[serde(rename = "dataOperations", default)]
    pub data_operations: Vec<String>,
}

impl WriteFilePayload {
    pub fn serialize_as_json(&self) -> bool {
        has_op(&self.data_operations, "jsonstringify")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateFilePayload {
    #[serde(rename = "fileLocation")]
    pub file_location: String,
    #[serde(rename = "fileType", default)]
    pub file_type: FileKind,
    #[serde(default)]
    pub data: Value,
    #[serde(rename = "dataOperations", default)]
    pub data_operations: Vec<String>,
}

impl UpdateFilePayload {
    pub fn append(&self) -> bool {
        has_op(&self.data_operations, "append")
    }

    /// Structured edits for JSON and XML files. A single edit object is
    /// accepted as a one-element list.
    pub fn edits(&self) -> Result<Vec<FileEdit>, String> {
        let items = match &self.data {
            Value::Array(items) => items.clone(),
            Value::Null => Vec::new(),
            other => vec![other.clone()],
        };
        items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(|e| format!("invalid edit: {}", e)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    #[default]
    Text,
    Json,
    Xml,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEdit {
    pub path: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailPayload {
    #[serde(rename = "accountProperties")]
    pub account: EmailAccount,
    #[serde(rename = "emailProperties")]
    pub message: EmailMessage,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailAccount {
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    #[serde(default)]
    pub from: Option<String>,
    pub to: Recipients,
    #[serde(default)]
    pub cc: Option<Recipients>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
}

/// One address string, or a list joined with `", "`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Recipients {
    One(String),
    Many(Vec<String>),
}

impl Default for Recipients {
    fn default() -> Self {
        Recipients::Many(Vec::new())
    }
}

impl Recipients {
    pub fn joined(&self) -> String {
        match self {
            Recipients::One(s) => s.clone(),
            Recipients::Many(list) => list.join(", "),
        }
    }

    /// Individual addresses, splitting a joined string on commas.
    pub fn addresses(&self) -> Vec<String> {
        let joined = self.joined();
        joined
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetVarPayload {
    pub target: String,
    #[serde(default, alias = "value")]
    pub data: Value,
    #[serde(default, alias = "op")]
    pub action: SetOp,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetOp {
    #[default]
    #[serde(alias = "set")]
    Replace,
    #[serde(alias = "push")]
    Append,
    Increment,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrintPayload {
    #[serde(default)]
    pub text: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplaceTextPayload {
    #[serde(rename = "fileLocation")]
    pub file_location: String,
    #[serde(default)]
    pub replacements: Vec<Replacement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Replacement {
    #[serde(alias = "search", alias = "searchString")]
    pub from: String,
    #[serde(default, alias = "replace", alias = "replaceString")]
    pub to: String,
    #[serde(default)]
    pub regex: bool,
}

fn has_op(ops: &[String], wanted: &str) -> bool {
    ops.iter().any(|op| op.eq_ignore_ascii_case(wanted))
}

/// Decode `values` into the payload type `T`, with a readable error.
pub fn decode<T: serde::de::DeserializeOwned>(values: &Value) -> Result<T, String> {
    let values = if values.is_null() {
        Value::Object(Default::default())
    } else {
        values.clone()
    };
    serde_json::from_value(values).map_err(|e| e.to_string())
}

/// Check that `values` fits the payload shape of `action_type`.
pub fn check_payload(action_type: ActionType, values: &Value) -> Result<(), String> {
    match action_type {
        ActionType::InvokeShellCommand => decode::<ShellPayload>(values).map(drop),
        ActionType::InvokeHttpCall => decode::<HttpPayload>(values).map(drop),
        ActionType::WriteFile => decode::<WriteFilePayload>(values).map(drop),
        ActionType::ReadModifyWriteFile => {
            let payload = decode::<UpdateFilePayload>(values)?;
            if payload.file_type != FileKind::Text {
                payload.edits()?;
            }
            Ok(())
        }
        ActionType::SendEmail => decode::<EmailPayload>(values).map(drop),
        ActionType::SetStoreVariable => decode::<SetVarPayload>(values).map(drop),
        ActionType::PrintMessage => decode::<PrintPayload>(values).map(drop),
        ActionType::ReplaceTextInFile => decode::<ReplaceTextPayload>(values).map(drop),
    }
}
