use std::path::Path;

use serde_json::{Map, Value};
use salvo_types::{Result, SalvoError};

use crate::model::Script;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Yaml,
}

fn format_of(path: &Path) -> Format {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
            Format::Yaml
        }
        _ => Format::Json,
    }
}

fn decode_value(text: &str, format: Format) -> std::result::Result<Value, String> {
    match format {
        Format::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
        Format::Yaml => serde_yaml::from_str(text).map_err(|e| e.to_string()),
    }
}

/// Parse script text. `origin` only labels errors.
pub fn parse_script(text: &str, origin: &Path) -> Result<Script> {
    let parse_err = |message: String| SalvoError::ScriptParse {
        path: origin.display().to_string(),
        message,
    };
    let value = decode_value(text, format_of(origin)).map_err(parse_err)?;
    serde_json::from_value(value).map_err(|e| parse_err(e.to_string()))
}

/// Read and parse a script document (JSON, or YAML for `.yaml`/`.yml`).
pub fn load_script(path: &Path) -> Result<Script> {
    let text = std::fs::read_to_string(path).map_err(|e| SalvoError::ScriptParse {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let script = parse_script(&text, path)?;
    tracing::debug!(
        script = %script.name,
        operations = script.operations.len(),
        "Loaded script"
    );
    Ok(script)
}

/// Read one preload file and return the mapping it contributes to the store.
///
/// A mapping whose only key is `default` holding another mapping is unwrapped.
pub fn load_preload(path: &Path) -> Result<Map<String, Value>> {
    let preload_err = |message: String| SalvoError::Preload {
        source_path: path.display().to_string(),
        message,
    };
    let text = std::fs::read_to_string(path).map_err(|e| preload_err(e.to_string()))?;
    let value = decode_value(&text, format_of(path)).map_err(preload_err)?;
    match value {
        Value::Object(mut map) => {
            if map.len() == 1 && map.get("default").is_some_and(Value::is_object) {
                if let Some(Value::Object(inner)) = map.remove("default") {
                    return Ok(inner);
                }
            }
            Ok(map)
        }
        other => Err(preload_err(format!(
            "top level must be a mapping, found {}",
            kind_name(&other)
        ))),
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}
