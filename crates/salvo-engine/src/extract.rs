//! Pull a value out of an action's result payload.
//!
//! Extraction never fails: anything that cannot be resolved yields null.

use regex::Regex;
use salvo_script::{Extraction, ExtractionMethod, ForceType};
use salvo_types::value::{display_string, get_path, loose_number, number_value, parse_path, PathSegment};
use serde_json::Value;

/// Run `extraction` against `payload` and apply its `forceType`, if any.
pub fn extract(payload: &Value, extraction: &Extraction) -> Value {
    let raw = match extraction.method {
        ExtractionMethod::String => payload.clone(),
        ExtractionMethod::Path => by_path(payload, extraction),
        ExtractionMethod::Index => by_index(payload, extraction),
        ExtractionMethod::Regex => by_regex(payload, extraction),
    };
    match extraction.force_type {
        Some(force) => coerce(raw, force),
        None => raw,
    }
}

fn segment_from(value: &Value) -> Option<PathSegment> {
    match value {
        Value::Number(n) => n.as_u64().map(|i| PathSegment::Index(i as usize)),
        Value::String(s) => Some(match s.parse::<usize>() {
            Ok(i) => PathSegment::Index(i),
            Err(_) => PathSegment::Key(s.clone()),
        }),
        _ => None,
    }
}

fn by_path(payload: &Value, extraction: &Extraction) -> Value {
    if extraction.is_all() {
        return payload.clone();
    }
    let segments = match &extraction.source {
        None | Some(Value::Null) => return payload.clone(),
        Some(Value::String(path)) => parse_path(path),
        Some(Value::Array(parts)) => match parts.iter().map(segment_from).collect::<Option<Vec<_>>>() {
            Some(segments) => segments,
            None => return Value::Null,
        },
        Some(other) => match segment_from(other) {
            Some(segment) => vec![segment],
            None => return Value::Null,
        },
    };
    get_path(payload, &segments).cloned().unwrap_or(Value::Null)
}

fn by_index(payload: &Value, extraction: &Extraction) -> Value {
    if extraction.is_all() {
        return payload.clone();
    }
    let Some(source) = &extraction.source else {
        return payload.clone();
    };
    let found = match payload {
        Value::Array(items) => loose_index(source).and_then(|i| items.get(i)),
        Value::Object(map) => map.get(&display_string(source)),
        _ => None,
    };
    found.cloned().unwrap_or(Value::Null)
}

fn loose_index(source: &Value) -> Option<usize> {
    match source {
        Value::Number(n) => n.as_u64().map(|i| i as usize),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn by_regex(payload: &Value, extraction: &Extraction) -> Value {
    let Some(pattern) = extraction.source.as_ref().map(display_string) else {
        tracing::warn!("Regex extraction without a pattern");
        return Value::Null;
    };
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(e) => {
            tracing::warn!(pattern = %pattern, error = %e, "Invalid extraction pattern");
            return Value::Null;
        }
    };
    let text = display_string(payload);
    let Some(caps) = re.captures(&text) else {
        return Value::Null;
    };
    let group = |i: usize| {
        caps.get(i)
            .map(|m| Value::String(m.as_str().to_string()))
            .unwrap_or(Value::Null)
    };
    match extraction.regex_group {
        Some(i) => group(i),
        None => Value::Array((0..caps.len()).map(group).collect()),
    }
}

/// Apply a `forceType` coercion.
pub fn coerce(value: Value, force: ForceType) -> Value {
    match force {
        ForceType::Number => match loose_number(&value) {
            Some(n) => number_value(n),
            None => {
                tracing::warn!(value = %value, "Value does not coerce to a number");
                Value::Null
            }
        },
        ForceType::String => Value::String(display_string(&value)),
        ForceType::Json => match serde_json::to_string_pretty(&value) {
            Ok(text) => Value::String(text),
            Err(e) => {
                tracing::warn!(error = %e, "Value does not serialize to JSON");
                Value::Null
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use salvo_script::ALL_SENTINEL;
    use serde_json::json;

    fn extraction(method: ExtractionMethod, source: Value) -> Extraction {
        Extraction::new(method, Some(source))
    }

    fn payload() -> Value {
        json!({
            "data": {"users": [{"name": "ada", "age": "36"}, {"name": "alan"}]},
            "total": 2
        })
    }

    #[test]
    fn string_returns_payload() {
        let e = Extraction::new(ExtractionMethod::String, None);
        assert_eq!(extract(&json!("raw output"), &e), json!("raw output"));
    }

    #[test]
    fn path_lookups() {
        let p = payload();
        assert_eq!(
            extract(&p, &extraction(ExtractionMethod::Path, json!("data.users[1].name"))),
            json!("alan")
        );
        assert_eq!(
            extract(&p, &extraction(ExtractionMethod::Path, json!(["data", "users", 0, "name"]))),
            json!("ada")
        );
        assert_eq!(
            extract(&p, &extraction(ExtractionMethod::Path, json!("data.missing.deep"))),
            Value::Null
        );
        assert_eq!(
            extract(&p, &extraction(ExtractionMethod::Path, json!(ALL_SENTINEL))),
            p
        );
    }

    #[test]
    fn index_lookups() {
        let list = json!(["a", "b", "c"]);
        assert_eq!(extract(&list, &extraction(ExtractionMethod::Index, json!(1))), json!("b"));
        assert_eq!(extract(&list, &extraction(ExtractionMethod::Index, json!("2"))), json!("c"));
        assert_eq!(extract(&list, &extraction(ExtractionMethod::Index, json!(9))), Value::Null);
        assert_eq!(
            extract(&payload(), &extraction(ExtractionMethod::Index, json!("total"))),
            json!(2)
        );
        assert_eq!(
            extract(&json!("scalar"), &extraction(ExtractionMethod::Index, json!(0))),
            Value::Null
        );
    }

    #[test]
    fn regex_whole_match_and_group() {
        let text = json!("build 42 finished in 7s");
        let all = extract(&text, &extraction(ExtractionMethod::Regex, json!(r"build (\d+)( failed)?")));
        assert_eq!(all, json!(["build 42", "42", null]));

        let mut e = extraction(ExtractionMethod::Regex, json!(r"in (\d+)s"));
        e.regex_group = Some(1);
        assert_eq!(extract(&text, &e), json!("7"));

        let miss = extraction(ExtractionMethod::Regex, json!(r"error"));
        assert_eq!(extract(&text, &miss), Value::Null);
    }

    #[test]
    fn regex_runs_against_display_form() {
        let mut e = extraction(ExtractionMethod::Regex, json!(r#""id":(\d+)"#));
        e.regex_group = Some(1);
        assert_eq!(extract(&json!({"id": 5}), &e), json!("5"));
    }

    #[test]
    fn invalid_regex_yields_null() {
        let e = extraction(ExtractionMethod::Regex, json!("(unclosed"));
        assert_eq!(extract(&json!("anything"), &e), Value::Null);
    }

    #[test]
    fn force_types() {
        let mut e = extraction(ExtractionMethod::Path, json!("data.users[0].age"));
        e.force_type = Some(ForceType::Number);
        assert_eq!(extract(&payload(), &e), json!(36));

        e.source = Some(json!("data.users[0].name"));
        assert_eq!(extract(&payload(), &e), Value::Null);

        e.source = Some(json!("total"));
        e.force_type = Some(ForceType::String);
        assert_eq!(extract(&payload(), &e), json!("2"));

        e.source = Some(json!("data.users[1]"));
        e.force_type = Some(ForceType::Json);
        assert_eq!(extract(&payload(), &e), json!("{\n  \"name\": \"alan\"\n}"));
    }

    #[test]
    fn number_coercion_of_blank_and_bool() {
        assert_eq!(coerce(json!(""), ForceType::Number), json!(0));
        assert_eq!(coerce(json!(true), ForceType::Number), json!(1));
        assert_eq!(coerce(json!(" 2.5 "), ForceType::Number), json!(2.5));
    }
}
