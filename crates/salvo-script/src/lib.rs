//! Script document model for Salvo operation runs.
//!
//! A script is a named list of operations, each an ordered list of action
//! templates. Documents are JSON or YAML; see [`load_script`].
//!
//! # Example
//! ```
//! let text = r#"{"name": "demo", "operations": [{"name": "hello", "actions": [
//!     {"type": "print-message", "values": {"text": "hi"}}
//! ]}]}"#;
//! let script = salvo_script::parse_script(text, std::path::Path::new("demo.json")).unwrap();
//! assert_eq!(script.operations[0].actions[0].kind(), Some(salvo_script::ActionType::PrintMessage));
//! ```

pub mod delay_serde;
mod loader;
pub mod model;
pub mod payload;

pub use loader::{load_preload, load_script, parse_script};
pub use model::*;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::Path;
    use std::time::Duration;

    fn parse(value: serde_json::Value) -> Script {
        parse_script(&value.to_string(), Path::new("test.json")).unwrap()
    }

    #[test]
    fn minimal_script_defaults() {
        let script = parse(json!({
            "name": "minimal",
            "operations": [{"actions": [{"type": "set-var", "values": {"target": "a"}}]}]
        }));
        let op = &script.operations[0];
        assert!(script.preloads.is_empty());
        assert_eq!(op.iterations, Iterations::Count(1));
        assert_eq!(op.pre_delay_op, Duration::ZERO);
        assert!(op.run_at.is_none());
        let action = &op.actions[0];
        assert_eq!(action.kind(), Some(ActionType::SetStoreVariable));
        assert!(action.conditions.is_empty());
        assert!(action.capture.is_empty());
        assert!(action.timeout.is_none());
    }

    #[test]
    fn delays_accept_numbers_and_strings() {
        let script = parse(json!({
            "name": "delays",
            "operations": [{
                "pre_delay_op": 1500,
                "post_delay_op": "2s",
                "pre_delay_loop": null,
                "post_delay_loop": "250ms",
                "actions": [{"type": "print-message", "pre_delay": 10, "timeout": "30s"}]
            }]
        }));
        let op = &script.operations[0];
        assert_eq!(op.pre_delay_op, Duration::from_millis(1500));
        assert_eq!(op.post_delay_op, Duration::from_secs(2));
        assert_eq!(op.pre_delay_loop, Duration::ZERO);
        assert_eq!(op.post_delay_loop, Duration::from_millis(250));
        assert_eq!(op.actions[0].pre_delay, Duration::from_millis(10));
        assert_eq!(op.actions[0].timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn iteration_spec_with_aliases() {
        let script = parse(json!({
            "name": "iter",
            "operations": [
                {"iterations": {"type": "for-each-in-array", "iterateeName": "x", "source": ["a", "b"]}},
                {"iterations": {"type": "for-each-file", "iteratee": "f", "directory": "./in", "pattern": "*.txt"}},
                {"iterations": "}>}retries{<{"},
                {"iterations": 0}
            ]
        }));
        match &script.operations[0].iterations {
            Iterations::Spec(spec) => {
                assert_eq!(spec.strategy, IterationStrategy::ForEachInArray);
                assert_eq!(spec.iteratee, "x");
                assert_eq!(spec.source_array, Some(json!(["a", "b"])));
            }
            other => panic!("expected spec, got {:?}", other),
        }
        match &script.operations[1].iterations {
            Iterations::Spec(spec) => {
                assert_eq!(spec.strategy, IterationStrategy::ForEachFile);
                assert_eq!(spec.directory.as_deref(), Some("./in"));
                assert_eq!(spec.pattern.as_deref(), Some("*.txt"));
            }
            other => panic!("expected spec, got {:?}", other),
        }
        assert_eq!(
            script.operations[2].iterations,
            Iterations::Text("}>}retries{<{".into())
        );
        assert_eq!(script.operations[3].iterations, Iterations::Count(0));
    }

    #[test]
    fn conditions_structured_and_raw() {
        let script = parse(json!({
            "name": "cond",
            "operations": [{"actions": [{
                "type": "print-message",
                "conditions": [
                    {"type": "does-var-equal", "varName": "mode", "checkValue": "prod"},
                    {"type": "not-equals", "varName": "count", "checkValue": 0},
                    "count > 2"
                ]
            }]}]
        }));
        let conditions = &script.operations[0].actions[0].conditions;
        assert_eq!(
            conditions[0],
            Condition::Compare {
                kind: CompareKind::Equals,
                var_name: "mode".into(),
                check_value: json!("prod"),
            }
        );
        assert!(matches!(
            conditions[1],
            Condition::Compare { kind: CompareKind::NotEquals, .. }
        ));
        assert_eq!(conditions[2], Condition::Expression("count > 2".into()));
    }

    #[test]
    fn capture_single_object_and_legacy_names() {
        let script = parse(json!({
            "name": "cap",
            "operations": [{"actions": [{
                "type": "web-call",
                "values": {"target": "http://localhost"},
                "capture": {
                    "type": "object",
                    "source": "data.items[0].id",
                    "forceType": "jsonStringify",
                    "captureType": "push",
                    "target": "ids"
                }
            }]}]
        }));
        let capture = &script.operations[0].actions[0].capture;
        assert_eq!(capture.len(), 1);
        assert_eq!(capture[0].extraction.method, ExtractionMethod::Path);
        assert_eq!(capture[0].extraction.force_type, Some(ForceType::Json));
        assert_eq!(capture[0].capture_type, CaptureMode::Append);
        assert_eq!(capture[0].target, "ids");
    }

    #[test]
    fn capture_fields_and_regex_index() {
        let script = parse(json!({
            "name": "fields",
            "operations": [{"actions": [{
                "type": "terminal",
                "values": {"text": "echo"},
                "capture": [{
                    "target": "parsed",
                    "fields": [
                        {"key": "version", "type": "regex", "source": "v(\\d+)", "regexIndex": 1, "forceType": "NUMBER"},
                        {"key": "all", "source": "$$all$$"}
                    ]
                }]
            }]}]
        }));
        let capture = &script.operations[0].actions[0].capture[0];
        assert_eq!(capture.fields.len(), 2);
        let version = &capture.fields[0].extraction;
        assert_eq!(version.method, ExtractionMethod::Regex);
        assert_eq!(version.regex_group, Some(1));
        assert_eq!(version.force_type, Some(ForceType::Number));
        assert!(capture.fields[1].extraction.is_all());
        assert_eq!(capture.fields[1].extraction.method, ExtractionMethod::String);
    }

    #[test]
    fn unknown_force_type_is_rejected() {
        let err = parse_script(
            &json!({
                "name": "bad",
                "operations": [{"actions": [{"type": "print-message",
                    "capture": {"target": "x", "forceType": "bogus"}}]}]
            })
            .to_string(),
            Path::new("bad.json"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("bad.json"));
    }

    #[test]
    fn action_type_aliases_resolve() {
        let pairs = [
            ("terminal", ActionType::InvokeShellCommand),
            ("web-call", ActionType::InvokeHttpCall),
            ("make-file", ActionType::WriteFile),
            ("update-file", ActionType::ReadModifyWriteFile),
            ("send-email", ActionType::SendEmail),
            ("set-var", ActionType::SetStoreVariable),
            ("print-statement", ActionType::PrintMessage),
            ("replace-file-text", ActionType::ReplaceTextInFile),
        ];
        for (alias, expected) in pairs {
            assert_eq!(ActionType::from_name(alias), Some(expected));
            assert_eq!(ActionType::from_name(expected.as_str()), Some(expected));
        }
        assert_eq!(ActionType::from_name("launch-rocket"), None);
    }

    #[test]
    fn missing_name_is_a_parse_error() {
        let err = parse_script(r#"{"operations": []}"#, Path::new("s.json")).unwrap_err();
        assert!(err.to_string().contains("name"));
    }
}
