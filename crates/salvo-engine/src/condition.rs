//! Action conditions.
//!
//! A condition list is a conjunction: the action runs only when every entry
//! holds. An empty list always holds.

use salvo_script::{CompareKind, Condition};
use salvo_types::value::strict_equals;
use serde_json::Value;

use crate::expr::{evaluate, Bindings};

/// Evaluate a whole condition list.
pub fn conditions_hold(conditions: &[Condition], bindings: &Bindings) -> bool {
    conditions.iter().all(|c| evaluate_condition(c, bindings))
}

/// Evaluate one condition. An absent store key compares as null; an
/// expression holds only when it evaluates to exactly `true`.
pub fn evaluate_condition(condition: &Condition, bindings: &Bindings) -> bool {
    match condition {
        Condition::Compare {
            kind,
            var_name,
            check_value,
        } => {
            let current = bindings.get(var_name).unwrap_or(&Value::Null);
            let equal = strict_equals(current, check_value);
            match kind {
                CompareKind::Equals => equal,
                CompareKind::NotEquals => !equal,
            }
        }
        Condition::Expression(src) => match evaluate(src, bindings) {
            Ok(Value::Bool(true)) => true,
            Ok(other) => {
                tracing::debug!(expression = %src, result = %other, "Condition not met");
                false
            }
            Err(e) => {
                tracing::warn!(expression = %src, error = %e, "Condition could not be evaluated; treating as not met");
                false
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bindings() -> Bindings {
        [
            ("status".to_string(), json!("ready")),
            ("count".to_string(), json!(2)),
        ]
        .into_iter()
        .collect()
    }

    fn compare(kind: CompareKind, var: &str, value: Value) -> Condition {
        Condition::Compare {
            kind,
            var_name: var.into(),
            check_value: value,
        }
    }

    #[test]
    fn empty_list_always_holds() {
        assert!(conditions_hold(&[], &bindings()));
    }

    #[test]
    fn strict_comparisons() {
        let b = bindings();
        assert!(evaluate_condition(&compare(CompareKind::Equals, "status", json!("ready")), &b));
        assert!(evaluate_condition(&compare(CompareKind::Equals, "count", json!(2.0)), &b));
        assert!(!evaluate_condition(&compare(CompareKind::Equals, "count", json!("2")), &b));
        assert!(evaluate_condition(&compare(CompareKind::NotEquals, "status", json!("done")), &b));
    }

    #[test]
    fn absent_key_compares_as_null() {
        let b = bindings();
        assert!(!evaluate_condition(&compare(CompareKind::Equals, "nope", json!("x")), &b));
        assert!(evaluate_condition(&compare(CompareKind::Equals, "nope", Value::Null), &b));
    }

    #[test]
    fn expressions_must_be_exactly_true() {
        let b = bindings();
        assert!(evaluate_condition(&Condition::Expression("count >= 2".into()), &b));
        assert!(!evaluate_condition(&Condition::Expression("count".into()), &b));
        assert!(!evaluate_condition(&Condition::Expression("missing == 1".into()), &b));
        assert!(!evaluate_condition(&Condition::Expression("((".into()), &b));
    }

    #[test]
    fn one_false_condition_fails_the_list() {
        let b = bindings();
        let list = vec![
            compare(CompareKind::Equals, "status", json!("ready")),
            Condition::Expression("count > 5".into()),
        ];
        assert!(!conditions_hold(&list, &b));
        assert!(conditions_hold(&list[..1], &b));
    }
}
