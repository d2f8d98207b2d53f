//! Structural comparison of draft snapshots, used to skip redundant draft writes.

use serde_json::{Number, Value};

/// Whether two snapshots hold the same values.
///
/// Objects compare by key regardless of key order, arrays element-wise in
/// order, and numbers by numeric value so `1` and `1.0` are equal. A key
/// holding `null` is not the same as a missing key.
pub fn are_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(left), Value::Bool(right)) => left == right,
        (Value::Number(left), Value::Number(right)) => numbers_equal(left, right),
        (Value::String(left), Value::String(right)) => left == right,
        (Value::Array(left), Value::Array(right)) => {
            left.len() == right.len()
                && left
                    .iter()
                    .zip(right)
                    .all(|(left, right)| are_equal(left, right))
        }
        (Value::Object(left), Value::Object(right)) => {
            left.len() == right.len()
                && left.iter().all(|(key, left)| {
                    right
                        .get(key)
                        .is_some_and(|right| are_equal(left, right))
                })
        }
        _ => false,
    }
}

fn numbers_equal(left: &Number, right: &Number) -> bool {
    if left.is_f64() || right.is_f64() {
        left.as_f64() == right.as_f64()
    } else {
        left == right
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn separately_built_snapshots_with_same_values_are_equal() {
        let first = json!({"lineup": {"gk": "p1", "cb": "p2"}, "bench": ["p3", "p4"]});
        let second = json!({"lineup": {"gk": "p1", "cb": "p2"}, "bench": ["p3", "p4"]});
        assert!(are_equal(&first, &second));
    }

    #[test]
    fn key_order_is_irrelevant() {
        let first = json!({"a": 1, "b": {"x": true, "y": null}});
        let second = json!({"b": {"y": null, "x": true}, "a": 1});
        assert!(are_equal(&first, &second));
    }

    #[test]
    fn numbers_compare_by_value() {
        assert!(are_equal(&json!({"minutes": 1}), &json!({"minutes": 1.0})));
        assert!(!are_equal(&json!({"minutes": 1}), &json!({"minutes": 1.5})));
        assert!(!are_equal(&json!(-1), &json!(1)));
    }

    #[test]
    fn nested_difference_is_detected() {
        let first = json!({"teamSummary": {"defenseSummary": "Solid"}});
        let second = json!({"teamSummary": {"defenseSummary": "Shaky"}});
        assert!(!are_equal(&first, &second));
    }

    #[test]
    fn array_order_matters() {
        assert!(!are_equal(&json!(["p1", "p2"]), &json!(["p2", "p1"])));
        assert!(!are_equal(&json!(["p1"]), &json!(["p1", "p2"])));
    }

    #[test]
    fn null_value_differs_from_missing_key() {
        assert!(!are_equal(&json!({"notes": null}), &json!({})));
        assert!(!are_equal(&json!({}), &json!({"notes": null})));
    }

    #[test]
    fn mismatched_types_are_not_equal() {
        assert!(!are_equal(&json!("1"), &json!(1)));
        assert!(!are_equal(&json!({}), &json!([])));
        assert!(!are_equal(&json!(null), &json!(false)));
    }
}
