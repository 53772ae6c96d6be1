//! Structural diff of two JSON snapshots: `{key: [before, after]}` per changed field.

use chrono::DateTime;
use serde::Serialize;
use serde_json::{Map, Value};

/// Compare two serializable values. `None` stands for an absent snapshot.
pub fn compare<A: Serialize, B: Serialize>(
    before: Option<&A>,
    after: Option<&B>,
) -> Result<Map<String, Value>, serde_json::Error> {
    let a = before.map(serde_json::to_value).transpose()?.unwrap_or(Value::Null);
    let b = after.map(serde_json::to_value).transpose()?.unwrap_or(Value::Null);
    Ok(compare_values(&a, &b))
}

/// Diff two snapshots.
///
/// - null/null is empty; a single null side yields `{"value": [a, b]}`.
/// - Keys present on one side only are paired with null on the other.
/// - Strings that both parse as RFC 3339 timestamps compare as instants.
/// - Nested objects recurse; an empty nested diff is omitted.
/// - Non-object snapshots compare as a whole under `"value"`.
pub fn compare_values(before: &Value, after: &Value) -> Map<String, Value> {
    match (before, after) {
        (Value::Null, Value::Null) => Map::new(),
        (Value::Object(a), Value::Object(b)) => compare_objects(a, b),
        (a, b) => {
            let mut out = Map::new();
            if a.is_null() || b.is_null() || !values_equal(a, b) {
                out.insert("value".into(), pair(a, b));
            }
            out
        }
    }
}

fn compare_objects(a: &Map<String, Value>, b: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, va) in a {
        match b.get(key) {
            Some(vb) => {
                if let (Value::Object(na), Value::Object(nb)) = (va, vb) {
                    let nested = compare_objects(na, nb);
                    if !nested.is_empty() {
                        out.insert(key.clone(), Value::Object(nested));
                    }
                } else if !values_equal(va, vb) {
                    out.insert(key.clone(), pair(va, vb));
                }
            }
            None => {
                out.insert(key.clone(), pair(va, &Value::Null));
            }
        }
    }
    for (key, vb) in b {
        if !a.contains_key(key) {
            out.insert(key.clone(), pair(&Value::Null, vb));
        }
    }
    out
}

fn values_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::String(sa), Value::String(sb)) => {
            match (DateTime::parse_from_rfc3339(sa), DateTime::parse_from_rfc3339(sb)) {
                (Ok(ta), Ok(tb)) => ta == tb,
                _ => false,
            }
        }
        (Value::Number(na), Value::Number(nb)) => match (na.as_f64(), nb.as_f64()) {
            (Some(fa), Some(fb)) => fa == fb,
            _ => false,
        },
        _ => false,
    }
}

fn pair(a: &Value, b: &Value) -> Value {
    Value::Array(vec![a.clone(), b.clone()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn both_absent_is_empty() {
        assert!(compare::<Value, Value>(None, None).unwrap().is_empty());
        assert!(compare_values(&Value::Null, &Value::Null).is_empty());
    }

    #[test]
    fn one_absent_side_is_a_value_pair() {
        let diff = compare_values(&Value::Null, &json!({"a": 1}));
        assert_eq!(diff.get("value"), Some(&json!([null, {"a": 1}])));
    }

    #[test]
    fn identical_snapshots_have_no_diff() {
        let x = json!({"a": 1, "b": "two", "nested": {"c": [1, 2]}, "t": "2024-01-01T00:00:00Z"});
        assert!(compare_values(&x, &x).is_empty());
    }

    #[test]
    fn changed_added_and_removed_keys() {
        let before = json!({"kept": 1, "changed": "a", "removed": true});
        let after = json!({"kept": 1, "changed": "b", "added": 3});
        let diff = compare_values(&before, &after);
        assert_eq!(diff.len(), 3);
        assert_eq!(diff["changed"], json!(["a", "b"]));
        assert_eq!(diff["removed"], json!([true, null]));
        assert_eq!(diff["added"], json!([null, 3]));
    }

    #[test]
    fn timestamps_compare_as_instants() {
        let before = json!({"at": "2024-05-01T10:00:00Z"});
        let same = json!({"at": "2024-05-01T12:00:00.000000000+02:00"});
        assert!(compare_values(&before, &same).is_empty());

        let later = json!({"at": "2024-05-01T10:00:00.5Z"});
        assert_eq!(compare_values(&before, &later).len(), 1);
    }

    #[test]
    fn nested_objects_recurse_and_omit_empty() {
        let before = json!({"meta": {"x": 1, "y": 2}, "other": {"z": 1}});
        let after = json!({"meta": {"x": 1, "y": 3}, "other": {"z": 1}});
        let diff = compare_values(&before, &after);
        assert_eq!(diff.len(), 1);
        assert_eq!(diff["meta"], json!({"y": [2, 3]}));
    }

    #[test]
    fn non_time_strings_compare_verbatim() {
        let diff = compare_values(&json!({"s": "abc"}), &json!({"s": "abd"}));
        assert_eq!(diff["s"], json!(["abc", "abd"]));
    }

    #[test]
    fn typed_structs_are_compared_through_json() {
        #[derive(Serialize)]
        struct Item {
            name: &'static str,
            qty: u32,
        }
        let diff = compare(Some(&Item { name: "a", qty: 1 }), Some(&Item { name: "a", qty: 2 })).unwrap();
        assert_eq!(diff["qty"], json!([1, 2]));
    }
}
