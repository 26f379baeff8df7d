//! Record fragments and the change detector.

use relgraph_state::{value_as_row_id, Row, RowId, PRIMARY_KEY};
use serde_json::Value;

use crate::error::{RelgraphError, Result};

/// Column id to JSON value. Relationship columns hold a nested map (to-one)
/// or a sequence of maps (to-many).
pub type Fragment = Row;

/// Does the fragment carry anything besides its primary key?
///
/// Any extra key counts, even when its value is `null` or empty.
pub fn contains_non_primary_key_data(fragment: &Fragment) -> bool {
    fragment.keys().any(|key| key != PRIMARY_KEY)
}

/// A fragment without a usable primary key is new.
pub fn is_new(fragment: &Fragment) -> bool {
    primary_key(fragment).is_none()
}

pub fn primary_key(fragment: &Fragment) -> Option<RowId> {
    fragment.get(PRIMARY_KEY).and_then(value_as_row_id)
}

/// Interpret an arbitrary payload as a fragment.
pub fn fragment_from_value(table: &str, value: Value) -> Result<Fragment> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(RelgraphError::InvalidPayload {
            table: table.to_string(),
            reason: format!("expected an object, got {}", kind_of(&other)),
        }),
    }
}

/// "Empty" in the loose sense used for relationship payloads: null, false,
/// zero, empty string, empty array or empty object.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Truthiness of a flag such as `active`.
pub fn is_truthy(value: &Value) -> bool {
    !is_empty_value(value)
}

/// Entries of a to-many payload: either a plain sequence or the hydrated
/// `{"rows": [...]}` shape. Non-object entries are skipped.
pub fn to_many_entries(value: &Value) -> Vec<Fragment> {
    let items = match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => match map.get("rows") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => &[],
        },
        _ => &[],
    };
    items
        .iter()
        .filter_map(|item| item.as_object().cloned())
        .collect()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frag(value: Value) -> Fragment {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn primary_key_only_is_unchanged() {
        assert!(!contains_non_primary_key_data(&frag(json!({"id": 5}))));
        assert!(!contains_non_primary_key_data(&frag(json!({}))));
    }

    #[test]
    fn any_extra_key_is_a_change() {
        assert!(contains_non_primary_key_data(&frag(json!({"id": 5, "note": null}))));
        assert!(contains_non_primary_key_data(&frag(json!({"id": 5, "tags": []}))));
        assert!(contains_non_primary_key_data(&frag(json!({"name": ""}))));
    }

    #[test]
    fn newness_follows_primary_key() {
        assert!(is_new(&frag(json!({"name": "Ann"}))));
        assert!(is_new(&frag(json!({"id": null}))));
        assert!(!is_new(&frag(json!({"id": "7"}))));
        assert_eq!(primary_key(&frag(json!({"id": 7}))), Some(7));
    }

    #[test]
    fn to_many_accepts_both_shapes() {
        let plain = to_many_entries(&json!([{"id": 1}, 3, {"id": 2}]));
        assert_eq!(plain.len(), 2);

        let hydrated = to_many_entries(&json!({"rows": [{"id": 1, "data": {"id": 9}}]}));
        assert_eq!(hydrated.len(), 1);

        assert!(to_many_entries(&json!("nope")).is_empty());
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let err = fragment_from_value("people", json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("an array"));
    }

    #[test]
    fn loose_emptiness() {
        for empty in [json!(null), json!(false), json!(0), json!(""), json!("0"), json!([]), json!({})] {
            assert!(is_empty_value(&empty), "{empty} should be empty");
        }
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!({"id": 1})));
    }
}
