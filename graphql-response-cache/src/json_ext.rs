//! JSON value aliases shared by the payload types and the entity extractor.

use serde_json_bytes::ByteString;
use serde_json_bytes::Map;
pub use serde_json_bytes::Value;

/// A JSON object.
pub type Object = Map<ByteString, Value>;

/// Returns a copy of `value` where the keys of every nested object are sorted.
///
/// Arrays keep their order: `[1, 2]` and `[2, 1]` are different values.
pub(crate) fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(object) => {
            let mut entries: Vec<(&ByteString, &Value)> = object.iter().collect();
            entries.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key.clone(), sort_keys(value)))
                    .collect(),
            )
        }
        Value::Array(values) => Value::Array(values.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;

    #[test]
    fn sort_keys_is_recursive() {
        let value = json!({"b": {"z": 1, "a": 2}, "a": [{"y": 1, "x": 2}]});
        let sorted = sort_keys(&value);
        assert_eq!(
            serde_json::to_string(&sorted).unwrap(),
            r#"{"a":[{"x":2,"y":1}],"b":{"a":2,"z":1}}"#
        );
    }

    #[test]
    fn sort_keys_keeps_array_order() {
        let sorted = sort_keys(&json!(["b", "a"]));
        assert_eq!(sorted, json!(["b", "a"]));
    }
}
