//! Convert serde_json::Value into text parameters. Every placeholder carries an
//! explicit `::type` cast, so Postgres parses the text into the column type.

use crate::model::FieldType;
use serde_json::Value;

/// Text form of a JSON value bound to a column of type `t`; `None` binds SQL NULL.
/// A `jsonb` column always receives the serialized document, so a JSON string
/// keeps its quotes.
pub fn bind_text(v: &Value, t: FieldType) -> Option<String> {
    match v {
        Value::Null => None,
        _ if t == FieldType::Json => Some(v.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Array(_) | Value::Object(_) => Some(v.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_and_documents() {
        assert_eq!(bind_text(&Value::Null, FieldType::Text), None);
        assert_eq!(bind_text(&json!(true), FieldType::Boolean).as_deref(), Some("true"));
        assert_eq!(bind_text(&json!(42), FieldType::Integer).as_deref(), Some("42"));
        assert_eq!(bind_text(&json!(1.5), FieldType::Float).as_deref(), Some("1.5"));
        assert_eq!(bind_text(&json!("x"), FieldType::Text).as_deref(), Some("x"));
        assert_eq!(bind_text(&json!({"a": [1]}), FieldType::Json).as_deref(), Some(r#"{"a":[1]}"#));
    }

    #[test]
    fn json_columns_get_serialized_scalars() {
        assert_eq!(bind_text(&json!("hello"), FieldType::Json).as_deref(), Some(r#""hello""#));
        assert_eq!(bind_text(&json!(3), FieldType::Json).as_deref(), Some("3"));
        assert_eq!(bind_text(&Value::Null, FieldType::Json), None);
    }
}
