//! Per-field validators run against a snapshot before every write.

use crate::config::ValidationRule;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Generic field map a validator inspects (JSON keys as the model serializes them).
pub type EntityData = Map<String, Value>;

/// A validator writes a message into `out.error` when `field` is invalid and
/// leaves it empty otherwise.
pub type Validator = Arc<dyn Fn(&str, &EntityData, &mut ValidationError) + Send + Sync>;

/// Validators keyed by lowercased field name, in registration order.
pub type ValidatorsMap = HashMap<String, Vec<Validator>>;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub error: String,
}

impl ValidationError {
    pub fn for_field(field: &str) -> Self {
        ValidationError {
            field: field.to_string(),
            error: String::new(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Run every registered validator for every field present in `entity`.
/// All failures are collected; an empty result means the entity passed.
pub fn validate(entity: &EntityData, validators: &ValidatorsMap) -> ValidationResult {
    let mut result = ValidationResult::default();
    for key in entity.keys() {
        let Some(list) = validators.get(&key.to_lowercase()) else {
            continue;
        };
        for validator in list {
            let mut out = ValidationError::for_field(key);
            validator(key, entity, &mut out);
            if !out.error.is_empty() {
                result.errors.push(out);
            }
        }
    }
    result
}

/// Wrap a plain function as a [`Validator`].
pub fn validator<F>(f: F) -> Validator
where
    F: Fn(&str, &EntityData, &mut ValidationError) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Fails when the field is missing, null or the empty string.
pub fn required() -> Validator {
    validator(|field, entity, out| match entity.get(field) {
        None | Some(Value::Null) => out.error = format!("{} is required", field),
        Some(Value::String(s)) if s.is_empty() => out.error = format!("{} is required", field),
        _ => {}
    })
}

fn email_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
        )
        .ok()
    })
    .as_ref()
}

/// Fails when a non-empty string value is not an email address. Empty or absent passes.
pub fn email() -> Validator {
    validator(|field, entity, out| {
        if let Some(s) = entity.get(field).and_then(Value::as_str) {
            if !s.is_empty() && !email_regex().is_some_and(|re| re.is_match(s)) {
                out.error = "email has an invalid format".to_string();
            }
        }
    })
}

impl ValidationRule {
    /// Compile the declarative rule into validators. Fails only on a bad `pattern`.
    pub fn compile(&self) -> Result<Vec<Validator>, regex::Error> {
        let mut out = Vec::new();
        if self.required == Some(true) {
            out.push(required());
        }
        if let Some(format) = &self.format {
            match format.to_lowercase().as_str() {
                "email" => out.push(email()),
                "uuid" => out.push(validator(|field, entity, out| {
                    if let Some(s) = entity.get(field).and_then(Value::as_str) {
                        if uuid::Uuid::parse_str(s).is_err() {
                            out.error = format!("{} must be a valid UUID", field);
                        }
                    }
                })),
                _ => {}
            }
        }
        if let Some(max) = self.max_length {
            out.push(validator(move |field, entity, out| {
                if let Some(s) = entity.get(field).and_then(Value::as_str) {
                    if s.chars().count() > max as usize {
                        out.error = format!("{} must be at most {} characters", field, max);
                    }
                }
            }));
        }
        if let Some(min) = self.min_length {
            out.push(validator(move |field, entity, out| {
                if let Some(s) = entity.get(field).and_then(Value::as_str) {
                    if s.chars().count() < min as usize {
                        out.error = format!("{} must be at least {} characters", field, min);
                    }
                }
            }));
        }
        if let Some(pattern) = &self.pattern {
            let re = Regex::new(pattern)?;
            out.push(validator(move |field, entity, out| {
                if let Some(s) = entity.get(field).and_then(Value::as_str) {
                    if !re.is_match(s) {
                        out.error = format!("{} does not match required pattern", field);
                    }
                }
            }));
        }
        if let Some(allowed) = self.allowed.clone() {
            out.push(validator(move |field, entity, out| {
                match entity.get(field) {
                    None | Some(Value::Null) => {}
                    Some(v) if allowed.iter().any(|a| value_eq(v, a)) => {}
                    Some(_) => {
                        out.error = format!(
                            "{} must be one of: {:?}",
                            field,
                            allowed.iter().take(5).collect::<Vec<_>>()
                        )
                    }
                }
            }));
        }
        if let Some(min) = self.minimum {
            out.push(validator(move |field, entity, out| {
                if let Some(n) = entity.get(field).and_then(Value::as_f64) {
                    if n < min {
                        out.error = format!("{} must be at least {}", field, min);
                    }
                }
            }));
        }
        if let Some(max) = self.maximum {
            out.push(validator(move |field, entity, out| {
                if let Some(n) = entity.get(field).and_then(Value::as_f64) {
                    if n > max {
                        out.error = format!("{} must be at most {}", field, max);
                    }
                }
            }));
        }
        Ok(out)
    }
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(s), Value::String(t)) => s == t,
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity(v: Value) -> EntityData {
        match v {
            Value::Object(m) => m,
            _ => panic!("object expected"),
        }
    }

    fn map(entries: Vec<(&str, Vec<Validator>)>) -> ValidatorsMap {
        entries.into_iter().map(|(k, v)| (k.to_lowercase(), v)).collect()
    }

    #[test]
    fn required_rejects_empty_and_null() {
        let validators = map(vec![("field", vec![required()])]);
        let r = validate(&entity(json!({"field": ""})), &validators);
        assert_eq!(r.errors, vec![ValidationError { field: "field".into(), error: "field is required".into() }]);
        assert!(!validate(&entity(json!({"field": null})), &validators).is_valid());
        assert!(validate(&entity(json!({"field": "x"})), &validators).is_valid());
    }

    #[test]
    fn email_allows_empty_and_rejects_garbage() {
        let validators = map(vec![("email", vec![email()])]);
        assert!(validate(&entity(json!({"email": ""})), &validators).is_valid());
        assert!(validate(&entity(json!({"email": "a@b.io"})), &validators).is_valid());
        let r = validate(&entity(json!({"email": "not-an-email"})), &validators);
        assert_eq!(r.errors[0].error, "email has an invalid format");
    }

    #[test]
    fn failures_across_fields_are_all_reported() {
        let validators = map(vec![
            ("name", vec![required(), ValidationRule { min_length: Some(3), ..Default::default() }.compile().unwrap().remove(0)]),
            ("contactEmail", vec![required(), email()]),
        ]);
        let r = validate(&entity(json!({"name": "", "contactEmail": "nope", "other": 1})), &validators);
        assert_eq!(r.errors.len(), 3);
        let fields: Vec<&str> = r.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields.iter().filter(|f| **f == "name").count(), 2);
        assert!(fields.contains(&"contactEmail"));
    }

    #[test]
    fn field_lookup_is_case_insensitive() {
        let validators = map(vec![("FirstName", vec![required()])]);
        assert!(!validate(&entity(json!({"firstName": ""})), &validators).is_valid());
    }

    #[test]
    fn rules_compile_into_validators() {
        let rule = ValidationRule {
            required: Some(true),
            max_length: Some(4),
            pattern: Some("^[a-z]+$".into()),
            allowed: Some(vec![json!("abc"), json!("xyz")]),
            ..Default::default()
        };
        let validators = map(vec![("code", rule.compile().unwrap())]);
        assert!(validate(&entity(json!({"code": "abc"})), &validators).is_valid());
        let r = validate(&entity(json!({"code": "ABCDE"})), &validators);
        assert_eq!(r.errors.len(), 3);
    }

    #[test]
    fn numeric_bounds() {
        let rule = ValidationRule {
            minimum: Some(1.0),
            maximum: Some(10.0),
            ..Default::default()
        };
        let validators = map(vec![("qty", rule.compile().unwrap())]);
        assert!(validate(&entity(json!({"qty": 5})), &validators).is_valid());
        assert_eq!(validate(&entity(json!({"qty": 0})), &validators).errors[0].error, "qty must be at least 1");
        assert_eq!(validate(&entity(json!({"qty": 11})), &validators).errors[0].error, "qty must be at most 10");
    }

    #[test]
    fn bad_pattern_fails_compilation() {
        let rule = ValidationRule {
            pattern: Some("(".into()),
            ..Default::default()
        };
        assert!(rule.compile().is_err());
    }
}
