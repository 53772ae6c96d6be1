//! `GET /api/{kebab-plural}/schema`: JSON-schema-like description of a resource.

use super::resource::expect_method;
use crate::error::AppError;
use crate::model::{FieldType, ModelDescriptor, SYSTEM_KEYS};
use crate::registry::Resource;
use crate::response::success_ok;
use axum::http::Method;
use axum::response::IntoResponse;
use axum::routing::{any, MethodRouter};
use serde_json::{json, Map, Value};
use std::sync::Arc;

fn property(field_type: FieldType, read_only: bool) -> Value {
    let mut prop = Map::new();
    prop.insert("type".into(), Value::from(field_type.schema_type()));
    if field_type == FieldType::Timestamp {
        prop.insert("format".into(), Value::from("date-time"));
    }
    if read_only {
        prop.insert("readOnly".into(), Value::Bool(true));
    }
    Value::Object(prop)
}

/// `{title, type, properties, required}`; system fields are marked read-only,
/// non-nullable domain fields are required.
pub fn schema_of(model: &ModelDescriptor) -> Value {
    let mut properties = Map::new();
    for spec in model.column_specs() {
        let read_only = SYSTEM_KEYS.contains(&spec.key.as_str());
        properties.insert(spec.key.clone(), property(spec.field_type, read_only));
    }
    let required: Vec<&str> = model
        .fields
        .iter()
        .filter(|f| !f.nullable)
        .map(|f| f.name.as_str())
        .collect();
    json!({
        "title": model.name(),
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

pub fn schema(resource: Arc<Resource>) -> MethodRouter<crate::state::AppState> {
    any(move |method: Method| async move {
        expect_method(&method, Method::GET)?;
        let body = schema_of(&resource.descriptor);
        Ok::<_, AppError>(success_ok(body, format!("Schema for {}", resource.name())).into_response())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldDef, Model, SystemData};
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Gadget {
        #[serde(flatten)]
        system: SystemData,
        label: String,
        released_on: Option<chrono::DateTime<chrono::Utc>>,
    }

    impl Model for Gadget {
        const NAME: &'static str = "Gadget";
        fn fields() -> Vec<FieldDef> {
            vec![
                FieldDef::new("label", FieldType::Text).not_null(),
                FieldDef::new("releasedOn", FieldType::Timestamp),
            ]
        }
    }

    #[test]
    fn schema_lists_fields_and_required() {
        let s = schema_of(&ModelDescriptor::of::<Gadget>());
        assert_eq!(s["title"], "Gadget");
        assert_eq!(s["type"], "object");
        assert_eq!(s["properties"]["label"]["type"], "string");
        assert_eq!(s["properties"]["releasedOn"]["format"], "date-time");
        assert_eq!(s["properties"]["id"]["readOnly"], true);
        assert_eq!(s["required"], json!(["label"]));
    }
}
