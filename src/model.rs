//! Domain model contract and the type-erased descriptor the registry stores per resource.

use crate::case::{to_camel_case, to_snake_case, ResourceNames};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

/// Bookkeeping fields every domain model embeds with `#[serde(flatten)]`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemData {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by_id: i64,
    #[serde(default)]
    pub updated_by_id: i64,
}

/// JSON keys of the [`SystemData`] fields as they appear in snapshots.
pub const SYSTEM_KEYS: &[&str] = &["id", "createdAt", "updatedAt", "deletedAt", "createdById", "updatedById"];

/// Storage type of a model field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Integer,
    Float,
    Boolean,
    Timestamp,
    Json,
}

impl FieldType {
    pub fn pg_type(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Integer => "bigint",
            FieldType::Float => "double precision",
            FieldType::Boolean => "boolean",
            FieldType::Timestamp => "timestamptz",
            FieldType::Json => "jsonb",
        }
    }

    /// JSON schema `type` keyword.
    pub fn schema_type(&self) -> &'static str {
        match self {
            FieldType::Text | FieldType::Timestamp => "string",
            FieldType::Integer => "integer",
            FieldType::Float => "number",
            FieldType::Boolean => "boolean",
            FieldType::Json => "object",
        }
    }
}

/// One domain field: its JSON key (as serialized by serde) and storage type.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub nullable: bool,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        FieldDef {
            name: name.into(),
            field_type,
            nullable: true,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Column name in the backing table.
    pub fn column(&self) -> String {
        to_snake_case(&self.name)
    }
}

/// A domain type that can be registered as a resource.
///
/// ```ignore
/// #[derive(Clone, Debug, Default, Serialize, Deserialize)]
/// #[serde(rename_all = "camelCase")]
/// struct Widget {
///     #[serde(flatten)]
///     system: SystemData,
///     field: String,
/// }
///
/// impl Model for Widget {
///     const NAME: &'static str = "Widget";
///     fn fields() -> Vec<FieldDef> {
///         vec![FieldDef::new("field", FieldType::Text)]
///     }
/// }
/// ```
pub trait Model: Serialize + DeserializeOwned + Default + Send + Sync + 'static {
    /// Bare type name, e.g. "Widget". Routes and table names derive from it.
    const NAME: &'static str;

    /// Domain fields, excluding the embedded [`SystemData`].
    fn fields() -> Vec<FieldDef>;
}

/// Column of a system field and its storage type.
pub fn system_columns() -> Vec<(&'static str, FieldType)> {
    vec![
        ("id", FieldType::Integer),
        ("created_at", FieldType::Timestamp),
        ("updated_at", FieldType::Timestamp),
        ("deleted_at", FieldType::Timestamp),
        ("created_by_id", FieldType::Integer),
        ("updated_by_id", FieldType::Integer),
    ]
}

/// Backing column of one snapshot key.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnSpec {
    pub column: String,
    pub key: String,
    pub field_type: FieldType,
    pub nullable: bool,
}

fn zero_value<T: Model>() -> Result<Map<String, Value>, serde_json::Error> {
    to_object(serde_json::to_value(T::default())?)
}

fn normalize<T: Model>(value: Value) -> Result<Map<String, Value>, serde_json::Error> {
    let typed: T = serde_json::from_value(value)?;
    to_object(serde_json::to_value(typed)?)
}

fn to_object(value: Value) -> Result<Map<String, Value>, serde_json::Error> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(serde::de::Error::custom(format!(
            "model must serialize to a JSON object, got {}",
            other
        ))),
    }
}

/// Type-erased handle on a [`Model`]: names, fields, and the functions that build
/// and normalize snapshots of it.
#[derive(Clone, Debug)]
pub struct ModelDescriptor {
    pub names: ResourceNames,
    pub fields: Vec<FieldDef>,
    zero: fn() -> Result<Map<String, Value>, serde_json::Error>,
    normalize: fn(Value) -> Result<Map<String, Value>, serde_json::Error>,
}

impl ModelDescriptor {
    pub fn of<T: Model>() -> Self {
        ModelDescriptor {
            names: ResourceNames::from_type_name(T::NAME),
            fields: T::fields(),
            zero: zero_value::<T>,
            normalize: normalize::<T>,
        }
    }

    pub fn name(&self) -> &str {
        &self.names.singular
    }

    pub fn table_name(&self) -> &str {
        &self.names.snake_plural
    }

    /// Snapshot of `T::default()`.
    pub fn zero_value(&self) -> Result<Map<String, Value>, serde_json::Error> {
        (self.zero)()
    }

    /// Round-trip a candidate snapshot through `T`: unknown keys are dropped,
    /// missing keys take their default, mistyped values are an error.
    pub fn normalize(&self, value: Value) -> Result<Map<String, Value>, serde_json::Error> {
        (self.normalize)(value)
    }

    /// System columns followed by domain columns, each paired with its snapshot key.
    pub fn column_specs(&self) -> Vec<ColumnSpec> {
        let mut out: Vec<ColumnSpec> = system_columns()
            .into_iter()
            .map(|(c, t)| ColumnSpec {
                column: c.to_string(),
                key: to_camel_case(c),
                field_type: t,
                nullable: true,
            })
            .collect();
        for f in &self.fields {
            out.push(ColumnSpec {
                column: f.column(),
                key: f.name.clone(),
                field_type: f.field_type,
                nullable: f.nullable,
            });
        }
        out
    }

    pub fn column_type(&self, column: &str) -> Option<FieldType> {
        self.column_specs()
            .into_iter()
            .find(|c| c.column == column)
            .map(|c| c.field_type)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_type(column).is_some()
    }
}
