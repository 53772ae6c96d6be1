//! Builds parameterized INSERT, SELECT, UPDATE and soft-delete statements from a model descriptor.

use super::params::bind_text;
use crate::model::{ColumnSpec, FieldType, ModelDescriptor};
use crate::store::{Filter, OrderBy, PageRequest, Snapshot};
use serde_json::Value;

/// Quote identifier for PostgreSQL.
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
    /// Column type of each entry in `params`.
    pub types: Vec<FieldType>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf::default()
    }

    fn push_param(&mut self, v: Value, t: FieldType) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        self.types.push(t);
        n
    }

    /// Push a parameter and return its placeholder cast to `t`.
    fn placeholder(&mut self, v: Value, t: FieldType) -> String {
        let n = self.push_param(v, t);
        format!("${}::{}", n, t.pg_type())
    }

    /// Parameters in bind order, as text for their column type.
    pub fn bound(&self) -> Vec<Option<String>> {
        self.params
            .iter()
            .zip(&self.types)
            .map(|(v, t)| bind_text(v, *t))
            .collect()
    }
}

fn select_column_list(model: &ModelDescriptor) -> String {
    model
        .column_specs()
        .iter()
        .map(|c| quoted(&c.column))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `WHERE deleted_at IS NULL AND <filters>`; filters bind in order.
fn where_clause(model: &ModelDescriptor, filters: &[Filter], q: &mut QueryBuf) -> String {
    let mut parts = vec![format!("{} IS NULL", quoted("deleted_at"))];
    for f in filters {
        match f {
            Filter::Eq { column, value } => {
                let t = model.column_type(column).unwrap_or(FieldType::Text);
                if value.is_null() {
                    parts.push(format!("{} IS NULL", quoted(column)));
                } else {
                    let ph = q.placeholder(value.clone(), t);
                    parts.push(format!("{} = {}", quoted(column), ph));
                }
            }
        }
    }
    format!(" WHERE {}", parts.join(" AND "))
}

fn order_clause(order: &[OrderBy]) -> String {
    let mut parts: Vec<String> = order
        .iter()
        .map(|o| format!("{} {}", quoted(&o.column), if o.descending { "DESC" } else { "ASC" }))
        .collect();
    if !order.iter().any(|o| o.column == "id") {
        parts.push(format!("{} ASC", quoted("id")));
    }
    format!(" ORDER BY {}", parts.join(", "))
}

/// Columns the client payload may write: everything but the store-owned ones.
fn writable(model: &ModelDescriptor) -> impl Iterator<Item = ColumnSpec> {
    model
        .column_specs()
        .into_iter()
        .filter(|c| !matches!(c.column.as_str(), "id" | "created_at" | "updated_at" | "deleted_at"))
}

/// SELECT one live row by id, further constrained by `filters`.
pub fn select_by_id(schema: &str, model: &ModelDescriptor, id: i64, filters: &[Filter]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, model.table_name());
    let mut filters = filters.to_vec();
    filters.insert(0, Filter::eq("id", id));
    let where_sql = where_clause(model, &filters, &mut q);
    q.sql = format!("SELECT {} FROM {}{}", select_column_list(model), table, where_sql);
    q
}

/// SELECT a page of live rows.
pub fn select_page(
    schema: &str,
    model: &ModelDescriptor,
    filters: &[Filter],
    order: &[OrderBy],
    page: PageRequest,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, model.table_name());
    let where_sql = where_clause(model, filters, &mut q);
    q.sql = format!(
        "SELECT {} FROM {}{}{} LIMIT {} OFFSET {}",
        select_column_list(model),
        table,
        where_sql,
        order_clause(order),
        page.limit,
        page.offset()
    );
    q
}

/// COUNT of live rows matching `filters`.
pub fn count(schema: &str, model: &ModelDescriptor, filters: &[Filter]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, model.table_name());
    let where_sql = where_clause(model, filters, &mut q);
    q.sql = format!("SELECT COUNT(*) FROM {}{}", table, where_sql);
    q
}

/// INSERT every writable column from the snapshot; timestamps from NOW().
pub fn insert(schema: &str, model: &ModelDescriptor, entity: &Snapshot) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, model.table_name());
    let mut cols = vec![quoted("created_at"), quoted("updated_at")];
    let mut values = vec!["NOW()".to_string(), "NOW()".to_string()];
    for c in writable(model) {
        let v = entity.get(&c.key).cloned().unwrap_or(Value::Null);
        cols.push(quoted(&c.column));
        values.push(q.placeholder(v, c.field_type));
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
        table,
        cols.join(", "),
        values.join(", "),
        select_column_list(model)
    );
    q
}

/// UPDATE the live row `entity["id"]`. `created_by_id` is never rewritten.
pub fn update(schema: &str, model: &ModelDescriptor, entity: &Snapshot) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, model.table_name());
    let mut sets = Vec::new();
    for c in writable(model).filter(|c| c.column != "created_by_id") {
        let v = entity.get(&c.key).cloned().unwrap_or(Value::Null);
        let ph = q.placeholder(v, c.field_type);
        sets.push(format!("{} = {}", quoted(&c.column), ph));
    }
    sets.push(format!("{} = NOW()", quoted("updated_at")));
    let id = entity.get("id").cloned().unwrap_or(Value::Null);
    let id_ph = q.placeholder(id, FieldType::Integer);
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {} AND {} IS NULL RETURNING {}",
        table,
        sets.join(", "),
        quoted("id"),
        id_ph,
        quoted("deleted_at"),
        select_column_list(model)
    );
    q
}

/// Soft delete by id, stamping the acting user as last updater.
pub fn soft_delete(schema: &str, model: &ModelDescriptor, id: i64, actor: i64) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, model.table_name());
    let actor_ph = q.placeholder(Value::from(actor), FieldType::Integer);
    let id_ph = q.placeholder(Value::from(id), FieldType::Integer);
    q.sql = format!(
        "UPDATE {} SET {} = NOW(), {} = NOW(), {} = {} WHERE {} = {} AND {} IS NULL RETURNING {}",
        table,
        quoted("deleted_at"),
        quoted("updated_at"),
        quoted("updated_by_id"),
        actor_ph,
        quoted("id"),
        id_ph,
        quoted("deleted_at"),
        select_column_list(model)
    );
    q
}
