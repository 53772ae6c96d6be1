//! DDL for resource tables and the history ledger. Every statement is idempotent
//! (IF NOT EXISTS), so migrations run on every boot.

use crate::error::AppError;
use crate::model::{ColumnSpec, ModelDescriptor};
use crate::sql::{qualified_table, quoted};
use sqlx::PgPool;

pub const HISTORY_TABLE: &str = "history_entries";

fn column_def(c: &ColumnSpec) -> String {
    let name = quoted(&c.column);
    match c.column.as_str() {
        "id" => format!("{} BIGSERIAL PRIMARY KEY", name),
        "created_at" | "updated_at" => format!("{} TIMESTAMPTZ NOT NULL DEFAULT NOW()", name),
        "created_by_id" | "updated_by_id" => format!("{} BIGINT NOT NULL DEFAULT 0", name),
        _ if !c.nullable => format!("{} {} NOT NULL", name, c.field_type.pg_type().to_uppercase()),
        _ => format!("{} {}", name, c.field_type.pg_type().to_uppercase()),
    }
}

pub fn create_schema_sql(schema: &str) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {}", quoted(schema))
}

pub fn create_table_sql(schema: &str, model: &ModelDescriptor) -> String {
    let defs: Vec<String> = model
        .column_specs()
        .iter()
        .map(column_def)
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        qualified_table(schema, model.table_name()),
        defs.join(", ")
    )
}

/// One `ADD COLUMN IF NOT EXISTS` per domain field, for tables created by an older model.
/// Added columns are nullable so existing rows stay valid.
pub fn add_column_sqls(schema: &str, model: &ModelDescriptor) -> Vec<String> {
    let table = qualified_table(schema, model.table_name());
    model
        .fields
        .iter()
        .map(|f| {
            format!(
                "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {} {}",
                table,
                quoted(&f.column()),
                f.field_type.pg_type().to_uppercase()
            )
        })
        .collect()
}

pub fn owner_index_sql(schema: &str, model: &ModelDescriptor) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
        quoted(&format!("{}_created_by_id_idx", model.table_name())),
        qualified_table(schema, model.table_name()),
        quoted("created_by_id")
    )
}

pub fn history_table_sql(schema: &str) -> String {
    format!(
        r#"CREATE TABLE IF NOT EXISTS {} (
            "id" BIGSERIAL PRIMARY KEY,
            "user_id" BIGINT NOT NULL,
            "username" TEXT NOT NULL,
            "action" TEXT NOT NULL,
            "resource_name" TEXT NOT NULL,
            "resource_id" TEXT NOT NULL,
            "timestamp" TEXT NOT NULL,
            "detail" TEXT NOT NULL,
            "request_id" TEXT NOT NULL
        )"#,
        qualified_table(schema, HISTORY_TABLE)
    )
}

pub fn history_index_sql(schema: &str) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} ({}, {})",
        quoted(&format!("{}_resource_idx", HISTORY_TABLE)),
        qualified_table(schema, HISTORY_TABLE),
        quoted("resource_name"),
        quoted("resource_id")
    )
}

/// Create or extend the model's table.
pub async fn migrate_model(pool: &PgPool, schema: &str, model: &ModelDescriptor) -> Result<(), AppError> {
    let mut statements = vec![create_schema_sql(schema), create_table_sql(schema, model)];
    statements.extend(add_column_sqls(schema, model));
    statements.push(owner_index_sql(schema, model));
    for sql in statements {
        tracing::debug!(sql = %sql, resource = %model.name(), "migrate");
        sqlx::query(&sql).execute(pool).await?;
    }
    tracing::info!(resource = %model.name(), table = %model.table_name(), "migrated");
    Ok(())
}

pub async fn migrate_history(pool: &PgPool, schema: &str) -> Result<(), AppError> {
    for sql in [create_schema_sql(schema), history_table_sql(schema), history_index_sql(schema)] {
        tracing::debug!(sql = %sql, "migrate");
        sqlx::query(&sql).execute(pool).await?;
    }
    Ok(())
}
