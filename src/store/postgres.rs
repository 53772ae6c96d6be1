//! PostgreSQL store: one table per model, soft deletes, history in `history_entries`.

use super::{check_columns, AuditSink, Filter, OrderBy, Page, PageRequest, Snapshot, Store};
use crate::error::AppError;
use crate::history::{CrudAction, HistoryEntry, HistoryQuery};
use crate::migration::{migrate_history, migrate_model, HISTORY_TABLE};
use crate::model::{ColumnSpec, FieldType, ModelDescriptor};
use crate::sql::{count, insert, qualified_table, quoted, select_by_id, select_page, soft_delete, update, QueryBuf};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    schema: String,
}

impl PgStore {
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        PgStore {
            pool,
            schema: schema.into(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_optional(&self, model: &ModelDescriptor, q: &QueryBuf) -> Result<Option<Snapshot>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, resource = %model.name(), "query");
        let mut query = sqlx::query(&q.sql);
        for p in q.bound() {
            query = query.bind(p);
        }
        let row = query.fetch_optional(&self.pool).await?;
        row.map(|r| row_to_snapshot(&r, &model.column_specs())).transpose()
    }

    async fn fetch_all(&self, model: &ModelDescriptor, q: &QueryBuf) -> Result<Vec<Snapshot>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, resource = %model.name(), "query");
        let mut query = sqlx::query(&q.sql);
        for p in q.bound() {
            query = query.bind(p);
        }
        let rows = query.fetch_all(&self.pool).await?;
        let specs = model.column_specs();
        rows.iter().map(|r| row_to_snapshot(r, &specs)).collect()
    }

    async fn fetch_count(&self, q: &QueryBuf) -> Result<u64, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query_scalar::<_, i64>(&q.sql);
        for p in q.bound() {
            query = query.bind(p);
        }
        let n = query.fetch_one(&self.pool).await?;
        Ok(n.max(0) as u64)
    }
}

fn row_to_snapshot(row: &PgRow, specs: &[ColumnSpec]) -> Result<Snapshot, AppError> {
    let mut map = Snapshot::new();
    for spec in specs {
        map.insert(spec.key.clone(), cell_to_value(row, &spec.column, spec.field_type)?);
    }
    Ok(map)
}

fn cell_to_value(row: &PgRow, name: &str, field_type: FieldType) -> Result<Value, AppError> {
    let v = match field_type {
        FieldType::Integer => row.try_get::<Option<i64>, _>(name)?.map(Value::from),
        FieldType::Float => row
            .try_get::<Option<f64>, _>(name)?
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        FieldType::Boolean => row.try_get::<Option<bool>, _>(name)?.map(Value::Bool),
        FieldType::Timestamp => row
            .try_get::<Option<DateTime<Utc>>, _>(name)?
            .map(|d| Value::String(d.to_rfc3339_opts(SecondsFormat::Micros, true))),
        FieldType::Json => row.try_get::<Option<Value>, _>(name)?,
        FieldType::Text => row.try_get::<Option<String>, _>(name)?.map(Value::String),
    };
    Ok(v.unwrap_or(Value::Null))
}

#[async_trait]
impl Store for PgStore {
    async fn migrate(&self, model: &ModelDescriptor) -> Result<(), AppError> {
        migrate_model(&self.pool, &self.schema, model).await
    }

    async fn create(&self, model: &ModelDescriptor, entity: &Snapshot) -> Result<Snapshot, AppError> {
        let q = insert(&self.schema, model, entity);
        self.fetch_optional(model, &q)
            .await?
            .ok_or(AppError::Db(sqlx::Error::RowNotFound))
    }

    async fn save(&self, model: &ModelDescriptor, entity: &Snapshot) -> Result<Option<Snapshot>, AppError> {
        let q = update(&self.schema, model, entity);
        self.fetch_optional(model, &q).await
    }

    async fn delete(&self, model: &ModelDescriptor, id: i64, actor: i64) -> Result<Option<Snapshot>, AppError> {
        let q = soft_delete(&self.schema, model, id, actor);
        self.fetch_optional(model, &q).await
    }

    async fn find(
        &self,
        model: &ModelDescriptor,
        filters: &[Filter],
        page: PageRequest,
        order: &[OrderBy],
    ) -> Result<Page<Snapshot>, AppError> {
        check_columns(model, filters, order)?;
        let total = self.fetch_count(&count(&self.schema, model, filters)).await?;
        let items = self
            .fetch_all(model, &select_page(&self.schema, model, filters, order, page))
            .await?;
        Ok(Page { items, total })
    }

    async fn find_by_id(
        &self,
        model: &ModelDescriptor,
        id: i64,
        filters: &[Filter],
    ) -> Result<Option<Snapshot>, AppError> {
        check_columns(model, filters, &[])?;
        self.fetch_optional(model, &select_by_id(&self.schema, model, id, filters))
            .await
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").fetch_optional(&self.pool).await?;
        Ok(())
    }
}

const HISTORY_COLUMNS: &str =
    r#""id", "user_id", "username", "action", "resource_name", "resource_id", "timestamp", "detail", "request_id""#;

fn row_to_history(row: &PgRow) -> Result<HistoryEntry, AppError> {
    let action: String = row.try_get("action")?;
    Ok(HistoryEntry {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        username: row.try_get("username")?,
        action: CrudAction::parse(&action)
            .ok_or_else(|| AppError::Internal(format!("unknown history action {}", action)))?,
        resource_name: row.try_get("resource_name")?,
        resource_id: row.try_get("resource_id")?,
        timestamp: row.try_get("timestamp")?,
        detail: row.try_get("detail")?,
        request_id: row.try_get("request_id")?,
    })
}

#[async_trait]
impl AuditSink for PgStore {
    async fn ensure_schema(&self) -> Result<(), AppError> {
        migrate_history(&self.pool, &self.schema).await
    }

    async fn record(&self, mut entry: HistoryEntry) -> Result<HistoryEntry, AppError> {
        let sql = format!(
            "INSERT INTO {} (\"user_id\", \"username\", \"action\", \"resource_name\", \"resource_id\", \"timestamp\", \"detail\", \"request_id\") \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
            qualified_table(&self.schema, HISTORY_TABLE),
            quoted("id")
        );
        tracing::debug!(sql = %sql, resource = %entry.resource_name, action = %entry.action, "query");
        let id: i64 = sqlx::query_scalar(&sql)
            .bind(entry.user_id)
            .bind(&entry.username)
            .bind(entry.action.as_str())
            .bind(&entry.resource_name)
            .bind(&entry.resource_id)
            .bind(&entry.timestamp)
            .bind(&entry.detail)
            .bind(&entry.request_id)
            .fetch_one(&self.pool)
            .await?;
        entry.id = id;
        Ok(entry)
    }

    async fn timeline(&self, query: &HistoryQuery, page: PageRequest) -> Result<Page<HistoryEntry>, AppError> {
        let table = qualified_table(&self.schema, HISTORY_TABLE);
        let where_sql = if query.resource_id.is_some() {
            "WHERE \"resource_name\" = $1 AND \"resource_id\" = $2"
        } else {
            "WHERE \"resource_name\" = $1"
        };
        let count_sql = format!("SELECT COUNT(*) FROM {} {}", table, where_sql);
        let list_sql = format!(
            "SELECT {} FROM {} {} ORDER BY \"id\" DESC LIMIT {} OFFSET {}",
            HISTORY_COLUMNS,
            table,
            where_sql,
            page.limit,
            page.offset()
        );
        tracing::debug!(sql = %list_sql, resource = %query.resource_name, "query");

        let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql).bind(&query.resource_name);
        let mut list_q = sqlx::query(&list_sql).bind(&query.resource_name);
        if let Some(id) = &query.resource_id {
            count_q = count_q.bind(id);
            list_q = list_q.bind(id);
        }
        let total = count_q.fetch_one(&self.pool).await?;
        let rows = list_q.fetch_all(&self.pool).await?;
        let items = rows.iter().map(row_to_history).collect::<Result<Vec<_>, _>>()?;
        Ok(Page {
            items,
            total: total.max(0) as u64,
        })
    }
}
