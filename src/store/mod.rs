//! Persistence collaborators: entity storage and the audit sink.
//!
//! Snapshots cross this boundary as JSON objects keyed the way the model
//! serializes (camelCase). Predicates are a closed set of server-built
//! filters; values are always bound, never interpolated.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::error::AppError;
use crate::history::{HistoryEntry, HistoryQuery};
use crate::model::ModelDescriptor;
use async_trait::async_trait;
use serde_json::{Map, Value};

pub type Snapshot = Map<String, Value>;

/// Server-constructed row predicate. Soft-deleted rows are always excluded.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    /// `column = value`.
    Eq { column: String, value: Value },
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Ownership predicate: rows created by `user_id`.
    pub fn owned_by(user_id: i64) -> Self {
        Filter::eq("created_by_id", user_id)
    }

    pub fn column(&self) -> &str {
        match self {
            Filter::Eq { column, .. } => column,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        OrderBy {
            column: column.into(),
            descending: false,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        OrderBy {
            column: column.into(),
            descending: true,
        }
    }
}

/// 1-based page of `limit` rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Self {
        PageRequest {
            page: page.max(1),
            limit: limit.max(1),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

/// One page of rows plus the total matching count.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Create or extend backing storage for the model. Safe to call on every boot.
    async fn migrate(&self, model: &ModelDescriptor) -> Result<(), AppError>;

    /// Insert a snapshot. The store assigns `id`, `createdAt` and `updatedAt`.
    async fn create(&self, model: &ModelDescriptor, entity: &Snapshot) -> Result<Snapshot, AppError>;

    /// Overwrite the row with `entity["id"]`. `None` when it does not exist.
    async fn save(&self, model: &ModelDescriptor, entity: &Snapshot) -> Result<Option<Snapshot>, AppError>;

    /// Soft delete on behalf of `actor`. Returns the deleted row, or `None` when it does not exist.
    async fn delete(&self, model: &ModelDescriptor, id: i64, actor: i64) -> Result<Option<Snapshot>, AppError>;

    async fn find(
        &self,
        model: &ModelDescriptor,
        filters: &[Filter],
        page: PageRequest,
        order: &[OrderBy],
    ) -> Result<Page<Snapshot>, AppError>;

    /// Row with `id` that also satisfies every filter.
    async fn find_by_id(
        &self,
        model: &ModelDescriptor,
        id: i64,
        filters: &[Filter],
    ) -> Result<Option<Snapshot>, AppError>;

    /// Readiness probe.
    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Create backing storage for history entries. Idempotent.
    async fn ensure_schema(&self) -> Result<(), AppError>;

    /// Append an entry; returns it with its assigned id.
    async fn record(&self, entry: HistoryEntry) -> Result<HistoryEntry, AppError>;

    /// Entries matching `query`, newest first.
    async fn timeline(&self, query: &HistoryQuery, page: PageRequest) -> Result<Page<HistoryEntry>, AppError>;
}

/// Reject filters and orderings on columns the model does not have.
pub(crate) fn check_columns(
    model: &ModelDescriptor,
    filters: &[Filter],
    order: &[OrderBy],
) -> Result<(), AppError> {
    for column in filters
        .iter()
        .map(Filter::column)
        .chain(order.iter().map(|o| o.column.as_str()))
    {
        if !model.has_column(column) {
            return Err(AppError::BadRequest(format!(
                "unknown field {} for {}",
                column,
                model.name()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_offset() {
        assert_eq!(PageRequest::new(1, 10).offset(), 0);
        assert_eq!(PageRequest::new(3, 25).offset(), 50);
        assert_eq!(PageRequest::new(0, 0), PageRequest { page: 1, limit: 1 });
    }
}
