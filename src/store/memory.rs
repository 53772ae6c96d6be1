//! In-process store with the same visibility rules as the Postgres one.

use super::{check_columns, AuditSink, Filter, OrderBy, Page, PageRequest, Snapshot, Store};
use crate::error::AppError;
use crate::history::{HistoryEntry, HistoryQuery};
use crate::model::ModelDescriptor;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[derive(Default)]
struct Table {
    next_id: i64,
    rows: BTreeMap<i64, Snapshot>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
    history: RwLock<Vec<HistoryEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every row of the model's table, soft-deleted ones included.
    pub async fn raw_rows(&self, model: &ModelDescriptor) -> Vec<Snapshot> {
        let tables = self.tables.read().await;
        tables
            .get(model.table_name())
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every recorded history entry in insertion order.
    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.history.read().await.clone()
    }
}

fn now() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
}

fn is_live(row: &Snapshot) -> bool {
    row.get("deletedAt").map_or(true, Value::is_null)
}

fn key_of(model: &ModelDescriptor, column: &str) -> String {
    model
        .column_specs()
        .into_iter()
        .find(|c| c.column == column)
        .map(|c| c.key)
        .unwrap_or_else(|| column.to_string())
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn matches(model: &ModelDescriptor, row: &Snapshot, filters: &[Filter]) -> bool {
    is_live(row)
        && filters.iter().all(|f| match f {
            Filter::Eq { column, value } => row
                .get(&key_of(model, column))
                .map_or(value.is_null(), |v| loose_eq(v, value)),
        })
}

fn rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn cmp_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn id_of(row: &Snapshot) -> i64 {
    row.get("id").and_then(Value::as_i64).unwrap_or_default()
}

fn sort_rows(model: &ModelDescriptor, rows: &mut [Snapshot], order: &[OrderBy]) {
    let keys: Vec<(String, bool)> = order
        .iter()
        .map(|o| (key_of(model, &o.column), o.descending))
        .collect();
    rows.sort_by(|a, b| {
        for (key, descending) in &keys {
            let va = a.get(key).unwrap_or(&Value::Null);
            let vb = b.get(key).unwrap_or(&Value::Null);
            let ord = cmp_values(va, vb);
            let ord = if *descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        id_of(a).cmp(&id_of(b))
    });
}

fn paginate<T>(items: Vec<T>, page: PageRequest) -> Page<T> {
    let total = items.len() as u64;
    let items = items
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit as usize)
        .collect();
    Page { items, total }
}

#[async_trait]
impl Store for MemoryStore {
    async fn migrate(&self, model: &ModelDescriptor) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        tables
            .entry(model.table_name().to_string())
            .or_insert_with(|| Table {
                next_id: 1,
                rows: BTreeMap::new(),
            });
        Ok(())
    }

    async fn create(&self, model: &ModelDescriptor, entity: &Snapshot) -> Result<Snapshot, AppError> {
        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(model.table_name())
            .ok_or_else(|| AppError::Internal(format!("table {} not migrated", model.table_name())))?;
        let id = table.next_id;
        table.next_id += 1;
        let mut row = entity.clone();
        let ts = now();
        row.insert("id".into(), Value::from(id));
        row.insert("createdAt".into(), ts.clone());
        row.insert("updatedAt".into(), ts);
        row.insert("deletedAt".into(), Value::Null);
        table.rows.insert(id, row.clone());
        Ok(row)
    }

    async fn save(&self, model: &ModelDescriptor, entity: &Snapshot) -> Result<Option<Snapshot>, AppError> {
        let id = id_of(entity);
        let mut tables = self.tables.write().await;
        let Some(existing) = tables
            .get_mut(model.table_name())
            .and_then(|t| t.rows.get_mut(&id))
            .filter(|row| is_live(row))
        else {
            return Ok(None);
        };
        let mut row = entity.clone();
        for key in ["createdAt", "createdById", "deletedAt"] {
            row.insert(key.into(), existing.get(key).cloned().unwrap_or(Value::Null));
        }
        row.insert("updatedAt".into(), now());
        *existing = row.clone();
        Ok(Some(row))
    }

    async fn delete(&self, model: &ModelDescriptor, id: i64, actor: i64) -> Result<Option<Snapshot>, AppError> {
        let mut tables = self.tables.write().await;
        let Some(existing) = tables
            .get_mut(model.table_name())
            .and_then(|t| t.rows.get_mut(&id))
            .filter(|row| is_live(row))
        else {
            return Ok(None);
        };
        let ts = now();
        existing.insert("deletedAt".into(), ts.clone());
        existing.insert("updatedAt".into(), ts);
        existing.insert("updatedById".into(), Value::from(actor));
        Ok(Some(existing.clone()))
    }

    async fn find(
        &self,
        model: &ModelDescriptor,
        filters: &[Filter],
        page: PageRequest,
        order: &[OrderBy],
    ) -> Result<Page<Snapshot>, AppError> {
        check_columns(model, filters, order)?;
        let tables = self.tables.read().await;
        let mut rows: Vec<Snapshot> = tables
            .get(model.table_name())
            .map(|t| {
                t.rows
                    .values()
                    .filter(|row| matches(model, row, filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        sort_rows(model, &mut rows, order);
        Ok(paginate(rows, page))
    }

    async fn find_by_id(
        &self,
        model: &ModelDescriptor,
        id: i64,
        filters: &[Filter],
    ) -> Result<Option<Snapshot>, AppError> {
        check_columns(model, filters, &[])?;
        let tables = self.tables.read().await;
        Ok(tables
            .get(model.table_name())
            .and_then(|t| t.rows.get(&id))
            .filter(|row| matches(model, row, filters))
            .cloned())
    }
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn ensure_schema(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn record(&self, mut entry: HistoryEntry) -> Result<HistoryEntry, AppError> {
        let mut history = self.history.write().await;
        entry.id = history.len() as i64 + 1;
        history.push(entry.clone());
        Ok(entry)
    }

    async fn timeline(&self, query: &HistoryQuery, page: PageRequest) -> Result<Page<HistoryEntry>, AppError> {
        let history = self.history.read().await;
        let entries: Vec<HistoryEntry> = history
            .iter()
            .rev()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();
        Ok(paginate(entries, page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldDef, FieldType, Model, SystemData};
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Clone, Debug, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Note {
        #[serde(flatten)]
        system: SystemData,
        title: String,
        rank: i64,
    }

    impl Model for Note {
        const NAME: &'static str = "Note";
        fn fields() -> Vec<FieldDef> {
            vec![FieldDef::new("title", FieldType::Text), FieldDef::new("rank", FieldType::Integer)]
        }
    }

    fn snapshot(v: Value) -> Snapshot {
        match v {
            Value::Object(m) => m,
            _ => Snapshot::new(),
        }
    }

    async fn seeded() -> (MemoryStore, ModelDescriptor) {
        let store = MemoryStore::new();
        let model = ModelDescriptor::of::<Note>();
        store.migrate(&model).await.unwrap();
        for (title, rank, owner) in [("a", 3, 1), ("b", 1, 2), ("c", 2, 1)] {
            store
                .create(&model, &snapshot(json!({"title": title, "rank": rank, "createdById": owner})))
                .await
                .unwrap();
        }
        (store, model)
    }

    #[tokio::test]
    async fn create_assigns_ids_and_timestamps() {
        let (store, model) = seeded().await;
        let row = store.find_by_id(&model, 2, &[]).await.unwrap().unwrap();
        assert_eq!(row["title"], "b");
        assert!(row["createdAt"].is_string());
        assert!(row["deletedAt"].is_null());
    }

    #[tokio::test]
    async fn find_filters_orders_and_pages() {
        let (store, model) = seeded().await;
        let page = store
            .find(&model, &[Filter::owned_by(1)], PageRequest::new(1, 10), &[OrderBy::desc("rank")])
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        let titles: Vec<&Value> = page.items.iter().map(|r| &r["title"]).collect();
        assert_eq!(titles, vec!["a", "c"]);

        let second = store
            .find(&model, &[], PageRequest::new(2, 2), &[OrderBy::asc("rank")])
            .await
            .unwrap();
        assert_eq!(second.total, 3);
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0]["title"], "a");
    }

    #[tokio::test]
    async fn unknown_columns_are_rejected() {
        let (store, model) = seeded().await;
        let err = store
            .find(&model, &[], PageRequest::new(1, 10), &[OrderBy::asc("title; drop table notes")])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn ownership_filter_hides_foreign_rows() {
        let (store, model) = seeded().await;
        assert!(store.find_by_id(&model, 2, &[Filter::owned_by(1)]).await.unwrap().is_none());
        assert!(store.find_by_id(&model, 2, &[Filter::owned_by(2)]).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn save_keeps_creator_and_delete_is_soft() {
        let (store, model) = seeded().await;
        let saved = store
            .save(&model, &snapshot(json!({"id": 1, "title": "z", "rank": 3, "createdById": 99, "updatedById": 2})))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved["createdById"], 1);
        assert_eq!(saved["updatedById"], 2);

        let deleted = store.delete(&model, 1, 2).await.unwrap().unwrap();
        assert_eq!(deleted["updatedById"], 2);
        assert!(store.find_by_id(&model, 1, &[]).await.unwrap().is_none());
        assert!(store.delete(&model, 1, 2).await.unwrap().is_none());
        assert_eq!(store.raw_rows(&model).await.len(), 3);
    }

    #[tokio::test]
    async fn timeline_is_newest_first() {
        let store = MemoryStore::new();
        for id in 1..=3 {
            let e = HistoryEntry::new(None, crate::history::CrudAction::Created, "Note", id, &json!({}), "r").unwrap();
            store.record(e).await.unwrap();
        }
        let q = HistoryQuery { resource_name: "Note".into(), resource_id: None };
        let page = store.timeline(&q, PageRequest::new(1, 2)).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items[0].resource_id, "3");
        assert_eq!(page.items[1].resource_id, "2");
    }
}
