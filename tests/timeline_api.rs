mod common;

use async_trait::async_trait;
use axum::http::StatusCode;
use common::*;
use resource_manager::{AppError, AuditSink, CrudAction, HistoryEntry, HistoryQuery, MemoryStore, Page, PageRequest};
use serde_json::{json, Value};
use std::sync::Arc;

#[tokio::test]
async fn every_mutation_is_recorded_newest_first() {
    let (app, store) = app().await;
    let id = create_widget(&app, U1, "a").await;
    send(&app, "PUT", &format!("/api/widgets/{}/update", id), Some(U1), Some(json!({"field": "b"}))).await;
    send(&app, "DELETE", &format!("/api/widgets/{}/delete", id), Some(U1), None).await;

    let history = store.history().await;
    let actions: Vec<CrudAction> = history.iter().map(|e| e.action).collect();
    assert_eq!(actions, vec![CrudAction::Created, CrudAction::Updated, CrudAction::Deleted]);
    assert!(history.iter().all(|e| e.user_id == U1_ID && e.resource_name == "Widget"));

    let diff: Value = serde_json::from_str(&history[1].detail).unwrap();
    assert_eq!(diff, json!({"field": ["a", "b"]}));
    let deleted: Value = serde_json::from_str(&history[2].detail).unwrap();
    assert_eq!(deleted["field"], "b");

    let reply = send(
        &app,
        "GET",
        &format!("/api/timeline?resourceName=widget&resourceId={}", id),
        Some(ADMIN),
        None,
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["message"], "resource timeline");
    assert_eq!(reply.body["pagination"]["total"], 3);
    assert_eq!(reply.body["data"][0]["action"], "deleted");
    assert_eq!(reply.body["data"][2]["action"], "created");
}

#[tokio::test]
async fn timeline_access_rules() {
    let (app, _) = app().await;
    create_widget(&app, U1, "a").await;

    let visitor = send(&app, "GET", "/api/timeline?resourceName=Widget", Some(U1), None).await;
    assert_eq!(visitor.status, StatusCode::FORBIDDEN);

    let anonymous = send(&app, "GET", "/api/timeline?resourceName=Widget", None, None).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let missing = send(&app, "GET", "/api/timeline", Some(ADMIN), None).await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    assert_eq!(missing.body["message"], "Resource Name is required");

    let unknown = send(&app, "GET", "/api/timeline?resource_name=Nope", Some(ADMIN), None).await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
}

/// Sink whose writes always fail.
struct BrokenAudit;

#[async_trait]
impl AuditSink for BrokenAudit {
    async fn ensure_schema(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn record(&self, _entry: HistoryEntry) -> Result<HistoryEntry, AppError> {
        Err(AppError::Internal("audit store offline".into()))
    }

    async fn timeline(&self, _query: &HistoryQuery, _page: PageRequest) -> Result<Page<HistoryEntry>, AppError> {
        Ok(Page {
            items: Vec::new(),
            total: 0,
        })
    }
}

#[tokio::test]
async fn failed_audit_write_does_not_fail_the_request() {
    let store = Arc::new(MemoryStore::new());
    let admin = admin_with(store.clone(), Arc::new(BrokenAudit)).await;
    let app = admin.into_router(Arc::new(identity()));

    let id = create_widget(&app, U1, "a").await;
    let detail = send(&app, "GET", &format!("/api/widgets/{}", id), Some(U1), None).await;
    assert_eq!(detail.status, StatusCode::OK);
    assert!(store.history().await.is_empty());
}
