#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use resource_manager::{
    required, Admin, AuditSink, Caller, EngineConfig, FieldDef, FieldType, MemoryStore, Model, PermissionAction,
    PermissionMap, ResourceConfig, Role, StaticTokenProvider, SystemData, ValidationRule,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub const U1: &str = "u1-token";
pub const U2: &str = "u2-token";
pub const ADMIN: &str = "admin-token";
pub const U1_ID: i64 = 11;
pub const U2_ID: i64 = 22;
pub const ADMIN_ID: i64 = 1;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Widget {
    #[serde(flatten)]
    pub system: SystemData,
    pub field: String,
    pub price: f64,
}

impl Model for Widget {
    const NAME: &'static str = "Widget";
    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::new("field", FieldType::Text).not_null(),
            FieldDef::new("price", FieldType::Float),
        ]
    }
}

/// Visitors may only read gadgets; every caller sees every gadget.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gadget {
    #[serde(flatten)]
    pub system: SystemData,
    pub name: String,
    pub contact_email: String,
}

impl Model for Gadget {
    const NAME: &'static str = "Gadget";
    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::new("name", FieldType::Text),
            FieldDef::new("contactEmail", FieldType::Text),
        ]
    }
}

pub fn identity() -> StaticTokenProvider {
    StaticTokenProvider::new()
        .with_token(U1, Caller::new(U1_ID, "u1", vec![Role::visitor()]))
        .with_token(U2, Caller::new(U2_ID, "u2", vec![Role::visitor()]))
        .with_token(ADMIN, Caller::new(ADMIN_ID, "root", vec![Role::admin()]))
}

pub async fn admin_with(store: Arc<MemoryStore>, audit: Arc<dyn AuditSink>) -> Admin {
    let mut admin = Admin::new(store, audit, EngineConfig::default());
    let widgets = PermissionMap::new()
        .grant_all(Role::ADMIN)
        .grant(Role::VISITOR, &PermissionAction::ALL);
    admin
        .register::<Widget>(ResourceConfig::new(widgets))
        .await
        .unwrap()
        .register_validator("field", vec![required()])
        .unwrap();

    let gadgets = ResourceConfig::new(
        PermissionMap::new()
            .grant_all(Role::ADMIN)
            .grant(Role::VISITOR, &[PermissionAction::Read]),
    )
    .skip_user_binding(true)
    .rule(
        "name",
        ValidationRule {
            required: Some(true),
            ..Default::default()
        },
    )
    .rule(
        "contactEmail",
        ValidationRule {
            format: Some("email".into()),
            ..Default::default()
        },
    );
    admin.register::<Gadget>(gadgets).await.unwrap();
    admin
}

/// Router over a fresh in-memory store, plus the store for inspection.
pub async fn app() -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let admin = admin_with(store.clone(), store.clone()).await;
    (admin.into_router(Arc::new(identity())), store)
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Value,
}

pub async fn send(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Reply {
    send_raw(app, method, uri, token, body.map(|v| v.to_string())).await
}

/// Like [`send`], with the body passed through verbatim.
pub async fn send_raw(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<String>) -> Reply {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header("authorization", format!("Bearer {}", token));
    }
    let req = match body {
        Some(raw) => req
            .header("content-type", "application/json")
            .body(Body::from(raw))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    Reply { status, headers, body }
}

/// POST a widget as `token` and return its id.
pub async fn create_widget(app: &Router, token: &str, field: &str) -> i64 {
    let reply = send(app, "POST", "/api/widgets/new", Some(token), Some(serde_json::json!({ "field": field }))).await;
    assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
    reply.body["data"]["id"].as_i64().unwrap()
}
