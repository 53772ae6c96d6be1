//! Demo server: two resources backed by Postgres when `DATABASE_URL` is set,
//! otherwise by the in-memory store.
//!
//! Run from repo root: `cargo run -p demo-server`
//! Tokens: `Authorization: Bearer admin-token` (admin), `alice-token`, `bob-token` (visitors).

use chrono::{DateTime, Utc};
use resource_manager::{
    init_tracing, required, Admin, AuditSink, Caller, EngineConfig, FieldDef, FieldType, MemoryStore, Model,
    PermissionAction, PermissionMap, PgStore, ResourceConfig, Role, StaticTokenProvider, Store, SystemData,
    ValidationRule,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Widget {
    #[serde(flatten)]
    system: SystemData,
    field: String,
    price: f64,
    tags: Option<serde_json::Value>,
}

impl Model for Widget {
    const NAME: &'static str = "Widget";
    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::new("field", FieldType::Text).not_null(),
            FieldDef::new("price", FieldType::Float).not_null(),
            FieldDef::new("tags", FieldType::Json),
        ]
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Announcement {
    #[serde(flatten)]
    system: SystemData,
    title: String,
    contact_email: String,
    published_at: Option<DateTime<Utc>>,
}

impl Model for Announcement {
    const NAME: &'static str = "Announcement";
    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::new("title", FieldType::Text).not_null(),
            FieldDef::new("contactEmail", FieldType::Text).not_null(),
            FieldDef::new("publishedAt", FieldType::Timestamp),
        ]
    }
}

async fn stores(config: &EngineConfig) -> Result<(Arc<dyn Store>, Arc<dyn AuditSink>), sqlx::Error> {
    match &config.database_url {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect(url)
                .await?;
            let pg = Arc::new(PgStore::new(pool, config.schema.clone()));
            tracing::info!(schema = %config.schema, "using postgres store");
            let store: Arc<dyn Store> = pg.clone();
            let audit: Arc<dyn AuditSink> = pg;
            Ok((store, audit))
        }
        None => {
            let memory = Arc::new(MemoryStore::new());
            tracing::info!("DATABASE_URL not set, using in-memory store");
            let store: Arc<dyn Store> = memory.clone();
            let audit: Arc<dyn AuditSink> = memory;
            Ok((store, audit))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing("resource_manager=info,demo_server=info");

    let config = EngineConfig::from_env();
    let bind_addr = config.bind_addr.clone();
    let (store, audit) = stores(&config).await?;
    let mut admin = Admin::new(store, audit, config);

    let visitor_crud = PermissionMap::new()
        .grant_all(Role::ADMIN)
        .grant(Role::VISITOR, &PermissionAction::ALL);
    admin
        .register::<Widget>(ResourceConfig::new(visitor_crud))
        .await?
        .register_validator("field", vec![required()])?;

    let announcements = ResourceConfig::new(
        PermissionMap::new()
            .grant_all(Role::ADMIN)
            .grant(Role::VISITOR, &[PermissionAction::Read]),
    )
    .skip_user_binding(true)
    .rule(
        "contactEmail",
        ValidationRule {
            required: Some(true),
            format: Some("email".into()),
            ..Default::default()
        },
    )
    .rule(
        "title",
        ValidationRule {
            required: Some(true),
            max_length: Some(120),
            ..Default::default()
        },
    );
    admin.register::<Announcement>(announcements).await?;

    let identity = StaticTokenProvider::new()
        .with_token("admin-token", Caller::new(1, "admin", vec![Role::admin()]))
        .with_token("alice-token", Caller::new(2, "alice", vec![Role::visitor()]))
        .with_token("bob-token", Caller::new(3, "bob", vec![Role::visitor()]));
    let app = admin.into_router(Arc::new(identity));

    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "demo server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
