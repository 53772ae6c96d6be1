//! Resource manager: register a domain struct, get a permission-checked,
//! owner-scoped, audited REST resource on axum and PostgreSQL.

pub mod case;
pub mod config;
pub mod diff;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod history;
pub mod identity;
pub mod logging;
pub mod middleware;
pub mod migration;
pub mod model;
pub mod permissions;
pub mod registry;
pub mod response;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use case::ResourceNames;
pub use config::{EngineConfig, ValidationRule};
pub use error::{AppError, RegistryError};
pub use extractors::{RequestContext, REQUEST_ID_HEADER};
pub use history::{CrudAction, HistoryEntry, HistoryQuery};
pub use identity::{Caller, IdentityProvider, StaticTokenProvider};
pub use logging::init_tracing;
pub use model::{FieldDef, FieldType, Model, ModelDescriptor, SystemData};
pub use permissions::{PermissionAction, PermissionMap, Role};
pub use registry::{Admin, ApiFunction, ApiHandlers, Registry, Resource, ResourceConfig, RouteKind, RouteSpec};
pub use response::{Envelope, Pagination};
pub use routes::build_router;
pub use service::{email, required, validator, CrudService, ValidationError, ValidationResult, Validator};
pub use state::AppState;
pub use store::{AuditSink, Filter, MemoryStore, OrderBy, Page, PageRequest, PgStore, Snapshot, Store};
