//! HTTP handlers: per-resource CRUD, schema introspection, API index and history timeline.

pub mod index;
pub mod resource;
pub mod schema;
pub mod timeline;

pub use index::api_index;
pub use schema::schema_of;
pub use timeline::timeline;
