//! Shared application state for all routes. The registry is frozen at router build time.

use crate::config::EngineConfig;
use crate::identity::IdentityProvider;
use crate::registry::Registry;
use crate::store::{AuditSink, Store};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub audit: Arc<dyn AuditSink>,
    pub registry: Arc<Registry>,
    pub identity: Arc<dyn IdentityProvider>,
    pub config: Arc<EngineConfig>,
}
