//! Resource registry. `Admin` collects registrations during bootstrap; `into_router`
//! freezes them into an immutable [`Registry`] shared by every request.

use crate::case::ResourceNames;
use crate::config::{EngineConfig, ValidationRule};
use crate::error::RegistryError;
use crate::handlers::resource as default_handlers;
use crate::identity::IdentityProvider;
use crate::migration::HISTORY_TABLE;
use crate::model::{Model, ModelDescriptor};
use crate::permissions::{PermissionAction, PermissionMap, Role};
use crate::service::{validate, EntityData, ValidationResult, Validator, ValidatorsMap};
use crate::state::AppState;
use crate::store::{AuditSink, Store};
use axum::http::Method;
use axum::routing::MethodRouter;
use axum::Router;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Builds the axum handler for one action of a resource.
pub type ApiFunction = fn(Arc<Resource>) -> MethodRouter<AppState>;

/// Per-action handler constructors. `Default` is the built-in CRUD set.
#[derive(Clone, Copy)]
pub struct ApiHandlers {
    pub list: ApiFunction,
    pub detail: ApiFunction,
    pub create: ApiFunction,
    pub update: ApiFunction,
    pub delete: ApiFunction,
}

impl Default for ApiHandlers {
    fn default() -> Self {
        ApiHandlers {
            list: default_handlers::list,
            detail: default_handlers::detail,
            create: default_handlers::create,
            update: default_handlers::update,
            delete: default_handlers::delete,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteKind {
    List,
    Schema,
    Create,
    Detail,
    Update,
    Delete,
}

/// One mounted route of a resource.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    pub name: String,
    pub path: String,
    #[serde(serialize_with = "serialize_method")]
    pub method: Method,
    pub requires_auth: bool,
    pub kind: RouteKind,
}

impl RouteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteKind::List => "list",
            RouteKind::Schema => "schema",
            RouteKind::Create => "create",
            RouteKind::Detail => "detail",
            RouteKind::Update => "update",
            RouteKind::Delete => "delete",
        }
    }
}

fn serialize_method<S: serde::Serializer>(m: &Method, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(m.as_str())
}

fn route_specs(names: &ResourceNames) -> Vec<RouteSpec> {
    let base = format!("/api/{}", names.kebab_plural);
    let spec = |kind: RouteKind, suffix: &str, method: Method, requires_auth: bool| RouteSpec {
        name: format!("{}-{}", names.kebab_singular, kind.as_str()),
        path: format!("{}{}", base, suffix),
        method,
        requires_auth,
        kind,
    };
    vec![
        spec(RouteKind::List, "", Method::GET, true),
        spec(RouteKind::Schema, "/schema", Method::GET, false),
        spec(RouteKind::Create, "/new", Method::POST, true),
        spec(RouteKind::Detail, "/:id", Method::GET, true),
        spec(RouteKind::Update, "/:id/update", Method::PUT, true),
        spec(RouteKind::Delete, "/:id/delete", Method::DELETE, true),
    ]
}

/// Registration options for one model.
#[derive(Clone, Default)]
pub struct ResourceConfig {
    /// Disable the ownership filter: every caller with the right role sees every row.
    pub skip_user_binding: bool,
    pub permissions: PermissionMap,
    pub handlers: Option<ApiHandlers>,
    pub rules: HashMap<String, ValidationRule>,
}

impl ResourceConfig {
    pub fn new(permissions: PermissionMap) -> Self {
        ResourceConfig {
            permissions,
            ..Default::default()
        }
    }

    pub fn skip_user_binding(mut self, skip: bool) -> Self {
        self.skip_user_binding = skip;
        self
    }

    pub fn handlers(mut self, handlers: ApiHandlers) -> Self {
        self.handlers = Some(handlers);
        self
    }

    pub fn rule(mut self, field: impl Into<String>, rule: ValidationRule) -> Self {
        self.rules.insert(field.into(), rule);
        self
    }
}

/// A registered model with its validators, permissions and handlers.
pub struct Resource {
    pub descriptor: ModelDescriptor,
    pub skip_user_binding: bool,
    pub validators: ValidatorsMap,
    pub permissions: PermissionMap,
    pub handlers: ApiHandlers,
    pub routes: Vec<RouteSpec>,
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("name", &self.descriptor.name())
            .field("skip_user_binding", &self.skip_user_binding)
            .field("validated_fields", &self.validators.keys().collect::<Vec<_>>())
            .field("routes", &self.routes)
            .finish()
    }
}

impl Resource {
    pub fn names(&self) -> &ResourceNames {
        &self.descriptor.names
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    /// Append validators for `field`. The field must be a key of the model's
    /// serialized shape (case-insensitive).
    pub fn register_validator(&mut self, field: &str, validators: Vec<Validator>) -> Result<(), RegistryError> {
        let key = field.to_lowercase();
        let known = self
            .descriptor
            .zero_value()
            .map_err(|e| RegistryError::InvalidModel {
                resource: self.name().to_string(),
                reason: e.to_string(),
            })?
            .keys()
            .any(|k| k.to_lowercase() == key);
        if !known {
            return Err(RegistryError::FieldNotFound {
                resource: self.name().to_string(),
                field: field.to_string(),
            });
        }
        self.validators.entry(key).or_default().extend(validators);
        Ok(())
    }

    pub fn set_permissions(&mut self, permissions: PermissionMap) {
        self.permissions = permissions;
    }

    pub fn has_permission(&self, roles: &[Role], action: PermissionAction) -> bool {
        self.permissions.has_permission(roles, action)
    }

    pub fn validate(&self, entity: &EntityData) -> ValidationResult {
        validate(entity, &self.validators)
    }
}

/// Immutable snapshot of every registered resource, shared by all requests.
#[derive(Debug, Default)]
pub struct Registry {
    resources: Vec<Arc<Resource>>,
    history_permissions: PermissionMap,
}

impl Registry {
    /// Case-insensitive lookup by singular name.
    pub fn get(&self, name: &str) -> Option<Arc<Resource>> {
        self.resources
            .iter()
            .find(|r| r.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    pub fn resources(&self) -> &[Arc<Resource>] {
        &self.resources
    }

    /// Who may read the history timeline.
    pub fn history_permissions(&self) -> &PermissionMap {
        &self.history_permissions
    }
}

/// Bootstrap-time registry builder.
pub struct Admin {
    store: Arc<dyn Store>,
    audit: Arc<dyn AuditSink>,
    config: Arc<EngineConfig>,
    resources: Vec<Resource>,
    history_permissions: PermissionMap,
    audit_ready: bool,
}

impl Admin {
    pub fn new(store: Arc<dyn Store>, audit: Arc<dyn AuditSink>, config: EngineConfig) -> Self {
        Admin {
            store,
            audit,
            config: Arc::new(config),
            resources: Vec::new(),
            history_permissions: PermissionMap::new().grant(Role::ADMIN, &[PermissionAction::Read]),
            audit_ready: false,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_history_permissions(&mut self, permissions: PermissionMap) {
        self.history_permissions = permissions;
    }

    /// Register `T` as a resource: reject duplicates and route collisions,
    /// compile its rules, then migrate its storage.
    pub async fn register<T: Model>(&mut self, config: ResourceConfig) -> Result<&mut Resource, RegistryError> {
        let descriptor = ModelDescriptor::of::<T>();
        let name = descriptor.name().to_string();
        check_model(&descriptor)?;

        if self.find_index(&name).is_some() {
            return Err(RegistryError::AlreadyRegistered(name));
        }

        let routes = route_specs(&descriptor.names);
        for existing in &self.resources {
            if let Some(route) = routes
                .iter()
                .find(|r| existing.routes.iter().any(|e| e.path == r.path))
            {
                return Err(RegistryError::RouteConflict {
                    resource: name,
                    existing: existing.name().to_string(),
                    path: route.path.clone(),
                });
            }
        }

        let mut resource = Resource {
            descriptor,
            skip_user_binding: config.skip_user_binding,
            validators: ValidatorsMap::new(),
            permissions: config.permissions,
            handlers: config.handlers.unwrap_or_default(),
            routes,
        };
        for (field, rule) in &config.rules {
            let validators = rule.compile().map_err(|e| RegistryError::InvalidModel {
                resource: name.clone(),
                reason: format!("rule for {}: {}", field, e),
            })?;
            resource.register_validator(field, validators)?;
        }

        if !self.audit_ready {
            self.audit.ensure_schema().await.map_err(|e| RegistryError::Migration {
                resource: "history".into(),
                source: Box::new(e),
            })?;
            self.audit_ready = true;
        }
        self.store
            .migrate(&resource.descriptor)
            .await
            .map_err(|e| RegistryError::Migration {
                resource: name.clone(),
                source: Box::new(e),
            })?;

        tracing::info!(
            resource = %name,
            path = %format!("/api/{}", resource.names().kebab_plural),
            skip_user_binding = resource.skip_user_binding,
            "registered resource"
        );
        let idx = self.resources.len();
        self.resources.push(resource);
        Ok(&mut self.resources[idx])
    }

    /// Remove a resource. Its table is left untouched.
    pub fn unregister(&mut self, name: &str) -> Result<Resource, RegistryError> {
        let idx = self
            .find_index(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        tracing::info!(resource = %name, "unregistered resource");
        Ok(self.resources.remove(idx))
    }

    /// Case-insensitive lookup.
    pub fn get_app(&self, name: &str) -> Result<&Resource, RegistryError> {
        self.find_index(name)
            .map(|i| &self.resources[i])
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn get_app_mut(&mut self, name: &str) -> Result<&mut Resource, RegistryError> {
        match self.find_index(name) {
            Some(i) => Ok(&mut self.resources[i]),
            None => Err(RegistryError::NotFound(name.to_string())),
        }
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// Every route of every registered resource.
    pub fn routes(&self) -> Vec<&RouteSpec> {
        self.resources.iter().flat_map(|r| r.routes.iter()).collect()
    }

    /// Freeze the registry and build the application router.
    pub fn into_router(self, identity: Arc<dyn IdentityProvider>) -> Router {
        let registry = Registry {
            resources: self.resources.into_iter().map(Arc::new).collect(),
            history_permissions: self.history_permissions,
        };
        let state = AppState {
            store: self.store,
            audit: self.audit,
            registry: Arc::new(registry),
            identity,
            config: self.config,
        };
        crate::routes::build_router(state)
    }

    fn find_index(&self, name: &str) -> Option<usize> {
        self.resources
            .iter()
            .position(|r| r.name().eq_ignore_ascii_case(name))
    }
}

/// The model must serialize to an object that carries every declared field.
fn check_model(descriptor: &ModelDescriptor) -> Result<(), RegistryError> {
    let invalid = |reason: String| RegistryError::InvalidModel {
        resource: descriptor.name().to_string(),
        reason,
    };
    if descriptor.name().is_empty() || !descriptor.name().chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(invalid("type name must be a non-empty alphanumeric identifier".into()));
    }
    if descriptor.table_name() == HISTORY_TABLE {
        return Err(invalid(format!("table {} is reserved for the history ledger", HISTORY_TABLE)));
    }
    let zero = descriptor.zero_value().map_err(|e| invalid(e.to_string()))?;
    for key in crate::model::SYSTEM_KEYS {
        if !zero.contains_key(*key) {
            return Err(invalid(format!("missing system field {}; embed SystemData with #[serde(flatten)]", key)));
        }
    }
    for field in &descriptor.fields {
        if !zero.contains_key(&field.name) {
            return Err(invalid(format!("declared field {} is not serialized by the model", field.name)));
        }
    }
    Ok(())
}
