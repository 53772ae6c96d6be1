//! Per-action pipeline: authorize, shape the body, resolve the instance under the
//! ownership filter, validate, mutate, diff and record history.

use crate::case::{fold_key, object_keys_to_model_keys, to_snake_case};
use crate::config::EngineConfig;
use crate::diff::compare_values;
use crate::error::AppError;
use crate::extractors::RequestContext;
use crate::history::{CrudAction, HistoryEntry};
use crate::model::ModelDescriptor;
use crate::permissions::PermissionAction;
use crate::registry::Resource;
use crate::state::AppState;
use crate::store::{Filter, OrderBy, Page, PageRequest, Snapshot};
use serde_json::Value;
use std::collections::HashMap;

/// Parsed `limit`, `page` and `order` of a list request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListQuery {
    pub page: PageRequest,
    pub order: Vec<OrderBy>,
}

/// `limit` and `page` query parameters. Invalid values fall back to their
/// defaults; `limit` is capped at the configured maximum.
pub fn page_from_params(params: &HashMap<String, String>, config: &EngineConfig) -> PageRequest {
    let positive = |key: &str| {
        params
            .get(key)
            .and_then(|s| s.trim().parse::<u32>().ok())
            .filter(|n| *n > 0)
    };
    let limit = positive("limit")
        .unwrap_or(config.default_page_size)
        .min(config.max_page_size);
    PageRequest::new(positive("page").unwrap_or(1), limit)
}

impl ListQuery {
    /// Pagination as in [`page_from_params`]. `order` is a comma list of fields,
    /// `-` prefix for descending; unknown fields are rejected.
    pub fn from_params(
        params: &HashMap<String, String>,
        config: &EngineConfig,
        model: &ModelDescriptor,
    ) -> Result<Self, AppError> {
        let mut order = Vec::new();
        for part in params.get("order").map(String::as_str).unwrap_or("").split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (descending, name) = match part.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, part),
            };
            let column = to_snake_case(name);
            if !model.has_column(&column) {
                return Err(AppError::BadRequest(format!("invalid order field: {}", name)));
            }
            order.push(OrderBy { column, descending });
        }
        if order.is_empty() {
            order.push(OrderBy::desc("id"));
        }
        Ok(ListQuery {
            page: page_from_params(params, config),
            order,
        })
    }
}

#[derive(Debug, PartialEq)]
pub enum UpdateOutcome {
    Updated(Snapshot),
    /// The merged instance equals the stored one; nothing was written.
    Unchanged(Snapshot),
}

/// Keys the server owns: clients can never write them.
fn is_system_key(key: &str) -> bool {
    let k = fold_key(key);
    matches!(k.as_str(), "id" | "createdat" | "updatedat" | "deletedat")
        || k.starts_with("createdby")
        || k.starts_with("updatedby")
        || k.starts_with("deletedby")
}

/// Parse a create/update body into an object keyed the way `model` serializes,
/// with every system-owned key removed.
pub fn shape_body(body: &[u8], model: &ModelDescriptor) -> Result<Snapshot, AppError> {
    let value: Value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Object(Snapshot::new())
    } else {
        serde_json::from_slice(body).map_err(|_| AppError::BadRequest("Invalid request body".into()))?
    };
    let Value::Object(mut map) = value else {
        return Err(AppError::BadRequest("Invalid request body".into()));
    };
    map.retain(|k, _| !is_system_key(k));
    object_keys_to_model_keys(&mut map, &model.zero_value()?);
    Ok(map)
}

/// `{id}` path segment; anything but a positive integer names no row.
pub fn parse_id(raw: &str) -> Result<i64, AppError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| AppError::NotFound("Instance not found".into()))
}

pub struct CrudService;

impl CrudService {
    fn authorize(
        resource: &Resource,
        ctx: &RequestContext,
        action: PermissionAction,
        denied: &str,
    ) -> Result<(), AppError> {
        let allowed = resource.has_permission(ctx.roles(), action);
        tracing::debug!(
            resource = %resource.name(),
            action = %action,
            user_id = ctx.user_id(),
            request_id = %ctx.request_id,
            allowed,
            "permission check"
        );
        if allowed {
            Ok(())
        } else {
            Err(AppError::Forbidden(denied.to_string()))
        }
    }

    /// Rows the caller may see: all of them for all-access roles or unbound
    /// resources, otherwise only the ones they created.
    pub fn ownership_filters(config: &EngineConfig, resource: &Resource, ctx: &RequestContext) -> Vec<Filter> {
        if resource.skip_user_binding || config.is_all_access(ctx.roles()) {
            Vec::new()
        } else {
            vec![Filter::owned_by(ctx.user_id())]
        }
    }

    async fn find_visible(
        state: &AppState,
        resource: &Resource,
        ctx: &RequestContext,
        id: i64,
    ) -> Result<Snapshot, AppError> {
        let filters = Self::ownership_filters(&state.config, resource, ctx);
        state
            .store
            .find_by_id(&resource.descriptor, id, &filters)
            .await?
            .ok_or_else(|| AppError::NotFound("Instance not found".into()))
    }

    fn normalize(resource: &Resource, merged: Snapshot) -> Result<Snapshot, AppError> {
        resource
            .descriptor
            .normalize(Value::Object(merged))
            .map_err(|e| AppError::BadRequest(format!("Invalid request body: {}", e)))
    }

    fn check_valid(resource: &Resource, entity: &Snapshot) -> Result<(), AppError> {
        let result = resource.validate(entity);
        if result.is_valid() {
            Ok(())
        } else {
            Err(AppError::Validation(result))
        }
    }

    /// Best effort: a failed history write is logged and the mutation stands.
    async fn record_history(
        state: &AppState,
        resource: &Resource,
        ctx: &RequestContext,
        action: CrudAction,
        id: i64,
        detail: &Value,
    ) {
        let entry = match HistoryEntry::new(ctx.caller.as_ref(), action, resource.name(), id, detail, &ctx.request_id) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::error!(error = %err, resource = %resource.name(), action = %action, "history detail not serializable");
                return;
            }
        };
        if let Err(err) = state.audit.record(entry).await {
            tracing::error!(
                error = %err,
                resource = %resource.name(),
                action = %action,
                resource_id = id,
                request_id = %ctx.request_id,
                "history entry not recorded"
            );
        }
    }

    /// Returns the page together with the pagination it was read with.
    pub async fn list(
        state: &AppState,
        resource: &Resource,
        ctx: &RequestContext,
        params: &HashMap<String, String>,
    ) -> Result<(Page<Snapshot>, PageRequest), AppError> {
        Self::authorize(resource, ctx, PermissionAction::Read, "User is not allowed to read this resource")?;
        let query = ListQuery::from_params(params, &state.config, &resource.descriptor)?;
        let filters = Self::ownership_filters(&state.config, resource, ctx);
        let page = state
            .store
            .find(&resource.descriptor, &filters, query.page, &query.order)
            .await?;
        Ok((page, query.page))
    }

    pub async fn detail(
        state: &AppState,
        resource: &Resource,
        ctx: &RequestContext,
        raw_id: &str,
    ) -> Result<Snapshot, AppError> {
        Self::authorize(resource, ctx, PermissionAction::Read, "User is not allowed to access this resource")?;
        let id = parse_id(raw_id)?;
        Self::find_visible(state, resource, ctx, id).await
    }

    pub async fn create(
        state: &AppState,
        resource: &Resource,
        ctx: &RequestContext,
        body: &[u8],
    ) -> Result<Snapshot, AppError> {
        Self::authorize(resource, ctx, PermissionAction::Create, "User is not allowed to create this resource")?;
        let body = shape_body(body, &resource.descriptor)?;
        let mut merged = resource.descriptor.zero_value()?;
        merged.extend(body);
        merged.insert("createdById".into(), Value::from(ctx.user_id()));
        merged.insert("updatedById".into(), Value::from(ctx.user_id()));
        let entity = Self::normalize(resource, merged)?;
        Self::check_valid(resource, &entity)?;

        let created = state.store.create(&resource.descriptor, &entity).await?;
        let id = created.get("id").and_then(Value::as_i64).unwrap_or_default();
        tracing::info!(
            resource = %resource.name(),
            action = "create",
            user_id = ctx.user_id(),
            request_id = %ctx.request_id,
            resource_id = id,
            "created"
        );
        Self::record_history(state, resource, ctx, CrudAction::Created, id, &Value::Object(created.clone())).await;
        Ok(created)
    }

    pub async fn update(
        state: &AppState,
        resource: &Resource,
        ctx: &RequestContext,
        raw_id: &str,
        body: &[u8],
    ) -> Result<UpdateOutcome, AppError> {
        Self::authorize(resource, ctx, PermissionAction::Read, "User is not allowed to access this resource")?;
        Self::authorize(resource, ctx, PermissionAction::Update, "User is not allowed to update this resource")?;
        let id = parse_id(raw_id)?;
        let body = shape_body(body, &resource.descriptor)?;
        let before = Self::find_visible(state, resource, ctx, id).await?;

        let mut merged = before.clone();
        merged.extend(body);
        merged.insert("updatedById".into(), Value::from(ctx.user_id()));
        let entity = Self::normalize(resource, merged)?;
        Self::check_valid(resource, &entity)?;

        let diff = compare_values(&Value::Object(before.clone()), &Value::Object(entity.clone()));
        if diff.is_empty() {
            return Ok(UpdateOutcome::Unchanged(before));
        }

        let saved = state
            .store
            .save(&resource.descriptor, &entity)
            .await?
            .ok_or_else(|| AppError::NotFound("Instance not found".into()))?;
        tracing::info!(
            resource = %resource.name(),
            action = "update",
            user_id = ctx.user_id(),
            request_id = %ctx.request_id,
            resource_id = id,
            changed = diff.len(),
            "updated"
        );
        Self::record_history(state, resource, ctx, CrudAction::Updated, id, &Value::Object(diff)).await;
        Ok(UpdateOutcome::Updated(saved))
    }

    pub async fn delete(
        state: &AppState,
        resource: &Resource,
        ctx: &RequestContext,
        raw_id: &str,
    ) -> Result<Snapshot, AppError> {
        Self::authorize(resource, ctx, PermissionAction::Read, "User is not allowed to access this resource")?;
        Self::authorize(resource, ctx, PermissionAction::Delete, "User is not allowed to delete this resource")?;
        let id = parse_id(raw_id)?;
        Self::find_visible(state, resource, ctx, id).await?;

        let deleted = state
            .store
            .delete(&resource.descriptor, id, ctx.user_id())
            .await?
            .ok_or_else(|| AppError::NotFound("Instance not found".into()))?;
        tracing::info!(
            resource = %resource.name(),
            action = "delete",
            user_id = ctx.user_id(),
            request_id = %ctx.request_id,
            resource_id = id,
            "deleted"
        );
        Self::record_history(state, resource, ctx, CrudAction::Deleted, id, &Value::Object(deleted.clone())).await;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldDef, FieldType, Model, SystemData};
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Widget {
        #[serde(flatten)]
        system: SystemData,
        field: String,
        unit_price: f64,
    }

    impl Model for Widget {
        const NAME: &'static str = "Widget";
        fn fields() -> Vec<FieldDef> {
            vec![
                FieldDef::new("field", FieldType::Text),
                FieldDef::new("unitPrice", FieldType::Float),
            ]
        }
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn parse(pairs: &[(&str, &str)]) -> Result<ListQuery, AppError> {
        ListQuery::from_params(&params(pairs), &EngineConfig::default(), &ModelDescriptor::of::<Widget>())
    }

    #[test]
    fn list_query_defaults() {
        let q = parse(&[]).unwrap();
        assert_eq!(q.page, PageRequest::new(1, 10));
        assert_eq!(q.order, vec![OrderBy::desc("id")]);
    }

    #[test]
    fn list_query_bad_numbers_fall_back_and_limit_is_capped() {
        let q = parse(&[("limit", "abc"), ("page", "-2")]).unwrap();
        assert_eq!(q.page, PageRequest::new(1, 10));
        let q = parse(&[("limit", "50000"), ("page", "3")]).unwrap();
        assert_eq!(q.page, PageRequest::new(3, 1000));
    }

    #[test]
    fn list_query_order_is_snake_cased_and_checked() {
        let q = parse(&[("order", "-unitPrice, field")]).unwrap();
        assert_eq!(q.order, vec![OrderBy::desc("unit_price"), OrderBy::asc("field")]);
        let err = parse(&[("order", "field;drop table widgets")]).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn shape_body_strips_system_keys_case_insensitively() {
        let body = br#"{"field":"x","ID":4,"createdById":999,"UpdatedByID":5,"created_by_id":1,"deletedBy":"z","createdAt":"2020-01-01T00:00:00Z","unit_price":2}"#;
        let shaped = shape_body(body, &ModelDescriptor::of::<Widget>()).unwrap();
        let mut keys: Vec<&String> = shaped.keys().collect();
        keys.sort();
        assert_eq!(keys, vec!["field", "unitPrice"]);
    }

    #[test]
    fn shape_body_rejects_non_objects_and_accepts_empty() {
        let model = ModelDescriptor::of::<Widget>();
        assert!(matches!(shape_body(b"[1,2]", &model), Err(AppError::BadRequest(_))));
        assert!(matches!(shape_body(b"{not json", &model), Err(AppError::BadRequest(_))));
        assert!(shape_body(b"", &model).unwrap().is_empty());
    }

    #[derive(Clone, Debug, Default, Serialize, Deserialize)]
    struct Item {
        #[serde(flatten)]
        system: SystemData,
        unit_price: f64,
    }

    impl Model for Item {
        const NAME: &'static str = "Item";
        fn fields() -> Vec<FieldDef> {
            vec![FieldDef::new("unit_price", FieldType::Float)]
        }
    }

    #[test]
    fn shape_body_keeps_the_model_key_spelling() {
        let model = ModelDescriptor::of::<Item>();
        let snake = shape_body(br#"{"unit_price": 5.0}"#, &model).unwrap();
        assert_eq!(snake["unit_price"], 5.0);
        let camel = shape_body(br#"{"unitPrice": 6.0, "createdById": 3}"#, &model).unwrap();
        assert_eq!(camel["unit_price"], 6.0);
        assert_eq!(camel.len(), 1);
    }

    #[test]
    fn ids_must_be_positive_integers() {
        assert_eq!(parse_id("12").unwrap(), 12);
        assert!(matches!(parse_id("abc"), Err(AppError::NotFound(_))));
        assert!(matches!(parse_id("0"), Err(AppError::NotFound(_))));
    }
}
