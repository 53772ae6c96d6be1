//! `GET /api/timeline`: paginated history of one resource type or instance.

use super::resource::expect_method;
use crate::error::AppError;
use crate::extractors::RequestContext;
use crate::history::HistoryQuery;
use crate::permissions::PermissionAction;
use crate::response::{success_page, Pagination};
use crate::service::page_from_params;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;

const DENIED: &str = "User is not allowed to read this resource";

fn param<'a>(params: &'a HashMap<String, String>, camel: &str, snake: &str) -> Option<&'a str> {
    params
        .get(camel)
        .or_else(|| params.get(snake))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

pub async fn timeline(
    method: Method,
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    expect_method(&method, Method::GET)?;
    if !state
        .registry
        .history_permissions()
        .has_permission(ctx.roles(), PermissionAction::Read)
    {
        return Err(AppError::Forbidden(DENIED.into()));
    }

    let name = param(&params, "resourceName", "resource_name")
        .ok_or_else(|| AppError::BadRequest("Resource Name is required".into()))?;
    let resource = state
        .registry
        .get(name)
        .ok_or_else(|| AppError::NotFound(format!("resource with name {} not found", name)))?;
    if !resource.has_permission(ctx.roles(), PermissionAction::Read) {
        return Err(AppError::Forbidden(DENIED.into()));
    }

    let query = HistoryQuery {
        resource_name: resource.name().to_string(),
        resource_id: param(&params, "resourceId", "resource_id").map(str::to_string),
    };
    let page = page_from_params(&params, &state.config);
    tracing::debug!(
        resource = %query.resource_name,
        resource_id = ?query.resource_id,
        user_id = ctx.user_id(),
        request_id = %ctx.request_id,
        "timeline"
    );
    let entries = state.audit.timeline(&query, page).await?;
    let pagination = Pagination {
        total: entries.total,
        page: page.page,
        limit: page.limit,
    };
    Ok(success_page(entries.items, "resource timeline", pagination).into_response())
}
