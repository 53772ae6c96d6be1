//! Default per-action handlers. Each constructor captures the resource and returns
//! a `MethodRouter` that accepts any verb, so a wrong verb answers with the
//! envelope instead of axum's bare 405.

use crate::error::AppError;
use crate::extractors::RequestContext;
use crate::registry::Resource;
use crate::response::{success_created, success_ok, success_page, Pagination};
use crate::service::{CrudService, UpdateOutcome};
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, MethodRouter};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub(crate) fn expect_method(actual: &Method, expected: Method) -> Result<(), AppError> {
    if *actual == expected {
        Ok(())
    } else {
        Err(AppError::MethodNotAllowed)
    }
}

pub fn list(resource: Arc<Resource>) -> MethodRouter<AppState> {
    any(
        move |method: Method,
              State(state): State<AppState>,
              ctx: RequestContext,
              Query(params): Query<HashMap<String, String>>| async move {
            list_handler(&state, &resource, &ctx, &method, &params).await
        },
    )
}

pub fn detail(resource: Arc<Resource>) -> MethodRouter<AppState> {
    any(
        move |method: Method, State(state): State<AppState>, ctx: RequestContext, Path(id): Path<String>| async move {
            detail_handler(&state, &resource, &ctx, &method, &id).await
        },
    )
}

pub fn create(resource: Arc<Resource>) -> MethodRouter<AppState> {
    any(
        move |method: Method, State(state): State<AppState>, ctx: RequestContext, body: Bytes| async move {
            create_handler(&state, &resource, &ctx, &method, &body).await
        },
    )
}

pub fn update(resource: Arc<Resource>) -> MethodRouter<AppState> {
    any(
        move |method: Method,
              State(state): State<AppState>,
              ctx: RequestContext,
              Path(id): Path<String>,
              body: Bytes| async move {
            update_handler(&state, &resource, &ctx, &method, &id, &body).await
        },
    )
}

pub fn delete(resource: Arc<Resource>) -> MethodRouter<AppState> {
    any(
        move |method: Method, State(state): State<AppState>, ctx: RequestContext, Path(id): Path<String>| async move {
            delete_handler(&state, &resource, &ctx, &method, &id).await
        },
    )
}

async fn list_handler(
    state: &AppState,
    resource: &Resource,
    ctx: &RequestContext,
    method: &Method,
    params: &HashMap<String, String>,
) -> Result<Response, AppError> {
    expect_method(method, Method::GET)?;
    let (page, request) = CrudService::list(state, resource, ctx, params).await?;
    let pagination = Pagination {
        total: page.total,
        page: request.page,
        limit: request.limit,
    };
    Ok(success_page(page.items, format!("{} List", resource.names().plural), pagination).into_response())
}

async fn detail_handler(
    state: &AppState,
    resource: &Resource,
    ctx: &RequestContext,
    method: &Method,
    raw_id: &str,
) -> Result<Response, AppError> {
    expect_method(method, Method::GET)?;
    let instance = CrudService::detail(state, resource, ctx, raw_id).await?;
    Ok(success_ok(instance, format!("{} Detail", resource.name())).into_response())
}

async fn create_handler(
    state: &AppState,
    resource: &Resource,
    ctx: &RequestContext,
    method: &Method,
    body: &[u8],
) -> Result<Response, AppError> {
    expect_method(method, Method::POST)?;
    let created = CrudService::create(state, resource, ctx, body).await?;
    Ok(success_created(created, format!("{} has been created", resource.name())).into_response())
}

async fn update_handler(
    state: &AppState,
    resource: &Resource,
    ctx: &RequestContext,
    method: &Method,
    raw_id: &str,
    body: &[u8],
) -> Result<Response, AppError> {
    expect_method(method, Method::PUT)?;
    let response = match CrudService::update(state, resource, ctx, raw_id, body).await? {
        UpdateOutcome::Updated(saved) => success_ok(saved, format!("{} has been updated", resource.name())),
        UpdateOutcome::Unchanged(current) => success_ok(current, format!("{} is up to date", resource.name())),
    };
    Ok(response.into_response())
}

async fn delete_handler(
    state: &AppState,
    resource: &Resource,
    ctx: &RequestContext,
    method: &Method,
    raw_id: &str,
) -> Result<Response, AppError> {
    expect_method(method, Method::DELETE)?;
    CrudService::delete(state, resource, ctx, raw_id).await?;
    Ok(success_ok(Value::Null, format!("{} has been deleted", resource.name())).into_response())
}
