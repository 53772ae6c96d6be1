//! Router assembly: per-resource routes from the frozen registry, the API index,
//! the history timeline and the common health routes.

mod common;

pub use common::common_routes;

use crate::error::AppError;
use crate::handlers::{api_index, schema::schema, timeline};
use crate::middleware::{identify, require_caller};
use crate::registry::{Resource, RouteKind};
use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, MethodRouter};
use axum::{middleware, Router};
use std::any::Any;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;

fn handler_for(resource: &Arc<Resource>, kind: RouteKind) -> MethodRouter<AppState> {
    let handlers = resource.handlers;
    let resource = Arc::clone(resource);
    match kind {
        RouteKind::List => (handlers.list)(resource),
        RouteKind::Schema => schema(resource),
        RouteKind::Create => (handlers.create)(resource),
        RouteKind::Detail => (handlers.detail)(resource),
        RouteKind::Update => (handlers.update)(resource),
        RouteKind::Delete => (handlers.delete)(resource),
    }
}

async fn not_found() -> AppError {
    AppError::NotFound("Route not found".into())
}

/// A panicking handler answers 500 with the envelope; the message is only logged.
fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| err.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_else(|| "unknown panic".to_string());
    AppError::Internal(format!("handler panicked: {}", detail)).into_response()
}

/// Mount every registered resource. Routes tagged `requires_auth` (and the
/// timeline) reject anonymous callers. Panics are caught outermost, then the
/// identity layer runs on every request.
pub fn build_router(state: AppState) -> Router {
    let mut protected: Router<AppState> = Router::new();
    let mut public: Router<AppState> = Router::new();
    for resource in state.registry.resources() {
        for route in &resource.routes {
            let handler = handler_for(resource, route.kind);
            if route.requires_auth {
                protected = protected.route(&route.path, handler);
            } else {
                public = public.route(&route.path, handler);
            }
        }
    }
    let protected = protected
        .route("/api/timeline", any(timeline))
        .route_layer(middleware::from_fn(require_caller));
    let public = public.route("/api", get(api_index)).merge(common_routes());

    let max_body = state.config.max_body_bytes;
    Router::new()
        .merge(protected)
        .merge(public)
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(CatchPanicLayer::custom(panic_response))
                .layer(middleware::from_fn_with_state(state.clone(), identify))
                .layer(DefaultBodyLimit::max(max_body))
                .layer(RequestBodyLimitLayer::new(max_body)),
        )
        .with_state(state)
}
