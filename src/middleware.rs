//! Identity middleware: resolve the caller once per request, gate authenticated routes.

use crate::error::AppError;
use crate::extractors::{RequestContext, REQUEST_ID_HEADER};
use crate::state::AppState;
use axum::extract::State;
use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

/// Store the caller (or anonymous) and a request id in request extensions,
/// and echo the request id on the response.
pub async fn identify(
    State(state): State<AppState>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let caller = state.identity.identify(request.headers());
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    tracing::debug!(
        request_id = %request_id,
        user_id = caller.as_ref().map(|c| c.user_id),
        path = %request.uri().path(),
        "identified"
    );
    request.extensions_mut().insert(RequestContext {
        caller,
        request_id: request_id.clone(),
    });
    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Reject anonymous callers with 401 before the handler runs.
pub async fn require_caller(request: Request<axum::body::Body>, next: Next) -> Response {
    let authenticated = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.caller.is_some())
        .unwrap_or(false);
    if !authenticated {
        return AppError::Unauthorized.into_response();
    }
    next.run(request).await
}
