//! Per-request identity and request id, populated by the `identify` middleware.

use crate::identity::Caller;
use crate::permissions::Role;
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

/// Header carrying a client-supplied request id. A UUID v4 is generated when absent.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    pub caller: Option<Caller>,
    pub request_id: String,
}

impl RequestContext {
    /// Roles of the caller; anonymous callers have none.
    pub fn roles(&self) -> &[Role] {
        self.caller.as_ref().map(|c| c.roles.as_slice()).unwrap_or(&[])
    }

    /// Caller id, 0 for anonymous.
    pub fn user_id(&self) -> i64 {
        self.caller.as_ref().map(|c| c.user_id).unwrap_or_default()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(ctx) = parts.extensions.get::<RequestContext>() {
            return Ok(ctx.clone());
        }
        let request_id = parts
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Ok(RequestContext {
            caller: None,
            request_id,
        })
    }
}
