//! Caller identity: the user id, username and role set a request acts as.

use crate::permissions::Role;
use axum::http::HeaderMap;
use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller {
    pub user_id: i64,
    pub username: String,
    pub roles: Vec<Role>,
}

impl Caller {
    pub fn new(user_id: i64, username: impl Into<String>, roles: Vec<Role>) -> Self {
        Caller {
            user_id,
            username: username.into(),
            roles,
        }
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }
}

/// Turns request credentials into a verified caller. `None` means anonymous.
pub trait IdentityProvider: Send + Sync {
    fn identify(&self, headers: &HeaderMap) -> Option<Caller>;
}

/// Fixed bearer token -> caller table.
#[derive(Clone, Debug, Default)]
pub struct StaticTokenProvider {
    tokens: HashMap<String, Caller>,
}

impl StaticTokenProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, caller: Caller) -> Self {
        self.tokens.insert(token.into(), caller);
        self
    }
}

impl IdentityProvider for StaticTokenProvider {
    fn identify(&self, headers: &HeaderMap) -> Option<Caller> {
        let token = bearer_token(headers)?;
        self.tokens.get(token).cloned()
    }
}

/// Token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
