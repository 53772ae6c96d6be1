//! Runtime settings read from the environment.

use crate::permissions::Role;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 1000;
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Postgres connection string; `None` selects the in-memory store.
    pub database_url: Option<String>,
    /// Schema holding resource tables and `history_entries`.
    pub schema: String,
    pub bind_addr: String,
    /// Prefix for absolute URLs in the API index ("" yields relative paths).
    pub api_base_url: String,
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub max_body_bytes: usize,
    /// Roles that bypass the ownership filter.
    pub all_access_roles: Vec<Role>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            database_url: None,
            schema: "public".into(),
            bind_addr: "0.0.0.0:3000".into(),
            api_base_url: String::new(),
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            max_body_bytes: MAX_BODY_BYTES,
            all_access_roles: vec![Role::admin()],
        }
    }
}

impl EngineConfig {
    /// Read settings from the process environment. Unset or unparsable values keep their default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let default = EngineConfig::default();
        let max_page_size = get("MAX_PAGE_SIZE")
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(default.max_page_size);
        EngineConfig {
            database_url: get("DATABASE_URL").filter(|s| !s.is_empty()),
            schema: get("RESOURCE_SCHEMA")
                .filter(|s| !s.is_empty())
                .unwrap_or(default.schema),
            bind_addr: get("BIND_ADDR")
                .filter(|s| !s.is_empty())
                .unwrap_or(default.bind_addr),
            api_base_url: get("API_BASE_URL")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(default.api_base_url),
            default_page_size: get("DEFAULT_PAGE_SIZE")
                .and_then(|s| s.parse::<u32>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(default.default_page_size)
                .min(max_page_size),
            max_page_size,
            max_body_bytes: get("MAX_BODY_BYTES")
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.max_body_bytes),
            all_access_roles: get("ALL_ACCESS_ROLES")
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|r| !r.is_empty())
                        .map(Role::new)
                        .collect()
                })
                .unwrap_or(default.all_access_roles),
        }
    }

    pub fn is_all_access(&self, roles: &[Role]) -> bool {
        roles.iter().any(|r| self.all_access_roles.contains(r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let c = EngineConfig::from_lookup(lookup(&[]));
        assert!(c.database_url.is_none());
        assert_eq!(c.schema, "public");
        assert_eq!(c.default_page_size, 10);
        assert_eq!(c.max_page_size, 1000);
        assert_eq!(c.all_access_roles, vec![Role::admin()]);
    }

    #[test]
    fn overrides_and_bad_values() {
        let c = EngineConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/rm"),
            ("DEFAULT_PAGE_SIZE", "abc"),
            ("MAX_PAGE_SIZE", "50"),
            ("ALL_ACCESS_ROLES", "admin, scheduler,"),
            ("API_BASE_URL", "http://localhost:3000/"),
        ]));
        assert_eq!(c.database_url.as_deref(), Some("postgres://localhost/rm"));
        assert_eq!(c.default_page_size, 10);
        assert_eq!(c.max_page_size, 50);
        assert_eq!(c.all_access_roles, vec![Role::admin(), Role::new("scheduler")]);
        assert_eq!(c.api_base_url, "http://localhost:3000");
    }

    #[test]
    fn all_access_is_role_membership() {
        let c = EngineConfig::default();
        assert!(c.is_all_access(&[Role::visitor(), Role::admin()]));
        assert!(!c.is_all_access(&[Role::visitor()]));
    }
}
