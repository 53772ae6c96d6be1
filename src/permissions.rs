//! Role -> allowed-action grant table. Grant wins, absence denies; no inheritance or negation.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Opaque role name carried by a caller ("admin", "visitor", "scheduler", ...).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(pub String);

impl Role {
    pub const ADMIN: &'static str = "admin";
    pub const VISITOR: &'static str = "visitor";
    pub const SCHEDULER: &'static str = "scheduler";

    pub fn new(name: impl Into<String>) -> Self {
        Role(name.into())
    }

    pub fn admin() -> Self {
        Role::new(Self::ADMIN)
    }

    pub fn visitor() -> Self {
        Role::new(Self::VISITOR)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        Role::new(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionAction {
    Create,
    Read,
    Update,
    Delete,
}

impl PermissionAction {
    pub const ALL: [PermissionAction; 4] = [
        PermissionAction::Create,
        PermissionAction::Read,
        PermissionAction::Update,
        PermissionAction::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionAction::Create => "create",
            PermissionAction::Read => "read",
            PermissionAction::Update => "update",
            PermissionAction::Delete => "delete",
        }
    }
}

impl fmt::Display for PermissionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role -> set of granted actions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionMap(HashMap<Role, HashSet<PermissionAction>>);

impl PermissionMap {
    pub fn new() -> Self {
        PermissionMap(HashMap::new())
    }

    /// Grant `actions` to `role` (added to whatever the role already holds).
    pub fn grant(mut self, role: impl Into<Role>, actions: &[PermissionAction]) -> Self {
        self.0.entry(role.into()).or_default().extend(actions.iter().copied());
        self
    }

    /// Grant every action to `role`.
    pub fn grant_all(self, role: impl Into<Role>) -> Self {
        self.grant(role, &PermissionAction::ALL)
    }

    /// True iff some role in `roles` is a key whose action set contains `action`.
    pub fn has_permission(&self, roles: &[Role], action: PermissionAction) -> bool {
        roles
            .iter()
            .any(|role| self.0.get(role).map(|set| set.contains(&action)).unwrap_or(false))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(names: &[&str]) -> Vec<Role> {
        names.iter().map(|n| Role::new(*n)).collect()
    }

    #[test]
    fn grant_allows_and_absence_denies() {
        let map = PermissionMap::new()
            .grant_all(Role::ADMIN)
            .grant(Role::VISITOR, &[PermissionAction::Read]);
        assert!(map.has_permission(&roles(&["admin"]), PermissionAction::Delete));
        assert!(map.has_permission(&roles(&["visitor"]), PermissionAction::Read));
        assert!(!map.has_permission(&roles(&["visitor"]), PermissionAction::Update));
        assert!(!map.has_permission(&roles(&["scheduler"]), PermissionAction::Read));
    }

    #[test]
    fn empty_role_set_is_denied() {
        let map = PermissionMap::new().grant_all(Role::ADMIN);
        assert!(!map.has_permission(&[], PermissionAction::Read));
    }

    #[test]
    fn any_role_granting_is_enough() {
        let map = PermissionMap::new().grant(Role::VISITOR, &[PermissionAction::Create]);
        assert!(map.has_permission(&roles(&["scheduler", "visitor"]), PermissionAction::Create));
    }

    #[test]
    fn adding_unrelated_role_never_revokes() {
        let map = PermissionMap::new()
            .grant(Role::VISITOR, &[PermissionAction::Read])
            .grant(Role::SCHEDULER, &[]);
        for action in PermissionAction::ALL {
            let before = map.has_permission(&roles(&["visitor"]), action);
            let after = map.has_permission(&roles(&["visitor", "scheduler", "stranger"]), action);
            assert!(!before || after, "{} revoked", action);
        }
    }

    #[test]
    fn grants_accumulate_per_role() {
        let map = PermissionMap::new()
            .grant(Role::VISITOR, &[PermissionAction::Read])
            .grant(Role::VISITOR, &[PermissionAction::Create]);
        assert!(map.has_permission(&roles(&["visitor"]), PermissionAction::Read));
        assert!(map.has_permission(&roles(&["visitor"]), PermissionAction::Create));
    }
}
