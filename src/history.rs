//! Append-only audit records of create/update/delete actions.

use crate::identity::Caller;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrudAction {
    Created,
    Updated,
    Deleted,
}

impl CrudAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrudAction::Created => "created",
            CrudAction::Updated => "updated",
            CrudAction::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(CrudAction::Created),
            "updated" => Some(CrudAction::Updated),
            "deleted" => Some(CrudAction::Deleted),
            _ => None,
        }
    }
}

impl fmt::Display for CrudAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Assigned by the audit sink; 0 until recorded.
    #[serde(default)]
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub action: CrudAction,
    pub resource_name: String,
    pub resource_id: String,
    /// RFC 3339 with nanoseconds.
    pub timestamp: String,
    /// JSON text: the full snapshot for created/deleted, the diff for updated.
    pub detail: String,
    pub request_id: String,
}

impl HistoryEntry {
    pub fn new(
        caller: Option<&Caller>,
        action: CrudAction,
        resource_name: &str,
        resource_id: i64,
        detail: &Value,
        request_id: &str,
    ) -> Result<Self, serde_json::Error> {
        Ok(HistoryEntry {
            id: 0,
            user_id: caller.map(|c| c.user_id).unwrap_or_default(),
            username: caller.map(|c| c.username.clone()).unwrap_or_default(),
            action,
            resource_name: resource_name.to_string(),
            resource_id: resource_id.to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
            detail: serde_json::to_string(detail)?,
            request_id: request_id.to_string(),
        })
    }
}

/// Timeline selection: one resource type, optionally one instance.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    pub resource_name: String,
    pub resource_id: Option<String>,
}

impl HistoryQuery {
    pub fn matches(&self, entry: &HistoryEntry) -> bool {
        entry.resource_name == self.resource_name
            && self
                .resource_id
                .as_deref()
                .map_or(true, |id| entry.resource_id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::Role;
    use serde_json::json;

    #[test]
    fn entry_carries_actor_and_serialized_detail() {
        let caller = Caller::new(7, "ana", vec![Role::visitor()]);
        let e = HistoryEntry::new(Some(&caller), CrudAction::Updated, "Widget", 3, &json!({"field": ["a", "b"]}), "req-1").unwrap();
        assert_eq!(e.user_id, 7);
        assert_eq!(e.username, "ana");
        assert_eq!(e.resource_id, "3");
        assert_eq!(e.detail, r#"{"field":["a","b"]}"#);
        assert!(chrono::DateTime::parse_from_rfc3339(&e.timestamp).is_ok());
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["action"], "updated");
        assert_eq!(v["resourceName"], "Widget");
    }

    #[test]
    fn query_matches_name_and_optional_id() {
        let e = HistoryEntry::new(None, CrudAction::Created, "Widget", 1, &json!({}), "r").unwrap();
        assert!(HistoryQuery { resource_name: "Widget".into(), resource_id: None }.matches(&e));
        assert!(HistoryQuery { resource_name: "Widget".into(), resource_id: Some("1".into()) }.matches(&e));
        assert!(!HistoryQuery { resource_name: "Widget".into(), resource_id: Some("2".into()) }.matches(&e));
        assert!(!HistoryQuery { resource_name: "Gadget".into(), resource_id: None }.matches(&e));
    }
}
