// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Identity claims carried by an authenticated request.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Claims extracted from an SSO session token or synthesized for a
/// service-account caller. `raw` keeps the full claim set so a custom
/// groups claim can be read without re-parsing the token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "sub", default)]
    pub subject: String,
    #[serde(rename = "iss", default, skip_serializing_if = "String::is_empty")]
    pub issuer: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    /// Service account exchanged for this identity, when RBAC is on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_namespace: Option<String>,
    #[serde(flatten)]
    pub raw: BTreeMap<String, serde_json::Value>,
}

impl Claims {
    /// Read groups from a non-standard claim name, accepting either a JSON
    /// list of strings or a single string.
    pub fn custom_groups(&self, claim_name: &str) -> Option<Vec<String>> {
        match self.raw.get(claim_name)? {
            serde_json::Value::String(s) => Some(vec![s.clone()]),
            serde_json::Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// The full claim set as an expression environment.
    pub fn as_map(&self) -> BTreeMap<String, serde_json::Value> {
        serde_json::to_value(self)
            .ok()
            .and_then(|v| match v {
                serde_json::Value::Object(map) => Some(map.into_iter().collect()),
                _ => None,
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_groups_accepts_string_or_list() {
        let claims: Claims = serde_json::from_value(serde_json::json!({
            "sub": "alice",
            "cognito:groups": ["dev", "ops"],
            "team": "core"
        }))
        .unwrap();
        assert_eq!(claims.custom_groups("cognito:groups").unwrap(), vec!["dev", "ops"]);
        assert_eq!(claims.custom_groups("team").unwrap(), vec!["core"]);
        assert_eq!(claims.custom_groups("missing"), None);
    }

    #[test]
    fn claim_map_includes_unknown_fields() {
        let claims: Claims = serde_json::from_value(serde_json::json!({
            "sub": "alice",
            "dept": "platform"
        }))
        .unwrap();
        let map = claims.as_map();
        assert_eq!(map["sub"], "alice");
        assert_eq!(map["dept"], "platform");
    }
}
