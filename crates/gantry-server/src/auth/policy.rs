// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Authorization decisions.
//!
//! Two engines. The delegated engine asks the control plane whether the
//! caller's credential can perform the verb, which is the default. The local
//! engine evaluates a policy document loaded at startup and never calls out,
//! for installations that do not want per-request access reviews.

use std::collections::HashMap;

use serde::Deserialize;

use gantry_cluster::{ClusterClient, ResourceRule};
use gantry_model::Claims;

use crate::auth::CallerContext;
use crate::auth::ops::Operation;
use crate::error::ApiError;

/// The API group all resources in the policy engine belong to.
const API_GROUP: &str = "gantry.io";

pub enum PolicyEngine {
    Delegated,
    Local(PolicyDocument),
}

impl PolicyEngine {
    /// One-off decision for a single operation.
    pub async fn allow(
        &self,
        caller: &CallerContext,
        op: Operation,
        namespace: &str,
        name: &str,
    ) -> Result<bool, ApiError> {
        match self {
            PolicyEngine::Delegated => Ok(caller
                .client
                .can_i(op.verb(), op.resource(), namespace, name)
                .await?),
            PolicyEngine::Local(doc) => {
                Ok(doc.allows(caller.claims.as_ref(), op.verb(), op.resource(), namespace, name))
            }
        }
    }

    /// Deny unless allowed, with a uniform message.
    pub async fn check(
        &self,
        caller: &CallerContext,
        op: Operation,
        namespace: &str,
        name: &str,
    ) -> Result<(), ApiError> {
        if self.allow(caller, op, namespace, name).await? {
            Ok(())
        } else {
            Err(ApiError::PermissionDenied(format!(
                "permission denied: {} {}",
                op.verb(),
                op.resource()
            )))
        }
    }

    /// A per-request gate for filtering list pages item by item. The
    /// delegated engine fetches the caller's rules once per namespace and
    /// matches locally, so a page costs at most one review per namespace.
    pub fn list_gate<'a>(&'a self, caller: &'a CallerContext, op: Operation) -> ListGate<'a> {
        ListGate {
            engine: self,
            caller,
            op,
            rules: HashMap::new(),
        }
    }
}

pub struct ListGate<'a> {
    engine: &'a PolicyEngine,
    caller: &'a CallerContext,
    op: Operation,
    rules: HashMap<String, Vec<ResourceRule>>,
}

impl ListGate<'_> {
    pub async fn allows(&mut self, namespace: &str, name: &str) -> Result<bool, ApiError> {
        match self.engine {
            PolicyEngine::Local(doc) => Ok(doc.allows(
                self.caller.claims.as_ref(),
                self.op.verb(),
                self.op.resource(),
                namespace,
                name,
            )),
            PolicyEngine::Delegated => {
                if !self.rules.contains_key(namespace) {
                    let rules = self.caller.client.my_rules(namespace).await?;
                    self.rules.insert(namespace.to_string(), rules);
                }
                let rules = &self.rules[namespace];
                Ok(rules
                    .iter()
                    .any(|r| rule_matches(r, self.op.verb(), self.op.resource(), name)))
            }
        }
    }
}

fn rule_matches(rule: &ResourceRule, verb: &str, resource: &str, name: &str) -> bool {
    // an empty word list places no restriction
    let word_matches =
        |set: &[String], want: &str| set.is_empty() || set.iter().any(|w| w == "*" || w == want);
    word_matches(&rule.verbs, verb)
        && word_matches(&rule.api_groups, API_GROUP)
        && word_matches(&rule.resources, resource)
        && (rule.resource_names.is_empty() || rule.resource_names.iter().any(|n| n == name))
}

/// A local policy document: a flat list of allow statements.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDocument {
    #[serde(default)]
    pub statements: Vec<PolicyStatement>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyStatement {
    /// Subjects or group names this statement applies to. `*` matches anyone.
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub verbs: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
    /// Namespaces the statement covers; empty means all.
    #[serde(default)]
    pub namespaces: Vec<String>,
    /// Resource names the statement covers; empty means all.
    #[serde(default)]
    pub names: Vec<String>,
}

impl PolicyDocument {
    pub fn load(path: &str) -> Result<Self, ApiError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ApiError::Internal(format!("cannot read policy document: {e}")))?;
        serde_json::from_str(&raw)
            .map_err(|e| ApiError::Internal(format!("cannot parse policy document: {e}")))
    }

    pub fn allows(
        &self,
        claims: Option<&Claims>,
        verb: &str,
        resource: &str,
        namespace: &str,
        name: &str,
    ) -> bool {
        self.statements
            .iter()
            .any(|s| statement_matches(s, claims, verb, resource, namespace, name))
    }
}

fn statement_matches(
    statement: &PolicyStatement,
    claims: Option<&Claims>,
    verb: &str,
    resource: &str,
    namespace: &str,
    name: &str,
) -> bool {
    let subject_matches = statement.subjects.iter().any(|s| {
        if s == "*" {
            return true;
        }
        let Some(claims) = claims else { return false };
        claims.subject == *s || claims.groups.contains(s)
    });
    if !subject_matches {
        return false;
    }
    let word = |set: &[String], want: &str| set.iter().any(|w| w == "*" || w == want);
    word(&statement.verbs, verb)
        && word(&statement.resources, resource)
        && (statement.namespaces.is_empty() || word(&statement.namespaces, namespace))
        && (statement.names.is_empty() || statement.names.iter().any(|n| n == name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(verbs: &[&str], resources: &[&str], names: &[&str]) -> ResourceRule {
        ResourceRule {
            verbs: verbs.iter().map(|s| s.to_string()).collect(),
            api_groups: vec![API_GROUP.to_string()],
            resources: resources.iter().map(|s| s.to_string()).collect(),
            resource_names: names.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn rule_matching_honors_wildcards_and_names() {
        let star = rule(&["*"], &["*"], &[]);
        assert!(rule_matches(&star, "delete", "workflows", "x"));

        let narrow = rule(&["get", "list"], &["workflows"], &["wf-1"]);
        assert!(rule_matches(&narrow, "list", "workflows", "wf-1"));
        assert!(!rule_matches(&narrow, "list", "workflows", "wf-2"));
        assert!(!rule_matches(&narrow, "delete", "workflows", "wf-1"));

        let other_group = ResourceRule {
            api_groups: vec!["batch".into()],
            ..rule(&["*"], &["*"], &[])
        };
        assert!(!rule_matches(&other_group, "get", "workflows", "x"));
    }

    #[test]
    fn rule_matching_treats_empty_lists_as_unrestricted() {
        let unrestricted = ResourceRule {
            verbs: Vec::new(),
            api_groups: Vec::new(),
            resources: Vec::new(),
            resource_names: Vec::new(),
        };
        assert!(rule_matches(&unrestricted, "delete", "workflows", "wf"));

        let verbs_only = ResourceRule {
            verbs: vec!["get".into()],
            ..unrestricted.clone()
        };
        assert!(rule_matches(&verbs_only, "get", "cronworkflows", "x"));
        assert!(!rule_matches(&verbs_only, "delete", "cronworkflows", "x"));
    }

    #[test]
    fn local_policy_matches_subjects_and_groups() {
        let doc: PolicyDocument = serde_json::from_value(serde_json::json!({
            "statements": [
                {"subjects": ["admins"], "verbs": ["*"], "resources": ["*"]},
                {"subjects": ["bob"], "verbs": ["get", "list"], "resources": ["workflows"],
                 "namespaces": ["dev"]}
            ]
        }))
        .unwrap();

        let admin = Claims {
            subject: "alice".into(),
            groups: vec!["admins".into()],
            ..Default::default()
        };
        assert!(doc.allows(Some(&admin), "delete", "workflows", "prod", "wf"));

        let bob = Claims {
            subject: "bob".into(),
            ..Default::default()
        };
        assert!(doc.allows(Some(&bob), "get", "workflows", "dev", "wf"));
        assert!(!doc.allows(Some(&bob), "get", "workflows", "prod", "wf"));
        assert!(!doc.allows(Some(&bob), "delete", "workflows", "dev", "wf"));
        assert!(!doc.allows(None, "get", "workflows", "dev", "wf"));
    }
}
