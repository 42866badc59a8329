// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Well-known label keys and label-value sanitization.

use crate::claims::Claims;
use crate::meta::ObjectMeta;

/// Tenancy tag scoping every resource to one server instance.
pub const KEY_INSTANCE_TAG: &str = "workflows.gantry.io/controller-instanceid";
/// Subject that created the resource.
pub const KEY_CREATOR: &str = "workflows.gantry.io/creator";
pub const KEY_CREATOR_EMAIL: &str = "workflows.gantry.io/creator-email";
pub const KEY_CREATOR_PREFERRED_USERNAME: &str =
    "workflows.gantry.io/creator-preferred-username";
/// Marks the API action that produced a workflow (resubmit, retry, ...).
pub const KEY_ACTION: &str = "workflows.gantry.io/action";
/// Set by the archiving controller once a workflow row is persisted.
pub const KEY_ARCHIVING_STATUS: &str = "workflows.gantry.io/workflow-archiving-status";
/// Links a workflow to the event binding that submitted it.
pub const KEY_EVENT_BINDING: &str = "workflows.gantry.io/workflow-event-binding";
/// Completed workflows carry this so informers can filter them out.
pub const KEY_COMPLETED: &str = "workflows.gantry.io/completed";

pub const ARCHIVING_STATUS_ARCHIVED: &str = "Archived";
pub const ARCHIVING_STATUS_PERSISTED: &str = "Persisted";

const MAX_LABEL_LEN: usize = 63;

/// Squeeze an arbitrary string into a valid label value: keep alphanumerics
/// and `-_.`, replace the rest, trim non-alphanumeric edges, cap at 63.
pub fn sanitize_label_value(value: &str) -> String {
    let mut out: String = value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '-' })
        .take(MAX_LABEL_LEN)
        .collect();
    while out.ends_with(|c: char| !c.is_ascii_alphanumeric()) {
        out.pop();
    }
    while out.starts_with(|c: char| !c.is_ascii_alphanumeric()) {
        out.remove(0);
    }
    out
}

/// Stamp creator labels from the caller's claims. Absent claim fields clear
/// any stale label left by a previous write.
pub fn apply_creator_labels(meta: &mut ObjectMeta, claims: Option<&Claims>) {
    let set_or_clear = |meta: &mut ObjectMeta, key: &str, value: Option<&str>| match value {
        Some(v) if !v.is_empty() => {
            meta.set_label(key, &sanitize_label_value(v));
        }
        _ => {
            meta.labels.remove(key);
        }
    };
    match claims {
        Some(claims) => {
            set_or_clear(meta, KEY_CREATOR, Some(claims.subject.as_str()));
            set_or_clear(meta, KEY_CREATOR_EMAIL, claims.email.as_deref());
            set_or_clear(
                meta,
                KEY_CREATOR_PREFERRED_USERNAME,
                claims.preferred_username.as_deref(),
            );
        }
        None => {
            meta.labels.remove(KEY_CREATOR);
            meta.labels.remove(KEY_CREATOR_EMAIL);
            meta.labels.remove(KEY_CREATOR_PREFERRED_USERNAME);
        }
    }
}

/// Instance-tag helpers. An empty configured tag scopes the server to
/// resources carrying no tag at all.
#[derive(Debug, Clone, Default)]
pub struct InstanceTag(pub Option<String>);

impl InstanceTag {
    pub fn new(tag: Option<String>) -> Self {
        InstanceTag(tag.filter(|t| !t.is_empty()))
    }

    /// Stamp the tag onto a resource about to be written.
    pub fn stamp(&self, meta: &mut ObjectMeta) {
        match &self.0 {
            Some(tag) => meta.set_label(KEY_INSTANCE_TAG, tag),
            None => {
                meta.labels.remove(KEY_INSTANCE_TAG);
            }
        }
    }

    /// Whether a resource read back from the cluster belongs to this
    /// instance. Callers surface a mismatch as not-found.
    pub fn owns(&self, meta: &ObjectMeta) -> bool {
        match &self.0 {
            Some(tag) => meta.label(KEY_INSTANCE_TAG) == Some(tag.as_str()),
            None => meta.label(KEY_INSTANCE_TAG).is_none(),
        }
    }

    /// Label requirement restricting list calls to this instance.
    pub fn selector(&self) -> String {
        match &self.0 {
            Some(tag) => format!("{KEY_INSTANCE_TAG}={tag}"),
            None => format!("!{KEY_INSTANCE_TAG}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_and_trims() {
        assert_eq!(sanitize_label_value("alice@corp.example"), "alice-corp.example");
        assert_eq!(sanitize_label_value("-weird--"), "weird");
        assert_eq!(sanitize_label_value("plain"), "plain");
        let long = "x".repeat(100);
        assert_eq!(sanitize_label_value(&long).len(), 63);
    }

    #[test]
    fn instance_tag_ownership() {
        let tag = InstanceTag::new(Some("acme".into()));
        let mut meta = ObjectMeta::default();
        assert!(!tag.owns(&meta));
        tag.stamp(&mut meta);
        assert!(tag.owns(&meta));

        let untagged = InstanceTag::new(None);
        assert!(untagged.owns(&ObjectMeta::default()));
        assert!(!untagged.owns(&meta));
        assert_eq!(untagged.selector(), format!("!{KEY_INSTANCE_TAG}"));
    }

    #[test]
    fn creator_labels_cleared_for_anonymous() {
        let mut meta = ObjectMeta::default();
        meta.set_label(KEY_CREATOR, "stale");
        apply_creator_labels(&mut meta, None);
        assert!(meta.label(KEY_CREATOR).is_none());
    }
}
