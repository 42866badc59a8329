// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The filter envelope shared by the live and archive listing paths.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::selector::{
    FieldFilter, LabelRequirement, SelectorError, parse_field_selector, parse_label_selector,
};

#[derive(Debug, Error, PartialEq)]
pub enum ListOptionsError {
    #[error("listOptions.continue must be an integer offset")]
    BadContinue,
    #[error(
        "namespace in the request {request:?} conflicts with namespace in the field selector {selector:?}"
    )]
    NamespaceConflict { request: String, selector: String },
    #[error("multiple metadata.name field selectors")]
    DuplicateName,
    #[error("namePrefix conflicts with a metadata.name field selector")]
    PrefixConflict,
    #[error("unknown nameFilter (want Exact, Prefix or Contains)")]
    BadNameFilter,
    #[error(transparent)]
    Selector(#[from] SelectorError),
}

/// How the name filter matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameFilter {
    #[default]
    Exact,
    Prefix,
    Contains,
    NotEquals,
}

impl NameFilter {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "" | "Exact" => Some(NameFilter::Exact),
            "Prefix" => Some(NameFilter::Prefix),
            "Contains" => Some(NameFilter::Contains),
            "NotEquals" => Some(NameFilter::NotEquals),
            _ => None,
        }
    }
}

/// Normalized list filters. Offsets are absolute; a page over-fetches
/// `limit + 1` rows so the caller can tell whether more remain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListOptions {
    pub namespace: String,
    pub name: String,
    pub name_filter: NameFilter,
    pub started_after: Option<DateTime<Utc>>,
    pub started_before: Option<DateTime<Utc>>,
    pub label_requirements: Vec<LabelRequirement>,
    pub limit: i64,
    pub offset: i64,
    pub ascending: bool,
    pub show_remaining_item_count: bool,
}

impl ListOptions {
    /// Build from wire parameters. `namespace` is the path/query namespace;
    /// a namespace in the field selector must agree with it. `name_pattern`
    /// reinterprets how a `metadata.name` selector matches; `name_prefix` is
    /// a standalone prefix filter.
    pub fn from_parts(
        namespace: &str,
        label_selector: &str,
        field_selector: &str,
        name_prefix: &str,
        name_pattern: &str,
        limit: Option<i64>,
        continue_token: &str,
    ) -> Result<Self, ListOptionsError> {
        let mut opts = ListOptions {
            namespace: namespace.to_string(),
            limit: limit.unwrap_or(0).max(0),
            ..Default::default()
        };
        if !continue_token.is_empty() {
            opts.offset = continue_token
                .parse::<i64>()
                .ok()
                .filter(|o| *o >= 0)
                .ok_or(ListOptionsError::BadContinue)?;
        }
        if !label_selector.is_empty() {
            opts.label_requirements = parse_label_selector(label_selector)?;
        }
        let mut saw_name = false;
        for filter in parse_field_selector(field_selector)? {
            match filter {
                FieldFilter::Namespace(ns) => {
                    if !opts.namespace.is_empty() && opts.namespace != ns {
                        return Err(ListOptionsError::NamespaceConflict {
                            request: opts.namespace.clone(),
                            selector: ns,
                        });
                    }
                    opts.namespace = ns;
                }
                FieldFilter::NameEquals(name) => {
                    if saw_name {
                        return Err(ListOptionsError::DuplicateName);
                    }
                    saw_name = true;
                    opts.name = name;
                    opts.name_filter = NameFilter::Exact;
                }
                FieldFilter::NameNotEquals(name) => {
                    if saw_name {
                        return Err(ListOptionsError::DuplicateName);
                    }
                    saw_name = true;
                    opts.name = name;
                    opts.name_filter = NameFilter::NotEquals;
                }
                FieldFilter::StartedAfter(t) => opts.started_after = Some(t),
                FieldFilter::StartedBefore(t) => opts.started_before = Some(t),
                FieldFilter::ShowRemainingItemCount(v) => opts.show_remaining_item_count = v,
            }
        }
        let pattern = NameFilter::parse(name_pattern).ok_or(ListOptionsError::BadNameFilter)?;
        if !name_prefix.is_empty() {
            if saw_name {
                return Err(ListOptionsError::PrefixConflict);
            }
            opts.name = name_prefix.to_string();
            opts.name_filter = NameFilter::Prefix;
        } else if saw_name && opts.name_filter == NameFilter::Exact {
            opts.name_filter = pattern;
        }
        Ok(opts)
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    /// Rows to request from a backend: one past the page so the caller
    /// knows whether a further page exists. Zero means unlimited.
    pub fn fetch_limit(&self) -> i64 {
        if self.limit > 0 { self.limit + 1 } else { 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_continue_as_offset() {
        let opts = ListOptions::from_parts("argo", "", "", "", "", Some(20), "40").unwrap();
        assert_eq!(opts.offset, 40);
        assert_eq!(opts.limit, 20);
        assert_eq!(opts.fetch_limit(), 21);
    }

    #[test]
    fn rejects_non_integer_continue() {
        let err = ListOptions::from_parts("", "", "", "", "", None, "abc").unwrap_err();
        assert_eq!(err, ListOptionsError::BadContinue);
        let err = ListOptions::from_parts("", "", "", "", "", None, "-5").unwrap_err();
        assert_eq!(err, ListOptionsError::BadContinue);
    }

    #[test]
    fn field_selector_namespace_must_agree() {
        let err =
            ListOptions::from_parts("argo", "", "metadata.namespace=other", "", "", None, "")
                .unwrap_err();
        assert!(matches!(err, ListOptionsError::NamespaceConflict { .. }));

        let opts = ListOptions::from_parts("", "", "metadata.namespace=argo", "", "", None, "").unwrap();
        assert_eq!(opts.namespace, "argo");
    }

    #[test]
    fn rejects_repeated_name_selectors() {
        let err =
            ListOptions::from_parts("", "", "metadata.name=a,metadata.name!=b", "", "", None, "")
                .unwrap_err();
        assert_eq!(err, ListOptionsError::DuplicateName);
    }

    #[test]
    fn name_not_equals_sets_filter_mode() {
        let opts = ListOptions::from_parts("", "", "metadata.name!=junk", "", "", None, "").unwrap();
        assert_eq!(opts.name, "junk");
        assert_eq!(opts.name_filter, NameFilter::NotEquals);
    }

    #[test]
    fn name_prefix_and_pattern_parameters() {
        let opts = ListOptions::from_parts("", "", "", "wf-", "", None, "").unwrap();
        assert_eq!(opts.name, "wf-");
        assert_eq!(opts.name_filter, NameFilter::Prefix);

        let opts =
            ListOptions::from_parts("", "", "metadata.name=build", "", "Contains", None, "")
                .unwrap();
        assert_eq!(opts.name, "build");
        assert_eq!(opts.name_filter, NameFilter::Contains);

        let err = ListOptions::from_parts("", "", "metadata.name=a", "a-", "", None, "")
            .unwrap_err();
        assert_eq!(err, ListOptionsError::PrefixConflict);

        let err = ListOptions::from_parts("", "", "", "", "Fuzzy", None, "").unwrap_err();
        assert_eq!(err, ListOptionsError::BadNameFilter);
    }

    #[test]
    fn started_at_range() {
        let opts = ListOptions::from_parts(
            "",
            "",
            "spec.startedAt>2024-01-01T00:00:00Z,spec.startedAt<2024-02-01T00:00:00Z",
            "",
            "",
            None,
            "",
        )
        .unwrap();
        assert!(opts.started_after.is_some());
        assert!(opts.started_before.is_some());
    }
}
