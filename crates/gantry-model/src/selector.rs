// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Selector grammars accepted on list calls.
//!
//! Label selectors follow the usual comma-separated requirement grammar.
//! Field selectors are a closed set: only the keys and operators the list
//! endpoints actually support parse, anything else is rejected up front.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SelectorError {
    #[error("invalid label selector: {0}")]
    Label(String),
    #[error("unsupported field selector {key:?}")]
    UnknownField { key: String },
    #[error("unsupported operator {op:?} for field {key:?}")]
    UnknownOperator { key: String, op: String },
    #[error("invalid value for field {key:?}: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// One parsed label requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelRequirement {
    pub key: String,
    pub operator: LabelOperator,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelOperator {
    Equals,
    NotEquals,
    In,
    NotIn,
    Exists,
    NotExists,
}

impl LabelRequirement {
    pub fn equals(key: &str, value: &str) -> Self {
        LabelRequirement {
            key: key.to_string(),
            operator: LabelOperator::Equals,
            values: vec![value.to_string()],
        }
    }

    pub fn exists(key: &str) -> Self {
        LabelRequirement {
            key: key.to_string(),
            operator: LabelOperator::Exists,
            values: Vec::new(),
        }
    }
}

/// Parse a label selector such as
/// `app=web,tier!=cache,env in (dev,stage),!legacy,owner`.
pub fn parse_label_selector(selector: &str) -> Result<Vec<LabelRequirement>, SelectorError> {
    let mut requirements = Vec::new();
    for part in split_top_level(selector) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        requirements.push(parse_requirement(part)?);
    }
    Ok(requirements)
}

// Commas inside `in (...)` value sets must not split requirements.
fn split_top_level(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in s.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn parse_requirement(part: &str) -> Result<LabelRequirement, SelectorError> {
    if let Some(key) = part.strip_prefix('!') {
        let key = key.trim();
        if key.is_empty() {
            return Err(SelectorError::Label(part.to_string()));
        }
        return Ok(LabelRequirement {
            key: key.to_string(),
            operator: LabelOperator::NotExists,
            values: Vec::new(),
        });
    }
    for (needle, op) in [(" notin ", LabelOperator::NotIn), (" in ", LabelOperator::In)] {
        if let Some(idx) = part.find(needle) {
            let key = part[..idx].trim();
            let rest = part[idx + needle.len()..].trim();
            let inner = rest
                .strip_prefix('(')
                .and_then(|r| r.strip_suffix(')'))
                .ok_or_else(|| SelectorError::Label(part.to_string()))?;
            let values: Vec<String> = inner
                .split(',')
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect();
            if key.is_empty() || values.is_empty() {
                return Err(SelectorError::Label(part.to_string()));
            }
            return Ok(LabelRequirement {
                key: key.to_string(),
                operator: op,
                values,
            });
        }
    }
    for (needle, op) in [
        ("!=", LabelOperator::NotEquals),
        ("==", LabelOperator::Equals),
        ("=", LabelOperator::Equals),
    ] {
        if let Some(idx) = part.find(needle) {
            let key = part[..idx].trim();
            let value = part[idx + needle.len()..].trim();
            if key.is_empty() {
                return Err(SelectorError::Label(part.to_string()));
            }
            return Ok(LabelRequirement {
                key: key.to_string(),
                operator: op,
                values: vec![value.to_string()],
            });
        }
    }
    Ok(LabelRequirement::exists(part))
}

/// A typed field filter decoded from a field selector.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldFilter {
    Namespace(String),
    NameEquals(String),
    NameNotEquals(String),
    StartedAfter(DateTime<Utc>),
    StartedBefore(DateTime<Utc>),
    ShowRemainingItemCount(bool),
}

/// Parse a comma-separated field selector. Keys outside the supported set,
/// or supported keys with an unsupported operator, are rejected.
pub fn parse_field_selector(selector: &str) -> Result<Vec<FieldFilter>, SelectorError> {
    let mut filters = Vec::new();
    for part in selector.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        filters.push(parse_field(part)?);
    }
    Ok(filters)
}

fn parse_field(part: &str) -> Result<FieldFilter, SelectorError> {
    let (key, op, value) = split_field(part)?;
    match (key, op) {
        ("metadata.namespace", "=") | ("metadata.namespace", "==") => {
            Ok(FieldFilter::Namespace(value.to_string()))
        }
        ("metadata.name", "=") | ("metadata.name", "==") => {
            Ok(FieldFilter::NameEquals(value.to_string()))
        }
        ("metadata.name", "!=") => Ok(FieldFilter::NameNotEquals(value.to_string())),
        ("spec.startedAt", ">") => Ok(FieldFilter::StartedAfter(parse_time(key, value)?)),
        ("spec.startedAt", "<") => Ok(FieldFilter::StartedBefore(parse_time(key, value)?)),
        ("ext.showRemainingItemCount", "=") | ("ext.showRemainingItemCount", "==") => {
            value.parse::<bool>().map(FieldFilter::ShowRemainingItemCount).map_err(|_| {
                SelectorError::InvalidValue {
                    key: key.to_string(),
                    reason: format!("{value:?} is not a bool"),
                }
            })
        }
        ("metadata.namespace", op)
        | ("metadata.name", op)
        | ("spec.startedAt", op)
        | ("ext.showRemainingItemCount", op) => Err(SelectorError::UnknownOperator {
            key: key.to_string(),
            op: op.to_string(),
        }),
        (key, _) => Err(SelectorError::UnknownField { key: key.to_string() }),
    }
}

fn split_field(part: &str) -> Result<(&str, &str, &str), SelectorError> {
    for op in ["!=", "==", "=", ">", "<"] {
        if let Some(idx) = part.find(op) {
            // `>=` / `<=` would match `=` after the comparator; take the
            // longest operator starting at the split point.
            let key = part[..idx].trim();
            let value = part[idx + op.len()..].trim();
            return Ok((key, op, value));
        }
    }
    Err(SelectorError::UnknownField { key: part.to_string() })
}

fn parse_time(key: &str, value: &str) -> Result<DateTime<Utc>, SelectorError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| SelectorError::InvalidValue {
            key: key.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_selector_full_grammar() {
        let reqs = parse_label_selector("app=web,tier!=cache,env in (dev, stage),!legacy,owner")
            .unwrap();
        assert_eq!(reqs.len(), 5);
        assert_eq!(reqs[0], LabelRequirement::equals("app", "web"));
        assert_eq!(reqs[1].operator, LabelOperator::NotEquals);
        assert_eq!(reqs[2].operator, LabelOperator::In);
        assert_eq!(reqs[2].values, vec!["dev", "stage"]);
        assert_eq!(reqs[3].operator, LabelOperator::NotExists);
        assert_eq!(reqs[4].operator, LabelOperator::Exists);
    }

    #[test]
    fn label_selector_double_equals() {
        let reqs = parse_label_selector("app==web").unwrap();
        assert_eq!(reqs[0], LabelRequirement::equals("app", "web"));
    }

    #[test]
    fn label_selector_rejects_unclosed_set() {
        assert!(parse_label_selector("env in (dev").is_err());
    }

    #[test]
    fn field_selector_supported_keys() {
        let filters = parse_field_selector(
            "metadata.namespace=argo,metadata.name!=junk,spec.startedAt>2024-01-01T00:00:00Z",
        )
        .unwrap();
        assert_eq!(filters[0], FieldFilter::Namespace("argo".into()));
        assert_eq!(filters[1], FieldFilter::NameNotEquals("junk".into()));
        assert!(matches!(filters[2], FieldFilter::StartedAfter(_)));
    }

    #[test]
    fn field_selector_rejects_unknown_key() {
        let err = parse_field_selector("status.phase=Running").unwrap_err();
        assert_eq!(err, SelectorError::UnknownField { key: "status.phase".into() });
    }

    #[test]
    fn field_selector_rejects_bad_operator() {
        let err = parse_field_selector("metadata.name>abc").unwrap_err();
        assert!(matches!(err, SelectorError::UnknownOperator { .. }));
    }

    #[test]
    fn field_selector_show_remaining() {
        let filters = parse_field_selector("ext.showRemainingItemCount=true").unwrap();
        assert_eq!(filters[0], FieldFilter::ShowRemainingItemCount(true));
        assert!(parse_field_selector("ext.showRemainingItemCount=yes").is_err());
    }
}
