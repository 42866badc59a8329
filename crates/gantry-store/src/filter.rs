// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Translation of list options into SQL, shared by the archive and the
//! live cache. The two stores use the same two-table shape (workflows +
//! labels), so one builder serves both engines.
//!
//! Timestamps are stored as RFC 3339 UTC text in both engines; lexical
//! comparison on that format is chronological.

use gantry_model::list_options::{ListOptions, NameFilter};
use gantry_model::selector::LabelOperator;
use sqlx::{Database, QueryBuilder};

/// Table pair a query runs against.
#[derive(Debug, Clone, Copy)]
pub struct WorkflowTables {
    pub workflows: &'static str,
    pub labels: &'static str,
}

pub const ARCHIVE_TABLES: WorkflowTables = WorkflowTables {
    workflows: "archived_workflows",
    labels: "archived_workflows_labels",
};

pub const LIVE_TABLES: WorkflowTables = WorkflowTables {
    workflows: "live_workflows",
    labels: "live_workflows_labels",
};

/// Append the WHERE clause for the given filters. The main table must be
/// aliased `w`. An empty instance id matches only untagged rows.
pub fn push_where<'args, DB: Database>(
    qb: &mut QueryBuilder<'args, DB>,
    tables: &WorkflowTables,
    instance_id: &str,
    opts: &ListOptions,
) where
    String: sqlx::Encode<'args, DB> + sqlx::Type<DB>,
{
    qb.push(" WHERE w.instance_id = ");
    qb.push_bind(instance_id.to_string());
    if !opts.namespace.is_empty() {
        qb.push(" AND w.namespace = ");
        qb.push_bind(opts.namespace.clone());
    }
    if !opts.name.is_empty() {
        match opts.name_filter {
            NameFilter::Exact => {
                qb.push(" AND w.name = ");
                qb.push_bind(opts.name.clone());
            }
            NameFilter::NotEquals => {
                qb.push(" AND w.name <> ");
                qb.push_bind(opts.name.clone());
            }
            NameFilter::Prefix => {
                qb.push(" AND w.name LIKE ");
                qb.push_bind(format!("{}%", escape_like(&opts.name)));
                qb.push(" ESCAPE '\\'");
            }
            NameFilter::Contains => {
                qb.push(" AND w.name LIKE ");
                qb.push_bind(format!("%{}%", escape_like(&opts.name)));
                qb.push(" ESCAPE '\\'");
            }
        }
    }
    if let Some(after) = opts.started_after {
        qb.push(" AND w.started_at > ");
        qb.push_bind(after.to_rfc3339_opts(chrono::SecondsFormat::Micros, true));
    }
    if let Some(before) = opts.started_before {
        qb.push(" AND w.started_at < ");
        qb.push_bind(before.to_rfc3339_opts(chrono::SecondsFormat::Micros, true));
    }
    for requirement in &opts.label_requirements {
        let negated = matches!(
            requirement.operator,
            LabelOperator::NotEquals | LabelOperator::NotIn | LabelOperator::NotExists
        );
        qb.push(if negated { " AND NOT EXISTS (SELECT 1 FROM " } else { " AND EXISTS (SELECT 1 FROM " });
        qb.push(tables.labels);
        qb.push(" l WHERE l.uid = w.uid AND l.key = ");
        qb.push_bind(requirement.key.clone());
        match requirement.operator {
            LabelOperator::Exists | LabelOperator::NotExists => {}
            LabelOperator::Equals | LabelOperator::NotEquals => {
                qb.push(" AND l.value = ");
                qb.push_bind(requirement.values[0].clone());
            }
            LabelOperator::In | LabelOperator::NotIn => {
                qb.push(" AND l.value IN (");
                let mut first = true;
                for value in &requirement.values {
                    if !first {
                        qb.push(", ");
                    }
                    first = false;
                    qb.push_bind(value.clone());
                }
                qb.push(")");
            }
        }
        qb.push(")");
    }
}

/// Append ordering and pagination. Sort is started-at (descending unless
/// asked otherwise) with name as a deterministic tiebreak.
pub fn push_order_and_page<'args, DB: Database>(
    qb: &mut QueryBuilder<'args, DB>,
    opts: &ListOptions,
    fetch_limit: i64,
) where
    i64: sqlx::Encode<'args, DB> + sqlx::Type<DB>,
{
    if opts.ascending {
        qb.push(" ORDER BY w.started_at ASC NULLS LAST, w.name ASC");
    } else {
        qb.push(" ORDER BY w.started_at DESC NULLS LAST, w.name ASC");
    }
    if fetch_limit > 0 || opts.offset > 0 {
        qb.push(" LIMIT ");
        qb.push_bind(if fetch_limit > 0 { fetch_limit } else { i64::MAX });
        qb.push(" OFFSET ");
        qb.push_bind(opts.offset);
    }
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
