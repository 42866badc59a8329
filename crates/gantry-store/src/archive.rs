// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Postgres-backed workflow archive.
//!
//! The external execution controller writes terminal workflows here; the
//! server reads, pages, and deletes. Every query is scoped by instance id,
//! so one database can back several server instances.

use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::debug;

use gantry_model::labels::{ARCHIVING_STATUS_PERSISTED, KEY_ARCHIVING_STATUS};
use gantry_model::list_options::ListOptions;
use gantry_model::workflow::Workflow;

use crate::error::StoreError;
use crate::filter::{ARCHIVE_TABLES, push_order_and_page, push_where};
use crate::record::WorkflowRecord;

#[derive(Clone)]
pub struct WorkflowArchive {
    pool: PgPool,
    instance_id: String,
}

impl WorkflowArchive {
    pub fn new(pool: PgPool, instance_id: &str) -> Self {
        WorkflowArchive {
            pool,
            instance_id: instance_id.to_string(),
        }
    }

    pub async fn list_workflows(&self, opts: &ListOptions) -> Result<Vec<Workflow>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT w.uid, w.instance_id, w.cluster_name, w.namespace, w.name, w.phase, \
             w.started_at, w.finished_at, w.workflow FROM archived_workflows w",
        );
        push_where(&mut qb, &ARCHIVE_TABLES, &self.instance_id, opts);
        push_order_and_page(&mut qb, opts, opts.fetch_limit());
        let records: Vec<WorkflowRecord> = qb.build_query_as().fetch_all(&self.pool).await?;
        debug!(count = records.len(), "Listed archived workflows");
        records.iter().map(|r| Self::hydrate(r)).collect()
    }

    pub async fn count_workflows(&self, opts: &ListOptions) -> Result<i64, StoreError> {
        let mut qb =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM archived_workflows w");
        push_where(&mut qb, &ARCHIVE_TABLES, &self.instance_id, opts);
        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count)
    }

    pub async fn get_workflow(&self, uid: &str) -> Result<Option<Workflow>, StoreError> {
        let record: Option<WorkflowRecord> = sqlx::query_as(
            "SELECT uid, instance_id, cluster_name, namespace, name, phase, started_at, \
             finished_at, workflow FROM archived_workflows WHERE uid = $1 AND instance_id = $2",
        )
        .bind(uid)
        .bind(&self.instance_id)
        .fetch_optional(&self.pool)
        .await?;
        record.as_ref().map(Self::hydrate).transpose()
    }

    /// Latest archived run of (namespace, name), by started-at.
    pub async fn get_workflow_by_name(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Workflow>, StoreError> {
        let record: Option<WorkflowRecord> = sqlx::query_as(
            "SELECT uid, instance_id, cluster_name, namespace, name, phase, started_at, \
             finished_at, workflow FROM archived_workflows \
             WHERE namespace = $1 AND name = $2 AND instance_id = $3 \
             ORDER BY started_at DESC NULLS LAST LIMIT 1",
        )
        .bind(namespace)
        .bind(name)
        .bind(&self.instance_id)
        .fetch_optional(&self.pool)
        .await?;
        record.as_ref().map(Self::hydrate).transpose()
    }

    /// Strike the row; the label relation cascades.
    pub async fn delete_workflow(&self, uid: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM archived_workflows WHERE uid = $1 AND instance_id = $2")
            .bind(uid)
            .bind(&self.instance_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Insert or replace an archived workflow. Production rows come from
    /// the execution controller; the server uses this only in tooling and
    /// tests.
    pub async fn archive_workflow(&self, wf: &Workflow) -> Result<(), StoreError> {
        let record = WorkflowRecord::from_workflow(wf, &self.instance_id)?;
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM archived_workflows WHERE uid = $1")
            .bind(&record.uid)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO archived_workflows \
             (uid, instance_id, cluster_name, namespace, name, phase, started_at, finished_at, workflow) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&record.uid)
        .bind(&record.instance_id)
        .bind(&record.cluster_name)
        .bind(&record.namespace)
        .bind(&record.name)
        .bind(&record.phase)
        .bind(&record.started_at)
        .bind(&record.finished_at)
        .bind(&record.workflow)
        .execute(&mut *tx)
        .await?;
        for (key, value) in &wf.metadata.labels {
            sqlx::query("INSERT INTO archived_workflows_labels (uid, key, value) VALUES ($1, $2, $3)")
                .bind(&record.uid)
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Distinct label keys present on archived workflows of this instance.
    pub async fn list_label_keys(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            "SELECT DISTINCT l.key FROM archived_workflows_labels l \
             JOIN archived_workflows w ON w.uid = l.uid \
             WHERE w.instance_id = $1 ORDER BY l.key",
        )
        .bind(&self.instance_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| r.get("key")).collect())
    }

    pub async fn list_label_values(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            "SELECT DISTINCT l.value FROM archived_workflows_labels l \
             JOIN archived_workflows w ON w.uid = l.uid \
             WHERE w.instance_id = $1 AND l.key = $2 ORDER BY l.value",
        )
        .bind(&self.instance_id)
        .bind(key)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| r.get("value")).collect())
    }

    // Read-side marker telling clients the object came from the archive.
    fn hydrate(record: &WorkflowRecord) -> Result<Workflow, StoreError> {
        let mut wf = record.to_workflow()?;
        wf.metadata
            .set_label(KEY_ARCHIVING_STATUS, ARCHIVING_STATUS_PERSISTED);
        Ok(wf)
    }
}
