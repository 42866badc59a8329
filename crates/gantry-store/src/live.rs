// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process SQLite mirror of live workflows.
//!
//! Fed by the control-plane watch: single writer, many readers. Upserts
//! are delete-then-insert inside a transaction so out-of-order delivery
//! cannot leave half-updated label rows behind.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use gantry_model::labels::{ARCHIVING_STATUS_ARCHIVED, KEY_ARCHIVING_STATUS};
use gantry_model::list_options::ListOptions;
use gantry_model::workflow::Workflow;

use crate::error::StoreError;
use crate::filter::{LIVE_TABLES, push_order_and_page, push_where};
use crate::migrations;
use crate::record::WorkflowRecord;

#[derive(Clone)]
pub struct LiveWorkflowStore {
    pool: SqlitePool,
    instance_id: String,
}

impl LiveWorkflowStore {
    /// Create the in-memory store and apply its schema. A single
    /// connection keeps the whole database on one handle; SQLite's
    /// internal locking covers concurrent readers.
    pub async fn new_in_memory(instance_id: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(sqlx::Error::from)?
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        migrations::run_sqlite(&pool)
            .await
            .map_err(sqlx::Error::from)?;
        Ok(LiveWorkflowStore {
            pool,
            instance_id: instance_id.to_string(),
        })
    }

    /// Apply an add or update. A workflow already marked as archived is
    /// removed instead, leaving the archive as its single source.
    pub async fn upsert(&self, wf: &Workflow) -> Result<(), StoreError> {
        if wf.metadata.label(KEY_ARCHIVING_STATUS) == Some(ARCHIVING_STATUS_ARCHIVED) {
            debug!(name = %wf.metadata.name, "Workflow archived, dropping from live cache");
            return self.delete(&wf.metadata.uid).await;
        }
        let record = WorkflowRecord::from_workflow(wf, &self.instance_id)?;
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM live_workflows WHERE uid = ?")
            .bind(&record.uid)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO live_workflows \
             (uid, instance_id, namespace, name, phase, started_at, finished_at, workflow) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.uid)
        .bind(&record.instance_id)
        .bind(&record.namespace)
        .bind(&record.name)
        .bind(&record.phase)
        .bind(&record.started_at)
        .bind(&record.finished_at)
        .bind(&record.workflow)
        .execute(&mut *tx)
        .await?;
        for (key, value) in &wf.metadata.labels {
            sqlx::query("INSERT INTO live_workflows_labels (uid, key, value) VALUES (?, ?, ?)")
                .bind(&record.uid)
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn delete(&self, uid: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM live_workflows WHERE uid = ?")
            .bind(uid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Swap the entire cache contents, used after a watch re-list.
    pub async fn replace_all(&self, workflows: &[Workflow]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM live_workflows").execute(&mut *tx).await?;
        tx.commit().await?;
        for wf in workflows {
            self.upsert(wf).await?;
        }
        Ok(())
    }

    pub async fn list_workflows(&self, opts: &ListOptions) -> Result<Vec<Workflow>, StoreError> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT w.uid, w.instance_id, w.namespace, w.name, w.phase, w.started_at, \
             w.finished_at, w.workflow FROM live_workflows w",
        );
        push_where(&mut qb, &LIVE_TABLES, &self.instance_id, opts);
        push_order_and_page(&mut qb, opts, opts.fetch_limit());
        let records: Vec<WorkflowRecord> = qb.build_query_as().fetch_all(&self.pool).await?;
        records.iter().map(WorkflowRecord::to_workflow).collect()
    }

    pub async fn count_workflows(&self, opts: &ListOptions) -> Result<i64, StoreError> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM live_workflows w");
        push_where(&mut qb, &LIVE_TABLES, &self.instance_id, opts);
        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count)
    }
}
