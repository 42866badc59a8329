// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQL backend for named counting semaphores.
//!
//! The server administers the `sync_limit` table; the execution controller
//! owns state, heartbeat, and lock rows. The read APIs here implement
//! queue fairness and controller liveness; the sweeper reclaims locks
//! held by controllers that stopped heartbeating.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tracing::{debug, info};

use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SemaphoreLimit {
    pub name: String,
    pub size_limit: i32,
}

/// One waiter in a semaphore queue.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Waiter {
    pub name: String,
    pub workflow_key: String,
    pub controller: String,
    pub priority: i32,
    pub time: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SemaphoreStore {
    pool: PgPool,
}

impl SemaphoreStore {
    pub fn new(pool: PgPool) -> Self {
        SemaphoreStore { pool }
    }

    /// Create a new limit. Duplicate names conflict.
    pub async fn create_limit(&self, name: &str, size: i32) -> Result<SemaphoreLimit, StoreError> {
        let result = sqlx::query("INSERT INTO sync_limit (name, size_limit) VALUES ($1, $2)")
            .bind(name)
            .bind(size)
            .execute(&self.pool)
            .await;
        match result {
            Ok(_) => Ok(SemaphoreLimit {
                name: name.to_string(),
                size_limit: size,
            }),
            Err(err) if StoreError::is_unique_violation(&err) => {
                Err(StoreError::already_exists("semaphore", name))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn get_limit(&self, name: &str) -> Result<SemaphoreLimit, StoreError> {
        let limit: Option<SemaphoreLimit> =
            sqlx::query_as("SELECT name, size_limit FROM sync_limit WHERE name = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        let limit = limit.ok_or_else(|| StoreError::not_found("semaphore", name))?;
        if limit.size_limit < 1 {
            return Err(StoreError::Corrupt {
                name: name.to_string(),
                reason: format!("size limit {} is not positive", limit.size_limit),
            });
        }
        Ok(limit)
    }

    /// Update an existing limit; never creates.
    pub async fn update_limit(&self, name: &str, size: i32) -> Result<SemaphoreLimit, StoreError> {
        let result = sqlx::query("UPDATE sync_limit SET size_limit = $2 WHERE name = $1")
            .bind(name)
            .bind(size)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("semaphore", name));
        }
        Ok(SemaphoreLimit {
            name: name.to_string(),
            size_limit: size,
        })
    }

    /// Idempotent: deleting an absent limit succeeds.
    pub async fn delete_limit(&self, name: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sync_limit WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Pending waiters for a semaphore, fairest first: highest priority,
    /// then earliest enqueue. Waiters whose controller missed its
    /// heartbeat window are excluded.
    pub async fn pending_waiters(
        &self,
        name: &str,
        inactivity_window: Duration,
    ) -> Result<Vec<Waiter>, StoreError> {
        let cutoff = Utc::now() - inactivity_window;
        let waiters = sqlx::query_as(
            "SELECT s.name, s.workflow_key, s.controller, s.priority, s.time \
             FROM sync_state s JOIN sync_controller c ON c.controller = s.controller \
             WHERE s.name = $1 AND s.held = FALSE AND c.time > $2 \
             ORDER BY s.priority DESC, s.time ASC",
        )
        .bind(name)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(waiters)
    }

    /// Current holders of a semaphore.
    pub async fn holders(&self, name: &str) -> Result<Vec<Waiter>, StoreError> {
        let holders = sqlx::query_as(
            "SELECT name, workflow_key, controller, priority, time \
             FROM sync_state WHERE name = $1 AND held = TRUE ORDER BY time ASC",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await?;
        Ok(holders)
    }

    pub async fn alive_controllers(
        &self,
        inactivity_window: Duration,
    ) -> Result<Vec<String>, StoreError> {
        let cutoff = Utc::now() - inactivity_window;
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT controller FROM sync_controller WHERE time > $1")
                .bind(cutoff)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(c,)| c).collect())
    }

    /// Drop advisory locks owned by controllers whose heartbeat is older
    /// than the window, so a crashed controller's holds can be reclaimed.
    pub async fn expire_stale_locks(
        &self,
        inactivity_window: Duration,
    ) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - inactivity_window;
        let result = sqlx::query(
            "DELETE FROM sync_lock WHERE controller IN \
             (SELECT controller FROM sync_controller WHERE time <= $1) \
             OR controller NOT IN (SELECT controller FROM sync_controller)",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        let swept = result.rows_affected();
        if swept > 0 {
            info!(swept, "Expired stale semaphore locks");
        } else {
            debug!("No stale semaphore locks");
        }
        Ok(swept)
    }
}
