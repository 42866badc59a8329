// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQL storage for the gantry API server.
//!
//! Three stores share this crate: the Postgres workflow archive, the
//! in-process SQLite live-workflow cache, and the SQL semaphore backend.
//! The archive and the cache answer the same [`ListOptions`] filter
//! language, translated by [`filter`].
//!
//! [`ListOptions`]: gantry_model::ListOptions

pub mod archive;
pub mod error;
pub mod filter;
pub mod live;
pub mod migrations;
pub mod record;
pub mod semaphore;

pub use archive::WorkflowArchive;
pub use error::StoreError;
pub use live::LiveWorkflowStore;
pub use semaphore::{SemaphoreLimit, SemaphoreStore, Waiter};
