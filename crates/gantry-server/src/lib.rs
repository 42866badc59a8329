// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Gantry API server.
//!
//! The HTTP front door for workflow orchestration: resource CRUD proxied to
//! the control plane under the caller's credential, the workflow archive,
//! inbound events, semaphore limits, and artifact downloads.

pub mod archive;
pub mod artifacts;
pub mod auth;
pub mod cluster_template;
pub mod config;
pub mod cron;
pub mod error;
pub mod event;
pub mod info;
pub mod routes;
pub mod server;
pub mod sse;
pub mod sync;
pub mod template;
pub mod workflow;

pub use config::Config;
pub use error::ApiError;
pub use server::{AppState, Server};
