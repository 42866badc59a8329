// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! REST client for the cluster control plane.
//!
//! Every request runs under a [`RestConfig`] derived from the caller's
//! credential, so cluster-side authorization always sees the real caller.
//! Streaming endpoints (watches, pod logs) surface as async streams.

pub mod client;
pub mod error;
pub mod rest;

pub use client::{
    ClusterClient, ConfigMap, EventStream, LineStream, ResourceRule, Secret, ServiceAccount,
    WatchEvent, WatchEventType,
};
pub use error::ClusterError;
pub use rest::RestConfig;
