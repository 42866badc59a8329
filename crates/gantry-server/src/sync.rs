// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Semaphore limit endpoints.
//!
//! Limits live either in a config object on the cluster or in the database
//! semaphore tables. The `type` field on each request picks the backend.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use serde::{Deserialize, Serialize};
use tracing::info;

use gantry_cluster::ConfigMap;
use gantry_store::SemaphoreStore;

use crate::auth::CallerContext;
use crate::auth::ops::Operation;
use crate::error::ApiError;
use crate::server::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncLimitType {
    #[default]
    #[serde(alias = "configMap")]
    Configmap,
    Database,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncLimitRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub size_limit: i32,
    #[serde(default, rename = "type")]
    pub limit_type: SyncLimitType,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncLimitParams {
    #[serde(default)]
    pub key: String,
    #[serde(default, rename = "type")]
    pub limit_type: SyncLimitType,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncLimitResponse {
    pub name: String,
    pub namespace: String,
    pub key: String,
    pub size_limit: i32,
}

fn require_positive(size: i32) -> Result<(), ApiError> {
    if size <= 0 {
        return Err(ApiError::InvalidArgument(
            "size limit must be greater than zero".into(),
        ));
    }
    Ok(())
}

fn semaphores_of(state: &AppState) -> Result<&SemaphoreStore, ApiError> {
    state.semaphores.as_ref().ok_or_else(|| {
        ApiError::InvalidArgument("database sync limits require a configured database".into())
    })
}

/// Database semaphores are keyed `namespace/key` to match how controllers
/// register their holders.
fn database_key(namespace: &str, key: &str) -> String {
    format!("{namespace}/{key}")
}

fn parse_size(key: &str, raw: &str) -> Result<i32, ApiError> {
    raw.trim().parse::<i32>().map_err(|_| {
        ApiError::InvalidArgument(format!("invalid size limit format for key {key:?}"))
    })
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path(namespace): Path<String>,
    Json(req): Json<SyncLimitRequest>,
) -> Result<Json<SyncLimitResponse>, ApiError> {
    state
        .policy
        .check(&caller, Operation::CreateSyncLimit, &namespace, "")
        .await?;
    require_positive(req.size_limit)?;
    match req.limit_type {
        SyncLimitType::Configmap => {
            match caller.client.get_config_map(&namespace, &req.name).await {
                Ok(mut cm) => {
                    if cm.data.contains_key(&req.key) {
                        return Err(ApiError::AlreadyExists(format!(
                            "sync limit key {:?} already exists",
                            req.key
                        )));
                    }
                    cm.data.insert(req.key.clone(), req.size_limit.to_string());
                    caller.client.update_config_map(&namespace, &cm).await?;
                }
                Err(err) if err.is_not_found() => {
                    let mut cm = ConfigMap::default();
                    cm.metadata.name = req.name.clone();
                    cm.metadata.namespace = namespace.clone();
                    cm.data.insert(req.key.clone(), req.size_limit.to_string());
                    caller.client.create_config_map(&namespace, &cm).await?;
                }
                Err(err) => return Err(err.into()),
            }
        }
        SyncLimitType::Database => {
            semaphores_of(&state)?
                .create_limit(&database_key(&namespace, &req.key), req.size_limit)
                .await?;
        }
    }
    info!(namespace = %namespace, key = %req.key, size = req.size_limit, "Created sync limit");
    Ok(Json(SyncLimitResponse {
        name: req.name,
        namespace,
        key: req.key,
        size_limit: req.size_limit,
    }))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path((namespace, name)): Path<(String, String)>,
    Query(params): Query<SyncLimitParams>,
) -> Result<Json<SyncLimitResponse>, ApiError> {
    state
        .policy
        .check(&caller, Operation::GetSyncLimit, &namespace, "")
        .await?;
    let size_limit = match params.limit_type {
        SyncLimitType::Configmap => {
            let cm = caller.client.get_config_map(&namespace, &name).await?;
            let raw = cm
                .data
                .get(&params.key)
                .ok_or_else(|| ApiError::NotFound(format!("key {:?} not found", params.key)))?;
            parse_size(&params.key, raw)?
        }
        SyncLimitType::Database => {
            semaphores_of(&state)?
                .get_limit(&database_key(&namespace, &params.key))
                .await?
                .size_limit
        }
    };
    Ok(Json(SyncLimitResponse {
        name,
        namespace,
        key: params.key,
        size_limit,
    }))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path((namespace, name)): Path<(String, String)>,
    Json(req): Json<SyncLimitRequest>,
) -> Result<Json<SyncLimitResponse>, ApiError> {
    state
        .policy
        .check(&caller, Operation::UpdateSyncLimit, &namespace, "")
        .await?;
    require_positive(req.size_limit)?;
    match req.limit_type {
        SyncLimitType::Configmap => {
            let mut cm = caller.client.get_config_map(&namespace, &name).await?;
            cm.data.insert(req.key.clone(), req.size_limit.to_string());
            caller.client.update_config_map(&namespace, &cm).await?;
        }
        SyncLimitType::Database => {
            semaphores_of(&state)?
                .update_limit(&database_key(&namespace, &req.key), req.size_limit)
                .await?;
        }
    }
    info!(namespace = %namespace, key = %req.key, size = req.size_limit, "Updated sync limit");
    Ok(Json(SyncLimitResponse {
        name,
        namespace,
        key: req.key,
        size_limit: req.size_limit,
    }))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path((namespace, name)): Path<(String, String)>,
    Query(params): Query<SyncLimitParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .policy
        .check(&caller, Operation::DeleteSyncLimit, &namespace, "")
        .await?;
    match params.limit_type {
        SyncLimitType::Configmap => {
            let mut cm = caller.client.get_config_map(&namespace, &name).await?;
            // a key that is already gone is not an error
            if cm.data.remove(&params.key).is_some() {
                caller.client.update_config_map(&namespace, &cm).await?;
            }
        }
        SyncLimitType::Database => {
            semaphores_of(&state)?
                .delete_limit(&database_key(&namespace, &params.key))
                .await?;
        }
    }
    info!(namespace = %namespace, key = %params.key, "Deleted sync limit");
    Ok(Json(serde_json::json!({})))
}
