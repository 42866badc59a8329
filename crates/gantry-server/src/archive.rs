// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Archived workflow endpoints.
//!
//! The archive is queried directly, so unlike the live endpoints the control
//! plane never sees these reads and authorization has to happen here, item
//! by item. Pages are refilled after filtering so a caller who cannot see
//! some rows still gets full pages.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use serde::Deserialize;
use tracing::info;

use gantry_model::labels::apply_creator_labels;
use gantry_model::workflow::{formulate_resubmit, formulate_retry};
use gantry_model::{LabelOperator, ListMeta, ListOptions, Workflow, WorkflowList};
use gantry_store::WorkflowArchive;

use crate::auth::CallerContext;
use crate::auth::ops::Operation;
use crate::error::ApiError;
use crate::server::AppState;
use crate::workflow::ListParams;

/// Rows fetched per refill round when the page is unlimited.
const UNLIMITED_BATCH: i64 = 200;

fn archive_of(state: &AppState) -> Result<&WorkflowArchive, ApiError> {
    state
        .archive
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("workflow archive is not configured".into()))
}

#[derive(Debug, Default, Deserialize)]
pub struct ArchiveListParams {
    #[serde(rename = "listOptions.labelSelector", default)]
    pub label_selector: String,
    #[serde(rename = "listOptions.fieldSelector", default)]
    pub field_selector: String,
    #[serde(rename = "listOptions.limit", default)]
    pub limit: Option<i64>,
    #[serde(rename = "listOptions.continue", default)]
    pub continue_token: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(rename = "namePrefix", default)]
    pub name_prefix: String,
    #[serde(rename = "nameFilter", default)]
    pub name_filter: String,
}

impl ArchiveListParams {
    fn to_list_params(&self) -> ListParams {
        ListParams {
            label_selector: self.label_selector.clone(),
            field_selector: self.field_selector.clone(),
            limit: self.limit,
            continue_token: self.continue_token.clone(),
            ascending: None,
            name_prefix: self.name_prefix.clone(),
            name_filter: self.name_filter.clone(),
        }
    }
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Query(params): Query<ArchiveListParams>,
) -> Result<Json<WorkflowList>, ApiError> {
    let archive = archive_of(&state)?;
    let namespace = state.effective_namespace(&params.namespace);
    let opts = params.to_list_params().to_options(&namespace)?;

    let mut gate = state.policy.list_gate(&caller, Operation::ListArchivedWorkflows);
    let limit = opts.limit;
    let mut cursor = opts.offset;
    let mut items: Vec<Workflow> = Vec::new();
    let mut next_offset = None;

    // fetch, filter, and refill until the page is full or the store is done
    'outer: loop {
        let batch_size = if limit > 0 { limit + 1 } else { UNLIMITED_BATCH };
        let batch = archive
            .list_workflows(&opts.clone().with_offset(cursor).with_limit(batch_size))
            .await?;
        if batch.is_empty() {
            break;
        }
        let fetched = batch.len() as i64;
        for (i, wf) in batch.into_iter().enumerate() {
            if limit > 0 && items.len() as i64 == limit {
                next_offset = Some(cursor + i as i64);
                break 'outer;
            }
            if gate
                .allows(&wf.metadata.namespace, &wf.metadata.name)
                .await?
            {
                items.push(wf);
            }
        }
        cursor += fetched;
        if fetched < batch_size {
            break;
        }
    }

    let mut metadata = ListMeta::default();
    if let Some(offset) = next_offset {
        metadata.continue_token = offset.to_string();
    }
    if opts.show_remaining_item_count && limit > 0 {
        let total = archive.count_workflows(&opts).await?;
        metadata.remaining_item_count = Some((total - cursor).max(0));
    }
    Ok(Json(WorkflowList { metadata, items }))
}

/// Load an archived workflow and check the operation against its actual
/// namespace and name.
async fn load_checked(
    state: &AppState,
    caller: &CallerContext,
    uid: &str,
    op: Operation,
) -> Result<Workflow, ApiError> {
    let archive = archive_of(state)?;
    let wf = archive
        .get_workflow(uid)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("archived workflow {uid:?} not found")))?;
    state
        .policy
        .check(caller, op, &wf.metadata.namespace, &wf.metadata.name)
        .await?;
    Ok(wf)
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path(uid): Path<String>,
) -> Result<Json<Workflow>, ApiError> {
    let wf = load_checked(&state, &caller, &uid, Operation::GetArchivedWorkflow).await?;
    Ok(Json(wf))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path(uid): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let wf = load_checked(&state, &caller, &uid, Operation::DeleteArchivedWorkflow).await?;
    archive_of(&state)?.delete_workflow(&uid).await?;
    info!(uid = %uid, workflow = %wf.metadata.name, "Deleted archived workflow");
    Ok(Json(serde_json::json!({})))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResubmitRequest {
    #[serde(default)]
    pub memoized: bool,
    #[serde(default)]
    pub parameters: Vec<String>,
}

pub async fn resubmit(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path(uid): Path<String>,
    Json(req): Json<ResubmitRequest>,
) -> Result<Json<Workflow>, ApiError> {
    let wf = load_checked(&state, &caller, &uid, Operation::ResubmitArchivedWorkflow).await?;
    reject_if_live(&caller, &wf).await?;
    let mut resubmitted = formulate_resubmit(&wf, req.memoized, &req.parameters)?;
    state.instance.stamp(&mut resubmitted.metadata);
    apply_creator_labels(&mut resubmitted.metadata, caller.claims.as_ref());
    let created = caller
        .client
        .create_workflow(&wf.metadata.namespace, &resubmitted)
        .await?;
    info!(uid = %uid, workflow = %created.metadata.name, "Resubmitted archived workflow");
    Ok(Json(created))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryRequest {
    #[serde(default)]
    pub restart_successful: bool,
    #[serde(default)]
    pub node_field_selector: String,
    #[serde(default)]
    pub parameters: Vec<String>,
}

pub async fn retry(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path(uid): Path<String>,
    Json(req): Json<RetryRequest>,
) -> Result<Json<Workflow>, ApiError> {
    let wf = load_checked(&state, &caller, &uid, Operation::RetryArchivedWorkflow).await?;
    reject_if_live(&caller, &wf).await?;
    // the original pods are long gone, so only the manifest is retried
    let (mut retried, _pods) = formulate_retry(
        &wf,
        req.restart_successful,
        &req.node_field_selector,
        &req.parameters,
    )?;
    state.instance.stamp(&mut retried.metadata);
    let created = caller
        .client
        .create_workflow(&wf.metadata.namespace, &retried)
        .await?;
    info!(uid = %uid, workflow = %created.metadata.name, "Retried archived workflow");
    Ok(Json(created))
}

/// Archived mutations must not race a live workflow of the same name.
async fn reject_if_live(caller: &CallerContext, wf: &Workflow) -> Result<(), ApiError> {
    match caller
        .client
        .get_workflow(&wf.metadata.namespace, &wf.metadata.name)
        .await
    {
        Ok(_) => Err(ApiError::AlreadyExists(format!(
            "workflow {:?} already exists",
            wf.metadata.name
        ))),
        Err(err) if err.is_not_found() => Ok(()),
        Err(err) => Err(err.into()),
    }
}

pub async fn label_keys(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .policy
        .check(&caller, Operation::ListArchivedWorkflowLabelKeys, "", "")
        .await?;
    let keys = archive_of(&state)?.list_label_keys().await?;
    Ok(Json(serde_json::json!({"items": keys})))
}

pub async fn label_values(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .policy
        .check(&caller, Operation::ListArchivedWorkflowLabelValues, "", "")
        .await?;
    let opts = ListOptions::from_parts("", &params.label_selector, "", "", "", None, "")?;
    let key = match opts.label_requirements.as_slice() {
        [req] if req.operator == LabelOperator::Exists => req.key.clone(),
        _ => {
            return Err(ApiError::InvalidArgument(
                "listOptions.labelSelector must be a single exists requirement".into(),
            ));
        }
    };
    let values = archive_of(&state)?.list_label_values(&key).await?;
    Ok(Json(serde_json::json!({"items": values})))
}
