// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cluster-scoped workflow template endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use serde::Deserialize;
use tracing::info;

use gantry_model::labels::apply_creator_labels;
use gantry_model::{ClusterWorkflowTemplate, ClusterWorkflowTemplateList};

use crate::auth::CallerContext;
use crate::auth::ops::Operation;
use crate::error::ApiError;
use crate::server::AppState;
use crate::workflow::ListParams;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRequest {
    pub template: ClusterWorkflowTemplate,
}

fn lint_template(template: &ClusterWorkflowTemplate) -> Result<(), ApiError> {
    if template.metadata.name.is_empty() {
        return Err(ApiError::InvalidArgument("template must have a name".into()));
    }
    if !template.metadata.namespace.is_empty() {
        return Err(ApiError::InvalidArgument(
            "cluster templates are not namespaced".into(),
        ));
    }
    Ok(())
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Json(mut req): Json<TemplateRequest>,
) -> Result<Json<ClusterWorkflowTemplate>, ApiError> {
    state
        .enforce_local(&caller, Operation::CreateClusterWorkflowTemplate, "", "")
        .await?;
    lint_template(&req.template)?;
    state.instance.stamp(&mut req.template.metadata);
    apply_creator_labels(&mut req.template.metadata, caller.claims.as_ref());
    let created = caller
        .client
        .create_cluster_workflow_template(&req.template)
        .await?;
    info!(template = %created.metadata.name, "Created cluster workflow template");
    Ok(Json(created))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path(name): Path<String>,
) -> Result<Json<ClusterWorkflowTemplate>, ApiError> {
    state
        .enforce_local(&caller, Operation::GetClusterWorkflowTemplate, "", &name)
        .await?;
    let template = caller.client.get_cluster_workflow_template(&name).await?;
    state.claim(&template.metadata, "cluster workflow template", &name)?;
    Ok(Json(template))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Query(params): Query<ListParams>,
) -> Result<Json<ClusterWorkflowTemplateList>, ApiError> {
    state
        .enforce_local(&caller, Operation::ListClusterWorkflowTemplates, "", "")
        .await?;
    Ok(Json(
        caller
            .client
            .list_cluster_workflow_templates(&params.label_selector)
            .await?,
    ))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path(name): Path<String>,
    Json(mut req): Json<TemplateRequest>,
) -> Result<Json<ClusterWorkflowTemplate>, ApiError> {
    state
        .enforce_local(&caller, Operation::UpdateClusterWorkflowTemplate, "", &name)
        .await?;
    lint_template(&req.template)?;
    req.template.metadata.name = name;
    Ok(Json(
        caller
            .client
            .update_cluster_workflow_template(&req.template)
            .await?,
    ))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .enforce_local(&caller, Operation::DeleteClusterWorkflowTemplate, "", &name)
        .await?;
    caller.client.delete_cluster_workflow_template(&name).await?;
    info!(template = %name, "Deleted cluster workflow template");
    Ok(Json(serde_json::json!({})))
}

pub async fn lint(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Json(req): Json<TemplateRequest>,
) -> Result<Json<ClusterWorkflowTemplate>, ApiError> {
    state
        .enforce_local(&caller, Operation::LintClusterWorkflowTemplate, "", "")
        .await?;
    lint_template(&req.template)?;
    Ok(Json(req.template))
}
