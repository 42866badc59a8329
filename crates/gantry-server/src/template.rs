// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workflow template endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use serde::Deserialize;
use tracing::info;

use gantry_model::labels::apply_creator_labels;
use gantry_model::{WorkflowTemplate, WorkflowTemplateList};

use crate::auth::CallerContext;
use crate::auth::ops::Operation;
use crate::error::ApiError;
use crate::server::AppState;
use crate::workflow::ListParams;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRequest {
    pub template: WorkflowTemplate,
}

/// Templates are resolved by the controller; lint only checks structure.
fn lint_template(template: &WorkflowTemplate) -> Result<(), ApiError> {
    if template.metadata.name.is_empty() {
        return Err(ApiError::InvalidArgument("template must have a name".into()));
    }
    let mut seen = std::collections::HashSet::new();
    for t in &template.spec.templates {
        if t.name.is_empty() {
            return Err(ApiError::InvalidArgument("template has no name".into()));
        }
        if !seen.insert(t.name.as_str()) {
            return Err(ApiError::InvalidArgument(format!(
                "duplicate template name {:?}",
                t.name
            )));
        }
    }
    Ok(())
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path(namespace): Path<String>,
    Json(mut req): Json<TemplateRequest>,
) -> Result<Json<WorkflowTemplate>, ApiError> {
    state
        .enforce_local(&caller, Operation::CreateWorkflowTemplate, &namespace, "")
        .await?;
    lint_template(&req.template)?;
    req.template.metadata.namespace = namespace.clone();
    state.instance.stamp(&mut req.template.metadata);
    apply_creator_labels(&mut req.template.metadata, caller.claims.as_ref());
    let created = caller
        .client
        .create_workflow_template(&namespace, &req.template)
        .await?;
    info!(namespace = %namespace, template = %created.metadata.name, "Created workflow template");
    Ok(Json(created))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<WorkflowTemplate>, ApiError> {
    state
        .enforce_local(&caller, Operation::GetWorkflowTemplate, &namespace, &name)
        .await?;
    let template = caller.client.get_workflow_template(&namespace, &name).await?;
    state.claim(&template.metadata, "workflow template", &name)?;
    Ok(Json(template))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path(namespace): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<WorkflowTemplateList>, ApiError> {
    let namespace = state.effective_namespace(&namespace);
    state
        .enforce_local(&caller, Operation::ListWorkflowTemplates, &namespace, "")
        .await?;
    Ok(Json(
        caller
            .client
            .list_workflow_templates(&namespace, &params.label_selector)
            .await?,
    ))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path((namespace, name)): Path<(String, String)>,
    Json(mut req): Json<TemplateRequest>,
) -> Result<Json<WorkflowTemplate>, ApiError> {
    state
        .enforce_local(&caller, Operation::UpdateWorkflowTemplate, &namespace, &name)
        .await?;
    lint_template(&req.template)?;
    req.template.metadata.name = name.clone();
    req.template.metadata.namespace = namespace.clone();
    Ok(Json(
        caller
            .client
            .update_workflow_template(&namespace, &req.template)
            .await?,
    ))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .enforce_local(&caller, Operation::DeleteWorkflowTemplate, &namespace, &name)
        .await?;
    caller.client.delete_workflow_template(&namespace, &name).await?;
    info!(namespace = %namespace, template = %name, "Deleted workflow template");
    Ok(Json(serde_json::json!({})))
}

pub async fn lint(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path(namespace): Path<String>,
    Json(mut req): Json<TemplateRequest>,
) -> Result<Json<WorkflowTemplate>, ApiError> {
    state
        .enforce_local(&caller, Operation::LintWorkflowTemplate, &namespace, "")
        .await?;
    lint_template(&req.template)?;
    req.template.metadata.namespace = namespace;
    Ok(Json(req.template))
}
