// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cron workflow endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use serde::Deserialize;
use tracing::info;

use gantry_model::labels::apply_creator_labels;
use gantry_model::{CronWorkflow, CronWorkflowList};

use crate::auth::CallerContext;
use crate::auth::ops::Operation;
use crate::error::ApiError;
use crate::server::AppState;
use crate::workflow::ListParams;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronRequest {
    pub cron_workflow: CronWorkflow,
}

/// A cron schedule is five whitespace-separated fields. The controller
/// interprets them; here we only reject obviously broken specs.
fn lint_cron(cron: &CronWorkflow) -> Result<(), ApiError> {
    if cron.metadata.name.is_empty() {
        return Err(ApiError::InvalidArgument(
            "cron workflow must have a name".into(),
        ));
    }
    let fields = cron.spec.schedule.split_whitespace().count();
    if fields != 5 {
        return Err(ApiError::InvalidArgument(format!(
            "schedule {:?} must have 5 fields",
            cron.spec.schedule
        )));
    }
    if let Some(policy) = cron.spec.concurrency_policy.as_deref()
        && !matches!(policy, "Allow" | "Forbid" | "Replace")
    {
        return Err(ApiError::InvalidArgument(format!(
            "unknown concurrency policy {policy:?}"
        )));
    }
    Ok(())
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path(namespace): Path<String>,
    Json(mut req): Json<CronRequest>,
) -> Result<Json<CronWorkflow>, ApiError> {
    state
        .enforce_local(&caller, Operation::CreateCronWorkflow, &namespace, "")
        .await?;
    lint_cron(&req.cron_workflow)?;
    req.cron_workflow.metadata.namespace = namespace.clone();
    state.instance.stamp(&mut req.cron_workflow.metadata);
    apply_creator_labels(&mut req.cron_workflow.metadata, caller.claims.as_ref());
    let created = caller
        .client
        .create_cron_workflow(&namespace, &req.cron_workflow)
        .await?;
    info!(namespace = %namespace, cron = %created.metadata.name, "Created cron workflow");
    Ok(Json(created))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<CronWorkflow>, ApiError> {
    state
        .enforce_local(&caller, Operation::GetCronWorkflow, &namespace, &name)
        .await?;
    let cron = caller.client.get_cron_workflow(&namespace, &name).await?;
    state.claim(&cron.metadata, "cron workflow", &name)?;
    Ok(Json(cron))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path(namespace): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<CronWorkflowList>, ApiError> {
    let namespace = state.effective_namespace(&namespace);
    state
        .enforce_local(&caller, Operation::ListCronWorkflows, &namespace, "")
        .await?;
    Ok(Json(
        caller
            .client
            .list_cron_workflows(&namespace, &params.label_selector)
            .await?,
    ))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path((namespace, name)): Path<(String, String)>,
    Json(mut req): Json<CronRequest>,
) -> Result<Json<CronWorkflow>, ApiError> {
    state
        .enforce_local(&caller, Operation::UpdateCronWorkflow, &namespace, &name)
        .await?;
    lint_cron(&req.cron_workflow)?;
    req.cron_workflow.metadata.name = name;
    req.cron_workflow.metadata.namespace = namespace.clone();
    Ok(Json(
        caller
            .client
            .update_cron_workflow(&namespace, &req.cron_workflow)
            .await?,
    ))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .enforce_local(&caller, Operation::DeleteCronWorkflow, &namespace, &name)
        .await?;
    caller.client.delete_cron_workflow(&namespace, &name).await?;
    info!(namespace = %namespace, cron = %name, "Deleted cron workflow");
    Ok(Json(serde_json::json!({})))
}

pub async fn suspend(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<CronWorkflow>, ApiError> {
    state
        .enforce_local(&caller, Operation::SuspendCronWorkflow, &namespace, &name)
        .await?;
    set_suspend(&state, &caller, &namespace, &name, true).await
}

pub async fn resume(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<CronWorkflow>, ApiError> {
    state
        .enforce_local(&caller, Operation::ResumeCronWorkflow, &namespace, &name)
        .await?;
    set_suspend(&state, &caller, &namespace, &name, false).await
}

async fn set_suspend(
    state: &AppState,
    caller: &CallerContext,
    namespace: &str,
    name: &str,
    suspend: bool,
) -> Result<Json<CronWorkflow>, ApiError> {
    let mut cron = caller.client.get_cron_workflow(namespace, name).await?;
    state.claim(&cron.metadata, "cron workflow", name)?;
    cron.spec.suspend = suspend;
    let updated = caller.client.update_cron_workflow(namespace, &cron).await?;
    info!(namespace = %namespace, cron = %name, suspend, "Toggled cron workflow");
    Ok(Json(updated))
}

pub async fn lint(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path(namespace): Path<String>,
    Json(mut req): Json<CronRequest>,
) -> Result<Json<CronWorkflow>, ApiError> {
    state
        .enforce_local(&caller, Operation::LintCronWorkflow, &namespace, "")
        .await?;
    lint_cron(&req.cron_workflow)?;
    req.cron_workflow.metadata.namespace = namespace;
    Ok(Json(req.cron_workflow))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cron(schedule: &str) -> CronWorkflow {
        serde_json::from_value(serde_json::json!({
            "metadata": {"name": "nightly"},
            "spec": {"schedule": schedule, "workflowSpec": {"entrypoint": "main"}}
        }))
        .unwrap()
    }

    #[test]
    fn lint_checks_the_schedule_shape() {
        assert!(lint_cron(&cron("0 2 * * *")).is_ok());
        assert!(lint_cron(&cron("not a schedule")).is_err());
        assert!(lint_cron(&cron("")).is_err());
    }

    #[test]
    fn lint_checks_the_concurrency_policy() {
        let mut c = cron("0 2 * * *");
        c.spec.concurrency_policy = Some("Replace".into());
        assert!(lint_cron(&c).is_ok());
        c.spec.concurrency_policy = Some("Sometimes".into());
        assert!(lint_cron(&c).is_err());
    }
}
