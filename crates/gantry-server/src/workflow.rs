// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workflow endpoints.
//!
//! Reads merge the live cache with the archive so completed workflows stay
//! visible after the control plane garbage-collects them. Mutations always
//! go straight to the control plane under the caller's own credential.

use std::collections::HashSet;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::response::Response;
use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, info};

use gantry_model::labels::apply_creator_labels;
use gantry_model::workflow::{
    NodePhase, NodeSelector, Parameter, ShutdownStrategy, SubmitOpts, WorkflowPhase,
    apply_submit_opts, formulate_resubmit, formulate_retry,
};
use gantry_model::{
    ListMeta, ListOptions, Workflow, WorkflowList, workflow_from_cron, workflow_from_template,
};

use crate::auth::CallerContext;
use crate::auth::ops::Operation;
use crate::error::ApiError;
use crate::server::AppState;
use crate::sse;

/// Alias resolving to the most recently started workflow in the namespace.
pub const LATEST_ALIAS: &str = "@latest";

/// Wire list options, flattened the way clients send them.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(rename = "listOptions.labelSelector", default)]
    pub label_selector: String,
    #[serde(rename = "listOptions.fieldSelector", default)]
    pub field_selector: String,
    #[serde(rename = "listOptions.limit", default)]
    pub limit: Option<i64>,
    #[serde(rename = "listOptions.continue", default)]
    pub continue_token: String,
    #[serde(rename = "listOptions.ascending", default)]
    pub ascending: Option<bool>,
    #[serde(rename = "namePrefix", default)]
    pub name_prefix: String,
    #[serde(rename = "nameFilter", default)]
    pub name_filter: String,
}

impl ListParams {
    pub fn to_options(&self, namespace: &str) -> Result<ListOptions, ApiError> {
        let mut opts = ListOptions::from_parts(
            namespace,
            &self.label_selector,
            &self.field_selector,
            &self.name_prefix,
            &self.name_filter,
            self.limit,
            &self.continue_token,
        )?;
        if let Some(ascending) = self.ascending {
            opts.ascending = ascending;
        }
        Ok(opts)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    pub workflow: Workflow,
    #[serde(default)]
    pub server_dry_run: bool,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path(namespace): Path<String>,
    Json(mut req): Json<CreateRequest>,
) -> Result<Json<Workflow>, ApiError> {
    state
        .enforce_local(&caller, Operation::CreateWorkflow, &namespace, "")
        .await?;
    req.workflow.metadata.namespace = namespace.clone();
    lint_workflow(&req.workflow)?;
    state.instance.stamp(&mut req.workflow.metadata);
    apply_creator_labels(&mut req.workflow.metadata, caller.claims.as_ref());
    if req.server_dry_run {
        return Ok(Json(req.workflow));
    }
    let created = caller.client.create_workflow(&namespace, &req.workflow).await?;
    info!(namespace = %namespace, workflow = %created.metadata.name, "Created workflow");
    Ok(Json(created))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<Workflow>, ApiError> {
    state
        .enforce_local(&caller, Operation::GetWorkflow, &namespace, &name)
        .await?;
    if name == LATEST_ALIAS {
        return Ok(Json(latest_workflow(&state, &caller, &namespace).await?));
    }
    match caller.client.get_workflow(&namespace, &name).await {
        Ok(wf) => {
            state.claim(&wf.metadata, "workflow", &name)?;
            Ok(Json(wf))
        }
        // completed workflows may only exist in the archive by now
        Err(err) if err.is_not_found() => {
            let Some(archive) = &state.archive else {
                return Err(err.into());
            };
            debug!(namespace = %namespace, workflow = %name, "Falling back to the archive");
            let wf = archive
                .get_workflow_by_name(&namespace, &name)
                .await?
                .ok_or_else(|| ApiError::NotFound(format!("workflow {name:?} not found")))?;
            state.claim(&wf.metadata, "workflow", &name)?;
            Ok(Json(wf))
        }
        Err(err) => Err(err.into()),
    }
}

async fn latest_workflow(
    state: &AppState,
    caller: &CallerContext,
    namespace: &str,
) -> Result<Workflow, ApiError> {
    let selector = state.instance.selector();
    let list = caller.client.list_workflows(namespace, &selector).await?;
    list.items
        .into_iter()
        .max_by_key(|wf| wf.status.started_at)
        .ok_or_else(|| ApiError::NotFound("no workflows in namespace".into()))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path(namespace): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<WorkflowList>, ApiError> {
    let namespace = state.effective_namespace(&namespace);
    state
        .enforce_local(&caller, Operation::ListWorkflows, &namespace, "")
        .await?;
    let opts = params.to_options(&namespace)?;
    let page = fused_page(&state, &opts).await?;
    Ok(Json(page))
}

/// One page over the live cache followed by the archive. Rows present in
/// both (a workflow mid-archiving) are deduplicated by uid.
async fn fused_page(state: &AppState, opts: &ListOptions) -> Result<WorkflowList, ApiError> {
    let live_total = state.live.count_workflows(opts).await?;
    let fetch = opts.fetch_limit();
    let mut items = state
        .live
        .list_workflows(&opts.clone().with_limit(fetch))
        .await?;

    let mut archive_total = 0;
    if let Some(archive) = &state.archive {
        archive_total = archive.count_workflows(opts).await?;
        let short = fetch == 0 || (items.len() as i64) < fetch;
        if short {
            let archive_offset = (opts.offset - live_total).max(0);
            let archive_fetch = if fetch == 0 { 0 } else { fetch - items.len() as i64 };
            let archived = archive
                .list_workflows(
                    &opts
                        .clone()
                        .with_limit(archive_fetch)
                        .with_offset(archive_offset),
                )
                .await?;
            let live_uids: HashSet<String> =
                items.iter().map(|w| w.metadata.uid.clone()).collect();
            items.extend(
                archived
                    .into_iter()
                    .filter(|w| !live_uids.contains(&w.metadata.uid)),
            );
        }
    }

    let mut metadata = ListMeta::for_page(opts.offset, opts.limit, items.len());
    if opts.limit > 0 {
        items.truncate(opts.limit as usize);
    }
    if opts.show_remaining_item_count && opts.limit > 0 {
        let total = live_total + archive_total;
        metadata.remaining_item_count =
            Some((total - opts.offset - items.len() as i64).max(0));
    }
    Ok(WorkflowList {
        metadata,
        items,
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteParams {
    #[serde(default)]
    pub force: bool,
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path((namespace, name)): Path<(String, String)>,
    Query(params): Query<DeleteParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .enforce_local(&caller, Operation::DeleteWorkflow, &namespace, &name)
        .await?;
    let wf = caller.client.get_workflow(&namespace, &name).await?;
    state.claim(&wf.metadata, "workflow", &name)?;
    if params.force {
        // a stuck finalizer would otherwise leave the delete hanging forever
        caller
            .client
            .clear_workflow_finalizers(&namespace, &name)
            .await?;
    }
    caller.client.delete_workflow(&namespace, &name).await?;
    info!(namespace = %namespace, workflow = %name, force = params.force, "Deleted workflow");
    Ok(Json(serde_json::json!({})))
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
    Path((namespace, name)): Path<(String, String)>,
    Json(req): Json<RetryRequest>,
) -> Result<Json<Workflow>, ApiError> {
    state
        .enforce_local(&caller, Operation::RetryWorkflow, &namespace, &name)
        .await?;
    let wf = caller.client.get_workflow(&namespace, &name).await?;
    state.claim(&wf.metadata, "workflow", &name)?;
    let (retried, pods) = formulate_retry(
        &wf,
        req.restart_successful,
        &req.node_field_selector,
        &req.parameters,
    )?;
    for pod in &pods {
        match caller.client.delete_pod(&namespace, pod).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err.into()),
        }
    }
    let updated = caller.client.update_workflow(&namespace, &retried).await?;
    info!(namespace = %namespace, workflow = %name, pods = pods.len(), "Retrying workflow");
    Ok(Json(updated))
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
    Path((namespace, name)): Path<(String, String)>,
    Json(req): Json<ResubmitRequest>,
) -> Result<Json<Workflow>, ApiError> {
    state
        .enforce_local(&caller, Operation::ResubmitWorkflow, &namespace, &name)
        .await?;
    let wf = caller.client.get_workflow(&namespace, &name).await?;
    state.claim(&wf.metadata, "workflow", &name)?;
    let mut resubmitted = formulate_resubmit(&wf, req.memoized, &req.parameters)?;
    state.instance.stamp(&mut resubmitted.metadata);
    apply_creator_labels(&mut resubmitted.metadata, caller.claims.as_ref());
    let created = caller.client.create_workflow(&namespace, &resubmitted).await?;
    info!(namespace = %namespace, from = %name, workflow = %created.metadata.name, "Resubmitted workflow");
    Ok(Json(created))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeRequest {
    #[serde(default)]
    pub node_field_selector: String,
}

pub async fn resume(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path((namespace, name)): Path<(String, String)>,
    Json(req): Json<ResumeRequest>,
) -> Result<Json<Workflow>, ApiError> {
    state
        .enforce_local(&caller, Operation::ResumeWorkflow, &namespace, &name)
        .await?;
    let mut wf = caller.client.get_workflow(&namespace, &name).await?;
    state.claim(&wf.metadata, "workflow", &name)?;
    let selector = if req.node_field_selector.is_empty() {
        None
    } else {
        Some(NodeSelector::parse(&req.node_field_selector)?)
    };
    wf.spec.suspend = None;
    for node in wf.status.nodes.values_mut() {
        let is_waiting = node.phase == NodePhase::Running
            && node.node_type == gantry_model::NodeType::Suspend;
        if !is_waiting {
            continue;
        }
        if let Some(selector) = &selector
            && !selector.matches(node)
        {
            continue;
        }
        node.phase = NodePhase::Succeeded;
        node.message = "resumed".to_string();
        node.finished_at = Some(chrono::Utc::now());
    }
    let updated = caller.client.update_workflow(&namespace, &wf).await?;
    Ok(Json(updated))
}

pub async fn suspend(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<Workflow>, ApiError> {
    state
        .enforce_local(&caller, Operation::SuspendWorkflow, &namespace, &name)
        .await?;
    let mut wf = caller.client.get_workflow(&namespace, &name).await?;
    state.claim(&wf.metadata, "workflow", &name)?;
    if wf.status.phase.completed() {
        return Err(ApiError::InvalidArgument(
            "cannot suspend a completed workflow".into(),
        ));
    }
    wf.spec.suspend = Some(true);
    let updated = caller.client.update_workflow(&namespace, &wf).await?;
    Ok(Json(updated))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopRequest {
    #[serde(default)]
    pub message: String,
}

pub async fn terminate(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<Workflow>, ApiError> {
    state
        .enforce_local(&caller, Operation::TerminateWorkflow, &namespace, &name)
        .await?;
    shutdown_workflow(&state, &caller, &namespace, &name, ShutdownStrategy::Terminate, "").await
}

pub async fn stop(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path((namespace, name)): Path<(String, String)>,
    Json(req): Json<StopRequest>,
) -> Result<Json<Workflow>, ApiError> {
    state
        .enforce_local(&caller, Operation::StopWorkflow, &namespace, &name)
        .await?;
    shutdown_workflow(&state, &caller, &namespace, &name, ShutdownStrategy::Stop, &req.message)
        .await
}

async fn shutdown_workflow(
    state: &AppState,
    caller: &CallerContext,
    namespace: &str,
    name: &str,
    strategy: ShutdownStrategy,
    message: &str,
) -> Result<Json<Workflow>, ApiError> {
    let mut wf = caller.client.get_workflow(namespace, name).await?;
    state.claim(&wf.metadata, "workflow", name)?;
    if wf.status.phase.completed() {
        return Err(ApiError::InvalidArgument(format!(
            "cannot shut down a workflow in phase {}",
            wf.status.phase
        )));
    }
    wf.spec.shutdown = Some(strategy);
    if !message.is_empty() {
        wf.status.message = message.to_string();
    }
    let updated = caller.client.update_workflow(namespace, &wf).await?;
    info!(namespace = %namespace, workflow = %name, strategy = %strategy, "Shutting down workflow");
    Ok(Json(updated))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetRequest {
    pub node_field_selector: String,
    #[serde(default)]
    pub phase: String,
    #[serde(default)]
    pub message: String,
    /// JSON object mapping output parameter names to values.
    #[serde(default)]
    pub output_parameters: String,
}

pub async fn set(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path((namespace, name)): Path<(String, String)>,
    Json(req): Json<SetRequest>,
) -> Result<Json<Workflow>, ApiError> {
    state
        .enforce_local(&caller, Operation::SetWorkflow, &namespace, &name)
        .await?;
    if req.node_field_selector.is_empty() {
        return Err(ApiError::InvalidArgument(
            "nodeFieldSelector is required".into(),
        ));
    }
    let selector = NodeSelector::parse(&req.node_field_selector)?;
    let phase = if req.phase.is_empty() {
        None
    } else {
        Some(
            req.phase
                .parse::<WorkflowPhase>()
                .map_err(|_| ApiError::InvalidArgument(format!("unknown phase {:?}", req.phase)))?,
        )
    };
    let outputs: Vec<(String, String)> = if req.output_parameters.is_empty() {
        Vec::new()
    } else {
        let map: std::collections::BTreeMap<String, String> =
            serde_json::from_str(&req.output_parameters).map_err(|_| {
                ApiError::InvalidArgument("outputParameters must be a JSON object of strings".into())
            })?;
        map.into_iter().collect()
    };

    let mut wf = caller.client.get_workflow(&namespace, &name).await?;
    state.claim(&wf.metadata, "workflow", &name)?;
    let mut matched = false;
    for node in wf.status.nodes.values_mut() {
        if !selector.matches(node) {
            continue;
        }
        matched = true;
        if let Some(phase) = phase {
            node.phase = match phase {
                WorkflowPhase::Succeeded => NodePhase::Succeeded,
                WorkflowPhase::Failed => NodePhase::Failed,
                WorkflowPhase::Error => NodePhase::Error,
                _ => {
                    return Err(ApiError::InvalidArgument(format!(
                        "cannot set a node to phase {phase}"
                    )));
                }
            };
        }
        if !req.message.is_empty() {
            node.message = req.message.clone();
        }
        if !outputs.is_empty() {
            let node_outputs = node.outputs.get_or_insert_with(Default::default);
            for (param_name, value) in &outputs {
                match node_outputs
                    .parameters
                    .iter_mut()
                    .find(|p| p.name == *param_name)
                {
                    Some(p) => p.value = Some(value.clone()),
                    None => node_outputs.parameters.push(Parameter {
                        name: param_name.clone(),
                        value: Some(value.clone()),
                        value_from: None,
                    }),
                }
            }
        }
    }
    if !matched {
        return Err(ApiError::NotFound("no node matches the selector".into()));
    }
    let updated = caller.client.update_workflow(&namespace, &wf).await?;
    Ok(Json(updated))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LintRequest {
    pub workflow: Workflow,
}

pub async fn lint(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path(namespace): Path<String>,
    Json(mut req): Json<LintRequest>,
) -> Result<Json<Workflow>, ApiError> {
    state
        .enforce_local(&caller, Operation::LintWorkflow, &namespace, "")
        .await?;
    req.workflow.metadata.namespace = namespace;
    lint_workflow(&req.workflow)?;
    Ok(Json(req.workflow))
}

/// Structural validation shared by create and lint.
pub fn lint_workflow(wf: &Workflow) -> Result<(), ApiError> {
    if wf.metadata.name.is_empty() && wf.metadata.generate_name.is_empty() {
        return Err(ApiError::InvalidArgument(
            "workflow must have a name or a generateName".into(),
        ));
    }
    let has_ref = wf.spec.workflow_template_ref.is_some();
    if wf.spec.entrypoint.is_empty() && !has_ref {
        return Err(ApiError::InvalidArgument(
            "workflow must have an entrypoint or a workflowTemplateRef".into(),
        ));
    }
    let mut seen = HashSet::new();
    for template in &wf.spec.templates {
        if template.name.is_empty() {
            return Err(ApiError::InvalidArgument("template has no name".into()));
        }
        if !seen.insert(template.name.as_str()) {
            return Err(ApiError::InvalidArgument(format!(
                "duplicate template name {:?}",
                template.name
            )));
        }
    }
    if !wf.spec.entrypoint.is_empty()
        && !wf.spec.templates.is_empty()
        && wf.template_by_name(&wf.spec.entrypoint).is_none()
    {
        return Err(ApiError::InvalidArgument(format!(
            "entrypoint template {:?} not found",
            wf.spec.entrypoint
        )));
    }
    Ok(())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub resource_kind: String,
    pub resource_name: String,
    #[serde(default)]
    pub submit_options: SubmitOpts,
}

/// Start a workflow from an existing template, cluster template or cron
/// workflow.
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path(namespace): Path<String>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<Workflow>, ApiError> {
    state
        .enforce_local(&caller, Operation::SubmitWorkflow, &namespace, "")
        .await?;
    let mut wf = match req.resource_kind.to_lowercase().as_str() {
        "workflowtemplate" => {
            let tmpl = caller
                .client
                .get_workflow_template(&namespace, &req.resource_name)
                .await?;
            let mut wf = workflow_from_template(&tmpl.metadata.name, false, &namespace);
            for (k, v) in &tmpl.metadata.labels {
                wf.metadata.set_label(k, v);
            }
            wf
        }
        "clusterworkflowtemplate" => {
            let tmpl = caller
                .client
                .get_cluster_workflow_template(&req.resource_name)
                .await?;
            let mut wf = workflow_from_template(&tmpl.metadata.name, true, &namespace);
            for (k, v) in &tmpl.metadata.labels {
                wf.metadata.set_label(k, v);
            }
            wf
        }
        "cronworkflow" => {
            let cron = caller
                .client
                .get_cron_workflow(&namespace, &req.resource_name)
                .await?;
            workflow_from_cron(&cron)
        }
        other => {
            return Err(ApiError::InvalidArgument(format!(
                "unsupported resource kind {other:?}"
            )));
        }
    };
    apply_submit_opts(&mut wf, &req.submit_options)?;
    state.instance.stamp(&mut wf.metadata);
    apply_creator_labels(&mut wf.metadata, caller.claims.as_ref());
    let created = caller.client.create_workflow(&namespace, &wf).await?;
    info!(
        namespace = %namespace,
        kind = %req.resource_kind,
        from = %req.resource_name,
        workflow = %created.metadata.name,
        "Submitted workflow"
    );
    Ok(Json(created))
}

pub async fn watch(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path(namespace): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Response, ApiError> {
    let namespace = state.effective_namespace(&namespace);
    state
        .enforce_local(&caller, Operation::WatchWorkflows, &namespace, "")
        .await?;
    let events = caller
        .client
        .watch_workflows(&namespace, &params.label_selector)
        .map(|item| {
            item.map_err(ApiError::from)
                .and_then(|event| serde_json::to_value(&event).map_err(|e| ApiError::Internal(e.to_string())))
        });
    Ok(sse::response(events, state.config.sse_keepalive))
}

#[derive(Debug, Default, Deserialize)]
pub struct LogParams {
    #[serde(rename = "logOptions.container", default)]
    pub container: String,
    #[serde(rename = "logOptions.follow", default)]
    pub follow: bool,
}

pub async fn pod_logs(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path((namespace, name, pod)): Path<(String, String, String)>,
    Query(params): Query<LogParams>,
) -> Result<Response, ApiError> {
    state
        .enforce_local(&caller, Operation::PodLogs, &namespace, &name)
        .await?;
    // confirm the pod belongs to the named workflow before streaming
    let wf = caller.client.get_workflow(&namespace, &name).await?;
    state.claim(&wf.metadata, "workflow", &name)?;
    let container = if params.container.is_empty() {
        "main".to_string()
    } else {
        params.container
    };
    let pod_name = pod.clone();
    let lines = caller
        .client
        .pod_logs(&namespace, &pod, &container, params.follow)
        .map(move |line| {
            line.map(|content| serde_json::json!({"content": content, "podName": pod_name}))
                .map_err(ApiError::from)
        });
    Ok(sse::response(lines, state.config.sse_keepalive))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_workflow() -> Workflow {
        serde_json::from_value(serde_json::json!({
            "metadata": {"name": "wf"},
            "spec": {"entrypoint": "main", "templates": [{"name": "main"}]}
        }))
        .unwrap()
    }

    #[test]
    fn lint_accepts_a_minimal_workflow() {
        assert!(lint_workflow(&minimal_workflow()).is_ok());
    }

    #[test]
    fn lint_rejects_structural_problems() {
        let mut wf = minimal_workflow();
        wf.metadata.name = String::new();
        assert!(lint_workflow(&wf).is_err());

        let mut wf = minimal_workflow();
        wf.spec.entrypoint = "missing".to_string();
        let err = lint_workflow(&wf).unwrap_err();
        assert!(err.to_string().contains("entrypoint"));

        let mut wf = minimal_workflow();
        wf.spec.templates.push(wf.spec.templates[0].clone());
        let err = lint_workflow(&wf).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn lint_allows_template_refs_without_entrypoint() {
        let wf: Workflow = serde_json::from_value(serde_json::json!({
            "metadata": {"generateName": "from-template-"},
            "spec": {"workflowTemplateRef": {"name": "tpl"}}
        }))
        .unwrap();
        assert!(lint_workflow(&wf).is_ok());
    }

    #[test]
    fn list_params_parse_into_options() {
        let params = ListParams {
            label_selector: "app=demo".into(),
            field_selector: "ext.showRemainingItemCount=true".into(),
            limit: Some(20),
            continue_token: "40".into(),
            ascending: Some(true),
            ..Default::default()
        };
        let opts = params.to_options("dev").unwrap();
        assert_eq!(opts.limit, 20);
        assert_eq!(opts.offset, 40);
        assert!(opts.ascending);
        assert!(opts.show_remaining_item_count);
        assert_eq!(opts.label_requirements.len(), 1);
    }

    #[test]
    fn name_prefix_narrows_the_listing() {
        let params = ListParams {
            name_prefix: "build-".into(),
            ..Default::default()
        };
        let opts = params.to_options("dev").unwrap();
        assert_eq!(opts.name, "build-");
        assert_eq!(opts.name_filter, gantry_model::list_options::NameFilter::Prefix);
    }

    #[test]
    fn bad_continue_token_is_invalid_argument() {
        let params = ListParams {
            continue_token: "not-a-number".into(),
            ..Default::default()
        };
        let err = params.to_options("dev").unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT");
    }
}
