// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workflow resource: spec, status, node state, and the formulation
//! helpers behind resubmit, retry, and submit options.
//!
//! Structs keep unknown wire fields through a flattened `extra` map so the
//! server can round-trip documents it does not interpret.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::labels::{
    KEY_ARCHIVING_STATUS, KEY_COMPLETED, KEY_CREATOR, KEY_CREATOR_EMAIL,
    KEY_CREATOR_PREFERRED_USERNAME,
};
use crate::meta::{ListMeta, ObjectMeta};

/// Name of the label linking a resubmitted workflow to its origin.
pub const KEY_PREVIOUS_WORKFLOW_NAME: &str = "workflows.gantry.io/previous-workflow-name";

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("expected parameter of the form NAME=VALUE, got {0:?}")]
    MalformedParameter(String),
    #[error("workflow must be Failed or Error to resubmit in memoized mode")]
    MemoizedResubmitPhase,
    #[error("cannot retry a workflow in phase {0}")]
    RetryPhase(WorkflowPhase),
    #[error("to retry a succeeded workflow, set restartSuccessful and a node field selector")]
    RetrySucceededNeedsSelector,
    #[error("invalid node field selector: {0:?}")]
    BadNodeSelector(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    #[serde(default = "Workflow::default_api_version")]
    pub api_version: String,
    #[serde(default = "Workflow::default_kind")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: WorkflowSpec,
    #[serde(default)]
    pub status: WorkflowStatus,
}

impl Default for Workflow {
    fn default() -> Self {
        Workflow {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata: ObjectMeta::default(),
            spec: WorkflowSpec::default(),
            status: WorkflowStatus::default(),
        }
    }
}

impl Workflow {
    fn default_api_version() -> String {
        "gantry.io/v1".to_string()
    }

    fn default_kind() -> String {
        "Workflow".to_string()
    }

    pub fn template_by_name(&self, name: &str) -> Option<&Template> {
        self.spec.templates.iter().find(|t| t.name == name)
    }

    /// Deterministic node id, `<workflow>-<fnv hash of node name>` except
    /// for the root node which reuses the workflow name.
    pub fn node_id(&self, node_name: &str) -> String {
        if node_name == self.metadata.name {
            return node_name.to_string();
        }
        const FNV_OFFSET: u64 = 14695981039346656037;
        const FNV_PRIME: u64 = 1099511628211;
        let mut hash = FNV_OFFSET;
        for b in node_name.bytes() {
            hash ^= b as u64;
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        format!("{}-{}", self.metadata.name, hash)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub entrypoint: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub templates: Vec<Template>,
    #[serde(default, skip_serializing_if = "Arguments::is_empty")]
    pub arguments: Arguments,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspend: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shutdown: Option<ShutdownStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_template_ref: Option<TemplateRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_deadline_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cluster_scope: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspend: Option<SuspendConfig>,
    #[serde(default, skip_serializing_if = "Outputs::is_empty")]
    pub outputs: Outputs,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Suspend step configuration. `event` names the expression that resumes
/// the node when an inbound event matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuspendConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<EventSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSource {
    pub expression: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Arguments {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
}

impl Arguments {
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_from: Option<ValueFrom>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueFrom {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub expression: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outputs {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl Outputs {
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty() && self.artifacts.is_empty() && self.result.is_none()
    }
}

/// A produced artifact and where its bytes live. Exactly one location is
/// expected to be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_store: Option<ObjectStoreArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<RawArtifact>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectStoreArtifact {
    pub endpoint: String,
    pub bucket: String,
    pub key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileArtifact {
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawArtifact {
    pub data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inputs {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutdownStrategy {
    Stop,
    Terminate,
}

impl ShutdownStrategy {
    /// Stop still runs exit handlers; Terminate kills everything.
    pub fn should_execute(&self, node_name: &str, workflow_name: &str) -> bool {
        match self {
            ShutdownStrategy::Stop => node_name.starts_with(&format!("{workflow_name}.onExit")),
            ShutdownStrategy::Terminate => false,
        }
    }
}

impl std::fmt::Display for ShutdownStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownStrategy::Stop => write!(f, "Stop"),
            ShutdownStrategy::Terminate => write!(f, "Terminate"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WorkflowPhase {
    #[default]
    #[serde(rename = "")]
    Unknown,
    Pending,
    Running,
    Succeeded,
    Failed,
    Error,
}

impl WorkflowPhase {
    pub fn completed(&self) -> bool {
        matches!(
            self,
            WorkflowPhase::Succeeded | WorkflowPhase::Failed | WorkflowPhase::Error
        )
    }
}

impl std::fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkflowPhase::Unknown => "",
            WorkflowPhase::Pending => "Pending",
            WorkflowPhase::Running => "Running",
            WorkflowPhase::Succeeded => "Succeeded",
            WorkflowPhase::Failed => "Failed",
            WorkflowPhase::Error => "Error",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for WorkflowPhase {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Ok(WorkflowPhase::Unknown),
            "Pending" => Ok(WorkflowPhase::Pending),
            "Running" => Ok(WorkflowPhase::Running),
            "Succeeded" => Ok(WorkflowPhase::Succeeded),
            "Failed" => Ok(WorkflowPhase::Failed),
            "Error" => Ok(WorkflowPhase::Error),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NodePhase {
    #[default]
    Pending,
    Running,
    Succeeded,
    Skipped,
    Failed,
    Error,
    Omitted,
}

impl NodePhase {
    pub fn fulfilled(&self) -> bool {
        matches!(
            self,
            NodePhase::Succeeded
                | NodePhase::Skipped
                | NodePhase::Failed
                | NodePhase::Error
                | NodePhase::Omitted
        )
    }

    pub fn failed_or_error(&self) -> bool {
        matches!(self, NodePhase::Failed | NodePhase::Error)
    }
}

impl std::fmt::Display for NodePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodePhase::Pending => "Pending",
            NodePhase::Running => "Running",
            NodePhase::Succeeded => "Succeeded",
            NodePhase::Skipped => "Skipped",
            NodePhase::Failed => "Failed",
            NodePhase::Error => "Error",
            NodePhase::Omitted => "Omitted",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NodeType {
    #[default]
    Pod,
    Container,
    Steps,
    StepGroup,
    #[serde(rename = "DAG")]
    Dag,
    TaskGroup,
    Retry,
    Skipped,
    Suspend,
    #[serde(rename = "HTTP")]
    Http,
    Plugin,
}

impl NodeType {
    pub fn is_group(&self) -> bool {
        matches!(
            self,
            NodeType::Steps | NodeType::StepGroup | NodeType::Dag | NodeType::TaskGroup
        )
    }

    pub fn is_execution(&self) -> bool {
        matches!(
            self,
            NodeType::Pod | NodeType::Container | NodeType::Http | NodeType::Plugin
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    #[serde(rename = "type", default)]
    pub node_type: NodeType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub template_name: String,
    #[serde(default)]
    pub phase: NodePhase,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub boundary_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Inputs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Outputs>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

pub const CONDITION_EVENT_EXPRESSION_ERROR: &str = "EventExpressionError";
pub const CONDITION_COMPLETED: &str = "Completed";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatus {
    #[serde(default, skip_serializing_if = "is_unknown")]
    pub phase: WorkflowPhase,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub nodes: BTreeMap<String, NodeStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Outputs>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn is_unknown(phase: &WorkflowPhase) -> bool {
    *phase == WorkflowPhase::Unknown
}

impl WorkflowStatus {
    /// Insert the condition, replacing an existing one of the same type.
    pub fn upsert_condition(&mut self, condition: Condition) {
        match self
            .conditions
            .iter_mut()
            .find(|c| c.condition_type == condition.condition_type)
        {
            Some(existing) => *existing = condition,
            None => self.conditions.push(condition),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowList {
    #[serde(default)]
    pub metadata: ListMeta,
    #[serde(default)]
    pub items: Vec<Workflow>,
}

/// Options accepted on submit. Parameters are `NAME=VALUE` strings; labels
/// a label-selector-style `k=v,...` list merged into the metadata.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOpts {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub generate_name: String,
    #[serde(default)]
    pub entry_point: String,
    #[serde(default)]
    pub parameters: Vec<String>,
    #[serde(default)]
    pub labels: String,
    #[serde(default)]
    pub annotations: String,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub priority: Option<i32>,
}

/// Set `NAME=VALUE` parameter overrides on the workflow arguments,
/// replacing existing entries and appending new ones.
pub fn override_parameters(wf: &mut Workflow, parameters: &[String]) -> Result<(), ModelError> {
    for param in parameters {
        let (name, value) = param
            .split_once('=')
            .ok_or_else(|| ModelError::MalformedParameter(param.clone()))?;
        match wf
            .spec
            .arguments
            .parameters
            .iter_mut()
            .find(|p| p.name == name)
        {
            Some(existing) => {
                existing.value = Some(value.to_string());
                existing.value_from = None;
            }
            None => wf.spec.arguments.parameters.push(Parameter {
                name: name.to_string(),
                value: Some(value.to_string()),
                value_from: None,
            }),
        }
    }
    Ok(())
}

pub fn apply_submit_opts(wf: &mut Workflow, opts: &SubmitOpts) -> Result<(), ModelError> {
    if !opts.entry_point.is_empty() {
        wf.spec.entrypoint = opts.entry_point.clone();
    }
    if !opts.name.is_empty() {
        wf.metadata.name = opts.name.clone();
        wf.metadata.generate_name = String::new();
    } else if !opts.generate_name.is_empty() {
        wf.metadata.generate_name = opts.generate_name.clone();
    }
    if opts.priority.is_some() {
        wf.spec.priority = opts.priority;
    }
    override_parameters(wf, &opts.parameters)?;
    for pair in opts.labels.split(',').filter(|s| !s.is_empty()) {
        let (k, v) = pair
            .split_once('=')
            .ok_or_else(|| ModelError::MalformedParameter(pair.to_string()))?;
        wf.metadata.set_label(k.trim(), v.trim());
    }
    for pair in opts.annotations.split(',').filter(|s| !s.is_empty()) {
        let (k, v) = pair
            .split_once('=')
            .ok_or_else(|| ModelError::MalformedParameter(pair.to_string()))?;
        wf.metadata
            .annotations
            .insert(k.trim().to_string(), v.trim().to_string());
    }
    Ok(())
}

const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Random 5-character suffix for generated resource names.
pub fn rand_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..5)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect()
}

/// Build a fresh workflow from a finished one. With `memoized`, previously
/// succeeded pod nodes are carried over as skipped so the controller does
/// not re-run them; the new name must then be fixed up front.
pub fn formulate_resubmit(
    wf: &Workflow,
    memoized: bool,
    parameters: &[String],
) -> Result<Workflow, ModelError> {
    let mut new_wf = Workflow::default();
    new_wf.metadata.namespace = wf.metadata.namespace.clone();
    new_wf.metadata.generate_name = if wf.metadata.generate_name.is_empty() {
        format!("{}-", wf.metadata.name)
    } else {
        wf.metadata.generate_name.clone()
    };
    if memoized {
        if !wf.status.phase.failed_or_error_phase() {
            return Err(ModelError::MemoizedResubmitPhase);
        }
        new_wf.metadata.name = format!("{}{}", new_wf.metadata.generate_name, rand_suffix());
    }

    new_wf.spec = wf.spec.clone();
    if new_wf.spec.active_deadline_seconds == Some(0) {
        // a terminated workflow would otherwise be stillborn
        new_wf.spec.active_deadline_seconds = None;
    }
    new_wf.spec.shutdown = None;

    for (key, value) in &wf.metadata.labels {
        match key.as_str() {
            KEY_CREATOR | KEY_CREATOR_EMAIL | KEY_CREATOR_PREFERRED_USERNAME | KEY_COMPLETED
            | KEY_ARCHIVING_STATUS => {}
            _ => new_wf.metadata.set_label(key, value),
        }
    }
    new_wf
        .metadata
        .set_label(KEY_PREVIOUS_WORKFLOW_NAME, &wf.metadata.name);
    new_wf.metadata.annotations = wf.metadata.annotations.clone();

    override_parameters(&mut new_wf, parameters)?;

    if !memoized {
        return Ok(new_wf);
    }

    let now = Utc::now();
    for node in wf.status.nodes.values() {
        if node.name.starts_with(&format!("{}.onExit", wf.metadata.name)) {
            continue;
        }
        let mut new_node = node.clone();
        let original_id = node.id.clone();
        new_node.name = replace_prefix(&node.name, &wf.metadata.name, &new_wf.metadata.name);
        new_node.id = new_wf.node_id(&new_node.name);
        if !new_node.boundary_id.is_empty() {
            new_node.boundary_id = convert_node_id(&new_wf, wf, &node.boundary_id);
        }
        new_node.children = node
            .children
            .iter()
            .map(|c| convert_node_id(&new_wf, wf, c))
            .collect();
        if new_node.phase.failed_or_error() && new_node.node_type == NodeType::Pod {
            new_node.started_at = None;
            new_node.finished_at = None;
        } else {
            new_node.started_at = Some(now);
            new_node.finished_at = Some(now);
        }
        if !new_node.phase.failed_or_error() && new_node.node_type == NodeType::Pod {
            new_node.phase = NodePhase::Skipped;
            new_node.node_type = NodeType::Skipped;
            new_node.message = format!("original pod: {original_id}");
        } else {
            new_node.phase = NodePhase::Pending;
            new_node.message = String::new();
        }
        new_wf.status.nodes.insert(new_node.id.clone(), new_node);
    }
    new_wf.status.conditions = vec![Condition {
        condition_type: CONDITION_COMPLETED.to_string(),
        status: "False".to_string(),
        message: String::new(),
    }];
    new_wf.status.phase = WorkflowPhase::Unknown;
    Ok(new_wf)
}

fn replace_prefix(name: &str, old: &str, new: &str) -> String {
    match name.strip_prefix(old) {
        Some(rest) => format!("{new}{rest}"),
        None => name.to_string(),
    }
}

fn convert_node_id(new_wf: &Workflow, old_wf: &Workflow, old_id: &str) -> String {
    let name = old_wf
        .status
        .nodes
        .get(old_id)
        .map(|n| replace_prefix(&n.name, &old_wf.metadata.name, &new_wf.metadata.name))
        .unwrap_or_else(|| old_id.to_string());
    new_wf.node_id(&name)
}

impl WorkflowPhase {
    pub fn failed_or_error_phase(&self) -> bool {
        matches!(self, WorkflowPhase::Failed | WorkflowPhase::Error)
    }
}

/// A parsed node field selector: conjunction of `key=value` / `key!=value`
/// terms over node identity fields.
#[derive(Debug, Clone, Default)]
pub struct NodeSelector {
    terms: Vec<(NodeField, bool, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum NodeField {
    Id,
    Name,
    DisplayName,
    TemplateName,
    Phase,
}

impl NodeSelector {
    pub fn parse(selector: &str) -> Result<Self, ModelError> {
        let mut terms = Vec::new();
        for part in selector.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (raw_key, negated, value) = if let Some((k, v)) = part.split_once("!=") {
                (k, true, v)
            } else if let Some((k, v)) = part.split_once('=') {
                (k, false, v)
            } else {
                return Err(ModelError::BadNodeSelector(part.to_string()));
            };
            let field = match raw_key.trim() {
                "id" => NodeField::Id,
                "name" => NodeField::Name,
                "displayName" => NodeField::DisplayName,
                "templateName" => NodeField::TemplateName,
                "phase" => NodeField::Phase,
                other => return Err(ModelError::BadNodeSelector(other.to_string())),
            };
            terms.push((field, negated, value.trim().to_string()));
        }
        Ok(NodeSelector { terms })
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn matches(&self, node: &NodeStatus) -> bool {
        self.terms.iter().all(|(field, negated, value)| {
            let actual = match field {
                NodeField::Id => node.id.as_str(),
                NodeField::Name => node.name.as_str(),
                NodeField::DisplayName => node.display_name.as_str(),
                NodeField::TemplateName => node.template_name.as_str(),
                NodeField::Phase => return (node.phase.to_string() == *value) != *negated,
            };
            (actual == value) != *negated
        })
    }
}

/// Reset a finished workflow for another run. Failed and error execution
/// nodes are dropped (their pods returned for deletion), succeeded nodes
/// are kept unless `restart_successful` and the selector matches, and
/// group nodes above any dropped node go back to Running.
pub fn formulate_retry(
    wf: &Workflow,
    restart_successful: bool,
    node_field_selector: &str,
    parameters: &[String],
) -> Result<(Workflow, Vec<String>), ModelError> {
    match wf.status.phase {
        WorkflowPhase::Failed | WorkflowPhase::Error => {}
        WorkflowPhase::Succeeded => {
            if !restart_successful || node_field_selector.is_empty() {
                return Err(ModelError::RetrySucceededNeedsSelector);
            }
        }
        phase => return Err(ModelError::RetryPhase(phase)),
    }
    let selector = NodeSelector::parse(node_field_selector)?;

    let mut new_wf = wf.clone();
    override_parameters(&mut new_wf, parameters)?;
    new_wf.status.phase = WorkflowPhase::Running;
    new_wf.status.message = String::new();
    new_wf.status.finished_at = None;
    new_wf.spec.shutdown = None;
    new_wf.metadata.labels.remove(KEY_COMPLETED);
    new_wf.status.conditions = vec![Condition {
        condition_type: CONDITION_COMPLETED.to_string(),
        status: "False".to_string(),
        message: String::new(),
    }];

    let mut to_delete: Vec<String> = Vec::new();
    let mut deleted_ids: Vec<String> = Vec::new();
    for (id, node) in &wf.status.nodes {
        let forced = restart_successful && !selector.is_empty() && selector.matches(node);
        if node.node_type.is_execution() && (node.phase.failed_or_error() || forced) {
            deleted_ids.push(id.clone());
            if node.node_type == NodeType::Pod {
                to_delete.push(node.id.clone());
            }
        }
    }
    for id in &deleted_ids {
        new_wf.status.nodes.remove(id);
    }

    // Group nodes that lost a descendant resume as Running.
    let lost: Vec<String> = new_wf
        .status
        .nodes
        .iter()
        .filter(|(_, node)| {
            node.node_type.is_group()
                && node
                    .children
                    .iter()
                    .any(|c| deleted_ids.contains(c) || !new_wf.status.nodes.contains_key(c))
        })
        .map(|(id, _)| id.clone())
        .collect();
    for id in lost {
        if let Some(node) = new_wf.status.nodes.get_mut(&id) {
            node.phase = NodePhase::Running;
            node.message = String::new();
            node.finished_at = None;
        }
    }
    // Retry wrappers above deleted children restart too.
    let retry_ids: Vec<String> = new_wf
        .status
        .nodes
        .iter()
        .filter(|(_, node)| {
            node.node_type == NodeType::Retry
                && node.children.iter().any(|c| deleted_ids.contains(c))
        })
        .map(|(id, _)| id.clone())
        .collect();
    for id in retry_ids {
        if let Some(node) = new_wf.status.nodes.get_mut(&id) {
            node.phase = NodePhase::Running;
            node.message = String::new();
            node.finished_at = None;
        }
    }

    Ok((new_wf, to_delete))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, node_type: NodeType, phase: NodePhase) -> NodeStatus {
        NodeStatus {
            id: id.to_string(),
            name: id.to_string(),
            node_type,
            phase,
            ..Default::default()
        }
    }

    fn failed_workflow() -> Workflow {
        let mut wf = Workflow::default();
        wf.metadata.name = "wf".to_string();
        wf.metadata.namespace = "argo".to_string();
        wf.status.phase = WorkflowPhase::Failed;
        wf.status
            .nodes
            .insert("wf".into(), node("wf", NodeType::Steps, NodePhase::Failed));
        wf.status
            .nodes
            .insert("wf-1".into(), node("wf-1", NodeType::Pod, NodePhase::Succeeded));
        wf.status
            .nodes
            .insert("wf-2".into(), node("wf-2", NodeType::Pod, NodePhase::Failed));
        wf
    }

    #[test]
    fn retry_drops_failed_pods_and_keeps_succeeded() {
        let wf = failed_workflow();
        let (new_wf, pods) = formulate_retry(&wf, false, "", &[]).unwrap();
        assert_eq!(new_wf.status.phase, WorkflowPhase::Running);
        assert!(new_wf.status.nodes.contains_key("wf-1"));
        assert!(!new_wf.status.nodes.contains_key("wf-2"));
        assert_eq!(pods, vec!["wf-2"]);
    }

    #[test]
    fn retry_succeeded_requires_selector() {
        let mut wf = failed_workflow();
        wf.status.phase = WorkflowPhase::Succeeded;
        for node in wf.status.nodes.values_mut() {
            node.phase = NodePhase::Succeeded;
        }
        assert_eq!(
            formulate_retry(&wf, false, "", &[]).unwrap_err(),
            ModelError::RetrySucceededNeedsSelector
        );
        let (_, pods) = formulate_retry(&wf, true, "id=wf-1", &[]).unwrap();
        assert_eq!(pods, vec!["wf-1"]);
    }

    #[test]
    fn retry_rejects_running_workflow() {
        let mut wf = failed_workflow();
        wf.status.phase = WorkflowPhase::Running;
        assert!(matches!(
            formulate_retry(&wf, false, "", &[]).unwrap_err(),
            ModelError::RetryPhase(WorkflowPhase::Running)
        ));
    }

    #[test]
    fn resubmit_carries_spec_and_links_origin() {
        let mut wf = failed_workflow();
        wf.spec.shutdown = Some(ShutdownStrategy::Terminate);
        wf.metadata.set_label(KEY_CREATOR, "old-user");
        wf.metadata.set_label("team", "core");
        let new_wf = formulate_resubmit(&wf, false, &[]).unwrap();
        assert_eq!(new_wf.metadata.generate_name, "wf-");
        assert!(new_wf.metadata.name.is_empty());
        assert_eq!(new_wf.spec.shutdown, None);
        assert_eq!(new_wf.metadata.label("team"), Some("core"));
        assert_eq!(new_wf.metadata.label(KEY_CREATOR), None);
        assert_eq!(new_wf.metadata.label(KEY_PREVIOUS_WORKFLOW_NAME), Some("wf"));
        assert!(new_wf.status.nodes.is_empty());
    }

    #[test]
    fn memoized_resubmit_skips_succeeded_pods() {
        let wf = failed_workflow();
        let new_wf = formulate_resubmit(&wf, true, &[]).unwrap();
        assert!(!new_wf.metadata.name.is_empty());
        let skipped: Vec<_> = new_wf
            .status
            .nodes
            .values()
            .filter(|n| n.node_type == NodeType::Skipped)
            .collect();
        assert_eq!(skipped.len(), 1);
        assert!(skipped[0].message.starts_with("original pod: "));
    }

    #[test]
    fn memoized_resubmit_requires_terminal_failure() {
        let mut wf = failed_workflow();
        wf.status.phase = WorkflowPhase::Succeeded;
        assert_eq!(
            formulate_resubmit(&wf, true, &[]).unwrap_err(),
            ModelError::MemoizedResubmitPhase
        );
    }

    #[test]
    fn parameter_overrides_replace_and_append() {
        let mut wf = Workflow::default();
        wf.spec.arguments.parameters.push(Parameter {
            name: "region".into(),
            value: Some("us".into()),
            value_from: None,
        });
        override_parameters(&mut wf, &["region=eu".into(), "tier=gold".into()]).unwrap();
        assert_eq!(wf.spec.arguments.parameters[0].value.as_deref(), Some("eu"));
        assert_eq!(wf.spec.arguments.parameters[1].name, "tier");
        assert!(override_parameters(&mut wf, &["oops".into()]).is_err());
    }

    #[test]
    fn node_selector_matching() {
        let selector = NodeSelector::parse("phase=Failed,templateName!=main").unwrap();
        let mut n = node("a", NodeType::Pod, NodePhase::Failed);
        assert!(selector.matches(&n));
        n.template_name = "main".to_string();
        assert!(!selector.matches(&n));
        assert!(NodeSelector::parse("bogus>1").is_err());
    }

    #[test]
    fn unknown_spec_fields_round_trip() {
        let doc = serde_json::json!({
            "metadata": {"name": "wf", "namespace": "argo"},
            "spec": {"entrypoint": "main", "podGC": {"strategy": "OnPodSuccess"}}
        });
        let wf: Workflow = serde_json::from_value(doc).unwrap();
        let back = serde_json::to_value(&wf).unwrap();
        assert_eq!(back["spec"]["podGC"]["strategy"], "OnPodSuccess");
    }
}
