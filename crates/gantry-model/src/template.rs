// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Template-shaped resources: workflow templates, cron workflows, and
//! event bindings, plus the submit path from a template to a workflow.

use serde::{Deserialize, Serialize};

use crate::meta::{ListMeta, ObjectMeta};
use crate::workflow::{Arguments, Workflow, WorkflowSpec};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTemplate {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: WorkflowSpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTemplateList {
    #[serde(default)]
    pub metadata: ListMeta,
    #[serde(default)]
    pub items: Vec<WorkflowTemplate>,
}

/// Same shape as a workflow template, scoped to the whole cluster.
pub type ClusterWorkflowTemplate = WorkflowTemplate;
pub type ClusterWorkflowTemplateList = WorkflowTemplateList;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronWorkflow {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: CronWorkflowSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<CronWorkflowStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronWorkflowSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schedule: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub suspend: bool,
    #[serde(default)]
    pub workflow_spec: WorkflowSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency_policy: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronWorkflowStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scheduled_time: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub active: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronWorkflowList {
    #[serde(default)]
    pub metadata: ListMeta,
    #[serde(default)]
    pub items: Vec<CronWorkflow>,
}

/// Binds inbound events to a workflow submission. The selector decides
/// whether an event matches; the submit section says what to run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBinding {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: EventBindingSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBindingSpec {
    #[serde(default)]
    pub event: EventSelector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submit: Option<Submit>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSelector {
    #[serde(default)]
    pub selector: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submit {
    pub workflow_template_ref: crate::workflow::TemplateRef,
    #[serde(default, skip_serializing_if = "Arguments::is_empty")]
    pub arguments: Arguments,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_meta: Option<ObjectMeta>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBindingList {
    #[serde(default)]
    pub metadata: ListMeta,
    #[serde(default)]
    pub items: Vec<EventBinding>,
}

/// Start a workflow from a template reference. The workflow carries only
/// the reference plus caller-supplied arguments; the controller resolves
/// the template body.
pub fn workflow_from_template(
    template_name: &str,
    cluster_scope: bool,
    namespace: &str,
) -> Workflow {
    let mut wf = Workflow::default();
    wf.metadata.generate_name = format!("{template_name}-");
    wf.metadata.namespace = namespace.to_string();
    wf.spec.workflow_template_ref = Some(crate::workflow::TemplateRef {
        name: template_name.to_string(),
        cluster_scope,
    });
    wf
}

/// Start a workflow from a cron workflow's embedded spec.
pub fn workflow_from_cron(cron: &CronWorkflow) -> Workflow {
    let mut wf = Workflow::default();
    wf.metadata.generate_name = format!("{}-", cron.metadata.name);
    wf.metadata.namespace = cron.metadata.namespace.clone();
    wf.spec = cron.spec.workflow_spec.clone();
    wf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_from_template_carries_reference() {
        let wf = workflow_from_template("hello", false, "argo");
        assert_eq!(wf.metadata.generate_name, "hello-");
        assert_eq!(wf.metadata.namespace, "argo");
        let template_ref = wf.spec.workflow_template_ref.unwrap();
        assert_eq!(template_ref.name, "hello");
        assert!(!template_ref.cluster_scope);
    }

    #[test]
    fn workflow_from_cron_copies_spec() {
        let mut cron = CronWorkflow::default();
        cron.metadata.name = "nightly".into();
        cron.metadata.namespace = "argo".into();
        cron.spec.workflow_spec.entrypoint = "main".into();
        let wf = workflow_from_cron(&cron);
        assert_eq!(wf.metadata.generate_name, "nightly-");
        assert_eq!(wf.spec.entrypoint, "main");
    }

    #[test]
    fn event_binding_wire_shape() {
        let binding: EventBinding = serde_json::from_value(serde_json::json!({
            "metadata": {"name": "on-order", "namespace": "argo"},
            "spec": {
                "event": {"selector": "payload.type == \"order\""},
                "submit": {"workflowTemplateRef": {"name": "order-flow"}}
            }
        }))
        .unwrap();
        assert_eq!(binding.spec.event.selector, "payload.type == \"order\"");
        assert_eq!(binding.spec.submit.unwrap().workflow_template_ref.name, "order-flow");
    }
}
