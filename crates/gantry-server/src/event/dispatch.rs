// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Turns one inbound event into workflow submissions and resumptions.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use gantry_cluster::ClusterError;
use gantry_model::labels::{self, InstanceTag};
use gantry_model::workflow::{
    CONDITION_EVENT_EXPRESSION_ERROR, Condition, NodePhase, NodeStatus, NodeType, Outputs,
    Parameter, SubmitOpts, Workflow, apply_submit_opts, rand_suffix,
};
use gantry_model::{EventBinding, workflow_from_template};

use crate::event::{EventEnvelope, expr};

const RETRY_ATTEMPTS: u32 = 5;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

pub struct DispatchOperation {
    envelope: EventEnvelope,
    instance: InstanceTag,
    env: BTreeMap<String, Value>,
}

impl DispatchOperation {
    pub fn new(envelope: EventEnvelope, instance: InstanceTag) -> Self {
        let mut env = BTreeMap::new();
        env.insert("namespace".to_string(), Value::from(envelope.namespace.clone()));
        env.insert(
            "discriminator".to_string(),
            Value::from(envelope.discriminator.clone()),
        );
        env.insert("payload".to_string(), envelope.payload.clone());
        env.insert(
            "metadata".to_string(),
            serde_json::to_value(&envelope.metadata).unwrap_or_default(),
        );
        DispatchOperation {
            envelope,
            instance,
            env,
        }
    }

    /// Match the event against every binding, then against every suspended
    /// workflow. Failures are logged per item; one bad binding must not stop
    /// the rest.
    pub async fn execute(&self) -> Result<(), ClusterError> {
        let bindings = self
            .envelope
            .client
            .list_event_bindings(&self.envelope.namespace, "")
            .await?;
        for binding in &bindings.items {
            let name = binding.metadata.name.clone();
            let result = with_retry(|| self.submit_from_binding(binding)).await;
            if let Err(err) = result {
                warn!(binding = %name, error = %err, "Failed to submit workflow from event binding");
            }
        }

        let workflows = self
            .envelope
            .client
            .list_workflows(
                &self.envelope.namespace,
                &self.instance.selector(),
            )
            .await?;
        for wf in &workflows.items {
            if !has_waiting_suspend_node(wf) {
                continue;
            }
            let name = wf.metadata.name.clone();
            let namespace = wf.metadata.namespace.clone();
            let result = with_retry(|| async {
                // refetch so the update is against the current version
                let wf = self.envelope.client.get_workflow(&namespace, &name).await?;
                self.resume_workflow(wf).await
            })
            .await;
            if let Err(err) = result {
                warn!(workflow = %name, error = %err, "Failed to resume workflow from event");
            }
        }
        Ok(())
    }

    async fn submit_from_binding(&self, binding: &EventBinding) -> Result<(), ClusterError> {
        let selector = &binding.spec.event.selector;
        let matched = expr::eval_bool(selector, &self.env)
            .map_err(|e| ClusterError::Decode(format!("event selector: {e}")))?;
        if !matched {
            return Ok(());
        }
        let Some(submit) = &binding.spec.submit else {
            return Ok(());
        };

        let mut parameters = Vec::new();
        for p in &submit.arguments.parameters {
            let source = p.value_from.as_ref().ok_or_else(|| {
                ClusterError::Decode(format!("parameter {:?} has no valueFrom", p.name))
            })?;
            let value = expr::eval_string(&source.expression, &self.env)
                .map_err(|e| ClusterError::Decode(format!("parameter {:?}: {e}", p.name)))?;
            parameters.push(format!("{}={}", p.name, value));
        }

        let mut wf = workflow_from_template(
            &submit.workflow_template_ref.name,
            submit.workflow_template_ref.cluster_scope,
            &self.envelope.namespace,
        );
        if let Some(meta) = &submit.object_meta {
            populate_metadata(&mut wf, meta, &self.env)?;
        }
        if wf.metadata.name.is_empty() && !wf.metadata.generate_name.is_empty() {
            // a collision comes back as a 409, which with_retry re-runs
            // with a fresh suffix
            wf.metadata.name = format!("{}{}", wf.metadata.generate_name, rand_suffix());
        }
        apply_submit_opts(
            &mut wf,
            &SubmitOpts {
                parameters,
                ..Default::default()
            },
        )
        .map_err(|e| ClusterError::Decode(e.to_string()))?;
        wf.metadata
            .set_label(labels::KEY_EVENT_BINDING, &binding.metadata.name);
        labels::apply_creator_labels(&mut wf.metadata, self.envelope.claims.as_ref());
        self.instance.stamp(&mut wf.metadata);

        let created = self
            .envelope
            .client
            .create_workflow(&self.envelope.namespace, &wf)
            .await?;
        info!(
            binding = %binding.metadata.name,
            workflow = %created.metadata.name,
            "Submitted workflow from event binding"
        );
        Ok(())
    }

    async fn resume_workflow(&self, mut wf: Workflow) -> Result<(), ClusterError> {
        let mut updated = false;
        let node_ids: Vec<String> = wf.status.nodes.keys().cloned().collect();
        for id in node_ids {
            let node = &wf.status.nodes[&id];
            if node.phase != NodePhase::Running || node.node_type != NodeType::Suspend {
                continue;
            }
            let Some(expression) = wf
                .template_by_name(&node.template_name)
                .and_then(|t| t.suspend.as_ref())
                .and_then(|s| s.event.as_ref())
                .map(|e| e.expression.clone())
            else {
                continue;
            };
            let template_outputs = wf
                .template_by_name(&node.template_name)
                .map(|t| t.outputs.clone())
                .unwrap_or_default();

            let mut env = self.env.clone();
            env.insert(
                "inputs".to_string(),
                serde_json::to_value(&node.inputs).unwrap_or_default(),
            );

            match expr::eval_bool(&expression, &env) {
                // An expression that fails on this event may still work for
                // another, so record a condition instead of failing the node.
                Err(err) => {
                    wf.status.upsert_condition(Condition {
                        condition_type: CONDITION_EVENT_EXPRESSION_ERROR.to_string(),
                        status: "True".to_string(),
                        message: err.to_string(),
                    });
                    updated = true;
                }
                Ok(false) => continue,
                Ok(true) => {
                    let Some(node) = wf.status.nodes.get_mut(&id) else {
                        continue;
                    };
                    match resolve_outputs(&template_outputs, &env) {
                        Ok(outputs) => {
                            node.outputs = Some(outputs);
                            if !node.phase.fulfilled() {
                                mark_node(node, NodePhase::Succeeded, "expression evaluated to true");
                            }
                        }
                        Err(message) => mark_node(node, NodePhase::Error, &message),
                    }
                    info!(
                        workflow = %wf.metadata.name,
                        node = %id,
                        phase = %format!("{:?}", wf.status.nodes[&id].phase),
                        "Matched event"
                    );
                    updated = true;
                }
            }
        }
        if updated {
            let namespace = wf.metadata.namespace.clone();
            self.envelope.client.update_workflow(&namespace, &wf).await?;
        }
        Ok(())
    }
}

/// A binding's object metadata is a set of expressions over the event; each
/// must evaluate to a string.
fn populate_metadata(
    wf: &mut Workflow,
    meta: &gantry_model::ObjectMeta,
    env: &BTreeMap<String, Value>,
) -> Result<(), ClusterError> {
    let eval = |field: String, raw: &str| {
        expr::eval_string(raw, env)
            .map_err(|e| ClusterError::Decode(format!("metadata {field}: {e}")))
    };
    if !meta.name.is_empty() {
        wf.metadata.name = eval("name".to_string(), &meta.name)?;
    }
    if !meta.generate_name.is_empty() {
        wf.metadata.generate_name = eval("generateName".to_string(), &meta.generate_name)?;
    }
    for (k, v) in &meta.labels {
        let value = eval(format!("labels.{k}"), v)?;
        wf.metadata.set_label(k, &value);
    }
    for (k, v) in &meta.annotations {
        let value = eval(format!("annotations.{k}"), v)?;
        wf.metadata.annotations.insert(k.clone(), value);
    }
    Ok(())
}

fn has_waiting_suspend_node(wf: &Workflow) -> bool {
    wf.status.nodes.values().any(|n| {
        n.phase == NodePhase::Running
            && n.node_type == NodeType::Suspend
            && wf
                .template_by_name(&n.template_name)
                .and_then(|t| t.suspend.as_ref())
                .and_then(|s| s.event.as_ref())
                .is_some()
    })
}

fn mark_node(node: &mut NodeStatus, phase: NodePhase, message: &str) {
    node.phase = phase;
    node.message = message.to_string();
    node.finished_at = Some(Utc::now());
}

fn resolve_outputs(
    template_outputs: &Outputs,
    env: &BTreeMap<String, Value>,
) -> Result<Outputs, String> {
    let mut outputs = Outputs::default();
    for p in &template_outputs.parameters {
        let source = p
            .value_from
            .as_ref()
            .ok_or_else(|| format!("malformed output parameter {:?}: valueFrom is nil", p.name))?;
        let value = expr::eval_string(&source.expression, env)
            .map_err(|e| format!("output parameter {:?} expression evaluation error: {e}", p.name))?;
        outputs.parameters.push(Parameter {
            name: p.name.clone(),
            value: Some(value),
            value_from: None,
        });
    }
    Ok(outputs)
}

async fn with_retry<F, Fut>(mut f: F) -> Result<(), ClusterError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), ClusterError>>,
{
    let mut delay = RETRY_BASE_DELAY;
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(()) => return Ok(()),
            Err(err) if err.is_transient() && attempt + 1 < RETRY_ATTEMPTS => {
                attempt += 1;
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn resolves_output_parameters_from_the_event() {
        let outputs: Outputs = serde_json::from_value(json!({
            "parameters": [
                {"name": "message", "valueFrom": {"expression": "payload.message"}},
                {"name": "tag", "valueFrom": {"expression": "payload.build + \"-ok\""}}
            ]
        }))
        .unwrap();
        let mut env = BTreeMap::new();
        env.insert("payload".to_string(), json!({"message": "hi", "build": 7}));
        let resolved = resolve_outputs(&outputs, &env).unwrap();
        assert_eq!(resolved.parameters[0].value.as_deref(), Some("hi"));
        assert_eq!(resolved.parameters[1].value.as_deref(), Some("7-ok"));
    }

    #[test]
    fn missing_value_from_is_an_error() {
        let outputs: Outputs = serde_json::from_value(json!({
            "parameters": [{"name": "p"}]
        }))
        .unwrap();
        let err = resolve_outputs(&outputs, &BTreeMap::new()).unwrap_err();
        assert!(err.contains("valueFrom"));
    }

    #[test]
    fn binding_metadata_is_evaluated_against_the_event() {
        let meta: gantry_model::ObjectMeta = serde_json::from_value(json!({
            "generateName": "payload.repo + \"-\"",
            "labels": {"team": "payload.team"},
            "annotations": {"note": "\"from \" + discriminator"}
        }))
        .unwrap();
        let mut env = BTreeMap::new();
        env.insert("payload".to_string(), json!({"repo": "api", "team": "core"}));
        env.insert("discriminator".to_string(), json!("ci"));

        let mut wf = Workflow::default();
        populate_metadata(&mut wf, &meta, &env).unwrap();
        assert_eq!(wf.metadata.generate_name, "api-");
        assert_eq!(wf.metadata.label("team"), Some("core"));
        assert_eq!(wf.metadata.annotations["note"], "from ci");

        let bad: gantry_model::ObjectMeta =
            serde_json::from_value(json!({"name": "payload.repo +"})).unwrap();
        assert!(populate_metadata(&mut wf, &bad, &env).is_err());
    }

    #[test]
    fn suspend_node_detection_requires_an_event_expression() {
        let wf: Workflow = serde_json::from_value(json!({
            "metadata": {"name": "wf"},
            "spec": {"templates": [
                {"name": "wait", "suspend": {"event": {"expression": "payload.ok"}}},
                {"name": "sleep", "suspend": {"duration": "30s"}}
            ]},
            "status": {"nodes": {
                "wf-1": {"id": "wf-1", "name": "wf-1", "type": "Suspend",
                         "templateName": "sleep", "phase": "Running"}
            }}
        }))
        .unwrap();
        assert!(!has_waiting_suspend_node(&wf));

        let mut wf = wf;
        let mut node = wf.status.nodes["wf-1"].clone();
        node.template_name = "wait".to_string();
        wf.status.nodes.insert("wf-1".to_string(), node);
        assert!(has_waiting_suspend_node(&wf));
    }
}
