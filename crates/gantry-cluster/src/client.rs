// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Typed control-plane client.
//!
//! One instance per caller credential. The resource API group lives under
//! `/apis/gantry.io/v1`; config objects, pods, service accounts and access
//! reviews use the core control-plane groups.

use std::collections::BTreeMap;
use std::pin::Pin;

use async_stream::try_stream;
use bytes::{Buf, BytesMut};
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use gantry_model::meta::ObjectMeta;
use gantry_model::template::{
    ClusterWorkflowTemplate, ClusterWorkflowTemplateList, CronWorkflow, CronWorkflowList,
    EventBinding, EventBindingList, WorkflowTemplate, WorkflowTemplateList,
};
use gantry_model::workflow::{Workflow, WorkflowList};

use crate::error::ClusterError;
use crate::rest::RestConfig;

/// API group served by the workflow custom resources.
pub const API_GROUP: &str = "gantry.io";
const API_PREFIX: &str = "/apis/gantry.io/v1";
const CORE_PREFIX: &str = "/api/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WatchEventType {
    Added,
    Modified,
    Deleted,
    Bookmark,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchEvent {
    #[serde(rename = "type")]
    pub event_type: WatchEventType,
    pub object: serde_json::Value,
}

impl WatchEvent {
    pub fn workflow(&self) -> Option<Workflow> {
        serde_json::from_value(self.object.clone()).ok()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMap {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccount {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub secrets: Vec<ObjectReference>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccountList {
    #[serde(default)]
    pub items: Vec<ServiceAccount>,
}

/// One rule from a subject-rules review.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRule {
    #[serde(default)]
    pub verbs: Vec<String>,
    #[serde(default)]
    pub api_groups: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub resource_names: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ClusterClient {
    http: reqwest::Client,
    base: String,
    auth_header: Option<String>,
}

pub type LineStream = Pin<Box<dyn Stream<Item = Result<String, ClusterError>> + Send>>;
pub type EventStream = Pin<Box<dyn Stream<Item = Result<WatchEvent, ClusterError>> + Send>>;

impl ClusterClient {
    pub fn new(config: &RestConfig) -> Result<Self, ClusterError> {
        let mut builder = reqwest::Client::builder();
        if config.insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder
            .build()
            .map_err(|e| ClusterError::Network(e.to_string()))?;
        Ok(ClusterClient {
            http,
            base: config.host.trim_end_matches('/').to_string(),
            auth_header: config.auth_header(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.http.request(method, format!("{}{}", self.base, path));
        if let Some(auth) = &self.auth_header {
            req = req.header(reqwest::header::AUTHORIZATION, auth);
        }
        req
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, ClusterError> {
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = control_plane_message(resp.text().await.unwrap_or_default());
            return Err(ClusterError::Http {
                status: status.as_u16(),
                message,
            });
        }
        resp.json().await.map_err(ClusterError::from)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ClusterError> {
        self.execute(self.request(reqwest::Method::GET, path).query(query))
            .await
    }

    async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClusterError> {
        self.execute(self.request(reqwest::Method::POST, path).json(body))
            .await
    }

    async fn put_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClusterError> {
        self.execute(self.request(reqwest::Method::PUT, path).json(body))
            .await
    }

    async fn delete_json(&self, path: &str) -> Result<(), ClusterError> {
        let _: serde_json::Value = self.execute(self.request(reqwest::Method::DELETE, path)).await?;
        Ok(())
    }

    async fn merge_patch<T: DeserializeOwned>(
        &self,
        path: &str,
        patch: &serde_json::Value,
    ) -> Result<T, ClusterError> {
        self.execute(
            self.request(reqwest::Method::PATCH, path)
                .header(reqwest::header::CONTENT_TYPE, "application/merge-patch+json")
                .body(patch.to_string()),
        )
        .await
    }

    fn list_query(label_selector: &str) -> Vec<(&'static str, String)> {
        if label_selector.is_empty() {
            Vec::new()
        } else {
            vec![("labelSelector", label_selector.to_string())]
        }
    }

    // --- workflows ---

    pub async fn get_workflow(&self, namespace: &str, name: &str) -> Result<Workflow, ClusterError> {
        self.get_json(&format!("{API_PREFIX}/namespaces/{namespace}/workflows/{name}"), &[])
            .await
    }

    pub async fn list_workflows(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<WorkflowList, ClusterError> {
        self.get_json(
            &format!("{API_PREFIX}/namespaces/{namespace}/workflows"),
            &Self::list_query(label_selector),
        )
        .await
    }

    pub async fn create_workflow(
        &self,
        namespace: &str,
        workflow: &Workflow,
    ) -> Result<Workflow, ClusterError> {
        self.post_json(&format!("{API_PREFIX}/namespaces/{namespace}/workflows"), workflow)
            .await
    }

    pub async fn update_workflow(
        &self,
        namespace: &str,
        workflow: &Workflow,
    ) -> Result<Workflow, ClusterError> {
        let name = &workflow.metadata.name;
        self.put_json(
            &format!("{API_PREFIX}/namespaces/{namespace}/workflows/{name}"),
            workflow,
        )
        .await
    }

    pub async fn delete_workflow(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        self.delete_json(&format!("{API_PREFIX}/namespaces/{namespace}/workflows/{name}"))
            .await
    }

    /// Strip finalizers so a stuck resource can actually go away.
    pub async fn clear_workflow_finalizers(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Workflow, ClusterError> {
        self.merge_patch(
            &format!("{API_PREFIX}/namespaces/{namespace}/workflows/{name}"),
            &serde_json::json!({"metadata": {"finalizers": null}}),
        )
        .await
    }

    /// Open a watch on workflows. `namespace` empty means all namespaces.
    pub fn watch_workflows(&self, namespace: &str, label_selector: &str) -> EventStream {
        let path = if namespace.is_empty() {
            format!("{API_PREFIX}/workflows")
        } else {
            format!("{API_PREFIX}/namespaces/{namespace}/workflows")
        };
        let mut query = vec![("watch", "true".to_string())];
        if !label_selector.is_empty() {
            query.push(("labelSelector", label_selector.to_string()));
        }
        let req = self.request(reqwest::Method::GET, &path).query(&query);
        Box::pin(try_stream! {
            let resp = req.send().await?;
            let status = resp.status();
            if !status.is_success() {
                let message = control_plane_message(resp.text().await.unwrap_or_default());
                Err(ClusterError::Http { status: status.as_u16(), message })?;
            } else {
                let mut lines = lines_of(resp.bytes_stream());
                while let Some(line) = lines.next().await {
                    let line = line?;
                    if line.is_empty() {
                        continue;
                    }
                    let event: WatchEvent = serde_json::from_str(&line)
                        .map_err(|e| ClusterError::Decode(e.to_string()))?;
                    debug!(event = ?event.event_type, "Watch event");
                    yield event;
                }
            }
        })
    }

    // --- workflow templates ---

    pub async fn get_workflow_template(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<WorkflowTemplate, ClusterError> {
        self.get_json(
            &format!("{API_PREFIX}/namespaces/{namespace}/workflowtemplates/{name}"),
            &[],
        )
        .await
    }

    pub async fn list_workflow_templates(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<WorkflowTemplateList, ClusterError> {
        self.get_json(
            &format!("{API_PREFIX}/namespaces/{namespace}/workflowtemplates"),
            &Self::list_query(label_selector),
        )
        .await
    }

    pub async fn create_workflow_template(
        &self,
        namespace: &str,
        template: &WorkflowTemplate,
    ) -> Result<WorkflowTemplate, ClusterError> {
        self.post_json(
            &format!("{API_PREFIX}/namespaces/{namespace}/workflowtemplates"),
            template,
        )
        .await
    }

    pub async fn update_workflow_template(
        &self,
        namespace: &str,
        template: &WorkflowTemplate,
    ) -> Result<WorkflowTemplate, ClusterError> {
        let name = &template.metadata.name;
        self.put_json(
            &format!("{API_PREFIX}/namespaces/{namespace}/workflowtemplates/{name}"),
            template,
        )
        .await
    }

    pub async fn delete_workflow_template(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), ClusterError> {
        self.delete_json(&format!(
            "{API_PREFIX}/namespaces/{namespace}/workflowtemplates/{name}"
        ))
        .await
    }

    // --- cluster workflow templates ---

    pub async fn get_cluster_workflow_template(
        &self,
        name: &str,
    ) -> Result<ClusterWorkflowTemplate, ClusterError> {
        self.get_json(&format!("{API_PREFIX}/clusterworkflowtemplates/{name}"), &[])
            .await
    }

    pub async fn list_cluster_workflow_templates(
        &self,
        label_selector: &str,
    ) -> Result<ClusterWorkflowTemplateList, ClusterError> {
        self.get_json(
            &format!("{API_PREFIX}/clusterworkflowtemplates"),
            &Self::list_query(label_selector),
        )
        .await
    }

    pub async fn create_cluster_workflow_template(
        &self,
        template: &ClusterWorkflowTemplate,
    ) -> Result<ClusterWorkflowTemplate, ClusterError> {
        self.post_json(&format!("{API_PREFIX}/clusterworkflowtemplates"), template)
            .await
    }

    pub async fn update_cluster_workflow_template(
        &self,
        template: &ClusterWorkflowTemplate,
    ) -> Result<ClusterWorkflowTemplate, ClusterError> {
        let name = &template.metadata.name;
        self.put_json(&format!("{API_PREFIX}/clusterworkflowtemplates/{name}"), template)
            .await
    }

    pub async fn delete_cluster_workflow_template(&self, name: &str) -> Result<(), ClusterError> {
        self.delete_json(&format!("{API_PREFIX}/clusterworkflowtemplates/{name}"))
            .await
    }

    // --- cron workflows ---

    pub async fn get_cron_workflow(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<CronWorkflow, ClusterError> {
        self.get_json(
            &format!("{API_PREFIX}/namespaces/{namespace}/cronworkflows/{name}"),
            &[],
        )
        .await
    }

    pub async fn list_cron_workflows(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<CronWorkflowList, ClusterError> {
        self.get_json(
            &format!("{API_PREFIX}/namespaces/{namespace}/cronworkflows"),
            &Self::list_query(label_selector),
        )
        .await
    }

    pub async fn create_cron_workflow(
        &self,
        namespace: &str,
        cron: &CronWorkflow,
    ) -> Result<CronWorkflow, ClusterError> {
        self.post_json(&format!("{API_PREFIX}/namespaces/{namespace}/cronworkflows"), cron)
            .await
    }

    pub async fn update_cron_workflow(
        &self,
        namespace: &str,
        cron: &CronWorkflow,
    ) -> Result<CronWorkflow, ClusterError> {
        let name = &cron.metadata.name;
        self.put_json(
            &format!("{API_PREFIX}/namespaces/{namespace}/cronworkflows/{name}"),
            cron,
        )
        .await
    }

    pub async fn delete_cron_workflow(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        self.delete_json(&format!("{API_PREFIX}/namespaces/{namespace}/cronworkflows/{name}"))
            .await
    }

    // --- event bindings ---

    pub async fn list_event_bindings(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<EventBindingList, ClusterError> {
        let path = if namespace.is_empty() {
            format!("{API_PREFIX}/workfloweventbindings")
        } else {
            format!("{API_PREFIX}/namespaces/{namespace}/workfloweventbindings")
        };
        self.get_json(&path, &Self::list_query(label_selector)).await
    }

    pub async fn get_event_binding(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<EventBinding, ClusterError> {
        self.get_json(
            &format!("{API_PREFIX}/namespaces/{namespace}/workfloweventbindings/{name}"),
            &[],
        )
        .await
    }

    // --- core resources ---

    pub async fn get_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap, ClusterError> {
        self.get_json(&format!("{CORE_PREFIX}/namespaces/{namespace}/configmaps/{name}"), &[])
            .await
    }

    pub async fn create_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap, ClusterError> {
        self.post_json(
            &format!("{CORE_PREFIX}/namespaces/{namespace}/configmaps"),
            config_map,
        )
        .await
    }

    pub async fn update_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap, ClusterError> {
        let name = &config_map.metadata.name;
        self.put_json(
            &format!("{CORE_PREFIX}/namespaces/{namespace}/configmaps/{name}"),
            config_map,
        )
        .await
    }

    pub async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        self.delete_json(&format!("{CORE_PREFIX}/namespaces/{namespace}/pods/{name}"))
            .await
    }

    /// Follow a container's log as a line stream.
    pub fn pod_logs(&self, namespace: &str, pod: &str, container: &str, follow: bool) -> LineStream {
        let req = self
            .request(
                reqwest::Method::GET,
                &format!("{CORE_PREFIX}/namespaces/{namespace}/pods/{pod}/log"),
            )
            .query(&[("container", container.to_string()), ("follow", follow.to_string())]);
        Box::pin(try_stream! {
            let resp = req.send().await?;
            let status = resp.status();
            if !status.is_success() {
                let message = control_plane_message(resp.text().await.unwrap_or_default());
                Err(ClusterError::Http { status: status.as_u16(), message })?;
            } else {
                let mut lines = lines_of(resp.bytes_stream());
                while let Some(line) = lines.next().await {
                    yield line?;
                }
            }
        })
    }

    pub async fn list_service_accounts(
        &self,
        namespace: &str,
    ) -> Result<ServiceAccountList, ClusterError> {
        self.get_json(&format!("{CORE_PREFIX}/namespaces/{namespace}/serviceaccounts"), &[])
            .await
    }

    pub async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, ClusterError> {
        self.get_json(&format!("{CORE_PREFIX}/namespaces/{namespace}/secrets/{name}"), &[])
            .await
    }

    // --- access reviews ---

    /// Ask the control plane whether this client's identity may perform
    /// the action. Runs as the caller, so the answer is about the caller.
    pub async fn can_i(
        &self,
        verb: &str,
        resource: &str,
        namespace: &str,
        name: &str,
    ) -> Result<bool, ClusterError> {
        #[derive(Deserialize)]
        struct Review {
            #[serde(default)]
            status: ReviewStatus,
        }
        #[derive(Default, Deserialize)]
        struct ReviewStatus {
            #[serde(default)]
            allowed: bool,
        }
        let review: Review = self
            .post_json(
                "/apis/authorization.k8s.io/v1/selfsubjectaccessreviews",
                &serde_json::json!({
                    "apiVersion": "authorization.k8s.io/v1",
                    "kind": "SelfSubjectAccessReview",
                    "spec": {
                        "resourceAttributes": {
                            "namespace": namespace,
                            "verb": verb,
                            "group": API_GROUP,
                            "resource": resource,
                            "name": name,
                        }
                    }
                }),
            )
            .await?;
        Ok(review.status.allowed)
    }

    /// All resource rules granted to this client's identity in a namespace.
    pub async fn my_rules(&self, namespace: &str) -> Result<Vec<ResourceRule>, ClusterError> {
        #[derive(Deserialize)]
        struct Review {
            #[serde(default)]
            status: ReviewStatus,
        }
        #[derive(Default, Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct ReviewStatus {
            #[serde(default)]
            resource_rules: Vec<ResourceRule>,
        }
        let review: Review = self
            .post_json(
                "/apis/authorization.k8s.io/v1/selfsubjectrulesreviews",
                &serde_json::json!({
                    "apiVersion": "authorization.k8s.io/v1",
                    "kind": "SelfSubjectRulesReview",
                    "spec": { "namespace": namespace }
                }),
            )
            .await?;
        Ok(review.status.resource_rules)
    }
}

/// Split a byte stream into newline-terminated UTF-8 lines.
fn lines_of<S>(mut bytes: S) -> Pin<Box<dyn Stream<Item = Result<String, ClusterError>> + Send>>
where
    S: Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + Unpin + 'static,
{
    Box::pin(try_stream! {
        let mut buf = BytesMut::new();
        while let Some(chunk) = bytes.next().await {
            buf.extend_from_slice(&chunk?);
            while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                let line = buf.split_to(pos + 1);
                let line = String::from_utf8_lossy(&line[..line.len() - 1])
                    .trim_end_matches('\r')
                    .to_string();
                yield line;
            }
        }
        if buf.has_remaining() {
            yield String::from_utf8_lossy(&buf).to_string();
        }
    })
}

/// Pull the human message out of a control-plane status body, falling back
/// to the raw text trimmed to a sane length.
fn control_plane_message(body: String) -> String {
    if let Ok(status) = serde_json::from_str::<serde_json::Value>(&body) {
        if let Some(message) = status.get("message").and_then(|m| m.as_str()) {
            return message.to_string();
        }
    }
    let mut body = body;
    if body.len() > 200 {
        let mut cut = 200;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_plane_message_prefers_status_message() {
        let body = r#"{"kind":"Status","message":"workflows.gantry.io \"x\" not found"}"#;
        assert_eq!(
            control_plane_message(body.to_string()),
            "workflows.gantry.io \"x\" not found"
        );
        assert_eq!(control_plane_message("plain text".to_string()), "plain text");
    }

    #[test]
    fn control_plane_message_truncates_on_a_char_boundary() {
        let body = "€".repeat(100);
        let message = control_plane_message(body);
        assert!(message.len() <= 200);
        assert!(message.chars().all(|c| c == '€'));
    }

    #[test]
    fn watch_event_decodes() {
        let event: WatchEvent = serde_json::from_str(
            r#"{"type":"ADDED","object":{"metadata":{"name":"wf","namespace":"argo"}}}"#,
        )
        .unwrap();
        assert_eq!(event.event_type, WatchEventType::Added);
        assert_eq!(event.workflow().unwrap().metadata.name, "wf");
    }
}
