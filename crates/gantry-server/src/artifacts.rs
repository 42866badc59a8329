// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Artifact download endpoints.
//!
//! Artifacts are streamed straight from wherever their bytes live. Each
//! driver handles one location kind; the registry picks the first driver
//! that accepts the artifact so payloads are never buffered in full.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{Extension, Path, State};
use axum::http::header;
use axum::response::Response;
use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use tokio_util::io::ReaderStream;
use tracing::info;

use gantry_model::{Artifact, NodeStatus, Workflow};

use crate::auth::CallerContext;
use crate::auth::ops::Operation;
use crate::error::ApiError;
use crate::server::AppState;

pub type ArtifactStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

#[async_trait]
pub trait ArtifactDriver: Send + Sync {
    /// Whether this driver can serve the artifact's location.
    fn accepts(&self, artifact: &Artifact) -> bool;

    async fn open(&self, artifact: &Artifact) -> Result<ArtifactStream, ApiError>;
}

/// Fetches from an HTTP-addressable object store key.
pub struct ObjectStoreDriver {
    client: reqwest::Client,
}

impl ObjectStoreDriver {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Default for ObjectStoreDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactDriver for ObjectStoreDriver {
    fn accepts(&self, artifact: &Artifact) -> bool {
        artifact.object_store.is_some()
    }

    async fn open(&self, artifact: &Artifact) -> Result<ArtifactStream, ApiError> {
        let Some(location) = &artifact.object_store else {
            return Err(ApiError::Internal("artifact has no object store location".into()));
        };
        let url = format!("{}/{}/{}", location.endpoint, location.bucket, location.key);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|_| ApiError::Unavailable("artifact store is unreachable".into()))?;
        if !resp.status().is_success() {
            return Err(ApiError::NotFound(format!(
                "artifact {:?} not found in store",
                artifact.name
            )));
        }
        let stream = resp
            .bytes_stream()
            .map_err(|e| std::io::Error::other(e.to_string()));
        Ok(Box::pin(stream))
    }
}

/// Reads from a path on a volume shared with the workflow pods.
pub struct FileDriver;

#[async_trait]
impl ArtifactDriver for FileDriver {
    fn accepts(&self, artifact: &Artifact) -> bool {
        artifact.file.is_some()
    }

    async fn open(&self, artifact: &Artifact) -> Result<ArtifactStream, ApiError> {
        let Some(location) = &artifact.file else {
            return Err(ApiError::Internal("artifact has no file location".into()));
        };
        let file = tokio::fs::File::open(&location.path)
            .await
            .map_err(|_| ApiError::NotFound(format!("artifact {:?} not found", artifact.name)))?;
        Ok(Box::pin(ReaderStream::new(file)))
    }
}

/// Serves artifacts whose bytes are inlined in the workflow status.
pub struct InlineDriver;

#[async_trait]
impl ArtifactDriver for InlineDriver {
    fn accepts(&self, artifact: &Artifact) -> bool {
        artifact.raw.is_some()
    }

    async fn open(&self, artifact: &Artifact) -> Result<ArtifactStream, ApiError> {
        let Some(location) = &artifact.raw else {
            return Err(ApiError::Internal("artifact has no inline data".into()));
        };
        let data = Bytes::from(location.data.clone().into_bytes());
        Ok(Box::pin(futures::stream::once(async move { Ok(data) })))
    }
}

pub struct ArtifactRegistry {
    drivers: Vec<Box<dyn ArtifactDriver>>,
}

impl ArtifactRegistry {
    pub fn new() -> Self {
        Self {
            drivers: vec![
                Box::new(ObjectStoreDriver::new()),
                Box::new(FileDriver),
                Box::new(InlineDriver),
            ],
        }
    }

    pub fn driver_for(&self, artifact: &Artifact) -> Option<&dyn ArtifactDriver> {
        self.drivers
            .iter()
            .find(|d| d.accepts(artifact))
            .map(|d| d.as_ref())
    }
}

impl Default for ArtifactRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn find_artifact<'a>(
    wf: &'a Workflow,
    node_id: &str,
    artifact_name: &str,
) -> Result<(&'a NodeStatus, &'a Artifact), ApiError> {
    let node = wf
        .status
        .nodes
        .get(node_id)
        .ok_or_else(|| ApiError::NotFound(format!("node {node_id:?} not found")))?;
    let artifact = node
        .outputs
        .as_ref()
        .and_then(|o| o.artifacts.iter().find(|a| a.name == artifact_name))
        .ok_or_else(|| ApiError::NotFound(format!("artifact {artifact_name:?} not found")))?;
    Ok((node, artifact))
}

async fn serve(state: &AppState, wf: &Workflow, node_id: &str, name: &str) -> Result<Response, ApiError> {
    let (node, artifact) = find_artifact(wf, node_id, name)?;
    let driver = state.artifacts.driver_for(artifact).ok_or_else(|| {
        ApiError::InvalidArgument(format!("artifact {name:?} has no readable location"))
    })?;
    let stream = driver.open(artifact).await?;
    info!(workflow = %wf.metadata.name, node = %node.id, artifact = %name, "Serving artifact");
    let response = Response::builder()
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{name}.tgz\""),
        )
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(response)
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path((namespace, name, node_id, artifact_name)): Path<(String, String, String, String)>,
) -> Result<Response, ApiError> {
    state
        .enforce_local(&caller, Operation::GetArtifact, &namespace, &name)
        .await?;
    let wf = caller.client.get_workflow(&namespace, &name).await?;
    state.claim(&wf.metadata, "workflow", &name)?;
    serve(&state, &wf, &node_id, &artifact_name).await
}

pub async fn get_by_uid(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path((uid, node_id, artifact_name)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    let archive = state
        .archive
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("workflow archive is not configured".into()))?;
    let wf = archive
        .get_workflow(&uid)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("archived workflow {uid:?} not found")))?;
    state
        .policy
        .check(
            &caller,
            Operation::GetArchivedArtifact,
            &wf.metadata.namespace,
            &wf.metadata.name,
        )
        .await?;
    serve(&state, &wf, &node_id, &artifact_name).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use gantry_model::{NodePhase, RawArtifact};

    fn artifact_workflow() -> Workflow {
        let mut wf = Workflow::default();
        wf.metadata.name = "steps-xyz".into();
        let mut node = NodeStatus {
            id: "steps-xyz-1".into(),
            name: "steps-xyz[0].make".into(),
            phase: NodePhase::Succeeded,
            ..Default::default()
        };
        node.outputs = Some(gantry_model::workflow::Outputs {
            artifacts: vec![Artifact {
                name: "result".into(),
                raw: Some(RawArtifact { data: "hello".into() }),
                ..Default::default()
            }],
            ..Default::default()
        });
        wf.status.nodes.insert(node.id.clone(), node);
        wf
    }

    #[test]
    fn finds_artifact_on_node() {
        let wf = artifact_workflow();
        let (node, artifact) = find_artifact(&wf, "steps-xyz-1", "result").unwrap();
        assert_eq!(node.phase, NodePhase::Succeeded);
        assert_eq!(artifact.name, "result");
    }

    #[test]
    fn missing_node_and_artifact_are_not_found() {
        let wf = artifact_workflow();
        assert!(matches!(
            find_artifact(&wf, "no-such-node", "result"),
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(
            find_artifact(&wf, "steps-xyz-1", "no-such-artifact"),
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn inline_driver_streams_raw_bytes() {
        let artifact = Artifact {
            name: "result".into(),
            raw: Some(RawArtifact { data: "hello".into() }),
            ..Default::default()
        };
        let registry = ArtifactRegistry::new();
        let driver = registry.driver_for(&artifact).unwrap();
        let mut stream = driver.open(&artifact).await.unwrap();
        let chunk = stream.next().await.unwrap().unwrap();
        assert_eq!(&chunk[..], b"hello");
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn registry_rejects_locationless_artifacts() {
        let registry = ArtifactRegistry::new();
        let artifact = Artifact { name: "empty".into(), ..Default::default() };
        assert!(registry.driver_for(&artifact).is_none());
    }
}
