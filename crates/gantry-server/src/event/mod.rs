// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Inbound event pipeline.
//!
//! Receiving an event only validates it and queues it; matching and
//! submission happen on a single consumer task so the HTTP handler can
//! answer immediately. The queue is bounded: a full queue is reported to
//! the sender as resource exhaustion rather than applying backpressure.

pub mod dispatch;
pub mod expr;

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::HeaderMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{error, info};

use gantry_cluster::ClusterClient;
use gantry_model::{Claims, EventBindingList, InstanceTag};

use crate::auth::CallerContext;
use crate::auth::ops::Operation;
use crate::error::ApiError;
use crate::server::AppState;
use crate::workflow::ListParams;
use dispatch::DispatchOperation;

/// Everything the consumer needs to act on one event.
pub struct EventEnvelope {
    pub namespace: String,
    pub discriminator: String,
    pub payload: Value,
    /// Request headers, already filtered down to `x-` headers so credential
    /// headers never reach expressions.
    pub metadata: BTreeMap<String, Vec<String>>,
    pub claims: Option<Claims>,
    /// The caller's control-plane client; dispatch runs under it.
    pub client: Arc<ClusterClient>,
}

#[derive(Clone)]
pub struct EventQueue {
    tx: mpsc::Sender<EventEnvelope>,
}

impl EventQueue {
    pub fn new(capacity: usize) -> (EventQueue, mpsc::Receiver<EventEnvelope>) {
        let (tx, rx) = mpsc::channel(capacity);
        (EventQueue { tx }, rx)
    }

    /// Queue an event. Never blocks.
    pub fn submit(&self, envelope: EventEnvelope) -> Result<(), ApiError> {
        self.tx.try_send(envelope).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => {
                ApiError::ResourceExhausted("event queue is full".into())
            }
            mpsc::error::TrySendError::Closed(_) => {
                ApiError::Unavailable("event pipeline has stopped".into())
            }
        })
    }
}

/// Headers whose name starts with `x-` become event metadata; everything
/// else (cookies, authorization, routing headers) is dropped.
fn metadata_from(headers: &HeaderMap) -> BTreeMap<String, Vec<String>> {
    let mut metadata: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers {
        let name = name.as_str().to_ascii_lowercase();
        if !name.starts_with("x-") {
            continue;
        }
        if let Ok(value) = value.to_str() {
            metadata.entry(name).or_default().push(value.to_string());
        }
    }
    metadata
}

pub async fn receive(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path((namespace, discriminator)): Path<(String, String)>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    receive_event(state, caller, namespace, discriminator, headers, payload).await
}

pub async fn receive_default(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path(namespace): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    receive_event(state, caller, namespace, String::new(), headers, payload).await
}

async fn receive_event(
    state: Arc<AppState>,
    caller: CallerContext,
    namespace: String,
    discriminator: String,
    headers: HeaderMap,
    payload: Value,
) -> Result<Json<Value>, ApiError> {
    state
        .policy
        .check(&caller, Operation::ReceiveEvent, &namespace, "")
        .await?;
    if payload.is_null() {
        return Err(ApiError::InvalidArgument("event payload must not be empty".into()));
    }
    state.events.submit(EventEnvelope {
        namespace: state.effective_namespace(&namespace),
        discriminator,
        payload,
        metadata: metadata_from(&headers),
        claims: caller.claims.clone(),
        client: caller.client.clone(),
    })?;
    Ok(Json(serde_json::json!({})))
}

pub async fn list_bindings(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Path(namespace): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<EventBindingList>, ApiError> {
    state
        .policy
        .check(&caller, Operation::ListEventBindings, &namespace, "")
        .await?;
    let bindings = caller
        .client
        .list_event_bindings(&namespace, &params.label_selector)
        .await?;
    Ok(Json(bindings))
}

/// Consume queued events until every sender is gone, which is how shutdown
/// drains the queue.
pub async fn run_consumer(mut rx: mpsc::Receiver<EventEnvelope>, instance: InstanceTag) {
    info!("Event consumer started");
    while let Some(envelope) = rx.recv().await {
        let op = DispatchOperation::new(envelope, instance.clone());
        if let Err(err) = op.execute().await {
            error!(error = %err, "Event dispatch failed");
        }
    }
    info!("Event consumer drained and stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_cluster::RestConfig;

    fn envelope() -> EventEnvelope {
        let config = RestConfig::server("https://cluster.example.com", None);
        EventEnvelope {
            namespace: "dev".into(),
            discriminator: String::new(),
            payload: serde_json::json!({}),
            metadata: BTreeMap::new(),
            claims: None,
            client: Arc::new(ClusterClient::new(&config).unwrap()),
        }
    }

    #[tokio::test]
    async fn full_queue_is_resource_exhaustion() {
        let (queue, _rx) = EventQueue::new(2);
        queue.submit(envelope()).unwrap();
        queue.submit(envelope()).unwrap();
        let err = queue.submit(envelope()).unwrap_err();
        assert_eq!(err.code(), "RESOURCE_EXHAUSTED");
    }

    #[test]
    fn metadata_keeps_only_x_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer secret".parse().unwrap());
        headers.insert("cookie", "authorization=s".parse().unwrap());
        headers.insert("x-tenant", "acme".parse().unwrap());
        headers.append("x-tenant", "other".parse().unwrap());
        let metadata = metadata_from(&headers);
        assert_eq!(metadata.len(), 1);
        assert_eq!(metadata["x-tenant"], vec!["acme", "other"]);
    }

    #[tokio::test]
    async fn closed_queue_is_unavailable() {
        let (queue, rx) = EventQueue::new(1);
        drop(rx);
        let err = queue.submit(envelope()).unwrap_err();
        assert_eq!(err.code(), "UNAVAILABLE");
    }
}
