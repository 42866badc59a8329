// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Client behavior against a mocked control plane.

use futures::StreamExt;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gantry_cluster::{ClusterClient, ClusterError, RestConfig};

async fn client_for(server: &MockServer) -> ClusterClient {
    let config = RestConfig::server(&server.uri(), Some("svc-token".to_string()));
    ClusterClient::new(&config).unwrap()
}

#[tokio::test]
async fn get_workflow_sends_bearer_and_decodes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/apis/gantry.io/v1/namespaces/argo/workflows/hello"))
        .and(header("authorization", "Bearer svc-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "metadata": {"name": "hello", "namespace": "argo"},
            "status": {"phase": "Running"}
        })))
        .mount(&server)
        .await;

    let wf = client_for(&server).await.get_workflow("argo", "hello").await.unwrap();
    assert_eq!(wf.metadata.name, "hello");
    assert_eq!(wf.status.phase, gantry_model::WorkflowPhase::Running);
}

#[tokio::test]
async fn not_found_carries_status_and_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/apis/gantry.io/v1/namespaces/argo/workflows/ghost"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "kind": "Status",
            "message": "workflows.gantry.io \"ghost\" not found"
        })))
        .mount(&server)
        .await;

    let err = client_for(&server).await.get_workflow("argo", "ghost").await.unwrap_err();
    match err {
        ClusterError::Http { status, message } => {
            assert_eq!(status, 404);
            assert!(message.contains("ghost"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn list_passes_label_selector() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/apis/gantry.io/v1/namespaces/argo/workflows"))
        .and(query_param("labelSelector", "app=web"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [{"metadata": {"name": "a"}}, {"metadata": {"name": "b"}}]
        })))
        .mount(&server)
        .await;

    let list = client_for(&server).await.list_workflows("argo", "app=web").await.unwrap();
    assert_eq!(list.items.len(), 2);
}

#[tokio::test]
async fn watch_decodes_json_lines() {
    let server = MockServer::start().await;
    let body = concat!(
        "{\"type\":\"ADDED\",\"object\":{\"metadata\":{\"name\":\"wf-1\"}}}\n",
        "{\"type\":\"DELETED\",\"object\":{\"metadata\":{\"name\":\"wf-1\"}}}\n",
    );
    Mock::given(method("GET"))
        .and(path("/apis/gantry.io/v1/namespaces/argo/workflows"))
        .and(query_param("watch", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/json"))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let mut stream = client.watch_workflows("argo", "");
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.workflow().unwrap().metadata.name, "wf-1");
    let second = stream.next().await.unwrap().unwrap();
    assert_eq!(second.event_type, gantry_cluster::WatchEventType::Deleted);
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn can_i_posts_access_review() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/apis/authorization.k8s.io/v1/selfsubjectaccessreviews"))
        .and(body_partial_json(serde_json::json!({
            "spec": {"resourceAttributes": {"verb": "list", "resource": "workflows", "namespace": "argo"}}
        })))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(serde_json::json!({"status": {"allowed": true}})),
        )
        .mount(&server)
        .await;

    let allowed = client_for(&server).await.can_i("list", "workflows", "argo", "").await.unwrap();
    assert!(allowed);
}

#[tokio::test]
async fn pod_logs_stream_lines() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces/argo/pods/wf-1-main/log"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("line one\nline two\n", "text/plain"))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let lines: Vec<String> = client
        .pod_logs("argo", "wf-1-main", "main", false)
        .filter_map(|l| async { l.ok() })
        .collect()
        .await;
    assert_eq!(lines, vec!["line one", "line two"]);
}
