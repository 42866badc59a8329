// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! API behavior against a mocked control plane.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gantry_cluster::{ClusterClient, RestConfig};
use gantry_model::{InstanceTag, Workflow};
use gantry_server::auth::modes::Modes;
use gantry_server::auth::policy::PolicyEngine;
use gantry_server::auth::Gatekeeper;
use gantry_server::artifacts::ArtifactRegistry;
use gantry_server::config::Config;
use gantry_server::event::EventQueue;
use gantry_server::server::AppState;
use gantry_server::routes;
use gantry_store::LiveWorkflowStore;

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    // held so the event queue stays open without a running consumer
    _event_rx: tokio::sync::mpsc::Receiver<gantry_server::event::EventEnvelope>,
}

async fn app_for(server: &MockServer, modes: Modes) -> TestApp {
    app_with_instance(server, modes, "").await
}

async fn app_with_instance(server: &MockServer, modes: Modes, instance_id: &str) -> TestApp {
    let config = Config {
        bind_addr: ([127, 0, 0, 1], 0).into(),
        cluster_host: server.uri(),
        cluster_token: Some("svc-token".into()),
        auth_modes: modes,
        instance_id: instance_id.to_string(),
        managed_namespace: "argo".into(),
        database_url: None,
        sso: None,
        policy_file: None,
        event_queue_size: 2,
        semaphore_inactivity: Duration::from_secs(300),
        lock_sweep_interval: Duration::from_secs(60),
        sse_keepalive: Duration::from_secs(30),
        links: vec![("Docs".into(), "https://docs.example.com".into())],
    };
    let rest = RestConfig::server(&config.cluster_host, config.cluster_token.clone());
    let client = Arc::new(ClusterClient::new(&rest).unwrap());
    let gatekeeper = Gatekeeper::new(
        config.auth_modes,
        client.clone(),
        config.cluster_host.clone(),
        None,
        config.managed_namespace.clone(),
    );
    let live = LiveWorkflowStore::new_in_memory(&config.instance_id).await.unwrap();
    let (events, event_rx) = EventQueue::new(config.event_queue_size);
    let state = Arc::new(AppState {
        instance: InstanceTag::new(Some(config.instance_id.clone())),
        gatekeeper,
        policy: PolicyEngine::Delegated,
        server_client: client,
        live,
        archive: None,
        semaphores: None,
        events,
        artifacts: ArtifactRegistry::new(),
        config,
    });
    TestApp {
        router: routes::router(state.clone()),
        state,
        _event_rx: event_rx,
    }
}

async fn server_app(server: &MockServer) -> TestApp {
    app_for(server, Modes { client: false, server: true, sso: false }).await
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn put_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::put(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn allow_access_reviews() -> Mock {
    Mock::given(method("POST"))
        .and(path("/apis/authorization.k8s.io/v1/selfsubjectaccessreviews"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": {"allowed": true}
        })))
}

#[tokio::test]
async fn create_workflow_proxies_to_the_control_plane() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/apis/gantry.io/v1/namespaces/dev/workflows"))
        .and(body_partial_json(serde_json::json!({
            "spec": {"entrypoint": "main"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "metadata": {"name": "hello", "namespace": "dev", "uid": "u1"},
            "spec": {"entrypoint": "main"}
        })))
        .mount(&server)
        .await;

    let app = server_app(&server).await;
    let response = app
        .router
        .oneshot(post_json(
            "/apis/gantry.io/v1/namespaces/dev/workflows",
            serde_json::json!({
                "workflow": {
                    "metadata": {"name": "hello"},
                    "spec": {"entrypoint": "main", "templates": [{"name": "main"}]}
                }
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["metadata"]["name"], "hello");
}

#[tokio::test]
async fn invalid_workflows_fail_lint_without_a_cluster_call() {
    let server = MockServer::start().await;
    let app = server_app(&server).await;
    let response = app
        .router
        .oneshot(post_json(
            "/apis/gantry.io/v1/namespaces/dev/workflows/lint",
            serde_json::json!({
                "workflow": {"metadata": {"name": "wf"}, "spec": {}}
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "INVALID_ARGUMENT");
    assert!(body["message"].as_str().unwrap().contains("entrypoint"));
    // no mocks mounted: the control plane was never consulted
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_workflow_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/apis/gantry.io/v1/namespaces/dev/workflows/ghost"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "message": "workflows.gantry.io \"ghost\" not found"
        })))
        .mount(&server)
        .await;

    let app = server_app(&server).await;
    let response = app
        .router
        .oneshot(
            Request::get("/apis/gantry.io/v1/namespaces/dev/workflows/ghost")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}

#[tokio::test]
async fn workflow_tagged_for_another_instance_is_hidden() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/apis/gantry.io/v1/namespaces/dev/workflows/theirs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "metadata": {
                "name": "theirs",
                "namespace": "dev",
                "labels": {"workflows.gantry.io/controller-instanceid": "someone-else"}
            }
        })))
        .mount(&server)
        .await;

    let app = app_with_instance(
        &server,
        Modes { client: false, server: true, sso: false },
        "acme",
    )
    .await;
    let response = app
        .router
        .oneshot(
            Request::get("/apis/gantry.io/v1/namespaces/dev/workflows/theirs")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}

#[tokio::test]
async fn empty_instance_id_only_sees_untagged_workflows() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/apis/gantry.io/v1/namespaces/dev/workflows/tagged"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "metadata": {
                "name": "tagged",
                "namespace": "dev",
                "labels": {"workflows.gantry.io/controller-instanceid": "acme"}
            }
        })))
        .mount(&server)
        .await;

    let app = server_app(&server).await;
    let response = app
        .router
        .oneshot(
            Request::get("/apis/gantry.io/v1/namespaces/dev/workflows/tagged")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn listing_reads_the_live_store() {
    let server = MockServer::start().await;
    let app = server_app(&server).await;
    for name in ["wf-a", "wf-b"] {
        let wf: Workflow = serde_json::from_value(serde_json::json!({
            "metadata": {"name": name, "namespace": "dev", "uid": format!("uid-{name}")},
            "status": {"phase": "Succeeded"}
        }))
        .unwrap();
        app.state.live.upsert(&wf).await.unwrap();
    }

    let response = app
        .router
        .oneshot(
            Request::get("/apis/gantry.io/v1/namespaces/dev/workflows?listOptions.limit=10")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn paging_with_continue_tokens_covers_every_workflow_once() {
    let server = MockServer::start().await;
    let app = server_app(&server).await;
    for i in 0..5 {
        let wf: Workflow = serde_json::from_value(serde_json::json!({
            "metadata": {"name": format!("wf-{i}"), "namespace": "dev", "uid": format!("uid-{i}")},
            "status": {"phase": "Succeeded"}
        }))
        .unwrap();
        app.state.live.upsert(&wf).await.unwrap();
    }

    let mut seen = Vec::new();
    let mut token = String::new();
    loop {
        let uri = format!(
            "/apis/gantry.io/v1/namespaces/dev/workflows?listOptions.limit=2&listOptions.continue={token}"
        );
        let response = app
            .router
            .clone()
            .oneshot(Request::get(&uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let items = body["items"].as_array().unwrap();
        assert!(items.len() <= 2);
        for item in items {
            seen.push(item["metadata"]["name"].as_str().unwrap().to_string());
        }
        match body["metadata"]["continue"].as_str() {
            Some(next) if !next.is_empty() => token = next.to_string(),
            _ => break,
        }
    }

    seen.sort();
    assert_eq!(seen, ["wf-0", "wf-1", "wf-2", "wf-3", "wf-4"]);
}

#[tokio::test]
async fn disabled_mode_rejects_the_request() {
    let server = MockServer::start().await;
    // client-only server: an empty authorization header has no mode to run in
    let app = app_for(&server, Modes { client: true, server: false, sso: false }).await;
    let response = app
        .router
        .oneshot(Request::get("/api/v1/info").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "UNAUTHENTICATED");
}

#[tokio::test]
async fn info_reports_namespace_and_links() {
    let server = MockServer::start().await;
    let app = server_app(&server).await;
    let response = app
        .router
        .oneshot(Request::get("/api/v1/info").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["managedNamespace"], "argo");
    assert_eq!(body["links"][0]["url"], "https://docs.example.com");
}

#[tokio::test]
async fn sync_limit_get_reports_a_missing_key() {
    let server = MockServer::start().await;
    allow_access_reviews().mount(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces/dev/configmaps/limits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "metadata": {"name": "limits", "namespace": "dev"},
            "data": {"other": "5"}
        })))
        .mount(&server)
        .await;

    let app = server_app(&server).await;
    let response = app
        .router
        .oneshot(
            Request::get("/api/v1/sync-limits/dev/limits?key=parallel&type=configmap")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert!(body["message"].as_str().unwrap().contains("key \"parallel\" not found"));
}

#[tokio::test]
async fn sync_limit_create_rejects_a_non_positive_size() {
    let server = MockServer::start().await;
    allow_access_reviews().mount(&server).await;
    let app = server_app(&server).await;
    let response = app
        .router
        .oneshot(post_json(
            "/api/v1/sync-limits/dev",
            serde_json::json!({"name": "limits", "key": "parallel", "sizeLimit": 0}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("size limit must be greater than zero"));
}

#[tokio::test]
async fn sync_limit_create_conflicts_with_an_existing_key() {
    let server = MockServer::start().await;
    allow_access_reviews().mount(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces/dev/configmaps/sem"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "metadata": {"name": "sem", "namespace": "dev"},
            "data": {"bucket": "5"}
        })))
        .mount(&server)
        .await;

    let app = server_app(&server).await;
    let response = app
        .router
        .oneshot(post_json(
            "/api/v1/sync-limits/dev",
            serde_json::json!({"name": "sem", "key": "bucket", "sizeLimit": 3}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "ALREADY_EXISTS");
    // the conflicting create must not touch the configmap
    let puts = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method == wiremock::http::Method::PUT)
        .count();
    assert_eq!(puts, 0);
}

#[tokio::test]
async fn events_queue_until_full() {
    let server = MockServer::start().await;
    allow_access_reviews().mount(&server).await;
    let app = server_app(&server).await;

    for _ in 0..2 {
        let response = app
            .router
            .clone()
            .oneshot(post_json(
                "/apis/gantry.io/v1/events/dev",
                serde_json::json!({"build": {"status": "passed"}}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    // capacity is 2 and no consumer is draining
    let response = app
        .router
        .oneshot(post_json(
            "/apis/gantry.io/v1/events/dev",
            serde_json::json!({"build": {"status": "passed"}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_json(response).await["code"], "RESOURCE_EXHAUSTED");
}

#[tokio::test]
async fn stopping_a_completed_workflow_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/apis/gantry.io/v1/namespaces/dev/workflows/done"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "metadata": {"name": "done", "namespace": "dev"},
            "status": {"phase": "Succeeded"}
        })))
        .mount(&server)
        .await;

    let app = server_app(&server).await;
    let response = app
        .router
        .oneshot(put_json(
            "/apis/gantry.io/v1/namespaces/dev/workflows/done/stop",
            serde_json::json!({}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn version_is_public_within_the_running_mode() {
    let server = MockServer::start().await;
    let app = server_app(&server).await;
    let response = app
        .router
        .oneshot(Request::get("/api/v1/version").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}
