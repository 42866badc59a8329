// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Router assembly.
//!
//! Resource endpoints live under `/apis/gantry.io/v1`, deployment endpoints
//! under `/api/v1`. The gatekeeper middleware covers everything, including
//! the artifact routes, so a handler can always expect a [`CallerContext`]
//! extension.

use std::sync::Arc;

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post, put};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::server::AppState;
use crate::{archive, artifacts, auth, cluster_template, cron, event, info, sync, template, workflow};

pub fn router(state: Arc<AppState>) -> Router {
    let workflows = Router::new()
        .route(
            "/namespaces/{namespace}/workflows",
            get(workflow::list).post(workflow::create),
        )
        .route("/namespaces/{namespace}/workflows/lint", post(workflow::lint))
        .route("/namespaces/{namespace}/workflows/submit", post(workflow::submit))
        .route(
            "/namespaces/{namespace}/workflows/{name}",
            get(workflow::get).delete(workflow::delete),
        )
        .route("/namespaces/{namespace}/workflows/{name}/retry", put(workflow::retry))
        .route(
            "/namespaces/{namespace}/workflows/{name}/resubmit",
            put(workflow::resubmit),
        )
        .route("/namespaces/{namespace}/workflows/{name}/resume", put(workflow::resume))
        .route(
            "/namespaces/{namespace}/workflows/{name}/suspend",
            put(workflow::suspend),
        )
        .route(
            "/namespaces/{namespace}/workflows/{name}/terminate",
            put(workflow::terminate),
        )
        .route("/namespaces/{namespace}/workflows/{name}/stop", put(workflow::stop))
        .route("/namespaces/{namespace}/workflows/{name}/set", put(workflow::set))
        .route(
            "/namespaces/{namespace}/workflows/{name}/{pod}/log",
            get(workflow::pod_logs),
        )
        .route("/workflow-events/{namespace}", get(workflow::watch));

    let templates = Router::new()
        .route(
            "/namespaces/{namespace}/workflow-templates",
            get(template::list).post(template::create),
        )
        .route(
            "/namespaces/{namespace}/workflow-templates/lint",
            post(template::lint),
        )
        .route(
            "/namespaces/{namespace}/workflow-templates/{name}",
            get(template::get).put(template::update).delete(template::delete),
        )
        .route(
            "/cluster-workflow-templates",
            get(cluster_template::list).post(cluster_template::create),
        )
        .route("/cluster-workflow-templates/lint", post(cluster_template::lint))
        .route(
            "/cluster-workflow-templates/{name}",
            get(cluster_template::get)
                .put(cluster_template::update)
                .delete(cluster_template::delete),
        )
        .route(
            "/namespaces/{namespace}/cron-workflows",
            get(cron::list).post(cron::create),
        )
        .route("/namespaces/{namespace}/cron-workflows/lint", post(cron::lint))
        .route(
            "/namespaces/{namespace}/cron-workflows/{name}",
            get(cron::get).put(cron::update).delete(cron::delete),
        )
        .route(
            "/namespaces/{namespace}/cron-workflows/{name}/suspend",
            put(cron::suspend),
        )
        .route(
            "/namespaces/{namespace}/cron-workflows/{name}/resume",
            put(cron::resume),
        );

    let archived = Router::new()
        .route("/archived-workflows", get(archive::list))
        .route(
            "/archived-workflows/{uid}",
            get(archive::get).delete(archive::delete),
        )
        .route("/archived-workflows/{uid}/resubmit", put(archive::resubmit))
        .route("/archived-workflows/{uid}/retry", put(archive::retry))
        .route("/archived-workflows-label-keys", get(archive::label_keys))
        .route("/archived-workflows-label-values", get(archive::label_values));

    let events = Router::new()
        .route(
            "/workflow-event-bindings/{namespace}",
            get(event::list_bindings),
        )
        .route("/events/{namespace}", post(event::receive_default))
        .route("/events/{namespace}/{discriminator}", post(event::receive));

    let resource_api = Router::new()
        .merge(workflows)
        .merge(templates)
        .merge(archived)
        .merge(events);

    let deployment_api = Router::new()
        .route("/info", get(info::get_info))
        .route("/userinfo", get(info::get_user_info))
        .route("/version", get(info::get_version))
        .route("/sync-limits/{namespace}", post(sync::create))
        .route(
            "/sync-limits/{namespace}/{name}",
            get(sync::get).put(sync::update).delete(sync::delete),
        );

    let artifact_api = Router::new()
        .route(
            "/artifacts/{namespace}/{name}/{node}/{artifact}",
            get(artifacts::get),
        )
        .route(
            "/artifacts-by-uid/{uid}/{node}/{artifact}",
            get(artifacts::get_by_uid),
        );

    Router::new()
        .nest("/apis/gantry.io/v1", resource_api)
        .nest("/api/v1", deployment_api)
        .merge(artifact_api)
        .layer(from_fn_with_state(state.clone(), auth::middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
