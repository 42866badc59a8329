// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Server assembly and lifecycle.
//!
//! [`Server::build`] wires the clients, stores, and policy engine into an
//! [`AppState`]; [`Server::run`] serves the API and owns the background
//! tasks: the watch feeder keeping the live store current, the event
//! consumer, and the semaphore lock sweeper. `run` resolves when the
//! shutdown future does; it never exits the process itself.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use futures::StreamExt;
use tokio::sync::{Notify, mpsc};
use tracing::{error, info, warn};

use gantry_cluster::{ClusterClient, RestConfig, WatchEventType};
use gantry_model::{InstanceTag, ObjectMeta};
use gantry_store::{LiveWorkflowStore, SemaphoreStore, WorkflowArchive};

use crate::artifacts::ArtifactRegistry;
use crate::auth::ops::Operation;
use crate::auth::policy::{PolicyDocument, PolicyEngine};
use crate::auth::sso::SsoVerifier;
use crate::auth::{CallerContext, Gatekeeper};
use crate::config::Config;
use crate::error::ApiError;
use crate::event::{EventEnvelope, EventQueue};
use crate::{event, routes};

/// Delay before the watch feeder reconnects after a stream failure.
const WATCH_RECONNECT_DELAY: Duration = Duration::from_secs(5);

pub struct AppState {
    pub config: Config,
    pub instance: InstanceTag,
    pub gatekeeper: Gatekeeper,
    pub policy: PolicyEngine,
    pub server_client: Arc<ClusterClient>,
    pub live: LiveWorkflowStore,
    pub archive: Option<WorkflowArchive>,
    pub semaphores: Option<SemaphoreStore>,
    pub events: EventQueue,
    pub artifacts: ArtifactRegistry,
}

impl AppState {
    /// Resolve the namespace a request targets. An explicit namespace wins;
    /// an empty one falls back to the managed namespace, or all namespaces
    /// when none is configured.
    pub fn effective_namespace(&self, namespace: &str) -> String {
        if !namespace.is_empty() {
            return namespace.to_string();
        }
        self.config.managed_namespace.clone()
    }

    /// Policy check for operations the control plane authorizes anyway under
    /// the caller's own credential. Only the local engine adds a decision
    /// here; the delegated engine would double-bill every request with an
    /// access review the control plane is about to repeat.
    pub async fn enforce_local(
        &self,
        caller: &CallerContext,
        op: Operation,
        namespace: &str,
        name: &str,
    ) -> Result<(), ApiError> {
        match &self.policy {
            PolicyEngine::Delegated => Ok(()),
            PolicyEngine::Local(_) => self.policy.check(caller, op, namespace, name).await,
        }
    }

    /// Tenancy gate on an object read back from the cluster. A resource
    /// tagged for another instance is reported as missing.
    pub fn claim(&self, meta: &ObjectMeta, kind: &str, name: &str) -> Result<(), ApiError> {
        if self.instance.owns(meta) {
            Ok(())
        } else {
            Err(ApiError::NotFound(format!("{kind} {name:?} not found")))
        }
    }
}

pub struct Server {
    state: Arc<AppState>,
    event_rx: mpsc::Receiver<EventEnvelope>,
}

impl Server {
    pub async fn build(config: Config) -> anyhow::Result<Server> {
        let rest = RestConfig::server(&config.cluster_host, config.cluster_token.clone());
        let server_client = Arc::new(
            ClusterClient::new(&rest).context("building control plane client")?,
        );

        let policy = match &config.policy_file {
            Some(path) => {
                let doc = PolicyDocument::load(path)
                    .with_context(|| format!("loading policy document from {path}"))?;
                info!(statements = doc.statements.len(), "Using local policy engine");
                PolicyEngine::Local(doc)
            }
            None => PolicyEngine::Delegated,
        };

        let sso = config.sso.as_ref().map(SsoVerifier::new);
        let gatekeeper = Gatekeeper::new(
            config.auth_modes,
            server_client.clone(),
            config.cluster_host.clone(),
            sso,
            config.managed_namespace.clone(),
        );

        let instance = InstanceTag::new(Some(config.instance_id.clone()));
        let live = LiveWorkflowStore::new_in_memory(&config.instance_id)
            .await
            .context("opening live workflow store")?;

        let (archive, semaphores) = match &config.database_url {
            Some(url) => {
                let pool = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await
                    .context("connecting to database")?;
                gantry_store::migrations::run_postgres(&pool)
                    .await
                    .context("running migrations")?;
                info!("Connected to database");
                (
                    Some(WorkflowArchive::new(pool.clone(), &config.instance_id)),
                    Some(SemaphoreStore::new(pool)),
                )
            }
            None => {
                info!("No database configured; archive and database semaphores disabled");
                (None, None)
            }
        };

        let (events, event_rx) = EventQueue::new(config.event_queue_size);

        let state = Arc::new(AppState {
            instance,
            gatekeeper,
            policy,
            server_client,
            live,
            archive,
            semaphores,
            events,
            artifacts: ArtifactRegistry::new(),
            config,
        });
        Ok(Server { state, event_rx })
    }

    /// Serve until `shutdown` resolves, then stop the background tasks and
    /// drain the event queue.
    pub async fn run(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let Server { state, event_rx } = self;
        let stop = Arc::new(Notify::new());

        let consumer = tokio::spawn(event::run_consumer(event_rx, state.instance.clone()));
        let feeder = tokio::spawn(watch_feeder(state.clone(), stop.clone()));
        let sweeper = state.semaphores.clone().map(|semaphores| {
            tokio::spawn(lock_sweeper(
                semaphores,
                state.config.lock_sweep_interval,
                state.config.semaphore_inactivity,
                stop.clone(),
            ))
        });

        let app = routes::router(state.clone());
        let listener = tokio::net::TcpListener::bind(state.config.bind_addr)
            .await
            .context("binding listen address")?;
        info!(addr = %state.config.bind_addr, "API server ready");
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .context("serving")?;

        stop.notify_waiters();
        // dropping the state drops the queue sender, which lets the consumer
        // finish whatever is already queued
        drop(state);
        feeder.await.ok();
        if let Some(sweeper) = sweeper {
            sweeper.await.ok();
        }
        consumer.await.ok();
        Ok(())
    }
}

/// Mirror the control plane's workflows into the live store: one full list
/// on (re)connect, then incremental watch events.
async fn watch_feeder(state: Arc<AppState>, stop: Arc<Notify>) {
    let namespace = state.config.managed_namespace.clone();
    let selector = state.instance.selector();
    loop {
        let seeded = async {
            let list = state
                .server_client
                .list_workflows(&namespace, &selector)
                .await?;
            state.live.replace_all(&list.items).await?;
            info!(count = list.items.len(), "Seeded live workflow store");
            Ok::<_, anyhow::Error>(())
        };
        tokio::select! {
            result = seeded => {
                if let Err(err) = result {
                    warn!(error = %err, "Seeding live store failed");
                    tokio::select! {
                        _ = tokio::time::sleep(WATCH_RECONNECT_DELAY) => continue,
                        _ = stop.notified() => return,
                    }
                }
            }
            _ = stop.notified() => return,
        }

        let mut stream = state.server_client.watch_workflows(&namespace, &selector);
        loop {
            let event = tokio::select! {
                event = stream.next() => event,
                _ = stop.notified() => return,
            };
            match event {
                Some(Ok(watch_event)) => {
                    let Some(wf) = watch_event.workflow() else {
                        continue;
                    };
                    let result = match watch_event.event_type {
                        WatchEventType::Deleted => state.live.delete(&wf.metadata.uid).await,
                        WatchEventType::Added | WatchEventType::Modified => {
                            state.live.upsert(&wf).await
                        }
                        WatchEventType::Bookmark | WatchEventType::Error => Ok(()),
                    };
                    if let Err(err) = result {
                        error!(error = %err, workflow = %wf.metadata.name, "Live store update failed");
                    }
                }
                Some(Err(err)) => {
                    warn!(error = %err, "Workflow watch failed; reconnecting");
                    break;
                }
                None => {
                    warn!("Workflow watch ended; reconnecting");
                    break;
                }
            }
        }
        tokio::select! {
            _ = tokio::time::sleep(WATCH_RECONNECT_DELAY) => {}
            _ = stop.notified() => return,
        }
    }
}

/// Periodically reclaim semaphore locks held by controllers that stopped
/// heartbeating.
async fn lock_sweeper(
    semaphores: SemaphoreStore,
    interval: Duration,
    inactivity_window: Duration,
    stop: Arc<Notify>,
) {
    let window =
        chrono::TimeDelta::from_std(inactivity_window).unwrap_or(chrono::TimeDelta::MAX);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = semaphores.expire_stale_locks(window).await {
                    error!(error = %err, "Semaphore lock sweep failed");
                }
            }
            _ = stop.notified() => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::modes::Modes;
    use gantry_model::Claims;

    async fn state_with(policy: PolicyEngine, managed: &str) -> AppState {
        let config = Config {
            bind_addr: ([127, 0, 0, 1], 0).into(),
            cluster_host: "https://cluster.example.com".into(),
            cluster_token: None,
            auth_modes: Modes { client: false, server: true, sso: false },
            instance_id: String::new(),
            managed_namespace: managed.to_string(),
            database_url: None,
            sso: None,
            policy_file: None,
            event_queue_size: 4,
            semaphore_inactivity: Duration::from_secs(300),
            lock_sweep_interval: Duration::from_secs(60),
            sse_keepalive: Duration::from_secs(30),
            links: Vec::new(),
        };
        let rest = RestConfig::server(&config.cluster_host, None);
        let client = Arc::new(ClusterClient::new(&rest).unwrap());
        let gatekeeper = Gatekeeper::new(
            config.auth_modes,
            client.clone(),
            config.cluster_host.clone(),
            None,
            String::new(),
        );
        let live = LiveWorkflowStore::new_in_memory("").await.unwrap();
        let (events, _rx) = EventQueue::new(config.event_queue_size);
        AppState {
            instance: InstanceTag::new(None),
            gatekeeper,
            policy,
            server_client: client,
            live,
            archive: None,
            semaphores: None,
            events,
            artifacts: ArtifactRegistry::new(),
            config,
        }
    }

    #[tokio::test]
    async fn effective_namespace_prefers_the_explicit_one() {
        let state = state_with(PolicyEngine::Delegated, "argo").await;
        assert_eq!(state.effective_namespace("dev"), "dev");
        assert_eq!(state.effective_namespace(""), "argo");

        let open = state_with(PolicyEngine::Delegated, "").await;
        assert_eq!(open.effective_namespace(""), "");
    }

    #[tokio::test]
    async fn enforce_local_is_a_no_op_for_the_delegated_engine() {
        let state = state_with(PolicyEngine::Delegated, "").await;
        let caller = CallerContext {
            client: state.server_client.clone(),
            claims: None,
            mode: crate::auth::modes::Mode::Server,
        };
        state
            .enforce_local(&caller, Operation::CreateWorkflow, "dev", "")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn enforce_local_applies_the_local_document() {
        let doc: PolicyDocument = serde_json::from_value(serde_json::json!({
            "statements": [
                {"subjects": ["alice"], "verbs": ["create"], "resources": ["workflows"]}
            ]
        }))
        .unwrap();
        let state = state_with(PolicyEngine::Local(doc), "").await;
        let caller = CallerContext {
            client: state.server_client.clone(),
            claims: Some(Claims { subject: "alice".into(), ..Default::default() }),
            mode: crate::auth::modes::Mode::Sso,
        };
        state
            .enforce_local(&caller, Operation::CreateWorkflow, "dev", "")
            .await
            .unwrap();
        let err = state
            .enforce_local(&caller, Operation::DeleteWorkflow, "dev", "wf")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PERMISSION_DENIED");
    }
}
