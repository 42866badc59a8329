// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for gantry-server.

use std::net::SocketAddr;
use std::time::Duration;

use crate::auth::modes::Modes;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address for the HTTP API
    pub bind_addr: SocketAddr,
    /// Base URL of the control plane (required)
    pub cluster_host: String,
    /// Server credential used for `server` auth mode (optional)
    pub cluster_token: Option<String>,
    /// Accepted authentication modes
    pub auth_modes: Modes,
    /// Instance tag; when set, only resources carrying it are visible
    pub instance_id: String,
    /// Namespace the server manages; empty means all namespaces
    pub managed_namespace: String,
    /// Postgres URL for the workflow archive and database semaphores (optional)
    pub database_url: Option<String>,
    /// SSO token verification settings (required when `sso` mode is enabled)
    pub sso: Option<SsoConfig>,
    /// Path to a local RBAC policy document; selects the local policy engine
    pub policy_file: Option<String>,
    /// Capacity of the event submission queue
    pub event_queue_size: usize,
    /// Heartbeat window after which a semaphore controller counts as gone
    pub semaphore_inactivity: Duration,
    /// How often stale semaphore locks are swept
    pub lock_sweep_interval: Duration,
    /// Keepalive interval for SSE streams
    pub sse_keepalive: Duration,
    /// External links advertised by the info endpoint, `name=url` pairs
    pub links: Vec<(String, String)>,
}

/// SSO token verification settings.
#[derive(Debug, Clone)]
pub struct SsoConfig {
    /// HS256 shared secret the session tokens are signed with
    pub secret: String,
    /// Expected `iss` claim
    pub issuer: String,
    /// Expected `aud` claim
    pub audience: String,
    /// Exchange verified claims for a delegated credential via RBAC rules
    pub rbac: bool,
    /// Claim holding group membership when not the standard `groups`
    pub groups_claim: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port: u16 = std::env::var("GANTRY_PORT")
            .unwrap_or_else(|_| "2746".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;
        let bind_addr = SocketAddr::from(([0, 0, 0, 0], port));

        let cluster_host = std::env::var("GANTRY_CLUSTER_HOST")
            .map_err(|_| ConfigError::MissingEnvVar("GANTRY_CLUSTER_HOST"))?;
        let cluster_token = std::env::var("GANTRY_CLUSTER_TOKEN").ok();

        let auth_modes: Modes = std::env::var("GANTRY_AUTH_MODES")
            .unwrap_or_else(|_| "server".to_string())
            .parse()
            .map_err(ConfigError::InvalidAuthMode)?;

        let instance_id = std::env::var("GANTRY_INSTANCE_ID").unwrap_or_default();
        let managed_namespace = std::env::var("GANTRY_MANAGED_NAMESPACE").unwrap_or_default();
        let database_url = std::env::var("GANTRY_DATABASE_URL").ok();

        let sso = match std::env::var("GANTRY_SSO_SECRET") {
            Ok(secret) => Some(SsoConfig {
                secret,
                issuer: std::env::var("GANTRY_SSO_ISSUER")
                    .map_err(|_| ConfigError::MissingEnvVar("GANTRY_SSO_ISSUER"))?,
                audience: std::env::var("GANTRY_SSO_AUDIENCE")
                    .map_err(|_| ConfigError::MissingEnvVar("GANTRY_SSO_AUDIENCE"))?,
                rbac: std::env::var("GANTRY_SSO_RBAC")
                    .map(|v| v == "true" || v == "1")
                    .unwrap_or(false),
                groups_claim: std::env::var("GANTRY_SSO_GROUPS_CLAIM").ok(),
            }),
            Err(_) => None,
        };
        if auth_modes.sso && sso.is_none() {
            return Err(ConfigError::MissingEnvVar("GANTRY_SSO_SECRET"));
        }

        let policy_file = std::env::var("GANTRY_POLICY_FILE").ok();

        let event_queue_size: usize = std::env::var("GANTRY_EVENT_QUEUE_SIZE")
            .unwrap_or_else(|_| "64".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidNumber("GANTRY_EVENT_QUEUE_SIZE"))?;

        let semaphore_inactivity = duration_var("GANTRY_SEMAPHORE_INACTIVITY_SECS", 300)?;
        let lock_sweep_interval = duration_var("GANTRY_LOCK_SWEEP_INTERVAL_SECS", 60)?;
        let sse_keepalive = duration_var("GANTRY_SSE_KEEPALIVE_SECS", 30)?;

        let links = std::env::var("GANTRY_LINKS")
            .map(|raw| parse_links(&raw))
            .unwrap_or_default();

        Ok(Self {
            bind_addr,
            cluster_host,
            cluster_token,
            auth_modes,
            instance_id,
            managed_namespace,
            database_url,
            sso,
            policy_file,
            event_queue_size,
            semaphore_inactivity,
            lock_sweep_interval,
            sse_keepalive,
            links,
        })
    }
}

fn duration_var(name: &'static str, default_secs: u64) -> Result<Duration, ConfigError> {
    let secs: u64 = std::env::var(name)
        .unwrap_or_else(|_| default_secs.to_string())
        .parse()
        .map_err(|_| ConfigError::InvalidNumber(name))?;
    Ok(Duration::from_secs(secs))
}

fn parse_links(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|pair| {
            let (name, url) = pair.split_once('=')?;
            let (name, url) = (name.trim(), url.trim());
            if name.is_empty() || url.is_empty() {
                return None;
            }
            Some((name.to_string(), url.to_string()))
        })
        .collect()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
    /// The port number is invalid.
    #[error("Invalid port number")]
    InvalidPort,
    /// A numeric environment variable failed to parse.
    #[error("Invalid numeric value for {0}")]
    InvalidNumber(&'static str),
    /// An unknown auth mode was listed.
    #[error("Invalid auth mode: {0}")]
    InvalidAuthMode(String),
}
