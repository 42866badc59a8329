// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Request authentication.
//!
//! The gatekeeper turns an authorization header into a [`CallerContext`]
//! holding the control-plane client the request will run under and the
//! caller's claims. Handlers never touch the header themselves; the context
//! is attached as a request extension by [`middleware`].

pub mod modes;
pub mod ops;
pub mod policy;
pub mod sso;

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, info, warn};

use gantry_cluster::{ClusterClient, RestConfig};
use gantry_model::Claims;

use crate::error::ApiError;
use crate::event::expr;
use crate::server::AppState;
use modes::{Mode, Modes};
use sso::SsoVerifier;

/// Annotation selecting a service account for SSO RBAC, holding a boolean
/// expression over the caller's claims.
pub const ANNOTATION_RBAC_RULE: &str = "workflows.gantry.io/rbac-rule";
/// Annotation ordering RBAC service accounts; higher wins.
pub const ANNOTATION_RBAC_PRECEDENCE: &str = "workflows.gantry.io/rbac-rule-precedence";

/// Everything a handler needs to act on behalf of the caller.
#[derive(Clone)]
pub struct CallerContext {
    pub client: Arc<ClusterClient>,
    pub claims: Option<Claims>,
    pub mode: Mode,
}

pub struct Gatekeeper {
    modes: Modes,
    server_client: Arc<ClusterClient>,
    base_host: String,
    sso: Option<SsoVerifier>,
    /// Namespace searched for SSO RBAC service accounts.
    namespace: String,
}

impl Gatekeeper {
    pub fn new(
        modes: Modes,
        server_client: Arc<ClusterClient>,
        base_host: String,
        sso: Option<SsoVerifier>,
        namespace: String,
    ) -> Self {
        Gatekeeper {
            modes,
            server_client,
            base_host,
            sso,
            namespace,
        }
    }

    /// Pick the auth mode implied by the header shape. An empty header can
    /// only mean server mode; the SSO prefix always means SSO.
    fn mode_for(&self, authorization: &str) -> Option<Mode> {
        if authorization.is_empty() {
            return self.modes.accepts(Mode::Server).then_some(Mode::Server);
        }
        if authorization.starts_with(sso::PREFIX) {
            return self.modes.accepts(Mode::Sso).then_some(Mode::Sso);
        }
        if self.modes.accepts(Mode::Client) {
            return Some(Mode::Client);
        }
        self.modes.accepts(Mode::Server).then_some(Mode::Server)
    }

    pub async fn caller(&self, authorization: &str) -> Result<CallerContext, ApiError> {
        let mode = self
            .mode_for(authorization)
            .ok_or_else(|| ApiError::Unauthenticated("token not valid for running mode".into()))?;
        debug!(mode = %mode, "Authenticating request");
        match mode {
            Mode::Server => Ok(CallerContext {
                client: self.server_client.clone(),
                claims: None,
                mode,
            }),
            Mode::Client => {
                let config = RestConfig::from_authorization(authorization, &self.base_host)
                    .map_err(|e| ApiError::Unauthenticated(e.to_string()))?;
                let client = ClusterClient::new(&config)
                    .map_err(|e| ApiError::Unauthenticated(e.to_string()))?;
                let claims = config.bearer_token.as_deref().and_then(unverified_claims);
                Ok(CallerContext {
                    client: Arc::new(client),
                    claims,
                    mode,
                })
            }
            Mode::Sso => {
                let verifier = self
                    .sso
                    .as_ref()
                    .ok_or_else(|| ApiError::Unauthenticated("sso is not configured".into()))?;
                let mut claims = verifier.authorize(authorization)?;
                if let Some(claim_name) = &verifier.groups_claim
                    && let Some(groups) = claims.custom_groups(claim_name)
                {
                    claims.groups = groups;
                }
                let client = if verifier.rbac {
                    match self.exchange_for_service_account(&claims).await {
                        Ok((client, account)) => {
                            claims.service_account_name = Some(account);
                            claims.service_account_namespace = Some(self.namespace.clone());
                            client
                        }
                        Err(err) => {
                            warn!(error = %err, "RBAC authorization failed");
                            return Err(ApiError::PermissionDenied("not allowed".into()));
                        }
                    }
                } else {
                    self.server_client.clone()
                };
                Ok(CallerContext {
                    client,
                    claims: Some(claims),
                    mode,
                })
            }
        }
    }

    /// Exchange verified SSO claims for the credential of the first annotated
    /// service account whose rule expression matches, highest precedence
    /// first.
    async fn exchange_for_service_account(
        &self,
        claims: &Claims,
    ) -> Result<(Arc<ClusterClient>, String), ApiError> {
        let list = self
            .server_client
            .list_service_accounts(&self.namespace)
            .await?;
        let mut accounts: Vec<_> = list
            .items
            .into_iter()
            .filter(|sa| sa.metadata.annotation(ANNOTATION_RBAC_RULE).is_some())
            .collect();
        accounts.sort_by_key(|sa| {
            std::cmp::Reverse(
                sa.metadata
                    .annotation(ANNOTATION_RBAC_PRECEDENCE)
                    .and_then(|v| v.parse::<i64>().ok())
                    .unwrap_or(0),
            )
        });
        let env = claims.as_map();
        for account in accounts {
            let rule = account
                .metadata
                .annotation(ANNOTATION_RBAC_RULE)
                .unwrap_or_default()
                .to_string();
            let matched = expr::eval_bool(&rule, &env)
                .map_err(|e| ApiError::Internal(format!("bad rbac rule: {e}")))?;
            if !matched {
                continue;
            }
            let name = account.metadata.name.clone();
            let secret_name = account
                .secrets
                .first()
                .map(|s| s.name.clone())
                .ok_or_else(|| {
                    ApiError::Internal("rbac service account has no secret".into())
                })?;
            let secret = self
                .server_client
                .get_secret(&self.namespace, &secret_name)
                .await?;
            let token = secret
                .data
                .get("token")
                .and_then(|v| STANDARD.decode(v).ok())
                .and_then(|b| String::from_utf8(b).ok())
                .ok_or_else(|| ApiError::Internal("rbac secret has no token".into()))?;
            let config = RestConfig::server(&self.base_host, Some(token));
            let client = ClusterClient::new(&config)
                .map_err(|e| ApiError::Unauthenticated(e.to_string()))?;
            info!(service_account = %name, subject = %claims.subject, "Selected RBAC service account");
            return Ok((Arc::new(client), name));
        }
        Err(ApiError::PermissionDenied(
            "no service account rule matches".into(),
        ))
    }
}

/// Best-effort claim extraction from a caller-supplied JWT. The token is not
/// verified here; it only has to satisfy the control plane.
fn unverified_claims(token: &str) -> Option<Claims> {
    let payload = token.split('.').nth(1)?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Pull the authorization value from the header, falling back to the
/// `authorization` cookie so SSE requests from browsers work.
pub fn authorization_from(req: &Request) -> String {
    if let Some(value) = req.headers().get(header::AUTHORIZATION)
        && let Ok(value) = value.to_str()
    {
        return value.to_string();
    }
    for cookie_header in req.headers().get_all(header::COOKIE) {
        let Ok(raw) = cookie_header.to_str() else {
            continue;
        };
        for pair in raw.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=')
                && name == "authorization"
            {
                return value.to_string();
            }
        }
    }
    String::new()
}

/// Axum middleware attaching a [`CallerContext`] to every request.
pub async fn middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let authorization = authorization_from(&req);
    let caller = state.gatekeeper.caller(&authorization).await?;
    req.extensions_mut().insert(caller);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request(headers: &[(&str, &str)]) -> Request {
        let mut builder = axum::http::Request::builder().uri("/api/v1/info");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn header_wins_over_cookie() {
        let req = request(&[
            ("authorization", "Bearer abc"),
            ("cookie", "authorization=Bearer xyz"),
        ]);
        assert_eq!(authorization_from(&req), "Bearer abc");
    }

    #[test]
    fn cookie_is_used_when_header_is_absent() {
        let req = request(&[("cookie", "theme=dark; authorization=Bearer xyz")]);
        assert_eq!(authorization_from(&req), "Bearer xyz");
        let req = request(&[]);
        assert_eq!(authorization_from(&req), "");
    }

    #[test]
    fn unverified_claims_reads_the_payload() {
        // header.payload.signature with payload {"sub":"sa"}
        let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(b"{\"sub\":\"sa\"}");
        let token = format!("x.{payload}.y");
        let claims = unverified_claims(&token).unwrap();
        assert_eq!(claims.subject, "sa");
        assert!(unverified_claims("not-a-jwt").is_none());
    }
}
