// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deployment info, caller identity, and version endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Extension, State};
use serde::Serialize;

use crate::auth::CallerContext;
use crate::error::ApiError;
use crate::server::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub managed_namespace: String,
    pub links: Vec<Link>,
}

pub async fn get_info(State(state): State<Arc<AppState>>) -> Json<InfoResponse> {
    Json(InfoResponse {
        managed_namespace: state.config.managed_namespace.clone(),
        links: state
            .config
            .links
            .iter()
            .map(|(name, url)| Link { name: name.clone(), url: url.clone() })
            .collect(),
    })
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfoResponse {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub issuer: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub subject: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub email: String,
    pub email_verified: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub service_account_name: String,
}

pub async fn get_user_info(
    Extension(caller): Extension<CallerContext>,
) -> Result<Json<UserInfoResponse>, ApiError> {
    let mut info = UserInfoResponse::default();
    if let Some(claims) = &caller.claims {
        info.issuer = claims.issuer.clone();
        info.subject = claims.subject.clone();
        info.groups = claims.groups.clone();
        info.email = claims.email.clone().unwrap_or_default();
        info.email_verified = claims.email_verified.unwrap_or(false);
        info.service_account_name = claims.service_account_name.clone().unwrap_or_default();
    }
    Ok(Json(info))
}

#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: String,
}

pub async fn get_version() -> Json<VersionResponse> {
    Json(VersionResponse { version: env!("CARGO_PKG_VERSION").to_string() })
}
