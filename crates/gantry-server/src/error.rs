// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! API error taxonomy and its HTTP rendering.
//!
//! Every handler returns `ApiError`; control-plane failures, store failures
//! and request parsing failures all fold into it through `From` impls so the
//! status code a client sees is decided in exactly one place.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use gantry_cluster::ClusterError;
use gantry_model::{ListOptionsError, SelectorError};
use gantry_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    PermissionDenied(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    AlreadyExists(String),
    #[error("{0}")]
    ResourceExhausted(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidArgument(_) => "INVALID_ARGUMENT",
            ApiError::Unauthenticated(_) => "UNAUTHENTICATED",
            ApiError::PermissionDenied(_) => "PERMISSION_DENIED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::AlreadyExists(_) => "ALREADY_EXISTS",
            ApiError::ResourceExhausted(_) => "RESOURCE_EXHAUSTED",
            ApiError::Unavailable(_) => "UNAVAILABLE",
            ApiError::Internal(_) => "INTERNAL",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            ApiError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::AlreadyExists(_) => StatusCode::CONFLICT,
            ApiError::ResourceExhausted(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Classify an upstream HTTP status. The mapping is fixed: redirects are
    /// treated as internal misconfiguration, unlisted 4xx as bad requests.
    pub fn from_upstream_status(status: u16, message: String) -> ApiError {
        match status {
            401 => ApiError::Unauthenticated(message),
            403 => ApiError::PermissionDenied(message),
            404 => ApiError::NotFound(message),
            409 => ApiError::AlreadyExists(message),
            429 => ApiError::ResourceExhausted(message),
            300..=399 => ApiError::Internal(message),
            400..=499 => ApiError::InvalidArgument(message),
            _ => ApiError::Internal(message),
        }
    }
}

impl From<ClusterError> for ApiError {
    fn from(err: ClusterError) -> Self {
        match err {
            ClusterError::Http { status, message } => {
                ApiError::from_upstream_status(status, message)
            }
            ClusterError::Network(message) => ApiError::Unavailable(message),
            ClusterError::Decode(message) => ApiError::Internal(message),
            ClusterError::Credential(message) => ApiError::Unauthenticated(message),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            StoreError::AlreadyExists { .. } => ApiError::AlreadyExists(err.to_string()),
            StoreError::Corrupt { .. } => ApiError::InvalidArgument(err.to_string()),
            StoreError::Database(e) => ApiError::Internal(e.to_string()),
            StoreError::Decode(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<ListOptionsError> for ApiError {
    fn from(err: ListOptionsError) -> Self {
        ApiError::InvalidArgument(err.to_string())
    }
}

impl From<SelectorError> for ApiError {
    fn from(err: SelectorError) -> Self {
        ApiError::InvalidArgument(err.to_string())
    }
}

impl From<gantry_model::ModelError> for ApiError {
    fn from(err: gantry_model::ModelError) -> Self {
        ApiError::InvalidArgument(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        let body = Json(json!({
            "code": self.code(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_status_mapping_is_fixed() {
        let cases: &[(u16, &str)] = &[
            (301, "INTERNAL"),
            (400, "INVALID_ARGUMENT"),
            (401, "UNAUTHENTICATED"),
            (403, "PERMISSION_DENIED"),
            (404, "NOT_FOUND"),
            (409, "ALREADY_EXISTS"),
            (410, "INVALID_ARGUMENT"),
            (422, "INVALID_ARGUMENT"),
            (429, "RESOURCE_EXHAUSTED"),
            (500, "INTERNAL"),
            (503, "INTERNAL"),
        ];
        for (status, code) in cases {
            let err = ApiError::from_upstream_status(*status, "x".into());
            assert_eq!(err.code(), *code, "status {status}");
        }
    }

    #[test]
    fn cluster_errors_keep_their_class() {
        let err: ApiError = ClusterError::Http {
            status: 404,
            message: "workflows.gantry.io \"x\" not found".into(),
        }
        .into();
        assert_eq!(err.http_status(), StatusCode::NOT_FOUND);

        let err: ApiError = ClusterError::Network("connection refused".into()).into();
        assert_eq!(err.http_status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn store_not_found_maps_to_404() {
        let err: ApiError = StoreError::not_found("workflows", "uid-1").into();
        assert_eq!(err.http_status(), StatusCode::NOT_FOUND);
        let err: ApiError = StoreError::already_exists("semaphores", "lim").into();
        assert_eq!(err.http_status(), StatusCode::CONFLICT);
    }
}
