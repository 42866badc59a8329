// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SSO session token verification.
//!
//! Session tokens are issued out of band and presented as
//! `Bearer v2:<base64(deflate(jwt))>`. The inner JWT is HS256-signed with the
//! shared secret and must carry the configured issuer and audience.

use std::io::Read;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use flate2::read::DeflateDecoder;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};

use gantry_model::Claims;

use crate::config::SsoConfig;
use crate::error::ApiError;

/// Marker for SSO session tokens in the authorization header.
pub const PREFIX: &str = "Bearer v2:";

pub struct SsoVerifier {
    key: DecodingKey,
    validation: Validation,
    pub rbac: bool,
    pub groups_claim: Option<String>,
}

impl SsoVerifier {
    pub fn new(config: &SsoConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&config.issuer]);
        validation.set_audience(&[&config.audience]);
        SsoVerifier {
            key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            rbac: config.rbac,
            groups_claim: config.groups_claim.clone(),
        }
    }

    /// Verify a session token and return its claims.
    ///
    /// Failure messages never echo token material.
    pub fn authorize(&self, authorization: &str) -> Result<Claims, ApiError> {
        let encoded = authorization
            .strip_prefix(PREFIX)
            .ok_or_else(|| ApiError::Unauthenticated("malformed session token".into()))?;
        let compressed = STANDARD
            .decode(encoded)
            .map_err(|_| ApiError::Unauthenticated("malformed session token".into()))?;
        let mut jwt = String::new();
        DeflateDecoder::new(&compressed[..])
            .read_to_string(&mut jwt)
            .map_err(|_| ApiError::Unauthenticated("malformed session token".into()))?;
        let token = jsonwebtoken::decode::<Claims>(&jwt, &self.key, &self.validation)
            .map_err(|_| ApiError::Unauthenticated("session token rejected".into()))?;
        Ok(token.claims)
    }
}
