// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! REST configuration for control-plane access and the decoding of
//! caller-supplied credentials into one.
//!
//! A caller-supplied configuration is never trusted as-is: anything that
//! would make the server read its own filesystem or talk to itself is
//! rejected before a client is built. Rejection messages never echo the
//! offending values.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::error::ClusterError;

/// Connection settings for the control plane. The file-path fields exist
/// only so that caller-supplied documents carrying them can be detected
/// and refused; the server's own config never sets them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub insecure: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ca_file: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cert_file: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key_file: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bearer_token_file: String,
}

impl RestConfig {
    /// The server's own configuration: host plus its service credential.
    pub fn server(host: &str, bearer_token: Option<String>) -> Self {
        RestConfig {
            host: host.to_string(),
            bearer_token,
            ..Default::default()
        }
    }

    /// Build a configuration from an inbound `Authorization` value.
    ///
    /// `Bearer <b64>` decoding to a JSON document is treated as a full
    /// caller-supplied configuration and sanitized. Any other bearer value
    /// is a plain token; `Basic <b64 user:pass>` carries basic credentials.
    /// Both of the latter inherit the server's host.
    pub fn from_authorization(authorization: &str, base_host: &str) -> Result<Self, ClusterError> {
        if let Some(token) = strip_scheme(authorization, "Bearer") {
            if let Some(config) = decode_embedded_config(token) {
                config.sanitize()?;
                if config.host.is_empty() {
                    return Err(ClusterError::Credential(
                        "rest config is missing a host".to_string(),
                    ));
                }
                return Ok(config);
            }
            if token.is_empty() {
                return Err(ClusterError::Credential("empty bearer token".to_string()));
            }
            return Ok(RestConfig {
                host: base_host.to_string(),
                bearer_token: Some(token.to_string()),
                ..Default::default()
            });
        }
        if let Some(token) = strip_scheme(authorization, "Basic") {
            let decoded = BASE64
                .decode(token)
                .map_err(|_| ClusterError::Credential("malformed basic credentials".to_string()))?;
            let decoded = String::from_utf8(decoded)
                .map_err(|_| ClusterError::Credential("malformed basic credentials".to_string()))?;
            let (user, pass) = decoded
                .split_once(':')
                .ok_or_else(|| ClusterError::Credential("malformed basic credentials".to_string()))?;
            return Ok(RestConfig {
                host: base_host.to_string(),
                username: Some(user.to_string()),
                password: Some(pass.to_string()),
                ..Default::default()
            });
        }
        Err(ClusterError::Credential(
            "unsupported authorization scheme".to_string(),
        ))
    }

    /// Refuse configurations that reference the server's filesystem or a
    /// loopback host. Both would let a remote caller act with the server's
    /// own identity.
    pub fn sanitize(&self) -> Result<(), ClusterError> {
        if !self.ca_file.is_empty()
            || !self.cert_file.is_empty()
            || !self.key_file.is_empty()
            || !self.bearer_token_file.is_empty()
        {
            return Err(ClusterError::Credential(
                "rest config must not reference local files".to_string(),
            ));
        }
        if !self.host.is_empty() && is_loopback_host(&self.host) {
            return Err(ClusterError::Credential(
                "rest config must not target a loopback host".to_string(),
            ));
        }
        Ok(())
    }

    /// `Authorization` header value for outbound requests, if any.
    pub fn auth_header(&self) -> Option<String> {
        if let Some(token) = &self.bearer_token {
            return Some(format!("Bearer {token}"));
        }
        if let Some(user) = &self.username {
            let pass = self.password.as_deref().unwrap_or("");
            return Some(format!("Basic {}", BASE64.encode(format!("{user}:{pass}"))));
        }
        None
    }
}

fn strip_scheme<'a>(authorization: &'a str, scheme: &str) -> Option<&'a str> {
    let rest = authorization.strip_prefix(scheme)?;
    if !rest.is_empty() && !rest.starts_with(' ') {
        return None;
    }
    Some(rest.trim())
}

fn decode_embedded_config(token: &str) -> Option<RestConfig> {
    let bytes = BASE64.decode(token).ok()?;
    // only a JSON object is a candidate; a random token that happens to
    // be valid base64 will not start with '{'
    if bytes.first() != Some(&b'{') {
        return None;
    }
    serde_json::from_slice(&bytes).ok()
}

fn is_loopback_host(host: &str) -> bool {
    let host = url::Url::parse(host)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| host.split(':').next().unwrap_or(host).to_string());
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    host.parse::<std::net::IpAddr>()
        .map(|ip| ip.is_loopback())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_config(config: &serde_json::Value) -> String {
        format!("Bearer {}", BASE64.encode(config.to_string()))
    }

    #[test]
    fn plain_bearer_inherits_base_host() {
        let config = RestConfig::from_authorization("Bearer abc123", "https://cluster:6443").unwrap();
        assert_eq!(config.host, "https://cluster:6443");
        assert_eq!(config.bearer_token.as_deref(), Some("abc123"));
        assert_eq!(config.auth_header().unwrap(), "Bearer abc123");
    }

    #[test]
    fn basic_credentials_decode() {
        let token = BASE64.encode("alice:s3cret");
        let config =
            RestConfig::from_authorization(&format!("Basic {token}"), "https://cluster").unwrap();
        assert_eq!(config.username.as_deref(), Some("alice"));
        assert_eq!(config.password.as_deref(), Some("s3cret"));
    }

    #[test]
    fn embedded_config_with_ca_file_is_rejected() {
        let auth = encode_config(&serde_json::json!({
            "host": "https://cluster:6443",
            "caFile": "/etc/ssl/ca.pem"
        }));
        let err = RestConfig::from_authorization(&auth, "https://base").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("local files"), "{msg}");
        assert!(!msg.contains("/etc/ssl"), "must not echo the path: {msg}");
    }

    #[test]
    fn embedded_config_with_loopback_host_is_rejected() {
        for host in ["https://127.0.0.1:6443", "https://localhost:6443", "http://[::1]:8080"] {
            let auth = encode_config(&serde_json::json!({ "host": host, "bearerToken": "t" }));
            let err = RestConfig::from_authorization(&auth, "https://base").unwrap_err();
            assert!(err.to_string().contains("loopback"), "{host}");
        }
    }

    #[test]
    fn embedded_config_with_remote_host_is_accepted() {
        let auth = encode_config(&serde_json::json!({
            "host": "https://other-cluster:6443",
            "bearerToken": "tok"
        }));
        let config = RestConfig::from_authorization(&auth, "https://base").unwrap();
        assert_eq!(config.host, "https://other-cluster:6443");
    }

    #[test]
    fn unsupported_scheme_rejected() {
        assert!(RestConfig::from_authorization("Digest abc", "https://base").is_err());
        assert!(RestConfig::from_authorization("Bearer ", "https://base").is_err());
    }
}
