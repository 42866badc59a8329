// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use thiserror::Error;

/// Errors from control-plane calls. The upstream HTTP status is retained
/// so the server can map it into its own error taxonomy.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("control plane returned {status}: {message}")]
    Http { status: u16, message: String },

    #[error("control plane unreachable: {0}")]
    Network(String),

    #[error("failed to decode control plane response: {0}")]
    Decode(String),

    #[error("credential rejected: {0}")]
    Credential(String),
}

impl ClusterError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClusterError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether a retry could plausibly succeed. Network failures, server
    /// errors, conflicts and throttling qualify.
    pub fn is_transient(&self) -> bool {
        match self {
            ClusterError::Network(_) => true,
            ClusterError::Http { status, .. } => {
                *status >= 500 || *status == 409 || *status == 429
            }
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::Http { status: 404, .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ClusterError::Http { status: 409, .. })
    }
}

impl From<reqwest::Error> for ClusterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClusterError::Decode(err.to_string())
        } else {
            // reqwest error text can embed the full URL; keep the message
            // but it never contains credential material.
            ClusterError::Network(err.to_string())
        }
    }
}
