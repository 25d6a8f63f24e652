// SPDX-FileCopyrightText: 2026 Scribeflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared between the REST, streaming, and realtime layers.

use serde::{Deserialize, Serialize};

/// Bearer credential pair as returned by login and refresh.
///
/// Owned exclusively by [`crate::TokenStore`]; every other component reads
/// snapshots and funnels mutation through the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<&str>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.map(str::to_string),
        }
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

/// A server-pushed usage notification payload.
///
/// Transient: consumed by host UI state, never persisted by this layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UsageEvent {
    pub service: String,
    pub used: u64,
    pub limit: u64,
    pub percentage: f64,
    pub remaining: u64,
    pub message: String,
}

/// Severity of a usage notification, mirroring the server's event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageSeverity {
    /// Informational: usage is climbing.
    Warning,
    /// Will imminently exceed the plan limit.
    LimitWarning,
    /// Hard stop: the limit has been exceeded.
    LimitExceeded,
    /// Post-operation refresh hint.
    Updated,
}

/// Which channel reported a usage condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitOrigin {
    /// The generation stream's own error payload.
    Stream,
    /// The realtime push channel.
    Push,
}

/// The single event shape used for limit conditions regardless of whether
/// they were learned from the stream error path or the push channel.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageNotification {
    pub severity: UsageSeverity,
    pub origin: LimitOrigin,
    pub event: UsageEvent,
}

/// Connection status surfaced to the host application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    /// Connect failed with an auth-classified error; waiting for a credential
    /// rotation before another attempt is allowed.
    AuthErrorPending,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::AuthErrorPending => write!(f, "auth_error_pending"),
        }
    }
}
