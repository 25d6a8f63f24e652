// SPDX-FileCopyrightText: 2026 Scribeflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON wire format for the realtime websocket.
//!
//! Every frame is a text message of the shape
//! `{"event": "<name>", "data": {...}}`. Unrecognized event names are
//! skipped at the transport layer rather than treated as protocol errors,
//! so the server can ship new event types without breaking older clients.

use serde::{Deserialize, Serialize};

use scribeflow_core::{LimitOrigin, UsageEvent, UsageNotification, UsageSeverity};

/// Server-to-client events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Usage crossed a soft warning threshold.
    UsageWarning(UsageEvent),
    /// Usage is approaching the hard limit.
    UsageLimitWarning(UsageEvent),
    /// The hard limit has been reached.
    UsageLimitExceeded(UsageEvent),
    /// Routine usage counter update.
    UsageUpdated(UsageEvent),
    /// The server accepted a replayed rotated credential.
    TokenRefreshed,
    /// The server rejected a replayed rotated credential.
    TokenRefreshError,
}

impl ServerEvent {
    /// Maps a usage-bearing event to its notification form, tagged as
    /// arriving over the push channel. Acks map to `None`.
    pub fn into_usage_notification(self) -> Option<UsageNotification> {
        let (severity, event) = match self {
            ServerEvent::UsageWarning(e) => (UsageSeverity::Warning, e),
            ServerEvent::UsageLimitWarning(e) => (UsageSeverity::LimitWarning, e),
            ServerEvent::UsageLimitExceeded(e) => (UsageSeverity::LimitExceeded, e),
            ServerEvent::UsageUpdated(e) => (UsageSeverity::Updated, e),
            ServerEvent::TokenRefreshed | ServerEvent::TokenRefreshError => return None,
        };
        Some(UsageNotification {
            severity,
            origin: LimitOrigin::Push,
            event,
        })
    }
}

/// Client-to-server events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Sent once immediately after the socket opens.
    Authenticate { token: String },
    /// Replays a rotated credential onto the live connection.
    RefreshToken { token: String },
}
