// SPDX-FileCopyrightText: 2026 Scribeflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Scribeflow client core.
//!
//! Transport and API failures are classified into a small, stable taxonomy
//! ([`ErrorKind`]) so that callers can decide on user-facing treatment
//! without string-matching. Every API error carries a deduplication key
//! (`kind:endpoint`) consumed by the notification center.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Classification of API and transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No network route at all (request never left the machine).
    NoInternet,
    /// Connection refused or reset at the network level.
    ServerDown,
    /// The request timed out.
    Timeout,
    /// 5xx other than 503.
    ServerError,
    /// 503 specifically (maintenance / overload).
    ServiceUnavailable,
    /// The refresh endpoint itself rejected the session.
    AuthFailed,
    /// 429. Logged, never surfaced to the user.
    RateLimited,
    /// Domain quota exhausted. Surfaced via the dedicated limit channel,
    /// never as a transport error.
    LimitExceeded,
    /// Anything that does not fit the above.
    Unknown,
}

impl ErrorKind {
    /// Maps an HTTP status code to a kind. 401 is handled by the refresh
    /// protocol before classification, so it maps to `AuthFailed` here only
    /// when it reaches the caller (i.e. the retry already failed).
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ErrorKind::AuthFailed,
            429 => ErrorKind::RateLimited,
            503 => ErrorKind::ServiceUnavailable,
            500..=599 => ErrorKind::ServerError,
            _ => ErrorKind::Unknown,
        }
    }

    /// A short user-facing message for this class of failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::NoInternet => "You appear to be offline. Check your connection.",
            ErrorKind::ServerDown => "Could not reach the server. Please try again shortly.",
            ErrorKind::Timeout => "The server took too long to respond.",
            ErrorKind::ServerError => "Something went wrong on our side. Please try again.",
            ErrorKind::ServiceUnavailable => "The service is temporarily unavailable.",
            ErrorKind::AuthFailed => "Your session has expired. Please sign in again.",
            ErrorKind::RateLimited => "Too many requests. Slow down a little.",
            ErrorKind::LimitExceeded => "You have reached your usage limit for this plan.",
            ErrorKind::Unknown => "An unexpected error occurred.",
        }
    }

    /// Whether this kind is ever shown to the user by the notification
    /// center. Rate limits are logged only, and offline state is owned by a
    /// dedicated network-status surface.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, ErrorKind::RateLimited | ErrorKind::NoInternet)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NoInternet => "no_internet",
            ErrorKind::ServerDown => "server_down",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ServerError => "server_error",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::AuthFailed => "auth_failed",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::LimitExceeded => "limit_exceeded",
            ErrorKind::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// The primary error type used across the Scribeflow crates.
#[derive(Debug, Error)]
pub enum ScribeflowError {
    /// Configuration errors (invalid TOML, missing required fields).
    #[error("configuration error: {0}")]
    Config(String),

    /// A classified REST/stream request failure.
    #[error("api error ({kind}) for {endpoint}: {message}")]
    Api {
        kind: ErrorKind,
        endpoint: String,
        /// HTTP status when the failure came from a response.
        status: Option<u16>,
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The refresh endpoint rejected the session. The credential store has
    /// already been cleared when this is returned.
    #[error("session expired, re-authentication required")]
    SessionExpired,

    /// Domain quota exhausted for a service.
    #[error("usage limit exceeded for {service}: {message}")]
    LimitExceeded { service: String, message: String },

    /// Malformed framing or payload on the streaming endpoint.
    #[error("stream protocol error: {0}")]
    Stream(String),

    /// Realtime transport failure.
    #[error("realtime error: {message}")]
    Realtime {
        message: String,
        /// True when the transport rejection looked like an auth failure.
        auth: bool,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// A bounded retry/poll gave up.
    #[error("gave up after {attempts} attempts")]
    Exhausted { attempts: usize },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ScribeflowError {
    /// Returns the taxonomy classification for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScribeflowError::Api { kind, .. } => *kind,
            ScribeflowError::SessionExpired => ErrorKind::AuthFailed,
            ScribeflowError::LimitExceeded { .. } => ErrorKind::LimitExceeded,
            ScribeflowError::Timeout { .. } => ErrorKind::Timeout,
            ScribeflowError::Realtime { auth: true, .. } => ErrorKind::AuthFailed,
            _ => ErrorKind::Unknown,
        }
    }

    /// Returns the HTTP status attached to this error, when any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ScribeflowError::Api { status, .. } => *status,
            _ => None,
        }
    }

    /// True when this error is an HTTP 401 that the refresh protocol should
    /// intercept.
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Stable deduplication key: one visible notification per kind/endpoint
    /// combination at a time. Errors without an endpoint context dedup on
    /// kind alone.
    pub fn dedup_key(&self) -> String {
        match self {
            ScribeflowError::Api { kind, endpoint, .. } => format!("{kind}:{endpoint}"),
            other => other.kind().to_string(),
        }
    }

    /// A message suitable for direct display to the user.
    pub fn user_message(&self) -> String {
        match self {
            ScribeflowError::LimitExceeded { message, .. } if !message.is_empty() => {
                message.clone()
            }
            other => other.kind().user_message().to_string(),
        }
    }
}
