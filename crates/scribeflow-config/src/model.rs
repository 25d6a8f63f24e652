// SPDX-FileCopyrightText: 2026 Scribeflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Scribeflow client.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Scribeflow configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScribeflowConfig {
    /// REST and streaming API endpoint settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Typing reconciler pacing settings.
    #[serde(default)]
    pub typing: TypingConfig,

    /// Realtime connection and orchestration settings.
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

/// REST/streaming API endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    /// Base URL for REST and streaming calls, including the path prefix.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Explicit realtime endpoint. When unset, derived from `base_url` by
    /// swapping the scheme to ws(s) and dropping the path prefix: the
    /// realtime transport connects at the API host root.
    #[serde(default)]
    pub realtime_url: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl ApiConfig {
    /// Resolves the realtime endpoint: explicit override, or the API host
    /// root with a websocket scheme.
    pub fn realtime_endpoint(&self) -> String {
        if let Some(url) = &self.realtime_url {
            return url.clone();
        }

        let (scheme, rest) = match self.base_url.split_once("://") {
            Some(("https", rest)) => ("wss", rest),
            Some((_, rest)) => ("ws", rest),
            None => ("ws", self.base_url.as_str()),
        };
        let host = rest.split('/').next().unwrap_or(rest);
        format!("{scheme}://{host}")
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            realtime_url: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:5000/api".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Typing reconciler pacing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TypingConfig {
    /// Minimum interval between reveal ticks in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Backlog size (in characters) above which the reveal step escalates
    /// to its maximum. Half of this value triggers the intermediate step.
    #[serde(default = "default_high_watermark")]
    pub high_watermark: usize,

    /// Characters of slack left behind by the completion fast-forward.
    #[serde(default = "default_completion_slack")]
    pub completion_slack: usize,

    /// Delay before the final snap-to-end after completion, in milliseconds.
    #[serde(default = "default_grace_delay_ms")]
    pub grace_delay_ms: u64,
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            high_watermark: default_high_watermark(),
            completion_slack: default_completion_slack(),
            grace_delay_ms: default_grace_delay_ms(),
        }
    }
}

fn default_tick_interval_ms() -> u64 {
    20
}

fn default_high_watermark() -> usize {
    200
}

fn default_completion_slack() -> usize {
    12
}

fn default_grace_delay_ms() -> u64 {
    250
}

/// Realtime connection and session orchestration configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RealtimeConfig {
    /// Maximum connect attempts per credential before manual intervention.
    #[serde(default = "default_max_connect_attempts")]
    pub max_connect_attempts: u32,

    /// How long to wait for a credential rotation after an auth-classified
    /// connect error before giving up, in seconds.
    #[serde(default = "default_rotation_wait_secs")]
    pub rotation_wait_secs: u64,

    /// Settle delay between disconnect and reconnect during rotation
    /// handling, in milliseconds.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Interval between connected-state polls after reconnect, in
    /// milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Capped number of connected-state polls after reconnect.
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            max_connect_attempts: default_max_connect_attempts(),
            rotation_wait_secs: default_rotation_wait_secs(),
            settle_delay_ms: default_settle_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_attempts: default_poll_attempts(),
        }
    }
}

fn default_max_connect_attempts() -> u32 {
    3
}

fn default_rotation_wait_secs() -> u64 {
    30
}

fn default_settle_delay_ms() -> u64 {
    150
}

fn default_poll_interval_ms() -> u64 {
    200
}

fn default_poll_attempts() -> usize {
    25
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realtime_endpoint_derived_from_http_base() {
        let api = ApiConfig {
            base_url: "http://localhost:5000/api".into(),
            ..ApiConfig::default()
        };
        assert_eq!(api.realtime_endpoint(), "ws://localhost:5000");
    }

    #[test]
    fn realtime_endpoint_derived_from_https_base() {
        let api = ApiConfig {
            base_url: "https://api.scribeflow.app/api/v1".into(),
            ..ApiConfig::default()
        };
        assert_eq!(api.realtime_endpoint(), "wss://api.scribeflow.app");
    }

    #[test]
    fn realtime_endpoint_override_takes_precedence() {
        let api = ApiConfig {
            base_url: "https://api.scribeflow.app/api".into(),
            realtime_url: Some("wss://rt.scribeflow.app".into()),
            ..ApiConfig::default()
        };
        assert_eq!(api.realtime_endpoint(), "wss://rt.scribeflow.app");
    }
}
