// SPDX-FileCopyrightText: 2026 Scribeflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Scribeflow configuration system.

use scribeflow_config::load_config_from_str;

/// Valid TOML with all known fields deserializes successfully.
#[test]
fn valid_toml_deserializes_into_config() {
    let toml = r#"
[api]
base_url = "https://api.example.com/api"
realtime_url = "wss://rt.example.com"
request_timeout_secs = 10

[typing]
tick_interval_ms = 16
high_watermark = 300
completion_slack = 8
grace_delay_ms = 100

[realtime]
max_connect_attempts = 5
rotation_wait_secs = 20
settle_delay_ms = 50
poll_interval_ms = 100
poll_attempts = 10
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.api.base_url, "https://api.example.com/api");
    assert_eq!(config.api.realtime_url.as_deref(), Some("wss://rt.example.com"));
    assert_eq!(config.api.request_timeout_secs, 10);
    assert_eq!(config.typing.tick_interval_ms, 16);
    assert_eq!(config.typing.high_watermark, 300);
    assert_eq!(config.typing.completion_slack, 8);
    assert_eq!(config.typing.grace_delay_ms, 100);
    assert_eq!(config.realtime.max_connect_attempts, 5);
    assert_eq!(config.realtime.rotation_wait_secs, 20);
    assert_eq!(config.realtime.settle_delay_ms, 50);
    assert_eq!(config.realtime.poll_interval_ms, 100);
    assert_eq!(config.realtime.poll_attempts, 10);
}

/// Missing sections fall back to documented defaults.
#[test]
fn missing_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty TOML should use defaults");

    assert_eq!(config.api.base_url, "http://localhost:5000/api");
    assert!(config.api.realtime_url.is_none());
    assert_eq!(config.api.request_timeout_secs, 30);
    assert_eq!(config.typing.tick_interval_ms, 20);
    assert_eq!(config.typing.high_watermark, 200);
    assert_eq!(config.realtime.max_connect_attempts, 3);
}

/// Unknown field in [api] section is rejected.
#[test]
fn unknown_field_in_api_produces_error() {
    let toml = r#"
[api]
base_ur = "typo"
"#;

    let err = load_config_from_str(toml).expect_err("should reject unknown field");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("base_ur"),
        "error should mention unknown field or the bad key, got: {err_str}"
    );
}

/// Unknown top-level section is rejected.
#[test]
fn unknown_section_produces_error() {
    let toml = r#"
[websocket]
url = "wss://example.com"
"#;

    let err = load_config_from_str(toml).expect_err("should reject unknown section");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("websocket"),
        "error should mention the unknown section, got: {err_str}"
    );
}

/// Partial sections keep defaults for unset fields.
#[test]
fn partial_section_keeps_other_defaults() {
    let toml = r#"
[typing]
high_watermark = 400
"#;

    let config = load_config_from_str(toml).unwrap();
    assert_eq!(config.typing.high_watermark, 400);
    assert_eq!(config.typing.tick_interval_ms, 20, "unset field keeps default");
}
