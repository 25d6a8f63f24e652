// SPDX-FileCopyrightText: 2026 Scribeflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./scribeflow.toml` > `~/.config/scribeflow/scribeflow.toml`
//! with environment variable overrides via `SCRIBEFLOW_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::ScribeflowConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `~/.config/scribeflow/scribeflow.toml` (user XDG config)
/// 3. `./scribeflow.toml` (local directory)
/// 4. `SCRIBEFLOW_*` environment variables
pub fn load_config() -> Result<ScribeflowConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ScribeflowConfig::default()))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("scribeflow/scribeflow.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("scribeflow.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<ScribeflowConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ScribeflowConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ScribeflowConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ScribeflowConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names. For example, `SCRIBEFLOW_API_BASE_URL`
/// must map to `api.base_url`, not `api.base.url`.
fn env_provider() -> Env {
    Env::prefixed("SCRIBEFLOW_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: SCRIBEFLOW_API_BASE_URL -> "api_base_url"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("api_", "api.", 1)
            .replacen("typing_", "typing.", 1)
            .replacen("realtime_", "realtime.", 1);
        mapped.into()
    })
}
