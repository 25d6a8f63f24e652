// SPDX-FileCopyrightText: 2026 Scribeflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Scribeflow client core.
//!
//! Layered loading via Figment: compiled defaults, then TOML files in the
//! XDG hierarchy, then `SCRIBEFLOW_*` environment variables.

pub mod loader;
pub mod model;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{ApiConfig, RealtimeConfig, ScribeflowConfig, TypingConfig};
