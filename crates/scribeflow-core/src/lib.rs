// SPDX-FileCopyrightText: 2026 Scribeflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Scribeflow client.
//!
//! This crate provides the error taxonomy, the credential store, the
//! deduplicating notification center, the shared usage/limit event shapes,
//! and the bounded polling combinator used by the higher-level crates.

pub mod error;
pub mod limits;
pub mod notify;
pub mod retry;
pub mod token;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{ErrorKind, ScribeflowError};
pub use limits::LimitGate;
pub use notify::{NotificationCenter, UserNotice};
pub use retry::{poll_until, PollPolicy};
pub use token::TokenStore;
pub use types::{
    ConnectionStatus, Credential, LimitOrigin, UsageEvent, UsageNotification, UsageSeverity,
};
