// SPDX-FileCopyrightText: 2026 Scribeflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP-facing layer of the Scribeflow client core.
//!
//! Provides [`RestClient`] (request envelope handling plus the
//! 401-refresh-replay protocol), [`StreamConsumer`] (SSE generation
//! streaming as a one-shot event stream), and the [`typing`] module
//! (arrival-rate-independent paced text reveal).

pub mod rest;
pub mod stream;
pub mod typing;

pub use rest::RestClient;
pub use stream::{GenerationEvent, GenerationStream, StreamConsumer};
pub use typing::{TypingDriver, TypingHandle, TypingReconciler};
