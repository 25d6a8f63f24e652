// SPDX-FileCopyrightText: 2026 Scribeflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Realtime layer of the Scribeflow client core.
//!
//! A websocket connection carries server-pushed usage events and token
//! refresh acknowledgements. [`RealtimeClient`] drives an explicit
//! connection state machine (notably: auth-rejected connects park in a
//! pending state instead of retry-looping), and [`SessionOrchestrator`]
//! replays credential rotations onto the live connection.

pub mod client;
pub mod orchestrator;
pub mod state;
pub mod transport;
pub mod wire;

pub use client::{AckEvent, RealtimeClient};
pub use orchestrator::SessionOrchestrator;
pub use state::{ConnectDecision, ConnectionState};
pub use transport::{RealtimeTransport, TransportConnection, WsTransport};
pub use wire::{ClientEvent, ServerEvent};
