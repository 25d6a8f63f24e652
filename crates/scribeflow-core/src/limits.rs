// SPDX-FileCopyrightText: 2026 Scribeflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Arbitration point for usage/limit notifications.
//!
//! The same logical "limit exceeded" condition can be learned from two
//! independent channels: the generation stream's error payload and the
//! realtime push channel. Arbitration rule: first report wins per generation;
//! the later duplicate is dropped. Informational severities (warnings,
//! post-operation updates) always pass through.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;
use tracing::debug;

use crate::types::{UsageNotification, UsageSeverity};

const LIMIT_CHANNEL_CAPACITY: usize = 32;

/// Fan-out for usage notifications with first-wins gating on hard limits.
pub struct LimitGate {
    exceeded_reported: AtomicBool,
    tx: broadcast::Sender<UsageNotification>,
}

impl LimitGate {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(LIMIT_CHANNEL_CAPACITY);
        Self {
            exceeded_reported: AtomicBool::new(false),
            tx,
        }
    }

    /// Publishes a usage notification.
    ///
    /// Returns `false` when a `LimitExceeded` notification was already
    /// reported for the current generation and this one was dropped.
    pub fn publish(&self, notification: UsageNotification) -> bool {
        if notification.severity == UsageSeverity::LimitExceeded
            && self.exceeded_reported.swap(true, Ordering::SeqCst)
        {
            debug!(origin = ?notification.origin, "duplicate limit-exceeded report dropped");
            return false;
        }
        let _ = self.tx.send(notification);
        true
    }

    /// Re-arms the gate at the start of a new generation.
    pub fn reset(&self) {
        self.exceeded_reported.store(false, Ordering::SeqCst);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UsageNotification> {
        self.tx.subscribe()
    }
}

impl Default for LimitGate {
    fn default() -> Self {
        Self::new()
    }
}
