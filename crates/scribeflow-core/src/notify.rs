// SPDX-FileCopyrightText: 2026 Scribeflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deduplicating user-facing notification center.
//!
//! At most one visible notification per error kind/endpoint combination at a
//! time. Rate limits are logged and never surfaced; offline state is owned by
//! a dedicated network-status surface, so it is suppressed here as well.

use std::collections::HashSet;
use std::sync::Mutex;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::{ErrorKind, ScribeflowError};

const NOTICE_CHANNEL_CAPACITY: usize = 32;

/// A notification ready for display by the host application.
#[derive(Debug, Clone, PartialEq)]
pub struct UserNotice {
    /// Stable key the host reports back via [`NotificationCenter::dismissed`].
    pub key: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Fan-out point for user-visible error notifications.
pub struct NotificationCenter {
    visible: Mutex<HashSet<String>>,
    tx: broadcast::Sender<UserNotice>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        Self {
            visible: Mutex::new(HashSet::new()),
            tx,
        }
    }

    /// Publishes a notice for the error unless suppressed.
    ///
    /// Returns `true` when a notice was broadcast. Suppression cases: the
    /// kind is not user-visible, or a notice with the same dedup key is
    /// already showing.
    pub fn publish(&self, err: &ScribeflowError) -> bool {
        let kind = err.kind();
        if !kind.is_user_visible() {
            warn!(kind = %kind, error = %err, "suppressed notification");
            return false;
        }

        let key = err.dedup_key();
        {
            let mut visible = self.visible.lock().expect("notice set lock poisoned");
            if !visible.insert(key.clone()) {
                debug!(key = %key, "duplicate notification while one is visible, skipped");
                return false;
            }
        }

        let notice = UserNotice {
            key,
            kind,
            message: err.user_message(),
        };
        // No subscribers means nothing is rendering notices; that's fine.
        let _ = self.tx.send(notice);
        true
    }

    /// The host calls this when the notice with `key` is no longer visible,
    /// re-enabling notifications for that kind/endpoint.
    pub fn dismissed(&self, key: &str) {
        self.visible
            .lock()
            .expect("notice set lock poisoned")
            .remove(key);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UserNotice> {
        self.tx.subscribe()
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}
