// SPDX-FileCopyrightText: 2026 Scribeflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Single source of truth for the bearer credential.
//!
//! The store performs no network I/O. Consumers read snapshots via [`TokenStore::get`]
//! and subscribe to rotation notifications; only the REST client's refresh
//! protocol and the host's login/logout flows call [`TokenStore::set`] and
//! [`TokenStore::clear`].

use std::sync::RwLock;

use tokio::sync::broadcast;
use tracing::debug;

use crate::types::Credential;

const ROTATION_CHANNEL_CAPACITY: usize = 16;

/// Holds the current credential and broadcasts true rotations.
///
/// A rotation is a replacement of a non-null credential with a *different*
/// non-null one. Initial login and logout do not notify.
pub struct TokenStore {
    current: RwLock<Option<Credential>>,
    rotations: broadcast::Sender<Credential>,
}

impl TokenStore {
    pub fn new() -> Self {
        let (rotations, _) = broadcast::channel(ROTATION_CHANNEL_CAPACITY);
        Self {
            current: RwLock::new(None),
            rotations,
        }
    }

    /// Returns a snapshot of the current credential.
    pub fn get(&self) -> Option<Credential> {
        self.current.read().expect("token store lock poisoned").clone()
    }

    /// Replaces the credential, broadcasting when this is a true rotation.
    pub fn set(&self, credential: Credential) {
        let rotated = {
            let mut slot = self.current.write().expect("token store lock poisoned");
            let rotated = matches!(&*slot, Some(old) if old.access_token != credential.access_token);
            *slot = Some(credential.clone());
            rotated
        };

        if rotated {
            debug!("credential rotated");
            // No subscribers is fine; rotation consumers are optional.
            let _ = self.rotations.send(credential);
        }
    }

    /// Clears the credential (logout or irrecoverable refresh failure).
    pub fn clear(&self) {
        *self.current.write().expect("token store lock poisoned") = None;
    }

    /// Subscribes to rotation notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Credential> {
        self.rotations.subscribe()
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn initial_login_does_not_notify() {
        let store = TokenStore::new();
        let mut rx = store.subscribe();

        store.set(Credential::new("first", None));
        assert!(rx.try_recv().is_err(), "initial set must not broadcast");
        assert_eq!(store.get().unwrap().access_token, "first");
    }

    #[tokio::test]
    async fn replacing_with_different_credential_notifies() {
        let store = TokenStore::new();
        let mut rx = store.subscribe();

        store.set(Credential::new("first", None));
        store.set(Credential::new("second", Some("r2")));

        let rotated = rx.try_recv().expect("rotation should broadcast");
        assert_eq!(rotated.access_token, "second");
    }

    #[tokio::test]
    async fn replacing_with_identical_credential_does_not_notify() {
        let store = TokenStore::new();
        let mut rx = store.subscribe();

        store.set(Credential::new("same", None));
        store.set(Credential::new("same", None));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn clear_removes_credential_without_notifying() {
        let store = TokenStore::new();
        let mut rx = store.subscribe();

        store.set(Credential::new("tok", None));
        store.clear();
        assert!(store.get().is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn set_after_clear_counts_as_login_not_rotation() {
        let store = TokenStore::new();
        let mut rx = store.subscribe();

        store.set(Credential::new("a", None));
        store.clear();
        store.set(Credential::new("b", None));
        assert!(rx.try_recv().is_err(), "login after logout is not a rotation");
    }
}
