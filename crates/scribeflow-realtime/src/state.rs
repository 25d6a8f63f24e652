// SPDX-FileCopyrightText: 2026 Scribeflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pure connection state machine.
//!
//! Kept free of IO so the transition rules can be tested directly. The
//! phases mirror [`ConnectionStatus`]; the extra bookkeeping is the
//! per-credential attempt counter and the rule that an auth-rejected
//! connect parks in `AuthErrorPending` and never self-retries.

use scribeflow_core::ConnectionStatus;

/// Outcome of asking the state machine to start a connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectDecision {
    /// Transitioned to `Connecting`; the caller should dial.
    Proceed,
    /// A connect is already in flight or established. Do nothing.
    AlreadyActive,
    /// The attempt cap for the current credential is spent.
    AttemptsExhausted,
}

#[derive(Debug)]
pub struct ConnectionState {
    status: ConnectionStatus,
    attempts: u32,
    max_attempts: u32,
    /// Access token the current attempt counter belongs to. A different
    /// token starts a fresh budget.
    credential_fingerprint: Option<String>,
}

impl ConnectionState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            credential_fingerprint: None,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Requests a transition to `Connecting` for the given access token.
    ///
    /// Busy states are a no-op and do not consume an attempt. A new token
    /// resets the attempt budget; a spent budget refuses the dial.
    pub fn begin_connect(&mut self, access_token: &str) -> ConnectDecision {
        if matches!(
            self.status,
            ConnectionStatus::Connecting | ConnectionStatus::Connected
        ) {
            return ConnectDecision::AlreadyActive;
        }

        if self.credential_fingerprint.as_deref() != Some(access_token) {
            self.credential_fingerprint = Some(access_token.to_string());
            self.attempts = 0;
        }

        if self.attempts >= self.max_attempts {
            return ConnectDecision::AttemptsExhausted;
        }

        self.attempts += 1;
        self.status = ConnectionStatus::Connecting;
        ConnectDecision::Proceed
    }

    pub fn on_connected(&mut self) {
        self.status = ConnectionStatus::Connected;
        self.attempts = 0;
    }

    /// An auth-classified connect failure. Parks; only an explicit
    /// disconnect or a credential rotation moves the machine on.
    pub fn on_auth_error(&mut self) {
        self.status = ConnectionStatus::AuthErrorPending;
    }

    pub fn on_disconnected(&mut self) {
        self.status = ConnectionStatus::Disconnected;
    }

    /// Grants a fresh attempt budget, used when a rotation arrives.
    pub fn reset_attempts(&mut self) {
        self.attempts = 0;
        self.credential_fingerprint = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_while_busy_is_a_noop_and_costs_nothing() {
        let mut state = ConnectionState::new(3);
        assert_eq!(state.begin_connect("tok"), ConnectDecision::Proceed);
        assert_eq!(state.attempts(), 1);

        assert_eq!(state.begin_connect("tok"), ConnectDecision::AlreadyActive);
        assert_eq!(state.attempts(), 1, "busy no-op must not burn an attempt");

        state.on_connected();
        assert_eq!(state.begin_connect("tok"), ConnectDecision::AlreadyActive);
    }

    #[test]
    fn attempt_cap_is_per_credential() {
        let mut state = ConnectionState::new(2);
        for _ in 0..2 {
            assert_eq!(state.begin_connect("tok-a"), ConnectDecision::Proceed);
            state.on_disconnected();
        }
        assert_eq!(
            state.begin_connect("tok-a"),
            ConnectDecision::AttemptsExhausted
        );

        // A rotated credential starts a fresh budget.
        assert_eq!(state.begin_connect("tok-b"), ConnectDecision::Proceed);
        assert_eq!(state.attempts(), 1);
    }

    #[test]
    fn auth_error_parks_without_clearing_attempts() {
        let mut state = ConnectionState::new(3);
        state.begin_connect("tok");
        state.on_auth_error();
        assert_eq!(state.status(), ConnectionStatus::AuthErrorPending);
        assert_eq!(state.attempts(), 1);
    }

    #[test]
    fn connected_resets_the_attempt_counter() {
        let mut state = ConnectionState::new(3);
        state.begin_connect("tok");
        state.on_connected();
        assert_eq!(state.attempts(), 0);
    }

    #[test]
    fn reset_attempts_grants_a_fresh_budget() {
        let mut state = ConnectionState::new(1);
        state.begin_connect("tok");
        state.on_disconnected();
        assert_eq!(
            state.begin_connect("tok"),
            ConnectDecision::AttemptsExhausted
        );

        state.reset_attempts();
        assert_eq!(state.begin_connect("tok"), ConnectDecision::Proceed);
    }
}
