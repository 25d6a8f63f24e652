// SPDX-FileCopyrightText: 2026 Scribeflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session rotation orchestration.
//!
//! Listens for credential rotations from the [`TokenStore`] and cycles the
//! realtime connection through a fixed sequence: disconnect, reset the
//! attempt budget, settle, reconnect, wait for the connected state, then
//! replay the rotated credential and await the server acknowledgement. A
//! fresh ack subscription is taken for every rotation so a stale ack from
//! an earlier cycle can never satisfy a later one.
//!
//! Every step is bounded. A rotation cycle that cannot complete logs and
//! abandons that cycle; the next rotation starts clean.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use scribeflow_config::RealtimeConfig;
use scribeflow_core::{
    poll_until, ConnectionStatus, Credential, PollPolicy, ScribeflowError, TokenStore,
};

use crate::client::{AckEvent, RealtimeClient};
use crate::wire::ClientEvent;

pub struct SessionOrchestrator {
    client: Arc<RealtimeClient>,
    tokens: Arc<TokenStore>,
    config: RealtimeConfig,
}

impl SessionOrchestrator {
    pub fn new(
        client: Arc<RealtimeClient>,
        tokens: Arc<TokenStore>,
        config: RealtimeConfig,
    ) -> Self {
        Self {
            client,
            tokens,
            config,
        }
    }

    /// Runs until cancelled, handling each credential rotation in turn.
    pub async fn run(self, cancel: CancellationToken) {
        let mut rotations = self.tokens.subscribe();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("session orchestrator stopping");
                    return;
                }
                rotation = rotations.recv() => match rotation {
                    Ok(credential) => {
                        if let Err(e) = self.handle_rotation(credential).await {
                            warn!(error = %e, "rotation cycle abandoned");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // Only the latest credential matters; skipped
                        // rotations are already superseded.
                        warn!(missed, "rotation listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                },
            }
        }
    }

    async fn handle_rotation(&self, credential: Credential) -> Result<(), ScribeflowError> {
        info!("credential rotated, cycling realtime connection");

        self.client.disconnect().await;
        self.client.reset_attempts();

        // Let the server finish tearing down the old session before the
        // new handshake arrives.
        tokio::time::sleep(Duration::from_millis(self.config.settle_delay_ms)).await;

        self.client.connect().await?;

        let policy = PollPolicy::new(
            self.config.poll_attempts,
            Duration::from_millis(self.config.poll_interval_ms),
        );
        let status = self.client.status();
        poll_until(&policy, |_| {
            let connected = *status.borrow() == ConnectionStatus::Connected;
            async move { connected.then_some(()) }
        })
        .await?;

        // Subscribe before sending so the ack cannot slip past.
        let mut acks = self.client.subscribe_acks();
        self.client
            .send(ClientEvent::RefreshToken {
                token: credential.access_token.clone(),
            })
            .await?;

        let wait = Duration::from_secs(self.config.rotation_wait_secs);
        match tokio::time::timeout(wait, acks.recv()).await {
            Ok(Ok(AckEvent::Refreshed)) => {
                info!("server acknowledged rotated credential");
            }
            Ok(Ok(AckEvent::RefreshFailed)) => {
                warn!("server rejected rotated credential");
            }
            Ok(Err(_)) => warn!("ack channel closed before acknowledgement"),
            Err(_) => warn!("timed out waiting for rotation acknowledgement"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{MockOutcome, MockTransport};
    use crate::transport::RealtimeTransport;
    use crate::wire::ServerEvent;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use scribeflow_core::LimitGate;

    fn jwt(marker: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"{marker}"}}"#));
        format!("{header}.{payload}.sig")
    }

    fn config() -> RealtimeConfig {
        RealtimeConfig {
            max_connect_attempts: 3,
            rotation_wait_secs: 5,
            settle_delay_ms: 10,
            poll_interval_ms: 10,
            poll_attempts: 5,
        }
    }

    /// Full rotation cycle: reconnect, replay the rotated credential,
    /// consume the acknowledgement.
    #[tokio::test(start_paused = true)]
    async fn rotation_cycles_connection_and_replays_credential() {
        let transport = Arc::new(MockTransport::scripted(vec![MockOutcome::Succeed]));
        let tokens = Arc::new(TokenStore::new());
        tokens.set(Credential::new(jwt("initial"), Some("refresh-1")));
        let client = Arc::new(RealtimeClient::new(
            Arc::clone(&transport) as Arc<dyn RealtimeTransport>,
            "ws://localhost:5000",
            config(),
            Arc::clone(&tokens),
            Arc::new(LimitGate::new()),
        ));

        let cancel = CancellationToken::new();
        let orchestrator =
            SessionOrchestrator::new(Arc::clone(&client), Arc::clone(&tokens), config());
        let task = tokio::spawn(orchestrator.run(cancel.clone()));

        // Let the orchestrator subscribe before rotating.
        tokio::task::yield_now().await;
        let rotated = jwt("rotated");
        tokens.set(Credential::new(rotated.clone(), Some("refresh-2")));

        // The cycle dials a new connection and replays the token on it.
        let mut session = loop {
            if let Some(session) = transport.sessions.lock().unwrap().pop() {
                break session;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        };
        let replayed = session.outbound_rx.recv().await.unwrap();
        assert_eq!(replayed, ClientEvent::RefreshToken { token: rotated });

        session.inbound_tx.send(ServerEvent::TokenRefreshed).unwrap();
        // Give the ack time to flow through before shutdown.
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(*client.status().borrow(), ConnectionStatus::Connected);
        cancel.cancel();
        task.await.unwrap();
    }

    /// A failed reconnect abandons the cycle instead of wedging the loop;
    /// the next rotation is still handled.
    #[tokio::test(start_paused = true)]
    async fn failed_cycle_does_not_wedge_the_loop() {
        let transport = Arc::new(MockTransport::scripted(vec![
            MockOutcome::Fail { auth: false },
            MockOutcome::Succeed,
        ]));
        let tokens = Arc::new(TokenStore::new());
        tokens.set(Credential::new(jwt("initial"), Some("refresh-1")));
        let client = Arc::new(RealtimeClient::new(
            Arc::clone(&transport) as Arc<dyn RealtimeTransport>,
            "ws://localhost:5000",
            config(),
            Arc::clone(&tokens),
            Arc::new(LimitGate::new()),
        ));

        let cancel = CancellationToken::new();
        let orchestrator =
            SessionOrchestrator::new(Arc::clone(&client), Arc::clone(&tokens), config());
        let task = tokio::spawn(orchestrator.run(cancel.clone()));

        tokio::task::yield_now().await;
        tokens.set(Credential::new(jwt("first"), Some("refresh-2")));
        tokio::time::sleep(Duration::from_millis(100)).await;

        // First cycle failed; a later rotation still connects.
        tokens.set(Credential::new(jwt("second"), Some("refresh-3")));
        for _ in 0..200 {
            if transport.sessions.lock().unwrap().len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(transport.sessions.lock().unwrap().len(), 1);

        cancel.cancel();
        task.await.unwrap();
    }
}
