// SPDX-FileCopyrightText: 2026 Scribeflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Realtime connection client.
//!
//! Owns one connection at a time, the state machine that guards dialing,
//! and the fan-out of inbound events: usage pushes go to the shared
//! [`LimitGate`], refresh acknowledgements to a broadcast listeners can
//! subscribe to per rotation.
//!
//! Two rules shape this module. A connect while one is active is a silent
//! no-op, not an error and not a second socket. And an auth-rejected
//! connect parks the machine in `AuthErrorPending` until either a
//! credential rotation arrives or a bounded wait gives up; it never
//! retry-loops on a credential the server already refused.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use scribeflow_config::RealtimeConfig;
use scribeflow_core::{ConnectionStatus, LimitGate, ScribeflowError, TokenStore};

use crate::state::{ConnectDecision, ConnectionState};
use crate::transport::{realtime_err, RealtimeTransport, TransportConnection};
use crate::wire::{ClientEvent, ServerEvent};

/// Outcome of replaying a rotated credential to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckEvent {
    Refreshed,
    RefreshFailed,
}

struct ActiveConnection {
    sender: mpsc::UnboundedSender<ClientEvent>,
    cancel: CancellationToken,
    reader: JoinHandle<()>,
}

pub struct RealtimeClient {
    transport: Arc<dyn RealtimeTransport>,
    url: String,
    config: RealtimeConfig,
    tokens: Arc<TokenStore>,
    limits: Arc<LimitGate>,
    state: Arc<Mutex<ConnectionState>>,
    status_tx: Arc<watch::Sender<ConnectionStatus>>,
    acks: broadcast::Sender<AckEvent>,
    conn: tokio::sync::Mutex<Option<ActiveConnection>>,
}

impl RealtimeClient {
    pub fn new(
        transport: Arc<dyn RealtimeTransport>,
        url: impl Into<String>,
        config: RealtimeConfig,
        tokens: Arc<TokenStore>,
        limits: Arc<LimitGate>,
    ) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        let (acks, _) = broadcast::channel(8);
        let state = ConnectionState::new(config.max_connect_attempts);
        Self {
            transport,
            url: url.into(),
            config,
            tokens,
            limits,
            state: Arc::new(Mutex::new(state)),
            status_tx: Arc::new(status_tx),
            acks,
            conn: tokio::sync::Mutex::new(None),
        }
    }

    /// Watch the connection status. The receiver observes every phase
    /// transition.
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    /// Subscribes to refresh acknowledgements. Call before sending the
    /// refresh so the ack cannot be missed.
    pub fn subscribe_acks(&self) -> broadcast::Receiver<AckEvent> {
        self.acks.subscribe()
    }

    /// Grants a fresh connect-attempt budget, used on credential rotation.
    pub fn reset_attempts(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.reset_attempts();
        }
    }

    /// Opens the realtime connection with the current credential.
    ///
    /// No-op when a connection is active. Refuses structurally invalid
    /// credentials without consuming an attempt, and refuses to dial past
    /// the per-credential attempt cap.
    pub async fn connect(&self) -> Result<(), ScribeflowError> {
        let Some(credential) = self.tokens.get() else {
            return Err(ScribeflowError::SessionExpired);
        };
        if !has_jwt_shape(&credential.access_token) {
            return Err(realtime_err(
                "credential is not a structurally valid token",
                true,
            ));
        }

        {
            let Ok(mut state) = self.state.lock() else {
                return Err(ScribeflowError::Internal("connection state poisoned".into()));
            };
            match state.begin_connect(&credential.access_token) {
                ConnectDecision::AlreadyActive => {
                    debug!("realtime connect skipped, already active");
                    return Ok(());
                }
                ConnectDecision::AttemptsExhausted => {
                    return Err(ScribeflowError::Exhausted {
                        attempts: self.config.max_connect_attempts as usize,
                    });
                }
                ConnectDecision::Proceed => {}
            }
        }
        self.publish_status(ConnectionStatus::Connecting);

        match self.transport.connect(&self.url, &credential).await {
            Ok(connection) => {
                self.install_connection(connection).await;
                if let Ok(mut state) = self.state.lock() {
                    state.on_connected();
                }
                self.publish_status(ConnectionStatus::Connected);
                info!(url = %self.url, "realtime connected");
                Ok(())
            }
            Err(err) => {
                let auth = matches!(&err, ScribeflowError::Realtime { auth: true, .. });
                if let Ok(mut state) = self.state.lock() {
                    if auth {
                        state.on_auth_error();
                    } else {
                        state.on_disconnected();
                    }
                }
                self.publish_status(if auth {
                    ConnectionStatus::AuthErrorPending
                } else {
                    ConnectionStatus::Disconnected
                });
                warn!(error = %err, auth, "realtime connect failed");
                Err(err)
            }
        }
    }

    /// Tears down the connection. Safe to call in any state, repeatedly.
    pub async fn disconnect(&self) {
        let active = self.conn.lock().await.take();
        if let Some(active) = active {
            active.cancel.cancel();
            drop(active.sender);
            let _ = active.reader.await;
        }
        if let Ok(mut state) = self.state.lock() {
            state.on_disconnected();
        }
        self.publish_status(ConnectionStatus::Disconnected);
    }

    /// Sends an event on the live connection.
    pub async fn send(&self, event: ClientEvent) -> Result<(), ScribeflowError> {
        let conn = self.conn.lock().await;
        let Some(active) = conn.as_ref() else {
            return Err(realtime_err("not connected", false));
        };
        active
            .sender
            .send(event)
            .map_err(|_| realtime_err("connection closed while sending", false))
    }

    /// After an auth-rejected connect, waits a bounded time for a
    /// credential rotation and reconnects with it. Gives up with
    /// [`ScribeflowError::Exhausted`] if no rotation arrives, leaving the
    /// machine disconnected; no automatic retry happens past that point.
    pub async fn recover_after_auth_error(&self) -> Result<(), ScribeflowError> {
        let mut rotations = self.tokens.subscribe();
        let wait = Duration::from_secs(self.config.rotation_wait_secs);

        match tokio::time::timeout(wait, rotations.recv()).await {
            Ok(Ok(_rotated)) => {
                info!("credential rotated during auth-error wait, reconnecting");
                self.reset_attempts();
                self.connect().await
            }
            Ok(Err(_)) | Err(_) => {
                warn!(
                    wait_secs = self.config.rotation_wait_secs,
                    "no credential rotation arrived, giving up on realtime"
                );
                if let Ok(mut state) = self.state.lock() {
                    state.on_disconnected();
                }
                self.publish_status(ConnectionStatus::Disconnected);
                Err(ScribeflowError::Exhausted {
                    attempts: self.config.max_connect_attempts as usize,
                })
            }
        }
    }

    async fn install_connection(&self, connection: TransportConnection) {
        // Replace any previous connection first so two readers never run.
        self.disconnect_quietly().await;

        let TransportConnection { sender, events } = connection;
        let cancel = CancellationToken::new();
        let reader = tokio::spawn(read_loop(
            events,
            cancel.clone(),
            Arc::clone(&self.state),
            Arc::clone(&self.status_tx),
            Arc::clone(&self.limits),
            self.acks.clone(),
        ));
        *self.conn.lock().await = Some(ActiveConnection {
            sender,
            cancel,
            reader,
        });
    }

    /// Connection teardown without the status transition, for replacement.
    async fn disconnect_quietly(&self) {
        let active = self.conn.lock().await.take();
        if let Some(active) = active {
            active.cancel.cancel();
            drop(active.sender);
            let _ = active.reader.await;
        }
    }

    fn publish_status(&self, status: ConnectionStatus) {
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

/// Routes inbound events until the socket or the cancel token ends it.
async fn read_loop(
    mut events: mpsc::UnboundedReceiver<ServerEvent>,
    cancel: CancellationToken,
    state: Arc<Mutex<ConnectionState>>,
    status_tx: Arc<watch::Sender<ConnectionStatus>>,
    limits: Arc<LimitGate>,
    acks: broadcast::Sender<AckEvent>,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            maybe_event = events.recv() => match maybe_event {
                Some(ServerEvent::TokenRefreshed) => {
                    let _ = acks.send(AckEvent::Refreshed);
                }
                Some(ServerEvent::TokenRefreshError) => {
                    let _ = acks.send(AckEvent::RefreshFailed);
                }
                Some(usage) => {
                    if let Some(notification) = usage.into_usage_notification() {
                        limits.publish(notification);
                    }
                }
                None => {
                    debug!("realtime connection closed by server");
                    if let Ok(mut state) = state.lock() {
                        state.on_disconnected();
                    }
                    let _ = status_tx.send(ConnectionStatus::Disconnected);
                    return;
                }
            },
        }
    }
}

/// Structural token check: three dot-separated segments, the first two
/// base64url-decodable. Catches truncated or garbage tokens before they
/// burn a connect attempt on a guaranteed rejection.
fn has_jwt_shape(token: &str) -> bool {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
        return false;
    }
    segments[..2]
        .iter()
        .all(|s| URL_SAFE_NO_PAD.decode(s).is_ok())
}
