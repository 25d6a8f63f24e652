// SPDX-FileCopyrightText: 2026 Scribeflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Websocket transport behind a trait seam.
//!
//! [`RealtimeTransport`] separates dialing and framing from the connection
//! state machine, so the client logic can be exercised against a scripted
//! transport in tests. [`WsTransport`] is the production implementation: a
//! single socket owned by a background worker, bridged to the caller with
//! channels.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, warn};

use scribeflow_core::{Credential, ScribeflowError};

use crate::wire::{ClientEvent, ServerEvent};

/// Channel pair for one live connection.
///
/// Dropping `sender` closes the socket gracefully; `events` ending means
/// the connection is gone.
pub struct TransportConnection {
    pub sender: mpsc::UnboundedSender<ClientEvent>,
    pub events: mpsc::UnboundedReceiver<ServerEvent>,
}

/// Dials the realtime endpoint and produces framed connections.
#[async_trait]
pub trait RealtimeTransport: Send + Sync + 'static {
    /// Opens a connection authenticated as `credential`.
    ///
    /// Auth rejections must surface as [`ScribeflowError::Realtime`] with
    /// `auth: true` so the state machine can park instead of retrying.
    async fn connect(
        &self,
        url: &str,
        credential: &Credential,
    ) -> Result<TransportConnection, ScribeflowError>;
}

/// Production websocket transport.
pub struct WsTransport;

#[async_trait]
impl RealtimeTransport for WsTransport {
    async fn connect(
        &self,
        url: &str,
        credential: &Credential,
    ) -> Result<TransportConnection, ScribeflowError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| realtime_err(format!("invalid realtime url: {e}"), false))?;
        let bearer = credential
            .bearer()
            .parse()
            .map_err(|_| realtime_err("credential is not a valid header value", true))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (mut socket, _) = connect_async(request).await.map_err(classify_ws_error)?;

        // Identify before anything else; servers drop unauthenticated
        // sockets after a short grace window.
        let hello = ClientEvent::Authenticate {
            token: credential.access_token.clone(),
        };
        let text = serde_json::to_string(&hello)
            .map_err(|e| realtime_err(format!("failed to encode auth event: {e}"), false))?;
        socket
            .send(Message::text(text))
            .await
            .map_err(classify_ws_error)?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(socket_worker(socket, outbound_rx, inbound_tx));

        Ok(TransportConnection {
            sender: outbound_tx,
            events: inbound_rx,
        })
    }
}

async fn socket_worker<S>(
    mut socket: tokio_tungstenite::WebSocketStream<S>,
    mut outbound_rx: mpsc::UnboundedReceiver<ClientEvent>,
    inbound_tx: mpsc::UnboundedSender<ServerEvent>,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            maybe_outbound = outbound_rx.recv() => match maybe_outbound {
                Some(event) => {
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(error = %e, "dropping unencodable outbound event");
                            continue;
                        }
                    };
                    if socket.send(Message::text(text)).await.is_err() {
                        break;
                    }
                }
                None => {
                    let _ = socket.close(None).await;
                    break;
                }
            },
            maybe_inbound = socket.next() => match maybe_inbound {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => {
                            if inbound_tx.send(event).is_err() {
                                break;
                            }
                        }
                        // Forward-compatible: unknown event names are skipped.
                        Err(e) => debug!(error = %e, "skipping unrecognized realtime frame"),
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    if socket.send(Message::Pong(payload)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "realtime socket error");
                    break;
                }
            },
        }
    }
}

/// Classifies a handshake or frame error; HTTP 401/403 on the upgrade is
/// an auth rejection.
fn classify_ws_error(err: WsError) -> ScribeflowError {
    let auth = matches!(
        &err,
        WsError::Http(response) if matches!(response.status().as_u16(), 401 | 403)
    );
    ScribeflowError::Realtime {
        message: format!("websocket connect failed: {err}"),
        auth,
        source: Some(Box::new(err)),
    }
}

pub(crate) fn realtime_err(message: impl Into<String>, auth: bool) -> ScribeflowError {
    ScribeflowError::Realtime {
        message: message.into(),
        auth,
        source: None,
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted transport for state machine and orchestrator tests.

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// One scripted connect outcome.
    pub enum MockOutcome {
        /// Connect succeeds; the session handles land in `sessions`.
        Succeed,
        /// Connect fails, auth-classified when `auth` is true.
        Fail { auth: bool },
    }

    /// Server-side handles for a successful mock connect.
    pub struct MockSession {
        /// Injects server events into the client.
        pub inbound_tx: mpsc::UnboundedSender<ServerEvent>,
        /// Observes what the client sent.
        pub outbound_rx: mpsc::UnboundedReceiver<ClientEvent>,
    }

    pub struct MockTransport {
        script: Mutex<VecDeque<MockOutcome>>,
        pub sessions: Mutex<Vec<MockSession>>,
        pub connect_calls: AtomicUsize,
    }

    impl MockTransport {
        pub fn scripted(outcomes: Vec<MockOutcome>) -> Self {
            Self {
                script: Mutex::new(outcomes.into()),
                sessions: Mutex::new(Vec::new()),
                connect_calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.connect_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RealtimeTransport for MockTransport {
        async fn connect(
            &self,
            _url: &str,
            _credential: &Credential,
        ) -> Result<TransportConnection, ScribeflowError> {
            self.connect_calls.fetch_add(1, Ordering::SeqCst);
            let outcome = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(MockOutcome::Fail { auth: false });

            match outcome {
                MockOutcome::Succeed => {
                    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
                    self.sessions.lock().unwrap().push(MockSession {
                        inbound_tx,
                        outbound_rx,
                    });
                    Ok(TransportConnection {
                        sender: outbound_tx,
                        events: inbound_rx,
                    })
                }
                MockOutcome::Fail { auth } => {
                    Err(realtime_err("scripted connect failure", auth))
                }
            }
        }
    }
}
