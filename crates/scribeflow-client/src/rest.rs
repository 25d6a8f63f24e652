// SPDX-FileCopyrightText: 2026 Scribeflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! REST client with the 401 -> refresh -> replay protocol.
//!
//! All business endpoints return `{data, message, success}` envelopes from
//! which [`RestClient::request`] extracts `data`. On a 401 from a
//! non-auth endpoint, the client refreshes the credential and replays the
//! request exactly once. Invariant: at most one refresh is in flight at a
//! time; requests that 401 while a refresh is running park on its outcome
//! instead of starting their own, and all of them settle together once the
//! refresh resolves.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, warn};

use scribeflow_config::ApiConfig;
use scribeflow_core::{Credential, ErrorKind, NotificationCenter, ScribeflowError, TokenStore};

/// Refresh endpoint path, never subject to auto-refresh itself.
pub const REFRESH_PATH: &str = "/auth/refresh";

/// Endpoints where a 401 is a real credential error, not a stale token.
const AUTH_EXEMPT_PATHS: [&str; 4] = [REFRESH_PATH, "/auth/login", "/auth/register", "/auth/logout"];

fn is_auth_exempt(path: &str) -> bool {
    AUTH_EXEMPT_PATHS.iter().any(|p| path.starts_with(p))
}

/// Standard response envelope returned by every business endpoint.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
    success: bool,
}

/// Outcome of the single in-flight refresh, observed by parked requests.
#[derive(Debug, Clone)]
enum RefreshPhase {
    Pending,
    Rotated(Credential),
    Failed,
}

enum RefreshSlot {
    Idle,
    InFlight(watch::Receiver<RefreshPhase>),
}

enum RefreshRole {
    Leader(watch::Sender<RefreshPhase>),
    Waiter(watch::Receiver<RefreshPhase>),
}

/// Returns the refresh slot to `Idle` when the leader settles, including
/// when the leader future is dropped mid-refresh (caller timeout, abort).
struct SlotReset<'a>(&'a Mutex<RefreshSlot>);

impl Drop for SlotReset<'_> {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.0.lock() {
            *slot = RefreshSlot::Idle;
        }
    }
}

/// HTTP client for the Scribeflow REST API.
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<TokenStore>,
    notices: Arc<NotificationCenter>,
    refresh: Mutex<RefreshSlot>,
}

impl RestClient {
    /// Creates a REST client against the configured base URL.
    pub fn new(
        config: &ApiConfig,
        tokens: Arc<TokenStore>,
        notices: Arc<NotificationCenter>,
    ) -> Result<Self, ScribeflowError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ScribeflowError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            tokens,
            notices,
            refresh: Mutex::new(RefreshSlot::Idle),
        })
    }

    /// Sends a request and extracts `data` from the response envelope.
    ///
    /// Applies the 401 refresh protocol for non-auth endpoints. Errors are
    /// classified and forwarded to the notification center before being
    /// returned to the caller.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<T, ScribeflowError> {
        let result = match self.execute(method.clone(), path, body).await {
            Err(err) if err.is_unauthorized() && !is_auth_exempt(path) => {
                debug!(path, "401 received, entering refresh protocol");
                match self.refresh_credential().await {
                    // Replayed at most once. A second 401 is terminal.
                    Ok(_) => self.execute(method, path, body).await,
                    Err(refresh_err) => Err(refresh_err),
                }
            }
            other => other,
        };

        if let Err(err) = &result {
            self.notices.publish(err);
        }
        result
    }

    /// Convenience wrapper for GET requests.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ScribeflowError> {
        self.request(Method::GET, path, None).await
    }

    /// Convenience wrapper for POST requests with a JSON body.
    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, ScribeflowError> {
        self.request(Method::POST, path, Some(body)).await
    }

    /// Snapshot of the credential store backing this client.
    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    /// Refreshes the credential, coordinating with any refresh already in
    /// flight.
    ///
    /// The first caller becomes the leader and performs the network call;
    /// everyone else parks on a watch channel and settles with the leader's
    /// outcome. On refresh failure the credential store is cleared and all
    /// parked callers receive [`ScribeflowError::SessionExpired`]. A leader
    /// whose future is dropped mid-refresh frees the slot; parked callers
    /// then elect a new leader rather than erroring out.
    pub async fn refresh_credential(&self) -> Result<Credential, ScribeflowError> {
        loop {
            let role = {
                let mut slot = self.refresh.lock().expect("refresh slot lock poisoned");
                match &*slot {
                    RefreshSlot::InFlight(rx) => RefreshRole::Waiter(rx.clone()),
                    RefreshSlot::Idle => {
                        let (tx, rx) = watch::channel(RefreshPhase::Pending);
                        *slot = RefreshSlot::InFlight(rx);
                        RefreshRole::Leader(tx)
                    }
                }
            };

            match role {
                RefreshRole::Waiter(mut rx) => loop {
                    let phase = rx.borrow_and_update().clone();
                    match phase {
                        RefreshPhase::Rotated(cred) => return Ok(cred),
                        RefreshPhase::Failed => return Err(ScribeflowError::SessionExpired),
                        RefreshPhase::Pending => {
                            // A closed channel means the leader was dropped
                            // before settling. Its guard has already returned
                            // the slot to Idle, so go elect a new leader.
                            if rx.changed().await.is_err() {
                                break;
                            }
                        }
                    }
                },
                RefreshRole::Leader(tx) => {
                    // Declared after `tx` so it drops first: the slot is
                    // back to Idle before waiters ever see the channel close.
                    let _reset = SlotReset(&self.refresh);
                    return match self.do_refresh().await {
                        Ok(cred) => {
                            let _ = tx.send(RefreshPhase::Rotated(cred.clone()));
                            Ok(cred)
                        }
                        Err(err) => {
                            warn!(error = %err, "credential refresh failed, clearing session");
                            self.tokens.clear();
                            let _ = tx.send(RefreshPhase::Failed);
                            Err(err)
                        }
                    };
                }
            }
        }
    }

    /// Calls the refresh endpoint and rotates the credential store.
    ///
    /// A 401 from the refresh endpoint itself is a hard logout, never
    /// retried.
    async fn do_refresh(&self) -> Result<Credential, ScribeflowError> {
        let refresh_token = self.tokens.get().and_then(|c| c.refresh_token);
        let body = serde_json::json!({ "refreshToken": refresh_token });

        let response = self
            .http
            .post(format!("{}{REFRESH_PATH}", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(REFRESH_PATH, e))?;

        let status = response.status();
        if status.as_u16() == 401 {
            return Err(ScribeflowError::SessionExpired);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ScribeflowError::Api {
                kind: ErrorKind::from_status(status.as_u16()),
                endpoint: REFRESH_PATH.into(),
                status: Some(status.as_u16()),
                message,
                source: None,
            });
        }

        let envelope: Envelope<Credential> =
            response.json().await.map_err(|e| ScribeflowError::Api {
                kind: ErrorKind::Unknown,
                endpoint: REFRESH_PATH.into(),
                status: None,
                message: format!("failed to parse refresh response: {e}"),
                source: Some(Box::new(e)),
            })?;

        let cred = envelope.data.ok_or_else(|| {
            ScribeflowError::Internal("refresh envelope missing credential data".into())
        })?;

        // A true rotation broadcasts to subscribers (realtime orchestrator).
        self.tokens.set(cred.clone());
        debug!("credential refresh succeeded");
        Ok(cred)
    }

    /// Single request execution: attaches the current bearer snapshot, sends,
    /// classifies failures, and unwraps the envelope.
    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<T, ScribeflowError> {
        let mut req = self.http.request(method, format!("{}{path}", self.base_url));
        if let Some(cred) = self.tokens.get() {
            req = req.header(AUTHORIZATION, cred.bearer());
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let response = req.send().await.map_err(|e| classify_transport(path, e))?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ScribeflowError::Api {
                kind: ErrorKind::from_status(status.as_u16()),
                endpoint: path.into(),
                status: Some(status.as_u16()),
                message,
                source: None,
            });
        }

        let envelope: Envelope<T> = response.json().await.map_err(|e| ScribeflowError::Api {
            kind: ErrorKind::Unknown,
            endpoint: path.into(),
            status: None,
            message: format!("failed to parse response envelope: {e}"),
            source: Some(Box::new(e)),
        })?;

        if !envelope.success {
            return Err(ScribeflowError::Api {
                kind: ErrorKind::Unknown,
                endpoint: path.into(),
                status: Some(status.as_u16()),
                message: envelope
                    .message
                    .unwrap_or_else(|| "request was not successful".into()),
                source: None,
            });
        }

        envelope
            .data
            .ok_or_else(|| ScribeflowError::Internal(format!("envelope for {path} missing data")))
    }
}

/// Classifies a reqwest transport error into the taxonomy.
///
/// Connection-level refusals map to `ServerDown`; request errors that never
/// produced a connection map to `NoInternet`.
pub(crate) fn classify_transport(path: &str, err: reqwest::Error) -> ScribeflowError {
    let kind = if err.is_timeout() {
        ErrorKind::Timeout
    } else if err.is_connect() {
        ErrorKind::ServerDown
    } else if err.is_request() {
        ErrorKind::NoInternet
    } else {
        ErrorKind::Unknown
    };

    ScribeflowError::Api {
        kind,
        endpoint: path.into(),
        status: None,
        message: err.to_string(),
        source: Some(Box::new(err)),
    }
}
