// SPDX-FileCopyrightText: 2026 Scribeflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SSE consumer for the generation streaming endpoint.
//!
//! Opens a streamed POST and converts the `data: <json>` framing into a
//! finite, one-shot stream of [`GenerationEvent`]s. Partial lines at a read
//! boundary are buffered by the SSE layer and never parsed early; an
//! unterminated trailing record at connection close is discarded.
//!
//! Exactly one terminal event (`Complete` or `Failed`) is emitted per open;
//! nothing follows it even if more bytes arrive. Cancellation is
//! cooperative: once the token fires, no further events are produced and
//! the transport is dropped.

use std::pin::Pin;
use std::sync::Arc;

use eventsource_stream::Eventsource;
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use scribeflow_core::{
    Credential, ErrorKind, LimitGate, LimitOrigin, ScribeflowError, TokenStore, UsageEvent,
    UsageNotification, UsageSeverity,
};

use crate::rest::{classify_transport, RestClient};

/// Streaming endpoint path under the API base URL.
pub const STREAM_PATH: &str = "/generate/stream";

/// Textual markers in error payloads that indicate a quota condition rather
/// than a transport failure.
const LIMIT_MARKERS: [&str; 3] = ["limit", "exceeded", "upgrade"];

/// Events produced by a generation stream.
#[derive(Debug)]
pub enum GenerationEvent {
    /// Incremental delta plus the cumulative partial text.
    Chunk { delta: String, partial: String },
    /// Terminal: generation finished with the final full text.
    Complete {
        full_text: String,
        words_generated: u64,
    },
    /// Terminal: generation failed.
    Failed(ScribeflowError),
}

/// A finite, one-shot stream of generation events.
pub type GenerationStream = Pin<Box<dyn Stream<Item = GenerationEvent> + Send>>;

/// Wire payload carried in each `data:` record.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamPayload {
    #[serde(default)]
    chunk: Option<String>,
    #[serde(default)]
    partial: Option<String>,
    #[serde(default)]
    done: Option<bool>,
    #[serde(default)]
    full_text: Option<String>,
    #[serde(default)]
    words_generated: Option<u64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    limit_exceeded: Option<bool>,
    #[serde(default)]
    usage: Option<UsageEvent>,
}

/// Opens authenticated generation streams.
pub struct StreamConsumer {
    http: reqwest::Client,
    endpoint: String,
    rest: Arc<RestClient>,
    tokens: Arc<TokenStore>,
    limits: Arc<LimitGate>,
}

impl StreamConsumer {
    /// Creates a stream consumer sharing the REST client's refresh protocol
    /// and the process-wide limit gate.
    pub fn new(
        base_url: &str,
        rest: Arc<RestClient>,
        tokens: Arc<TokenStore>,
        limits: Arc<LimitGate>,
    ) -> Self {
        // The streaming transport cannot ride the REST client's request
        // pipeline, so it keeps its own connection pool with no total
        // timeout (generations are long-lived).
        Self {
            http: reqwest::Client::new(),
            endpoint: format!("{}{STREAM_PATH}", base_url.trim_end_matches('/')),
            rest,
            tokens,
            limits,
        }
    }

    /// Opens a generation stream for the given request body.
    ///
    /// A 401 on open performs exactly one credential refresh (through the
    /// REST client, so it coordinates with any refresh already in flight)
    /// and retries the open once; a second 401 is terminal.
    pub async fn open(
        &self,
        body: serde_json::Value,
        cancel: CancellationToken,
    ) -> Result<GenerationStream, ScribeflowError> {
        // New generation: re-arm the limit arbitration.
        self.limits.reset();

        let mut response = self.send(&body, self.tokens.get()).await?;

        if response.status().as_u16() == 401 {
            debug!("stream open got 401, refreshing once");
            let cred = self.rest.refresh_credential().await?;
            response = self.send(&body, Some(cred)).await?;
            if response.status().as_u16() == 401 {
                return Err(ScribeflowError::Api {
                    kind: ErrorKind::AuthFailed,
                    endpoint: STREAM_PATH.into(),
                    status: Some(401),
                    message: "stream rejected the refreshed credential".into(),
                    source: None,
                });
            }
        }

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ScribeflowError::Api {
                kind: ErrorKind::from_status(status.as_u16()),
                endpoint: STREAM_PATH.into(),
                status: Some(status.as_u16()),
                message,
                source: None,
            });
        }

        Ok(parse_generation_stream(
            response,
            Arc::clone(&self.limits),
            cancel,
        ))
    }

    async fn send(
        &self,
        body: &serde_json::Value,
        cred: Option<Credential>,
    ) -> Result<reqwest::Response, ScribeflowError> {
        let mut req = self.http.post(&self.endpoint).json(body);
        if let Some(cred) = cred {
            req = req.header(reqwest::header::AUTHORIZATION, cred.bearer());
        }
        req.send().await.map_err(|e| classify_transport(STREAM_PATH, e))
    }
}

/// Parses a streaming response into a one-shot [`GenerationStream`].
fn parse_generation_stream(
    response: reqwest::Response,
    limits: Arc<LimitGate>,
    cancel: CancellationToken,
) -> GenerationStream {
    let events = response
        .bytes_stream()
        .eventsource()
        .take_until(Box::pin(cancel.cancelled_owned()));

    // `terminal` latches after Complete/Failed so trailing records are
    // ignored rather than re-emitted.
    let mapped = events
        .scan(false, move |terminal, result| {
            if *terminal {
                return futures::future::ready(None);
            }

            let item = match result {
                Ok(event) => match serde_json::from_str::<StreamPayload>(&event.data) {
                    Ok(payload) => map_payload(payload, terminal, &limits),
                    Err(e) => {
                        *terminal = true;
                        Some(GenerationEvent::Failed(ScribeflowError::Stream(format!(
                            "malformed stream record: {e}"
                        ))))
                    }
                },
                Err(e) => {
                    *terminal = true;
                    Some(GenerationEvent::Failed(ScribeflowError::Stream(format!(
                        "stream transport error: {e}"
                    ))))
                }
            };
            futures::future::ready(Some(item))
        })
        .filter_map(futures::future::ready);

    Box::pin(mapped)
}

/// Maps one wire payload to an event, setting `terminal` for Complete/Failed.
fn map_payload(
    payload: StreamPayload,
    terminal: &mut bool,
    limits: &LimitGate,
) -> Option<GenerationEvent> {
    if let Some(message) = payload.error {
        *terminal = true;
        if is_limit_condition(&message, payload.limit_exceeded) {
            let event = payload.usage.unwrap_or_else(|| UsageEvent {
                service: "generation".into(),
                message: message.clone(),
                ..UsageEvent::default()
            });
            let service = event.service.clone();
            // First report wins; the push channel may already have claimed it.
            limits.publish(UsageNotification {
                severity: UsageSeverity::LimitExceeded,
                origin: LimitOrigin::Stream,
                event,
            });
            return Some(GenerationEvent::Failed(ScribeflowError::LimitExceeded {
                service,
                message,
            }));
        }
        warn!(message = %message, "stream reported an error payload");
        return Some(GenerationEvent::Failed(ScribeflowError::Stream(message)));
    }

    if payload.done.unwrap_or(false) {
        *terminal = true;
        return Some(GenerationEvent::Complete {
            full_text: payload.full_text.unwrap_or_default(),
            words_generated: payload.words_generated.unwrap_or(0),
        });
    }

    if let Some(delta) = payload.chunk {
        return Some(GenerationEvent::Chunk {
            partial: payload.partial.unwrap_or_default(),
            delta,
        });
    }

    // Keep-alive or unknown record shapes are skipped.
    None
}

fn is_limit_condition(message: &str, flag: Option<bool>) -> bool {
    if flag == Some(true) {
        return true;
    }
    let lower = message.to_lowercase();
    LIMIT_MARKERS.iter().any(|m| lower.contains(m))
}
