// SPDX-FileCopyrightText: 2026 Scribeflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the assembled client pipeline: SSE stream into the
//! typing reveal, with limit events arbitrated across the stream and push
//! channels.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use scribeflow_client::{GenerationEvent, RestClient, StreamConsumer, TypingDriver};
use scribeflow_config::{ApiConfig, TypingConfig};
use scribeflow_core::{
    Credential, LimitGate, LimitOrigin, NotificationCenter, ScribeflowError, TokenStore,
    UsageEvent, UsageNotification, UsageSeverity,
};

fn sse_response(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body.to_string())
}

struct Pipeline {
    consumer: StreamConsumer,
    limits: Arc<LimitGate>,
}

async fn pipeline(server: &MockServer) -> Pipeline {
    let tokens = Arc::new(TokenStore::new());
    tokens.set(Credential::new("e2e-token", Some("refresh")));
    let limits = Arc::new(LimitGate::new());
    let api = ApiConfig {
        base_url: server.uri(),
        realtime_url: None,
        request_timeout_secs: 5,
    };
    let rest = Arc::new(
        RestClient::new(&api, Arc::clone(&tokens), Arc::new(NotificationCenter::new())).unwrap(),
    );
    let consumer = StreamConsumer::new(&server.uri(), rest, tokens, Arc::clone(&limits));
    Pipeline { consumer, limits }
}

/// A full generation flows through the typing reveal and lands on exactly
/// the server's final text.
#[tokio::test]
async fn generation_streams_through_typing_to_final_text() {
    let server = MockServer::start().await;
    let sse = concat!(
        "data: {\"chunk\":\"The quick \",\"partial\":\"The quick \"}\n\n",
        "data: {\"chunk\":\"brown fox\",\"partial\":\"The quick brown fox\"}\n\n",
        "data: {\"done\":true,\"fullText\":\"The quick brown fox\",\"wordsGenerated\":4}\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/generate/stream"))
        .respond_with(sse_response(sse))
        .mount(&server)
        .await;

    let p = pipeline(&server).await;
    let typing_config = TypingConfig {
        tick_interval_ms: 1,
        high_watermark: 200,
        completion_slack: 4,
        grace_delay_ms: 2,
    };
    let (driver, typing, mut display) = TypingDriver::new(&typing_config);
    let driver_task = tokio::spawn(driver.run());

    let mut stream = p
        .consumer
        .open(serde_json::json!({"prompt": "fox"}), CancellationToken::new())
        .await
        .unwrap();

    while let Some(event) = stream.next().await {
        match event {
            GenerationEvent::Chunk { delta, .. } => typing.push(&delta),
            GenerationEvent::Complete { full_text, .. } => typing.complete(&full_text),
            GenerationEvent::Failed(e) => panic!("unexpected failure: {e}"),
        }
    }

    driver_task.await.unwrap();
    assert_eq!(*display.borrow_and_update(), "The quick brown fox");
}

/// When the push channel reports the limit before the stream's own error
/// record arrives, subscribers see exactly one limit event, tagged with
/// the push origin. The stream caller still gets its terminal failure.
#[tokio::test]
async fn push_and_stream_limit_reports_collapse_to_one() {
    let server = MockServer::start().await;
    let sse = concat!(
        "data: {\"chunk\":\"partial out\",\"partial\":\"partial out\"}\n\n",
        "data: {\"error\":\"Word limit exceeded\",\"limitExceeded\":true}\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/generate/stream"))
        .respond_with(sse_response(sse))
        .mount(&server)
        .await;

    let p = pipeline(&server).await;
    let mut limit_rx = p.limits.subscribe();
    let mut stream = p
        .consumer
        .open(serde_json::json!({}), CancellationToken::new())
        .await
        .unwrap();

    // First chunk arrives, then the push channel gets there first.
    assert!(matches!(
        stream.next().await,
        Some(GenerationEvent::Chunk { .. })
    ));
    let claimed = p.limits.publish(UsageNotification {
        severity: UsageSeverity::LimitExceeded,
        origin: LimitOrigin::Push,
        event: UsageEvent {
            service: "text".into(),
            used: 1000,
            limit: 1000,
            percentage: 100.0,
            remaining: 0,
            message: "Word limit exceeded".into(),
        },
    });
    assert!(claimed);

    // The stream's own limit record still terminates the generation for
    // the caller, but its duplicate report is dropped by the gate.
    assert!(matches!(
        stream.next().await,
        Some(GenerationEvent::Failed(ScribeflowError::LimitExceeded { .. }))
    ));
    assert!(stream.next().await.is_none());

    let first = limit_rx.try_recv().unwrap();
    assert_eq!(first.origin, LimitOrigin::Push);
    assert!(
        limit_rx.try_recv().is_err(),
        "second limit report must be deduplicated"
    );
}

/// A push-channel limit cancels an in-flight generation: once the token
/// fires, the stream yields nothing further.
#[tokio::test]
async fn push_limit_cancels_generation_midstream() {
    let server = MockServer::start().await;
    let sse = concat!(
        "data: {\"chunk\":\"first\",\"partial\":\"first\"}\n\n",
        "data: {\"chunk\":\"second\",\"partial\":\"firstsecond\"}\n\n",
        "data: {\"done\":true,\"fullText\":\"firstsecond\",\"wordsGenerated\":2}\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/generate/stream"))
        .respond_with(sse_response(sse))
        .mount(&server)
        .await;

    let p = pipeline(&server).await;
    let cancel = CancellationToken::new();

    // Mirrors the binary's wiring: a limit notification trips the token.
    let mut limit_rx = p.limits.subscribe();
    let limit_cancel = cancel.clone();
    let watcher = tokio::spawn(async move {
        while let Ok(n) = limit_rx.recv().await {
            if n.severity == UsageSeverity::LimitExceeded {
                limit_cancel.cancel();
                return;
            }
        }
    });

    let mut stream = p
        .consumer
        .open(serde_json::json!({}), cancel.clone())
        .await
        .unwrap();

    assert!(matches!(
        stream.next().await,
        Some(GenerationEvent::Chunk { .. })
    ));

    p.limits.publish(UsageNotification {
        severity: UsageSeverity::LimitExceeded,
        origin: LimitOrigin::Push,
        event: UsageEvent {
            service: "text".into(),
            message: "limit hit".into(),
            ..UsageEvent::default()
        },
    });
    watcher.await.unwrap();

    // Remaining records are unread; the stream ends quietly.
    let mut trailing = 0;
    while tokio::time::timeout(Duration::from_millis(200), stream.next())
        .await
        .ok()
        .flatten()
        .is_some()
    {
        trailing += 1;
    }
    assert!(trailing <= 1, "at most one already-buffered event may slip out");
}
