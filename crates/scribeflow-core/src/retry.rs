// SPDX-FileCopyrightText: 2026 Scribeflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded polling combinator.
//!
//! Replaces hand-rolled wait loops (waiting for a connection, waiting for an
//! acknowledgement) with a single helper that resolves to the probed value
//! or a terminal [`ScribeflowError::Exhausted`].

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::ScribeflowError;

/// Policy controlling a bounded poll: fixed interval, capped attempts.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    /// Maximum number of probe attempts, including the first.
    pub max_attempts: usize,
    /// Delay between probe attempts.
    pub interval: Duration,
}

impl PollPolicy {
    pub fn new(max_attempts: usize, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }
}

/// Probes `f` up to `policy.max_attempts` times, sleeping `policy.interval`
/// between attempts.
///
/// `f` receives the 1-based attempt number and returns `Some(value)` when the
/// awaited condition holds. Returns [`ScribeflowError::Exhausted`] when every
/// attempt came back `None`.
pub async fn poll_until<T, F, Fut>(policy: &PollPolicy, mut f: F) -> Result<T, ScribeflowError>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        if let Some(value) = f(attempt).await {
            return Ok(value);
        }
        if attempt < max_attempts {
            debug!(attempt, max_attempts, "poll condition not met, waiting");
            tokio::time::sleep(policy.interval).await;
        }
    }

    Err(ScribeflowError::Exhausted {
        attempts: max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn resolves_when_condition_holds() {
        let policy = PollPolicy::new(5, Duration::from_millis(1));
        let calls = AtomicUsize::new(0);

        let value = poll_until(&policy, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { (attempt == 3).then_some("ready") }
        })
        .await
        .unwrap();

        assert_eq!(value, "ready");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_after_capped_attempts() {
        let policy = PollPolicy::new(4, Duration::from_millis(1));
        let calls = AtomicUsize::new(0);

        let result: Result<(), _> = poll_until(&policy, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { None }
        })
        .await;

        assert!(matches!(
            result,
            Err(ScribeflowError::Exhausted { attempts: 4 })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn first_attempt_success_skips_sleep() {
        let policy = PollPolicy::new(1, Duration::from_secs(60));
        let value = poll_until(&policy, |_| async { Some(42) }).await.unwrap();
        assert_eq!(value, 42);
    }
}
