// SPDX-FileCopyrightText: 2026 Scribeflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Paced text reveal decoupled from chunk arrival.
//!
//! Stream chunks land in a buffer as fast as they arrive; a fixed-interval
//! ticker reveals the buffer a few characters at a time so the displayed
//! text advances at a steady, readable rate. The reveal step adapts to the
//! backlog: far behind means bigger steps, nearly caught up means one
//! character per tick.
//!
//! The displayed prefix is monotonic and always a char-boundary-safe prefix
//! of the buffer. On completion the driver fast-forwards to within a small
//! slack, holds a short grace delay, then snaps to the exact final text.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use scribeflow_config::TypingConfig;

/// Reveal pacing state. Pure and synchronous; the async driver owns the
/// clock.
#[derive(Debug)]
pub struct TypingReconciler {
    buffer: String,
    buffer_chars: usize,
    cursor_chars: usize,
    cursor_bytes: usize,
    high_watermark: usize,
    completed: bool,
}

impl TypingReconciler {
    pub fn new(high_watermark: usize) -> Self {
        Self {
            buffer: String::new(),
            buffer_chars: 0,
            cursor_chars: 0,
            cursor_bytes: 0,
            high_watermark: high_watermark.max(2),
            completed: false,
        }
    }

    /// Appends newly arrived text to the buffer without revealing it.
    pub fn push(&mut self, delta: &str) {
        self.buffer.push_str(delta);
        self.buffer_chars += delta.chars().count();
    }

    /// Characters buffered but not yet revealed.
    pub fn behind(&self) -> usize {
        self.buffer_chars - self.cursor_chars
    }

    /// Step size for the next tick, scaled by backlog.
    ///
    /// Above the high watermark the reveal triples, above half of it the
    /// reveal doubles, otherwise one character per tick.
    fn step(&self) -> usize {
        let behind = self.behind();
        if behind > self.high_watermark {
            3
        } else if behind > self.high_watermark / 2 {
            2
        } else {
            1
        }
    }

    /// Advances the cursor by one adaptive step. Returns true if any
    /// characters were revealed.
    pub fn tick(&mut self) -> bool {
        let take = self.step().min(self.behind());
        if take == 0 {
            return false;
        }
        self.advance(take);
        true
    }

    /// Marks the buffer as final. `full_text` replaces the buffer so the
    /// snap lands on exactly what the server produced, even if a trailing
    /// chunk was lost.
    pub fn complete(&mut self, full_text: &str) {
        if full_text != self.buffer {
            // Revealed prefix stays valid only if it still prefixes the
            // final text; otherwise restart the cursor from a safe point.
            if !full_text.is_char_boundary(self.cursor_bytes)
                || !full_text.starts_with(&self.buffer[..self.cursor_bytes])
            {
                self.cursor_bytes = 0;
                self.cursor_chars = 0;
            }
            self.buffer = full_text.to_string();
            self.buffer_chars = full_text.chars().count();
        }
        self.completed = true;
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Jumps the cursor to within `slack` characters of the end.
    pub fn fast_forward_to_slack(&mut self, slack: usize) {
        let behind = self.behind();
        if behind > slack {
            self.advance(behind - slack);
        }
    }

    /// Reveals everything remaining.
    pub fn snap_to_end(&mut self) {
        self.cursor_chars = self.buffer_chars;
        self.cursor_bytes = self.buffer.len();
    }

    /// Clears all state for the next generation.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.buffer_chars = 0;
        self.cursor_chars = 0;
        self.cursor_bytes = 0;
        self.completed = false;
    }

    /// The revealed prefix. Always ends on a char boundary.
    pub fn revealed(&self) -> &str {
        &self.buffer[..self.cursor_bytes]
    }

    fn advance(&mut self, chars: usize) {
        let mut taken = 0;
        for c in self.buffer[self.cursor_bytes..].chars() {
            if taken == chars {
                break;
            }
            self.cursor_bytes += c.len_utf8();
            taken += 1;
        }
        self.cursor_chars += taken;
    }
}

/// Handle for feeding a running [`TypingDriver`].
///
/// Clone-cheap; the reconciler behind it is shared with the driver task.
#[derive(Clone)]
pub struct TypingHandle {
    state: Arc<Mutex<TypingReconciler>>,
    cancel: CancellationToken,
}

impl TypingHandle {
    /// Buffers a newly arrived chunk.
    pub fn push(&self, delta: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.push(delta);
        }
    }

    /// Signals that the generation finished with the given final text.
    pub fn complete(&self, full_text: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.complete(full_text);
        }
    }

    /// Stops the driver and clears pacing state synchronously, so a
    /// subsequent generation starts from an empty display.
    pub fn stop(&self) {
        self.cancel.cancel();
        if let Ok(mut state) = self.state.lock() {
            state.reset();
        }
    }
}

/// Owns the reveal clock. Ticks at a fixed interval, publishing the
/// revealed prefix through a watch channel.
pub struct TypingDriver {
    state: Arc<Mutex<TypingReconciler>>,
    display: watch::Sender<String>,
    cancel: CancellationToken,
    tick_interval: Duration,
    completion_slack: usize,
    grace_delay: Duration,
}

impl TypingDriver {
    /// Builds a driver plus the feeding handle and the display receiver.
    pub fn new(config: &TypingConfig) -> (Self, TypingHandle, watch::Receiver<String>) {
        let state = Arc::new(Mutex::new(TypingReconciler::new(config.high_watermark)));
        let (display, display_rx) = watch::channel(String::new());
        let cancel = CancellationToken::new();
        let handle = TypingHandle {
            state: Arc::clone(&state),
            cancel: cancel.clone(),
        };
        let driver = Self {
            state,
            display,
            cancel,
            tick_interval: Duration::from_millis(config.tick_interval_ms),
            completion_slack: config.completion_slack,
            grace_delay: Duration::from_millis(config.grace_delay_ms),
        };
        (driver, handle, display_rx)
    }

    /// Runs the reveal loop until the text is fully revealed after
    /// completion, or until the handle cancels it.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("typing driver cancelled");
                    return;
                }
                _ = interval.tick() => {}
            }

            enum Phase {
                Continue,
                Finish(String),
            }

            let phase = {
                let Ok(mut state) = self.state.lock() else { return };
                if state.is_completed() {
                    if state.behind() > self.completion_slack {
                        state.fast_forward_to_slack(self.completion_slack);
                        Phase::Finish(state.revealed().to_string())
                    } else if state.behind() > 0 {
                        Phase::Finish(state.revealed().to_string())
                    } else {
                        state.snap_to_end();
                        let _ = self.display.send(state.revealed().to_string());
                        return;
                    }
                } else {
                    if state.tick() {
                        let _ = self.display.send(state.revealed().to_string());
                    }
                    Phase::Continue
                }
            };

            if let Phase::Finish(text) = phase {
                // Show the near-final state for a beat before snapping so
                // the reveal does not end with a visual jump cut.
                let _ = self.display.send(text);
                tokio::select! {
                    _ = self.cancel.cancelled() => return,
                    _ = tokio::time::sleep(self.grace_delay) => {}
                }
                let Ok(mut state) = self.state.lock() else { return };
                state.snap_to_end();
                let _ = self.display.send(state.revealed().to_string());
                return;
            }
        }
    }
}
