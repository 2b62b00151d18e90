//! Bounded polling used by the lookup engine.
//!
//! The calling thread is blocked between attempts. There is no background
//! task: a poll always terminates after its timeout.

use std::time::{Duration, Instant};

use crate::result::DomapResult;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default polling interval (500ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

// =============================================================================
// POLL OPTIONS
// =============================================================================

/// Options for polling lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    /// Delay between two attempts in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl PollOptions {
    /// Create poll options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set polling interval in milliseconds
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Polling interval as Duration
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Run `attempt` until it yields a value or `timeout` elapses.
///
/// The first attempt is immediate. A zero timeout means exactly one attempt.
/// Sleeps are clamped so the loop never waits past the deadline, and the last
/// attempt happens at the deadline. Errors from `attempt` abort polling.
/// A timeout too large to be represented as an instant never expires.
pub fn poll<T>(
    timeout: Duration,
    options: &PollOptions,
    mut attempt: impl FnMut() -> DomapResult<Option<T>>,
) -> DomapResult<Option<T>> {
    let deadline = Instant::now().checked_add(timeout);
    let mut attempts = 0_u32;
    loop {
        attempts = attempts.saturating_add(1);
        if let Some(found) = attempt()? {
            return Ok(Some(found));
        }
        let remaining = deadline.map_or(Duration::MAX, |deadline| {
            deadline.saturating_duration_since(Instant::now())
        });
        if remaining.is_zero() {
            tracing::trace!(attempts, "poll budget exhausted");
            return Ok(None);
        }
        let pause = options.poll_interval().min(remaining);
        tracing::trace!(attempts, pause_ms = pause.as_millis() as u64, "retrying");
        std::thread::sleep(pause);
    }
}
