//! Sliding window limiter.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::clock::Clock;

/// Sliding window counter over admitted request timestamps.
///
/// Timestamps are appended at the back and expire from the front. The clock is
/// read after the lock is taken, so the deque stays ordered oldest-first even
/// under concurrent callers. Prune, decide and record happen under one lock
/// per window.
#[derive(Debug, Default)]
pub struct SlidingWindow {
    timestamps: Mutex<VecDeque<Instant>>,
}

impl SlidingWindow {
    /// Create an empty window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request and decide whether to admit it.
    ///
    /// Admits while fewer than `max_requests` admissions remain inside the
    /// trailing `window`. Rejected requests are not recorded.
    pub fn allow(&self, window: Duration, max_requests: f64, clock: &dyn Clock) -> bool {
        let mut timestamps = self.timestamps.lock();
        let now = clock.now();

        while let Some(&oldest) = timestamps.front() {
            if now.saturating_duration_since(oldest) > window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() as f64 >= max_requests {
            return false;
        }

        timestamps.push_back(now);
        true
    }

    /// Number of timestamps currently held.
    pub fn len(&self) -> usize {
        self.timestamps.lock().len()
    }

    /// Whether the window holds no timestamps.
    pub fn is_empty(&self) -> bool {
        self.timestamps.lock().is_empty()
    }
}
