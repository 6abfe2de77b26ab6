//! Sliding-window quota over tool invocations that reached the upstream.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub const MAX_REQUESTS: usize = 500;
pub const WINDOW: Duration = Duration::from_secs(15 * 60);

/// Tracks when recorded calls happened; expiry is evaluated lazily on each query.
#[derive(Debug)]
pub struct QuotaTracker {
    limit: usize,
    window: Duration,
    calls: VecDeque<Instant>,
}

impl Default for QuotaTracker {
    fn default() -> Self {
        Self::new(MAX_REQUESTS, WINDOW)
    }
}

impl QuotaTracker {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            calls: VecDeque::with_capacity(limit),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn can_proceed(&mut self) -> bool {
        self.can_proceed_at(Instant::now())
    }

    pub fn record(&mut self) {
        self.record_at(Instant::now());
    }

    pub fn remaining(&mut self) -> usize {
        self.remaining_at(Instant::now())
    }

    pub fn can_proceed_at(&mut self, now: Instant) -> bool {
        self.prune(now);
        self.calls.len() < self.limit
    }

    pub fn record_at(&mut self, at: Instant) {
        self.calls.push_back(at);
    }

    pub fn remaining_at(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.limit.saturating_sub(self.calls.len())
    }

    // A call stays in the window while `now - at < window`.
    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.calls.front() {
            if now.saturating_duration_since(*front) >= self.window {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }
}
