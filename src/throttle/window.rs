//! Rolling usage window.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Request and token consumption over a trailing time span.
///
/// Entries are appended on admission and pruned lazily: every read goes
/// through [`prune`](Self::prune) first, so only entries with
/// `timestamp >= now - window` ever count.
#[derive(Debug, Default)]
pub struct UsageWindow {
    requests: VecDeque<Instant>,
    tokens: VecDeque<(Instant, u64)>,
    token_sum: u64,
}

impl UsageWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop entries older than `now - window`.
    pub fn prune(&mut self, now: Instant, window: Duration) {
        let Some(cutoff) = now.checked_sub(window) else {
            return;
        };
        while self.requests.front().is_some_and(|&ts| ts < cutoff) {
            self.requests.pop_front();
        }
        while let Some(&(ts, count)) = self.tokens.front() {
            if ts >= cutoff {
                break;
            }
            self.token_sum -= count;
            self.tokens.pop_front();
        }
    }

    /// Record one admitted operation costing `tokens`.
    pub fn record(&mut self, tokens: u64, now: Instant) {
        self.requests.push_back(now);
        self.tokens.push_back((now, tokens));
        self.token_sum += tokens;
    }

    /// Requests counted in the window (call [`prune`](Self::prune) first).
    pub fn requests(&self) -> u64 {
        self.requests.len() as u64
    }

    /// Tokens counted in the window (call [`prune`](Self::prune) first).
    pub fn tokens(&self) -> u64 {
        self.token_sum
    }

    /// Whether one more operation costing `cost` fits under both limits.
    ///
    /// An operation that alone exceeds `token_limit` fits only once the window
    /// holds no token usage at all, so it waits rather than being refused.
    pub fn fits(&self, cost: u64, request_limit: u64, token_limit: u64) -> bool {
        if self.requests() >= request_limit {
            return false;
        }
        if cost > token_limit {
            return self.token_sum == 0;
        }
        self.token_sum + cost <= token_limit
    }

    /// Instant at which the oldest entry leaves the window.
    pub fn next_expiry(&self, window: Duration) -> Option<Instant> {
        let oldest_request = self.requests.front().copied();
        let oldest_tokens = self.tokens.front().map(|&(ts, _)| ts);
        let oldest = match (oldest_request, oldest_tokens) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        oldest.map(|ts| ts + window)
    }

    pub fn clear(&mut self) {
        self.requests.clear();
        self.tokens.clear();
        self.token_sum = 0;
    }
}
