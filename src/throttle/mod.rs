//! Rolling-window rate throttle with a FIFO admission queue.
//!
//! A [`Throttle`] gates arbitrary async work so that within any trailing
//! `window`, at most `request_limit` operations start and at most
//! `token_limit` estimated tokens are consumed.
//!
//! # Admission
//!
//! ```text
//! run_with_rate_limit(work, text)
//!         │
//!         ▼
//!   queue empty and budget fits? ──yes──► record usage, run work
//!         │ no
//!         ▼
//!   enqueue (FIFO) ──► drain task releases the head once the window has
//!                      slack and `window / request_limit` has passed since
//!                      the previous release
//! ```
//!
//! A newcomer never overtakes a queued request, even if its own cost would
//! fit: the queue is strictly first in, first out.
//!
//! The drain task is spawned on demand and exits once the queue is empty. It
//! holds only a weak reference, so dropping the last handle destroys the
//! throttle and rejects anything still queued with
//! [`TolkError::Cancelled`].

pub mod window;

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::providers::retry::{AttemptContext, RetryConfig, with_retry};
use crate::telemetry;
use crate::tokens::approx_tokens;
use crate::{Result, TolkError};

pub use window::UsageWindow;

/// Throttle limits.
#[derive(Debug, Clone, PartialEq)]
pub struct ThrottleConfig {
    /// Maximum operations started per window. Default: 60.
    pub request_limit: u64,
    /// Maximum estimated tokens consumed per window. Default: 100,000.
    pub token_limit: u64,
    /// Length of the trailing window. Default: 60s.
    pub window: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            request_limit: 60,
            token_limit: 100_000,
            window: Duration::from_secs(60),
        }
    }
}

impl ThrottleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_limit(mut self, n: u64) -> Self {
        self.request_limit = n;
        self
    }

    pub fn token_limit(mut self, n: u64) -> Self {
        self.token_limit = n;
        self
    }

    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Spacing between consecutive releases from the queue.
    pub fn cooldown(&self) -> Duration {
        self.window / u32::try_from(self.request_limit.max(1)).unwrap_or(u32::MAX)
    }

    /// Reject limits that could never admit anything.
    pub fn validate(&self) -> Result<()> {
        if self.request_limit == 0 {
            return Err(TolkError::Configuration(
                "throttle request_limit must be at least 1".into(),
            ));
        }
        if self.token_limit == 0 {
            return Err(TolkError::Configuration(
                "throttle token_limit must be at least 1".into(),
            ));
        }
        if self.window.is_zero() {
            return Err(TolkError::Configuration(
                "throttle window must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Partial update for [`Throttle::configure`]. Unset fields keep their value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThrottleUpdate {
    pub request_limit: Option<u64>,
    pub token_limit: Option<u64>,
    pub window: Option<Duration>,
}

/// Snapshot returned by [`Throttle::usage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleUsage {
    /// Operations started within the current window.
    pub requests: u64,
    /// Tokens consumed within the current window.
    pub tokens: u64,
    /// Operations started since creation or the last reset.
    pub total_requests: u64,
    /// Tokens consumed since creation or the last reset.
    pub total_tokens: u64,
    pub request_limit: u64,
    pub token_limit: u64,
    /// Operations waiting for admission.
    pub queue: usize,
}

/// Rolling-window rate throttle. See the [module docs](self).
pub struct Throttle {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<State>,
    wake: Arc<Notify>,
}

struct State {
    config: ThrottleConfig,
    window: UsageWindow,
    queue: VecDeque<Waiter>,
    total_requests: u64,
    total_tokens: u64,
    last_release: Option<Instant>,
    next_id: u64,
    drain: Option<JoinHandle<()>>,
    destroyed: bool,
}

/// A queued request waiting for budget.
struct Waiter {
    id: u64,
    tokens: u64,
    enqueued_at: Instant,
    grant: oneshot::Sender<Result<()>>,
}

impl State {
    fn admit(&mut self, tokens: u64, now: Instant) {
        self.window.record(tokens, now);
        self.total_requests += 1;
        self.total_tokens += tokens;
        metrics::counter!(telemetry::THROTTLE_TOKENS_TOTAL).increment(tokens);
    }

    fn fits(&self, tokens: u64) -> bool {
        self.window
            .fits(tokens, self.config.request_limit, self.config.token_limit)
    }

    fn reject_queued(&mut self) {
        for waiter in self.queue.drain(..) {
            let _ = waiter.grant.send(Err(TolkError::Cancelled));
        }
        metrics::gauge!(telemetry::THROTTLE_QUEUE_DEPTH).set(0.0);
    }

    fn remove_waiter(&mut self, id: u64) {
        self.queue.retain(|w| w.id != id);
        metrics::gauge!(telemetry::THROTTLE_QUEUE_DEPTH).set(self.queue.len() as f64);
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Throttle {
    /// Create a throttle. Zero limits are raised to one; use
    /// [`ThrottleConfig::validate`] to reject them instead.
    pub fn new(config: ThrottleConfig) -> Self {
        let config = ThrottleConfig {
            request_limit: config.request_limit.max(1),
            token_limit: config.token_limit.max(1),
            window: config.window,
        };
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    config,
                    window: UsageWindow::new(),
                    queue: VecDeque::new(),
                    total_requests: 0,
                    total_tokens: 0,
                    last_release: None,
                    next_id: 0,
                    drain: None,
                    destroyed: false,
                }),
                wake: Arc::new(Notify::new()),
            }),
        }
    }

    /// Current limits.
    pub fn config(&self) -> ThrottleConfig {
        self.inner.lock().config.clone()
    }

    /// Run `work` once the window has budget for `text_for_cost`.
    ///
    /// Runs immediately when nothing is queued and the cost fits; otherwise
    /// waits its turn in the FIFO queue. Returns the outcome of `work`, or
    /// [`TolkError::Cancelled`] if `cancel` fires while queued or the throttle
    /// is reset/destroyed first.
    pub async fn run_with_rate_limit<F, Fut, T>(
        &self,
        work: F,
        text_for_cost: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.acquire(approx_tokens(text_for_cost), cancel).await?;
        work().await
    }

    /// Run `work` through [`run_with_rate_limit`](Self::run_with_rate_limit)
    /// with retry on transient errors.
    ///
    /// Every attempt is admitted separately, so retries consume budget like
    /// any other request.
    pub async fn run_with_retry<F, Fut, T>(
        &self,
        mut work: F,
        text_for_cost: &str,
        retry: &RetryConfig,
        ctx: AttemptContext<'_>,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        with_retry(retry, ctx, || {
            let attempt = work();
            self.run_with_rate_limit(move || attempt, text_for_cost, ctx.cancel)
        })
        .await
    }

    /// Usage within the current window plus lifetime counters.
    ///
    /// Prunes stale window entries as a side effect.
    pub fn usage(&self) -> ThrottleUsage {
        let mut state = self.inner.lock();
        let window = state.config.window;
        state.window.prune(Instant::now(), window);
        ThrottleUsage {
            requests: state.window.requests(),
            tokens: state.window.tokens(),
            total_requests: state.total_requests,
            total_tokens: state.total_tokens,
            request_limit: state.config.request_limit,
            token_limit: state.config.token_limit,
            queue: state.queue.len(),
        }
    }

    /// Clear window entries and lifetime counters, and reject every queued
    /// request with [`TolkError::Cancelled`]. The throttle stays usable.
    pub fn reset(&self) {
        let mut state = self.inner.lock();
        state.window.clear();
        state.total_requests = 0;
        state.total_tokens = 0;
        state.last_release = None;
        state.reject_queued();
        drop(state);
        self.inner.wake.notify_one();
    }

    /// Update limits without losing accumulated usage.
    pub fn configure(&self, update: ThrottleUpdate) {
        let mut state = self.inner.lock();
        if let Some(n) = update.request_limit {
            state.config.request_limit = n.max(1);
        }
        if let Some(n) = update.token_limit {
            state.config.token_limit = n.max(1);
        }
        if let Some(window) = update.window {
            state.config.window = window;
        }
        debug!(config = ?state.config, "throttle reconfigured");
        drop(state);
        self.inner.wake.notify_one();
    }

    /// Stop the drain task and reject queued and future work with
    /// [`TolkError::Cancelled`]. Idempotent.
    pub fn destroy(&self) {
        let mut state = self.inner.lock();
        if state.destroyed {
            return;
        }
        state.destroyed = true;
        if let Some(handle) = state.drain.take() {
            handle.abort();
        }
        state.reject_queued();
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.lock().destroyed
    }

    async fn acquire(&self, tokens: u64, cancel: Option<&CancellationToken>) -> Result<()> {
        let (id, grant) = {
            let mut state = self.inner.lock();
            if state.destroyed {
                return Err(TolkError::Cancelled);
            }
            let now = Instant::now();
            let window = state.config.window;
            state.window.prune(now, window);
            if state.queue.is_empty() && state.fits(tokens) {
                state.admit(tokens, now);
                return Ok(());
            }

            let (tx, rx) = oneshot::channel();
            let id = state.next_id;
            state.next_id += 1;
            state.queue.push_back(Waiter {
                id,
                tokens,
                enqueued_at: now,
                grant: tx,
            });
            metrics::counter!(telemetry::THROTTLE_QUEUED_TOTAL).increment(1);
            metrics::gauge!(telemetry::THROTTLE_QUEUE_DEPTH).set(state.queue.len() as f64);
            debug!(tokens, queue = state.queue.len(), "throttle budget exhausted, queued");
            self.ensure_drain(&mut state);
            (id, rx)
        };

        let granted = match cancel {
            Some(token) => tokio::select! {
                granted = grant => granted,
                _ = token.cancelled() => {
                    self.inner.lock().remove_waiter(id);
                    return Err(TolkError::Cancelled);
                }
            },
            None => grant.await,
        };
        // A dropped sender means the throttle went away underneath us.
        granted.unwrap_or(Err(TolkError::Cancelled))
    }

    fn ensure_drain(&self, state: &mut State) {
        if state.drain.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let inner = Arc::downgrade(&self.inner);
        let wake = Arc::clone(&self.inner.wake);
        state.drain = Some(tokio::spawn(drain_queue(inner, wake)));
    }
}

impl Drop for Throttle {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for Throttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttle")
            .field("usage", &self.usage())
            .finish()
    }
}

/// Release queued requests in order as budget frees up.
async fn drain_queue(inner: Weak<Inner>, wake: Arc<Notify>) {
    loop {
        let Some(strong) = inner.upgrade() else {
            return;
        };
        let wait = {
            let mut state = strong.lock();
            match next_release(&mut state) {
                Some(wait) => wait,
                None => {
                    state.drain = None;
                    return;
                }
            }
        };
        if wait.is_zero() {
            continue;
        }

        // Keep only a weak handle while asleep; configure/reset wake us early.
        drop(strong);
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = wake.notified() => {}
        }
    }
}

/// Release the head of the queue if possible.
///
/// Returns `None` when the queue is empty or the throttle is destroyed,
/// `Some(ZERO)` after releasing (or discarding) an entry, and otherwise how
/// long to sleep before looking again.
fn next_release(state: &mut State) -> Option<Duration> {
    if state.destroyed {
        return None;
    }
    // Callers that gave up leave a closed channel behind.
    while state.queue.front().is_some_and(|w| w.grant.is_closed()) {
        state.queue.pop_front();
    }
    let head_tokens = state.queue.front()?.tokens;

    let now = Instant::now();
    let window = state.config.window;
    state.window.prune(now, window);

    let cooldown_ready = state
        .last_release
        .map(|t| t + state.config.cooldown())
        .filter(|ready| *ready > now);

    if cooldown_ready.is_none() && state.fits(head_tokens) {
        let waiter = state.queue.pop_front()?;
        state.admit(waiter.tokens, now);
        state.last_release = Some(now);
        metrics::gauge!(telemetry::THROTTLE_QUEUE_DEPTH).set(state.queue.len() as f64);
        debug!(
            tokens = waiter.tokens,
            waited_ms = now.duration_since(waiter.enqueued_at).as_millis() as u64,
            queue = state.queue.len(),
            "throttle released queued request"
        );
        // Receiver may have been dropped after the closed check; usage stays
        // recorded since the slot was granted.
        let _ = waiter.grant.send(Ok(()));
        return Some(Duration::ZERO);
    }

    let mut ready = cooldown_ready.unwrap_or(now);
    if !state.fits(head_tokens) {
        // Entries at exactly `now - window` still count, so aim just past.
        let expiry = state
            .window
            .next_expiry(window)
            .map(|t| t + Duration::from_millis(1))
            .unwrap_or(now);
        ready = ready.max(expiry);
    }
    Some(ready.saturating_duration_since(now).max(Duration::from_millis(1)))
}
