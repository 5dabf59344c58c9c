//! Request coalescing.
//!
//! [`Deduplicator::dedupe`] keeps at most one in-flight operation per key.
//! The first caller for a key starts the work; callers that arrive while it is
//! pending join it and receive a clone of the same outcome, error included.
//!
//! The work runs on its own task, so it settles even if no caller is polling.
//! The entry is removed right after the work settles and before any caller
//! observes the outcome, so a call made after settlement always starts fresh
//! work. When every caller abandons an operation before it settles, the entry
//! is removed at once and the operation's [`CancellationToken`] fires.
//! Successful results are not retained; caching is the job of a
//! [`TranslationCache`](crate::cache::TranslationCache).

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, trace, warn};

use crate::telemetry;
use crate::{Result, TolkError};

type Outcome<T> = Shared<BoxFuture<'static, Result<T>>>;
type InFlightMap<T> = Arc<Mutex<InFlight<T>>>;

struct InFlight<T> {
    entries: HashMap<String, Entry<T>>,
    next_id: u64,
}

struct Entry<T> {
    id: u64,
    outcome: Outcome<T>,
    cancel: CancellationToken,
    callers: usize,
}

/// Coalesces concurrent work by key.
pub struct Deduplicator<T> {
    in_flight: InFlightMap<T>,
}

impl<T> Default for Deduplicator<T> {
    fn default() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(InFlight {
                entries: HashMap::new(),
                next_id: 0,
            })),
        }
    }
}

impl<T> Deduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` unless an operation for `key` is already in flight, in which
    /// case wait for that one instead. `work` is invoked at most once per
    /// in-flight period, however many callers join.
    ///
    /// `work` receives the operation's cancellation token, which fires only
    /// once every caller waiting on the operation has gone away. Must be
    /// called within a tokio runtime.
    pub async fn dedupe<F, Fut>(&self, key: &str, work: F) -> Result<T>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (outcome, caller) = {
            let mut state = lock(&self.in_flight);
            let state = &mut *state;
            let (id, outcome) = match state.entries.get_mut(key) {
                Some(entry) => {
                    entry.callers += 1;
                    metrics::counter!(telemetry::DEDUPE_JOINS_TOTAL).increment(1);
                    trace!(key, "joined in-flight operation");
                    (entry.id, entry.outcome.clone())
                }
                None => {
                    let id = state.next_id;
                    state.next_id += 1;
                    let cancel = CancellationToken::new();
                    let task = tokio::spawn(work(cancel.clone()).in_current_span());
                    let registry = Arc::clone(&self.in_flight);
                    let owned_key = key.to_string();
                    let outcome = async move {
                        let settled = task.await.unwrap_or_else(|e| {
                            warn!(key = %owned_key, error = %e, "in-flight operation aborted");
                            Err(TolkError::Cancelled)
                        });
                        remove_if_current(&registry, &owned_key, id);
                        settled
                    }
                    .boxed()
                    .shared();
                    state.entries.insert(
                        key.to_string(),
                        Entry {
                            id,
                            outcome: outcome.clone(),
                            cancel,
                            callers: 1,
                        },
                    );
                    (id, outcome)
                }
            };
            let caller = Caller {
                in_flight: Arc::clone(&self.in_flight),
                key: key.to_string(),
                id,
            };
            (outcome, caller)
        };
        let settled = outcome.await;
        drop(caller);
        settled
    }

    /// Whether an operation for `key` is currently pending.
    pub fn is_in_flight(&self, key: &str) -> bool {
        lock(&self.in_flight).entries.contains_key(key)
    }

    /// Number of pending operations.
    pub fn len(&self) -> usize {
        lock(&self.in_flight).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One caller's interest in an in-flight operation. The last caller to drop
/// before settlement cancels the operation and clears its entry.
struct Caller<T> {
    in_flight: InFlightMap<T>,
    key: String,
    id: u64,
}

impl<T> Drop for Caller<T> {
    fn drop(&mut self) {
        let mut state = lock(&self.in_flight);
        let Some(entry) = state.entries.get_mut(&self.key) else {
            return;
        };
        if entry.id != self.id {
            return;
        }
        entry.callers -= 1;
        if entry.callers == 0 {
            entry.cancel.cancel();
            state.entries.remove(&self.key);
            trace!(key = %self.key, "in-flight operation abandoned");
        }
    }
}

fn remove_if_current<T>(in_flight: &Mutex<InFlight<T>>, key: &str, id: u64) {
    let mut state = lock(in_flight);
    if state.entries.get(key).is_some_and(|entry| entry.id == id) {
        state.entries.remove(key);
    }
}

fn lock<T>(state: &Mutex<InFlight<T>>) -> MutexGuard<'_, InFlight<T>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
