//! Telemetry metric name constants.
//!
//! Centralised metric names for tolk operations. Consumers install their own
//! `metrics` recorder (e.g. prometheus, statsd); without a recorder installed,
//! all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `tolk_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `provider`: provider name (e.g. "opus-mt", "deepl")
//! - `operation`: "translate" or "translate_batch"
//! - `status`: outcome: "ok" or "error"

/// Total provider calls dispatched by the orchestrator.
///
/// Labels: `provider`, `operation`, `status` ("ok" | "error").
pub const REQUESTS_TOTAL: &str = "tolk_requests_total";

/// Orchestrated request duration in seconds, from candidate selection to
/// settlement.
///
/// Labels: `operation`.
pub const REQUEST_DURATION_SECONDS: &str = "tolk_request_duration_seconds";

/// Total retry attempts (not counting the initial attempt).
///
/// Labels: `provider`.
pub const RETRIES_TOTAL: &str = "tolk_retries_total";

/// Total times a candidate failed and the next candidate was tried.
///
/// Labels: `provider` (the candidate that failed).
pub const FALLBACKS_TOTAL: &str = "tolk_fallbacks_total";

/// Total estimated tokens admitted by the throttle.
pub const THROTTLE_TOKENS_TOTAL: &str = "tolk_throttle_tokens_total";

/// Total operations that had to wait in the throttle queue.
pub const THROTTLE_QUEUED_TOTAL: &str = "tolk_throttle_queued_total";

/// Current throttle queue depth.
pub const THROTTLE_QUEUE_DEPTH: &str = "tolk_throttle_queue_depth";

/// Total cache hits.
///
/// Labels: `operation`.
pub const CACHE_HITS_TOTAL: &str = "tolk_cache_hits_total";

/// Total cache misses.
///
/// Labels: `operation`.
pub const CACHE_MISSES_TOTAL: &str = "tolk_cache_misses_total";

/// Total callers that joined an already in-flight operation instead of
/// starting new work.
pub const DEDUPE_JOINS_TOTAL: &str = "tolk_dedupe_joins_total";
