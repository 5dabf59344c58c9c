//! Translation caching.
//!
//! The orchestrator consults a [`TranslationCache`] before doing any provider
//! work and stores every successful translation afterwards. Keys come from
//! [`generate_cache_key`](crate::hash::generate_cache_key), so a backend only
//! ever sees opaque strings.
//!
//! [`MemoryCache`] is the bundled in-process backend. Shared backends (redis,
//! a database table) implement the trait and are injected through
//! [`OrchestratorBuilder::cache`](crate::OrchestratorBuilder::cache).
//!
//! # Batch decomposition
//!
//! `translate_batch` looks up each text individually, so a single
//! `translate("hello")` populates the entry that a later batch containing
//! `"hello"` can hit. Only misses are forwarded to providers.

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;

use crate::types::Translation;

pub use memory::{CacheConfig, CacheStats, MemoryCache};

/// Storage for finished translations.
///
/// Implementations must be cheap to call concurrently. A failing backend
/// should behave as a miss on `get` and drop the value on `set`; cache
/// trouble never fails a translation.
#[async_trait]
pub trait TranslationCache: Send + Sync {
    /// Look up a cached translation.
    async fn get(&self, key: &str) -> Option<Translation>;

    /// Store a translation. `ttl` overrides the backend's default lifetime.
    async fn set(&self, key: &str, value: Translation, ttl: Option<Duration>);
}
