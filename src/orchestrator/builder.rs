//! Builder for configuring orchestrator instances

use std::sync::Arc;
use std::time::Duration;

use super::{Inner, Orchestrator};
use crate::batch::{BatchConfig, Batcher};
use crate::cache::{CacheConfig, MemoryCache, TranslationCache};
use crate::config::Config;
use crate::dedupe::Deduplicator;
use crate::providers::{ProviderRegistry, RetryConfig, RoutingConfig, TranslationProvider};
use crate::throttle::{Throttle, ThrottleConfig};
use crate::{Result, TolkError};

/// Builder for [`Orchestrator`].
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use tolk::{Orchestrator, ThrottleConfig, RetryConfig, CacheConfig};
/// # fn providers() -> Vec<Arc<dyn tolk::TranslationProvider>> { vec![] }
/// let orchestrator = Orchestrator::builder()
///     .providers(providers())
///     .throttle(ThrottleConfig::new().request_limit(30))
///     .retry(RetryConfig::new().max_attempts(4))
///     .memory_cache(CacheConfig::new())
///     .build()?;
/// # Ok::<(), tolk::TolkError>(())
/// ```
pub struct OrchestratorBuilder {
    registry: Option<Arc<ProviderRegistry>>,
    providers: Vec<Arc<dyn TranslationProvider>>,
    throttle: ThrottleConfig,
    retry: RetryConfig,
    batch: BatchConfig,
    routing: RoutingConfig,
    cache: Option<Arc<dyn TranslationCache>>,
    cache_ttl: Option<Duration>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            registry: None,
            providers: Vec::new(),
            throttle: ThrottleConfig::default(),
            retry: RetryConfig::default(),
            batch: BatchConfig::default(),
            routing: RoutingConfig::default(),
            cache: None,
            cache_ttl: None,
        }
    }

    /// Start from a loaded [`Config`]. Providers still have to be added.
    pub fn from_config(config: &Config) -> Self {
        let mut builder = Self::new()
            .throttle(ThrottleConfig::from(&config.throttle))
            .retry(RetryConfig::from(&config.retry))
            .batching(config.batch.clone())
            .routing(config.routing.clone());
        if config.cache.enabled {
            builder = builder.memory_cache(CacheConfig::from(&config.cache));
        }
        builder
    }

    /// Share an existing registry instead of creating a fresh one.
    ///
    /// Providers added with [`provider`](Self::provider) are registered into
    /// it at build time.
    pub fn registry(mut self, registry: Arc<ProviderRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Add a provider. Registration order is the fallback order when routing
    /// sets none.
    pub fn provider(mut self, provider: Arc<dyn TranslationProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn providers<I>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn TranslationProvider>>,
    {
        self.providers.extend(providers);
        self
    }

    pub fn throttle(mut self, config: ThrottleConfig) -> Self {
        self.throttle = config;
        self
    }

    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    pub fn batching(mut self, config: BatchConfig) -> Self {
        self.batch = config;
        self
    }

    /// Provider order and quotas.
    pub fn routing(mut self, config: RoutingConfig) -> Self {
        self.routing = config;
        self
    }

    /// Use a custom cache backend.
    pub fn cache(mut self, cache: Arc<dyn TranslationCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Use the bundled in-memory cache.
    pub fn memory_cache(self, config: CacheConfig) -> Self {
        self.cache(Arc::new(MemoryCache::new(&config)))
    }

    /// TTL passed with every cache write. `None` leaves it to the backend.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Build the orchestrator.
    pub fn build(self) -> Result<Orchestrator> {
        self.throttle.validate()?;
        if self.retry.max_attempts == 0 {
            return Err(TolkError::Configuration(
                "retry max_attempts must be at least 1".into(),
            ));
        }

        let registry = self.registry.unwrap_or_default();
        for provider in self.providers {
            registry.register(provider);
        }
        for (name, quota) in self.routing.quotas {
            registry.set_quota(name, quota);
        }

        Ok(Orchestrator {
            inner: Arc::new(Inner {
                registry,
                throttle: Throttle::new(self.throttle),
                single: Deduplicator::new(),
                batches: Deduplicator::new(),
                retry: self.retry,
                batcher: Batcher::new(self.batch),
                order: self.routing.order,
                cache: self.cache,
                cache_ttl: self.cache_ttl,
            }),
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
