//! Orchestrator: the composition of cache, routing, dedupe, throttle and retry.
//!
//! # Request flow
//!
//! ```text
//! translate(text, options)
//!         │
//!         ▼
//!   cache key ──► cache hit? ──yes──► return cached
//!         │ no
//!         ▼
//!   candidates = select_candidates(requested, order, registry)
//!         │ empty ──► NoCandidates
//!         ▼
//!   dedupe(key) ──► own task; for each candidate:
//!                       throttle.run_with_retry(provider.translate)
//!                       ok    ──► record quota, cache, return
//!                       error ──► next candidate
//!                   all failed ──► last error
//! ```
//!
//! Batch callers go through [`Orchestrator::translate_batch`], which looks up
//! each text in the cache, groups the misses with the [`Batcher`], and runs the
//! same candidate walk once per batch.

mod builder;

pub use builder::OrchestratorBuilder;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::batch::{Batch, Batcher};
use crate::cache::TranslationCache;
use crate::dedupe::Deduplicator;
use crate::hash::generate_cache_key;
use crate::providers::{
    AttemptContext, ProviderRegistry, RetryConfig, TranslationProvider, select_candidates,
};
use crate::telemetry;
use crate::throttle::{Throttle, ThrottleUpdate, ThrottleUsage};
use crate::types::{TranslateOptions, TranslateRequest, Translation};
use crate::{Result, TolkError};

/// Translation request orchestrator.
///
/// Cheap to clone; clones share the throttle, in-flight map, registry and
/// cache.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Arc<ProviderRegistry>,
    throttle: Throttle,
    single: Deduplicator<Translation>,
    batches: Deduplicator<Vec<Translation>>,
    retry: RetryConfig,
    batcher: Batcher,
    order: Vec<String>,
    cache: Option<Arc<dyn TranslationCache>>,
    cache_ttl: Option<Duration>,
}

impl Orchestrator {
    /// Create a new builder.
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Translate one text.
    ///
    /// Concurrent calls for the same text, language pair and provider share
    /// one execution and receive the same outcome.
    #[instrument(
        name = "tolk.translate",
        skip(self, text, options),
        fields(
            source = %options.source_lang,
            target = %options.target_lang,
            provider = options.provider_label(),
        )
    )]
    pub async fn translate(&self, text: &str, options: &TranslateOptions) -> Result<Translation> {
        validate_options(options)?;
        let key = generate_cache_key(
            &[text],
            &options.source_lang,
            &options.target_lang,
            options.provider_label(),
        );
        if let Some(hit) = self.inner.cache_get(&key, "translate").await {
            return Ok(hit);
        }

        let candidates = self.candidates(options.provider.as_deref());
        if candidates.is_empty() {
            return Err(TolkError::NoCandidates);
        }

        let inner = Arc::clone(&self.inner);
        let request = TranslateRequest::new(text, &options.source_lang, &options.target_lang);
        let shared_options = options.clone();
        let owned_key = key.clone();
        let work = self.inner.single.dedupe(&key, move |cancel| async move {
            inner
                .translate_uncached(request, candidates, shared_options.cancel(cancel), owned_key)
                .await
        });
        until_cancelled(options.cancel.as_ref(), work).await
    }

    /// Translate many texts sharing a language pair.
    ///
    /// Returns one result per input, in input order. Cached texts are served
    /// directly; the rest are batched, and every input of a failed batch
    /// carries that batch's error.
    #[instrument(
        name = "tolk.translate_batch",
        skip(self, texts, options),
        fields(
            items = texts.len(),
            source = %options.source_lang,
            target = %options.target_lang,
        )
    )]
    pub async fn translate_batch<S>(
        &self,
        texts: &[S],
        options: &TranslateOptions,
    ) -> Vec<Result<Translation>>
    where
        S: AsRef<str>,
    {
        if let Err(e) = validate_options(options) {
            return vec![Err(e); texts.len()];
        }
        let label = options.provider_label();
        let mut results: Vec<Option<Result<Translation>>> = vec![None; texts.len()];
        let mut misses = Vec::new();
        for (index, text) in texts.iter().enumerate() {
            let key = generate_cache_key(
                &[text.as_ref()],
                &options.source_lang,
                &options.target_lang,
                label,
            );
            match self.inner.cache_get(&key, "translate_batch").await {
                Some(hit) => results[index] = Some(Ok(hit)),
                None => misses.push(index),
            }
        }

        if !misses.is_empty() {
            let candidates = self.candidates(options.provider.as_deref());
            let miss_texts: Vec<&str> = misses.iter().map(|&i| texts[i].as_ref()).collect();
            let batches = self.inner.batcher.batch_nodes(&miss_texts);
            debug!(misses = misses.len(), batches = batches.len(), "batched cache misses");

            let outcomes = join_all(
                batches
                    .iter()
                    .map(|batch| self.run_batch(batch, candidates.clone(), options)),
            )
            .await;

            for (batch, outcome) in batches.iter().zip(outcomes) {
                for (position, entry) in batch.entries.iter().enumerate() {
                    let result = batch_item(batch, &outcome, position);
                    for &origin in &entry.origins {
                        results[misses[origin]] = Some(result.clone());
                    }
                }
            }
        }

        results
            .into_iter()
            .map(|slot| slot.unwrap_or(Err(TolkError::NoCandidates)))
            .collect()
    }

    /// The ordered candidate list a request for `requested` would walk.
    pub fn candidates(&self, requested: Option<&str>) -> Vec<String> {
        let registry = &self.inner.registry;
        let registered;
        let order = if self.inner.order.is_empty() {
            registered = registry.names();
            &registered
        } else {
            &self.inner.order
        };
        select_candidates(requested, order, |name| registry.is_available(name))
    }

    /// Throttle usage for the current window.
    pub fn usage(&self) -> ThrottleUsage {
        self.inner.throttle.usage()
    }

    /// Live-update throttle limits.
    pub fn configure_throttle(&self, update: ThrottleUpdate) {
        self.inner.throttle.configure(update);
    }

    pub fn throttle(&self) -> &Throttle {
        &self.inner.throttle
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.inner.registry
    }

    /// Number of single and batch operations currently in flight.
    pub fn in_flight(&self) -> usize {
        self.inner.single.len() + self.inner.batches.len()
    }

    /// Destroy the throttle. Queued and future work fails with
    /// [`TolkError::Cancelled`].
    pub fn shutdown(&self) {
        info!("orchestrator shutting down");
        self.inner.throttle.destroy();
    }

    async fn run_batch(
        &self,
        batch: &Batch,
        candidates: Vec<String>,
        options: &TranslateOptions,
    ) -> Result<Vec<Translation>> {
        if candidates.is_empty() {
            return Err(TolkError::NoCandidates);
        }
        let texts: Vec<String> = batch.entries.iter().map(|e| e.text.clone()).collect();
        let key = generate_cache_key(
            &texts,
            &options.source_lang,
            &options.target_lang,
            options.provider_label(),
        );
        let inner = Arc::clone(&self.inner);
        let shared_options = options.clone();
        let work = self.inner.batches.dedupe(&key, move |cancel| async move {
            inner
                .batch_uncached(texts, candidates, shared_options.cancel(cancel))
                .await
        });
        until_cancelled(options.cancel.as_ref(), work).await
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.inner.registry)
            .field("throttle", &self.inner.throttle)
            .field("order", &self.inner.order)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl Inner {
    async fn translate_uncached(
        &self,
        request: TranslateRequest,
        candidates: Vec<String>,
        options: TranslateOptions,
        key: String,
    ) -> Result<Translation> {
        let started = Instant::now();
        let request = &request;
        let outcome = self
            .call_candidates(&candidates, &request.text, &options, "translate", move |provider| {
                async move {
                    let name = provider.name().to_string();
                    let mut translation = provider
                        .translate(request)
                        .await
                        .map_err(|e| TolkError::provider(&name, e))?;
                    if translation.text.trim().is_empty() && !request.text.trim().is_empty() {
                        return Err(TolkError::EmptyResponse { provider: name });
                    }
                    translation.provider = name;
                    Ok(translation)
                }
            })
            .await;
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS, "operation" => "translate")
            .record(started.elapsed().as_secs_f64());

        let translation = outcome?;
        self.registry
            .record_usage(&translation.provider, request.text.chars().count() as u64);
        if let Some(cache) = &self.cache {
            cache.set(&key, translation.clone(), self.cache_ttl).await;
        }
        Ok(translation)
    }

    async fn batch_uncached(
        &self,
        texts: Vec<String>,
        candidates: Vec<String>,
        options: TranslateOptions,
    ) -> Result<Vec<Translation>> {
        let started = Instant::now();
        let cost_text = texts.join("\n");
        let texts = &texts;
        let (source, target) = (options.source_lang.as_str(), options.target_lang.as_str());
        let outcome = self
            .call_candidates(&candidates, &cost_text, &options, "translate_batch", move |provider| {
                async move {
                    let name = provider.name().to_string();
                    let translations = provider
                        .translate_batch(texts, source, target)
                        .await
                        .map_err(|e| TolkError::provider(&name, e))?;
                    if translations.len() != texts.len() {
                        return Err(TolkError::BatchMismatch {
                            provider: name,
                            expected: texts.len(),
                            got: translations.len(),
                        });
                    }
                    let empty = texts
                        .iter()
                        .zip(&translations)
                        .any(|(input, out)| out.text.trim().is_empty() && !input.trim().is_empty());
                    if empty {
                        return Err(TolkError::EmptyResponse { provider: name });
                    }
                    Ok(translations
                        .into_iter()
                        .map(|mut t| {
                            t.provider.clone_from(&name);
                            t
                        })
                        .collect::<Vec<_>>())
                }
            })
            .await;
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS, "operation" => "translate_batch")
            .record(started.elapsed().as_secs_f64());

        let translations = outcome?;
        if let Some(first) = translations.first() {
            let chars = texts.iter().map(|t| t.chars().count() as u64).sum::<u64>();
            self.registry.record_usage(&first.provider, chars);
        }
        if let Some(cache) = &self.cache {
            let label = options.provider_label();
            for (text, translation) in texts.iter().zip(&translations) {
                let key = generate_cache_key(&[text], source, target, label);
                cache.set(&key, translation.clone(), self.cache_ttl).await;
            }
        }
        Ok(translations)
    }

    /// Walk `candidates` in order, running `call` through the throttle with
    /// retry for each, until one succeeds.
    async fn call_candidates<T, F, Fut>(
        &self,
        candidates: &[String],
        cost_text: &str,
        options: &TranslateOptions,
        operation: &'static str,
        mut call: F,
    ) -> Result<T>
    where
        F: FnMut(Arc<dyn TranslationProvider>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_error = None;
        for (index, name) in candidates.iter().enumerate() {
            // The registry may have changed since the candidates were chosen.
            let Some(provider) = self.registry.get(name) else {
                continue;
            };
            let ctx = AttemptContext::new(name)
                .cancel(options.cancel.as_ref())
                .debug(options.debug);
            let result = self
                .throttle
                .run_with_retry(|| call(Arc::clone(&provider)), cost_text, &self.retry, ctx)
                .await;

            let status = if result.is_ok() { "ok" } else { "error" };
            metrics::counter!(
                telemetry::REQUESTS_TOTAL,
                "provider" => name.clone(),
                "operation" => operation,
                "status" => status,
            )
            .increment(1);

            let err = match result {
                Ok(value) => return Ok(value),
                Err(TolkError::Cancelled) => return Err(TolkError::Cancelled),
                Err(e) => e,
            };

            let next = candidates.get(index + 1);
            if let Some(next) = next {
                metrics::counter!(telemetry::FALLBACKS_TOTAL, "provider" => name.clone())
                    .increment(1);
                if options.debug {
                    info!(provider = %name, next = %next, operation, error = %err, "provider failed, trying next candidate");
                } else {
                    warn!(provider = %name, next = %next, operation, error = %err, "provider failed, trying next candidate");
                }
            }
            last_error = Some(err);
        }
        Err(last_error.unwrap_or(TolkError::NoCandidates))
    }

    async fn cache_get(&self, key: &str, operation: &'static str) -> Option<Translation> {
        let cache = self.cache.as_ref()?;
        match cache.get(key).await {
            Some(hit) => {
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "operation" => operation)
                    .increment(1);
                Some(hit)
            }
            None => {
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "operation" => operation)
                    .increment(1);
                None
            }
        }
    }
}

/// The outcome for entry `position` of `batch`.
///
/// A coalesced batch outcome comes from whichever batch claimed the key
/// first, so its length is checked rather than trusted.
fn batch_item(
    batch: &Batch,
    outcome: &Result<Vec<Translation>>,
    position: usize,
) -> Result<Translation> {
    let translations = outcome.as_ref().map_err(Clone::clone)?;
    translations
        .get(position)
        .cloned()
        .ok_or_else(|| TolkError::BatchMismatch {
            provider: translations
                .first()
                .map(|t| t.provider.clone())
                .unwrap_or_default(),
            expected: batch.entries.len(),
            got: translations.len(),
        })
}

/// Await `work` unless the caller's own token fires first. Dropping `work`
/// only withdraws this caller from a shared operation.
async fn until_cancelled<T>(
    cancel: Option<&CancellationToken>,
    work: impl Future<Output = Result<T>>,
) -> Result<T> {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(TolkError::Cancelled),
            outcome = work => outcome,
        },
        None => work.await,
    }
}

fn validate_options(options: &TranslateOptions) -> Result<()> {
    if options.source_lang.trim().is_empty() || options.target_lang.trim().is_empty() {
        return Err(TolkError::InvalidInput(
            "source and target language are required".into(),
        ));
    }
    Ok(())
}
