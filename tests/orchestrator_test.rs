//! Integration tests for the orchestrator: failover, retry, dedupe, caching,
//! quotas and the batch path.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;

use tolk::{
    BatchConfig, CacheConfig, Orchestrator, ProviderError, ProviderQuota, RetryConfig,
    RoutingConfig, ThrottleConfig, TolkError, TranslateOptions, TranslateRequest, Translation,
    TranslationProvider,
};

// ============================================================================
// Mock provider
// ============================================================================

#[derive(Clone, Copy)]
enum Behavior {
    /// Answers `"{name}:{text}"`.
    Echo,
    Fatal,
    Retryable,
    Empty,
    /// Batch answers are one short.
    ShortBatch,
}

struct Scripted {
    name: &'static str,
    behavior: Behavior,
    delay: Duration,
    calls: AtomicUsize,
    batches: Mutex<Vec<Vec<String>>>,
}

impl Scripted {
    fn new(name: &'static str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            name,
            behavior,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            batches: Mutex::new(Vec::new()),
        })
    }

    fn slow(name: &'static str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name,
            behavior: Behavior::Echo,
            delay,
            calls: AtomicUsize::new(0),
            batches: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }

    fn answer(&self, text: &str) -> Result<Translation, ProviderError> {
        match self.behavior {
            Behavior::Echo | Behavior::ShortBatch => {
                Ok(Translation::new(format!("{}:{text}", self.name), self.name))
            }
            Behavior::Fatal => Err(ProviderError::fatal("invalid credentials")),
            Behavior::Retryable => Err(ProviderError::from_status(503, "unavailable", None)),
            Behavior::Empty => Ok(Translation::new("", self.name)),
        }
    }
}

#[async_trait]
impl TranslationProvider for Scripted {
    fn name(&self) -> &str {
        self.name
    }

    async fn translate(&self, request: &TranslateRequest) -> Result<Translation, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.answer(&request.text)
    }

    async fn translate_batch(
        &self,
        texts: &[String],
        _source_lang: &str,
        _target_lang: &str,
    ) -> Result<Vec<Translation>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batches.lock().unwrap().push(texts.to_vec());
        let mut out = texts
            .iter()
            .map(|t| self.answer(t))
            .collect::<Result<Vec<_>, _>>()?;
        if matches!(self.behavior, Behavior::ShortBatch) {
            out.pop();
        }
        Ok(out)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn fast_retry() -> RetryConfig {
    RetryConfig::new()
        .max_attempts(3)
        .initial_delay(Duration::from_millis(10))
        .jitter(false)
}

fn orchestrator(providers: &[&Arc<Scripted>]) -> Orchestrator {
    let mut builder = Orchestrator::builder().retry(fast_retry());
    for provider in providers {
        builder = builder.provider(Arc::clone(*provider) as Arc<dyn TranslationProvider>);
    }
    builder.build().unwrap()
}

fn en_fi() -> TranslateOptions {
    TranslateOptions::new("en", "fi")
}

// ============================================================================
// Single requests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn first_registered_provider_serves() {
    let a = Scripted::new("a", Behavior::Echo);
    let b = Scripted::new("b", Behavior::Echo);
    let orch = orchestrator(&[&a, &b]);

    let out = orch.translate("hello", &en_fi()).await.unwrap();
    assert_eq!(out, Translation::new("a:hello", "a"));
    assert_eq!(b.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn explicit_provider_goes_first() {
    let a = Scripted::new("a", Behavior::Echo);
    let b = Scripted::new("b", Behavior::Echo);
    let orch = orchestrator(&[&a, &b]);

    let out = orch.translate("hello", &en_fi().provider("b")).await.unwrap();
    assert_eq!(out.provider, "b");
    assert_eq!(a.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn routing_order_overrides_registration_order() {
    let a = Scripted::new("a", Behavior::Echo);
    let b = Scripted::new("b", Behavior::Echo);
    let orch = Orchestrator::builder()
        .provider(a.clone())
        .provider(b.clone())
        .routing(RoutingConfig::new().order(["b", "a"]))
        .build()
        .unwrap();

    assert_eq!(orch.candidates(None), ["b", "a"]);
    let out = orch.translate("hello", &en_fi()).await.unwrap();
    assert_eq!(out.provider, "b");
}

#[tokio::test(start_paused = true)]
async fn fatal_error_fails_over_without_retry() {
    let a = Scripted::new("a", Behavior::Fatal);
    let b = Scripted::new("b", Behavior::Echo);
    let orch = orchestrator(&[&a, &b]);

    let out = orch.translate("hello", &en_fi()).await.unwrap();
    assert_eq!(out.provider, "b");
    assert_eq!(a.calls(), 1);
    assert_eq!(b.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn retryable_error_exhausts_retries_then_fails_over() {
    let a = Scripted::new("a", Behavior::Retryable);
    let b = Scripted::new("b", Behavior::Echo);
    let orch = orchestrator(&[&a, &b]);

    let out = orch.translate("hello", &en_fi()).await.unwrap();
    assert_eq!(out.provider, "b");
    assert_eq!(a.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn empty_answer_is_treated_as_transient() {
    let a = Scripted::new("a", Behavior::Empty);
    let b = Scripted::new("b", Behavior::Echo);
    let orch = orchestrator(&[&a, &b]);

    let out = orch.translate("hello", &en_fi()).await.unwrap();
    assert_eq!(out.provider, "b");
    assert_eq!(a.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn all_candidates_failing_surfaces_last_error() {
    let a = Scripted::new("a", Behavior::Fatal);
    let b = Scripted::new("b", Behavior::Retryable);
    let orch = orchestrator(&[&a, &b]);

    let err = orch.translate("hello", &en_fi()).await.unwrap_err();
    match err {
        TolkError::Provider { provider, source } => {
            assert_eq!(provider, "b");
            assert!(source.is_retryable());
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn empty_registry_reports_no_candidates() {
    let orch = orchestrator(&[]);
    assert_eq!(
        orch.translate("hello", &en_fi()).await,
        Err(TolkError::NoCandidates)
    );
}

#[tokio::test(start_paused = true)]
async fn disabled_providers_report_no_candidates() {
    let a = Scripted::new("a", Behavior::Echo);
    let orch = Orchestrator::builder()
        .provider(a.clone())
        .routing(RoutingConfig::new().quota("a", ProviderQuota::disabled()))
        .build()
        .unwrap();

    assert_eq!(
        orch.translate("hello", &en_fi()).await,
        Err(TolkError::NoCandidates)
    );
    assert_eq!(a.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn missing_languages_are_invalid_input() {
    let a = Scripted::new("a", Behavior::Echo);
    let orch = orchestrator(&[&a]);
    let err = orch
        .translate("hello", &TranslateOptions::new("", "fi"))
        .await
        .unwrap_err();
    assert!(matches!(err, TolkError::InvalidInput(_)));
}

#[tokio::test(start_paused = true)]
async fn concurrent_identical_requests_share_one_call() {
    let a = Scripted::slow("a", Duration::from_millis(100));
    let orch = orchestrator(&[&a]);
    let options = en_fi();

    let results = join_all((0..10).map(|_| orch.translate("same text", &options))).await;

    assert_eq!(a.calls(), 1);
    assert!(results.iter().all(|r| r == &Ok(Translation::new("a:same text", "a"))));
    assert_eq!(orch.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn cached_translation_skips_providers() {
    let a = Scripted::new("a", Behavior::Echo);
    let orch = Orchestrator::builder()
        .provider(a.clone())
        .memory_cache(CacheConfig::new())
        .build()
        .unwrap();

    let first = orch.translate("hello", &en_fi()).await.unwrap();
    let second = orch.translate("  hello ", &en_fi()).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(a.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn quota_usage_moves_traffic_to_next_provider() {
    let a = Scripted::new("a", Behavior::Echo);
    let b = Scripted::new("b", Behavior::Echo);
    let orch = Orchestrator::builder()
        .provider(a.clone())
        .provider(b.clone())
        .routing(RoutingConfig::new().quota("a", ProviderQuota::limited(5)))
        .build()
        .unwrap();

    assert_eq!(orch.translate("hello", &en_fi()).await.unwrap().provider, "a");
    assert_eq!(orch.registry().quota("a").used, 5);
    assert_eq!(orch.candidates(None), ["b"]);
    assert_eq!(orch.translate("world", &en_fi()).await.unwrap().provider, "b");
}

#[tokio::test(start_paused = true)]
async fn registry_reset_and_init_take_effect() {
    let a = Scripted::new("a", Behavior::Echo);
    let orch = orchestrator(&[&a]);

    orch.registry().reset();
    assert_eq!(
        orch.translate("hello", &en_fi()).await,
        Err(TolkError::NoCandidates)
    );

    let b = Scripted::new("b", Behavior::Echo);
    orch.registry().init([b.clone() as Arc<dyn TranslationProvider>]);
    assert_eq!(orch.translate("hello", &en_fi()).await.unwrap().provider, "b");
}

#[tokio::test(start_paused = true)]
async fn cancelled_caller_leaves_the_queue() {
    let a = Scripted::new("a", Behavior::Echo);
    let orch = Orchestrator::builder()
        .provider(a.clone())
        .throttle(
            ThrottleConfig::new()
                .request_limit(1)
                .window(Duration::from_secs(10)),
        )
        .build()
        .unwrap();
    orch.translate("first", &en_fi()).await.unwrap();

    let token = CancellationToken::new();
    let options = en_fi().cancel(token.clone());
    let (second, ()) = tokio::join!(orch.translate("second", &options), async {
        tokio::task::yield_now().await;
        token.cancel();
    });

    assert_eq!(second, Err(TolkError::Cancelled));

    // The abandoned work leaves the throttle queue once its task runs.
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(a.calls(), 1);
    assert_eq!(orch.usage().queue, 0);
    assert_eq!(orch.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn one_caller_cancelling_does_not_fail_joiners() {
    let a = Scripted::slow("a", Duration::from_millis(100));
    let orch = orchestrator(&[&a]);

    let token = CancellationToken::new();
    let owner = en_fi().cancel(token.clone());
    let plain = en_fi();
    let (cancelled, joined, ()) = tokio::join!(
        orch.translate("shared", &owner),
        orch.translate("shared", &plain),
        async {
            tokio::task::yield_now().await;
            token.cancel();
        }
    );

    assert_eq!(cancelled, Err(TolkError::Cancelled));
    assert_eq!(joined, Ok(Translation::new("a:shared", "a")));
    assert_eq!(a.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn abandoned_request_is_not_resumed_later() {
    let a = Scripted::slow("a", Duration::from_millis(100));
    let orch = orchestrator(&[&a]);

    let abandoned =
        tokio::time::timeout(Duration::from_millis(10), orch.translate("hello", &en_fi())).await;
    assert!(abandoned.is_err());
    assert_eq!(orch.in_flight(), 0);

    let out = orch.translate("hello", &en_fi()).await.unwrap();
    assert_eq!(out.text, "a:hello");
}

#[tokio::test(start_paused = true)]
async fn shutdown_rejects_new_work() {
    let a = Scripted::new("a", Behavior::Echo);
    let orch = orchestrator(&[&a]);
    orch.shutdown();
    assert_eq!(
        orch.translate("hello", &en_fi()).await,
        Err(TolkError::Cancelled)
    );
    assert_eq!(a.calls(), 0);
}

// ============================================================================
// Batch requests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn batch_results_follow_input_order_and_fan_out_duplicates() {
    let a = Scripted::new("a", Behavior::Echo);
    let orch = orchestrator(&[&a]);

    let results = orch
        .translate_batch(&["one", "two", "one", "three"], &en_fi())
        .await;

    let texts: Vec<String> = results.into_iter().map(|r| r.unwrap().text).collect();
    assert_eq!(texts, ["a:one", "a:two", "a:one", "a:three"]);
    assert_eq!(a.batches(), [vec!["one", "two", "three"]]);
}

#[tokio::test(start_paused = true)]
async fn batch_splits_by_token_budget() {
    let a = Scripted::new("a", Behavior::Echo);
    let orch = Orchestrator::builder()
        .provider(a.clone())
        .batching(BatchConfig::new().max_tokens(20))
        .build()
        .unwrap();

    let texts = ["Short.", "Another short.", "A longer sentence with more tokens."];
    let results = orch.translate_batch(&texts, &en_fi()).await;

    assert_eq!(results.len(), 3);
    assert!(results.iter().all(Result::is_ok));
    let batches = a.batches();
    assert!(batches.len() >= 2);
    assert_eq!(batches.iter().map(Vec::len).sum::<usize>(), 3);
}

#[tokio::test(start_paused = true)]
async fn batch_only_sends_cache_misses() {
    let a = Scripted::new("a", Behavior::Echo);
    let orch = Orchestrator::builder()
        .provider(a.clone())
        .memory_cache(CacheConfig::new())
        .build()
        .unwrap();

    orch.translate("two", &en_fi()).await.unwrap();
    let results = orch.translate_batch(&["one", "two", "three"], &en_fi()).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(a.batches(), [vec!["one", "three"]]);

    // The batch populated the cache for its items too.
    let again = orch.translate("three", &en_fi()).await.unwrap();
    assert_eq!(again.text, "a:three");
    assert_eq!(a.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn short_batch_answer_fails_over() {
    let a = Scripted::new("a", Behavior::ShortBatch);
    let b = Scripted::new("b", Behavior::Echo);
    let orch = orchestrator(&[&a, &b]);

    let results = orch.translate_batch(&["one", "two"], &en_fi()).await;

    assert_eq!(a.calls(), 3);
    let providers: Vec<String> = results.into_iter().map(|r| r.unwrap().provider).collect();
    assert_eq!(providers, ["b", "b"]);
}

#[tokio::test(start_paused = true)]
async fn failed_batch_error_reaches_every_item() {
    let a = Scripted::new("a", Behavior::Fatal);
    let orch = orchestrator(&[&a]);

    let results = orch.translate_batch(&["one", "two", "one"], &en_fi()).await;
    assert_eq!(results.len(), 3);
    for result in &results {
        assert!(matches!(result, Err(TolkError::Provider { provider, .. }) if provider == "a"));
    }
}

#[tokio::test(start_paused = true)]
async fn batch_without_candidates_fails_every_item() {
    let orch = orchestrator(&[]);
    let results = orch.translate_batch(&["one", "two"], &en_fi()).await;
    assert_eq!(results, [Err(TolkError::NoCandidates), Err(TolkError::NoCandidates)]);
}

#[tokio::test(start_paused = true)]
async fn empty_batch_is_empty() {
    let a = Scripted::new("a", Behavior::Echo);
    let orch = orchestrator(&[&a]);
    let results = orch.translate_batch::<&str>(&[], &en_fi()).await;
    assert!(results.is_empty());
    assert_eq!(a.calls(), 0);
}
