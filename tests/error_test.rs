//! Tests for error classification.

use std::time::Duration;

use tolk::{ProviderError, TolkError};

#[test]
fn status_classification() {
    for status in [408, 425, 429, 500, 502, 503, 504] {
        assert!(
            ProviderError::from_status(status, "x", None).is_retryable(),
            "{status} should be retryable"
        );
    }
    for status in [400, 401, 403, 404, 422] {
        assert!(
            !ProviderError::from_status(status, "x", None).is_retryable(),
            "{status} should be fatal"
        );
    }
}

#[test]
fn status_message_includes_code() {
    let err = ProviderError::from_status(503, "upstream down", None);
    assert_eq!(err.to_string(), "HTTP 503: upstream down");
}

#[test]
fn retry_after_only_on_retryable() {
    let hint = Some(Duration::from_secs(3));
    assert_eq!(ProviderError::rate_limited(hint).retry_after(), hint);
    assert_eq!(ProviderError::from_status(401, "no", hint).retry_after(), None);
}

#[test]
fn transient_classification() {
    let retryable = TolkError::provider("p", ProviderError::retryable("blip"));
    assert!(retryable.is_transient());

    let fatal = TolkError::provider("p", ProviderError::fatal("bad key"));
    assert!(!fatal.is_transient());

    assert!(TolkError::EmptyResponse { provider: "p".into() }.is_transient());
    assert!(
        TolkError::BatchMismatch {
            provider: "p".into(),
            expected: 2,
            got: 1
        }
        .is_transient()
    );
    assert!(!TolkError::NoCandidates.is_transient());
    assert!(!TolkError::Cancelled.is_transient());
    assert!(!TolkError::Configuration("x".into()).is_transient());
}

#[test]
fn provider_hint_surfaces_through_wrapper() {
    let err = TolkError::provider(
        "deepl",
        ProviderError::rate_limited(Some(Duration::from_millis(750))),
    );
    assert_eq!(err.retry_after(), Some(Duration::from_millis(750)));
    assert_eq!(TolkError::NoCandidates.retry_after(), None);
}

#[test]
fn display_names_the_provider() {
    let err = TolkError::provider("deepl", ProviderError::fatal("invalid auth key"));
    assert_eq!(err.to_string(), "provider deepl failed: invalid auth key");
    assert_eq!(
        TolkError::NoCandidates.to_string(),
        "no provider candidates available"
    );
}

#[test]
fn source_chain_reaches_provider_error() {
    use std::error::Error;
    let err = TolkError::provider("p", ProviderError::fatal("inner"));
    let source = err.source().unwrap();
    assert_eq!(source.to_string(), "inner");
}
