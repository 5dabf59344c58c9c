//! Caller options for orchestrated translation

use tokio_util::sync::CancellationToken;

/// Options for [`Orchestrator::translate`](crate::Orchestrator::translate)
/// and [`Orchestrator::translate_batch`](crate::Orchestrator::translate_batch).
///
/// ```rust
/// # use tolk::TranslateOptions;
/// let options = TranslateOptions::new("en", "fi").provider("opus-mt");
/// assert_eq!(options.provider.as_deref(), Some("opus-mt"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct TranslateOptions {
    pub source_lang: String,
    pub target_lang: String,
    /// Provider to try first. Other configured providers remain fallbacks.
    pub provider: Option<String>,
    /// Log retries and fallbacks at `info` with extra detail.
    pub debug: bool,
    /// Abort queued waits and backoff sleeps for work started by this caller.
    pub cancel: Option<CancellationToken>,
}

impl TranslateOptions {
    pub fn new(source_lang: impl Into<String>, target_lang: impl Into<String>) -> Self {
        Self {
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
            ..Self::default()
        }
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Label used in cache keys: the requested provider, or `auto`.
    pub fn provider_label(&self) -> &str {
        self.provider.as_deref().unwrap_or("auto")
    }
}
