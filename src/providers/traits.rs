//! Provider trait for translation backends.
//!
//! The orchestration core never talks to a network itself. A provider is
//! anything that can turn a [`TranslateRequest`] into a [`Translation`] or
//! fail with a classified [`ProviderError`].
//!
//! # Failure classification
//!
//! Providers decide retryability once, where they interpret the transport
//! response:
//!
//! ```ignore
//! async fn translate(&self, request: &TranslateRequest) -> Result<Translation, ProviderError> {
//!     let response = self.client.post(..).send().await
//!         .map_err(|e| ProviderError::retryable(e.to_string()))?;
//!     if !response.status().is_success() {
//!         return Err(ProviderError::from_status(response.status().as_u16(), body, retry_after));
//!     }
//!     // ... parse the translation
//! }
//! ```

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::types::{TranslateRequest, Translation};

/// A translation backend.
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    /// Provider name, used for routing, quotas, cache keys and logging.
    fn name(&self) -> &str;

    /// Translate a single text.
    async fn translate(&self, request: &TranslateRequest) -> Result<Translation, ProviderError>;

    /// Translate several texts sharing a language pair, returning one
    /// translation per input in the same order.
    ///
    /// Default implementation calls `translate` sequentially.
    async fn translate_batch(
        &self,
        texts: &[String],
        source_lang: &str,
        target_lang: &str,
    ) -> Result<Vec<Translation>, ProviderError> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            let request = TranslateRequest::new(text.as_str(), source_lang, target_lang);
            results.push(self.translate(&request).await?);
        }
        Ok(results)
    }
}
