//! Tolk - translation request orchestration
//!
//! This crate sits between callers that need text translated and the
//! translation providers that do the work. It decides when, how often, in what
//! grouping and against which provider each request runs:
//!
//! - [`hash`]: stable content hashes and cache keys
//! - [`throttle`]: rolling-window request/token rate limiting with a FIFO queue
//! - [`batch`]: token-bounded batching with in-batch duplicate collapsing
//! - [`dedupe`]: coalescing of concurrent identical requests
//! - [`providers`]: provider trait, registry, candidate routing, retry policy
//! - [`orchestrator`]: the composition of all of the above
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use tolk::{
//!     Orchestrator, ProviderError, TranslateOptions, TranslateRequest, Translation,
//!     TranslationProvider,
//! };
//!
//! struct Upper;
//!
//! #[async_trait]
//! impl TranslationProvider for Upper {
//!     fn name(&self) -> &str {
//!         "upper"
//!     }
//!
//!     async fn translate(&self, request: &TranslateRequest) -> Result<Translation, ProviderError> {
//!         Ok(Translation::new(request.text.to_uppercase(), "upper"))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> tolk::Result<()> {
//!     let orchestrator = Orchestrator::builder()
//!         .provider(Arc::new(Upper))
//!         .build()?;
//!
//!     let options = TranslateOptions::new("en", "fi");
//!     let translation = orchestrator.translate("hello", &options).await?;
//!     println!("{} (via {})", translation.text, translation.provider);
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod cache;
pub mod config;
pub mod dedupe;
pub mod error;
pub mod hash;
pub mod orchestrator;
pub mod providers;
pub mod telemetry;
pub mod throttle;
pub mod tokens;
pub mod types;

// Re-export main types at crate root
pub use error::{ProviderError, Result, TolkError};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};

pub use batch::{Batch, BatchConfig, BatchEntry, Batcher};
pub use cache::{CacheConfig, CacheStats, MemoryCache, TranslationCache};
pub use config::Config;
pub use dedupe::Deduplicator;
pub use hash::generate_cache_key;
pub use providers::{
    ProviderQuota, ProviderRegistry, RetryConfig, RoutingConfig, TranslationProvider,
};
pub use throttle::{Throttle, ThrottleConfig, ThrottleUpdate, ThrottleUsage};

pub use types::{TranslateOptions, TranslateRequest, Translation};
