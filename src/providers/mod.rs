//! Translation providers: the trait, registry, routing and retry policy.
//!
//! Concrete backends (HTTP APIs, local models) live outside this crate and
//! implement [`TranslationProvider`].

pub mod registry;
pub mod retry;
pub mod routing;
pub mod traits;

pub use registry::ProviderRegistry;
pub use retry::{AttemptContext, RetryConfig, with_retry};
pub use routing::{ProviderQuota, RoutingConfig, select_candidates};
pub use traits::TranslationProvider;
