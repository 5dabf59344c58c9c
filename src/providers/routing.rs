//! Provider ordering, quota state, and candidate selection.
//!
//! This module provides:
//! - [`RoutingConfig`]: explicit provider order
//! - [`ProviderQuota`]: per-provider usage allowance
//! - [`select_candidates`]: the ordered, duplicate-free list of providers to
//!   attempt for one request
//!
//! # Candidate rule
//!
//! A requested provider that is registered and within quota goes first. The
//! configured order follows, skipping unavailable providers and anything
//! already listed. An empty result is terminal: there is no silent fallback
//! to a provider nobody configured.
//!
//! ```toml
//! [routing]
//! order = ["opus-mt", "deepl", "google"]
//!
//! [routing.quotas.deepl]
//! limit = 500000
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Provider order and initial quota state.
///
/// An empty `order` means "registration order" (see
/// [`ProviderRegistry::names`](super::ProviderRegistry::names)).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Provider names in fallback priority order.
    #[serde(default)]
    pub order: Vec<String>,
    /// Quota state applied to the registry when the orchestrator is built.
    #[serde(default)]
    pub quotas: HashMap<String, ProviderQuota>,
}

impl RoutingConfig {
    /// Create an empty routing config (registration order, no quotas).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the provider order.
    pub fn order<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order = order.into_iter().map(Into::into).collect();
        self
    }

    /// Set the quota for one provider.
    pub fn quota(mut self, provider: impl Into<String>, quota: ProviderQuota) -> Self {
        self.quotas.insert(provider.into(), quota);
        self
    }
}

/// Usage allowance for one provider, in translated characters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderQuota {
    /// Character allowance; `None` means unlimited.
    #[serde(default)]
    pub limit: Option<u64>,
    /// Characters already consumed.
    #[serde(default)]
    pub used: u64,
    /// Administratively disabled regardless of usage.
    #[serde(default)]
    pub disabled: bool,
}

impl ProviderQuota {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn limited(limit: u64) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn disabled() -> Self {
        Self {
            disabled: true,
            ..Self::default()
        }
    }

    /// Whether the provider may take more work.
    pub fn is_available(&self) -> bool {
        !self.disabled && self.limit.is_none_or(|limit| self.used < limit)
    }

    /// Characters left before the limit, if limited.
    pub fn remaining(&self) -> Option<u64> {
        self.limit.map(|limit| limit.saturating_sub(self.used))
    }
}

/// Build the ordered candidate list for one request.
///
/// `is_available` must return false for unregistered or over-quota providers.
pub fn select_candidates<F>(requested: Option<&str>, order: &[String], is_available: F) -> Vec<String>
where
    F: Fn(&str) -> bool,
{
    let mut candidates: Vec<String> = Vec::with_capacity(order.len() + 1);
    let requested = requested.filter(|name| !name.is_empty());
    for name in requested.into_iter().chain(order.iter().map(String::as_str)) {
        if candidates.iter().any(|c| c == name) || !is_available(name) {
            continue;
        }
        candidates.push(name.to_string());
    }
    candidates
}
