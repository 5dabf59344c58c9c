//! Provider registry with quota tracking.
//!
//! The `ProviderRegistry` stores providers by name in registration order,
//! alongside their [`ProviderQuota`]. It is the single source of truth for
//! "which providers exist and which may take work right now"; candidate
//! ordering lives in [`routing`](super::routing).
//!
//! The registry is shared (`Arc`) between the orchestrator and whoever manages
//! providers, so all methods take `&self`. `init` replaces the whole provider
//! set; `reset` empties it.
//!
//! ```text
//! init([opus-mt, deepl])         registry: opus-mt, deepl
//! set_quota(deepl, limit 1000)   deepl: 0/1000
//! record_usage(deepl, 1000)      deepl: 1000/1000 → unavailable
//! ```

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use super::routing::ProviderQuota;
use super::traits::TranslationProvider;

/// Registry of translation providers and their quotas.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<Vec<Arc<dyn TranslationProvider>>>,
    quotas: RwLock<HashMap<String, ProviderQuota>>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the registered providers.
    ///
    /// Quota state for providers that remain registered is kept.
    pub fn init<I>(&self, providers: I)
    where
        I: IntoIterator<Item = Arc<dyn TranslationProvider>>,
    {
        let mut registered = write(&self.providers);
        registered.clear();
        for provider in providers {
            insert(&mut registered, provider);
        }
        info!(
            providers = ?registered.iter().map(|p| p.name()).collect::<Vec<_>>(),
            "provider registry initialised"
        );
    }

    /// Remove every provider and forget all quota state.
    pub fn reset(&self) {
        write(&self.providers).clear();
        write(&self.quotas).clear();
        debug!("provider registry reset");
    }

    /// Register one provider, replacing any provider with the same name in
    /// place.
    pub fn register(&self, provider: Arc<dyn TranslationProvider>) {
        insert(&mut write(&self.providers), provider);
    }

    /// Look up a provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn TranslationProvider>> {
        read(&self.providers)
            .iter()
            .find(|p| p.name() == name)
            .cloned()
    }

    /// Provider names in registration order.
    pub fn names(&self) -> Vec<String> {
        read(&self.providers)
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        read(&self.providers).iter().any(|p| p.name() == name)
    }

    pub fn len(&self) -> usize {
        read(&self.providers).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Set (or replace) the quota for a provider.
    pub fn set_quota(&self, name: impl Into<String>, quota: ProviderQuota) {
        write(&self.quotas).insert(name.into(), quota);
    }

    /// Current quota for a provider. Providers without an explicit quota are
    /// unlimited.
    pub fn quota(&self, name: &str) -> ProviderQuota {
        read(&self.quotas).get(name).cloned().unwrap_or_default()
    }

    /// Add `chars` to the provider's consumed quota.
    pub fn record_usage(&self, name: &str, chars: u64) {
        let mut quotas = write(&self.quotas);
        let quota = quotas.entry(name.to_string()).or_default();
        quota.used = quota.used.saturating_add(chars);
        if !quota.is_available() {
            info!(provider = name, used = quota.used, limit = ?quota.limit, "provider quota exhausted");
        }
    }

    /// Whether the provider is registered and within quota.
    pub fn is_available(&self, name: &str) -> bool {
        self.contains(name) && read(&self.quotas).get(name).is_none_or(ProviderQuota::is_available)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .field("quotas", &*read(&self.quotas))
            .finish()
    }
}

fn insert(registered: &mut Vec<Arc<dyn TranslationProvider>>, provider: Arc<dyn TranslationProvider>) {
    match registered.iter_mut().find(|p| p.name() == provider.name()) {
        Some(slot) => *slot = provider,
        None => registered.push(provider),
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
