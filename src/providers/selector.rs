//! Provider selection: priority-ordered round-robin with bounded waiting
//!
//! The pool keeps providers sorted by descending priority and rotates a
//! cursor across them so equally-ranked endpoints share load. When no
//! provider has budget right now, the pool waits for the shortest token
//! refill, up to a configured ceiling, before giving up.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
    config::{ProviderConfig, RouterSettings},
    error::{Result, RouterError},
    providers::{
        capability::Capability,
        state::{ProviderState, ProviderStatusSnapshot},
    },
};

/// Priority-sorted pool of providers with round-robin selection
#[derive(Debug)]
pub struct ProviderPool {
    providers: RwLock<Vec<Arc<ProviderState>>>,
    cursor: AtomicUsize,
    settings: RouterSettings,
}

impl ProviderPool {
    /// Build the pool from the enabled subset of the configured providers
    pub fn new(configs: Vec<ProviderConfig>, settings: RouterSettings) -> Result<Self> {
        let mut providers = configs
            .into_iter()
            .filter(|config| config.enabled)
            .map(|config| ProviderState::new(config).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;

        if providers.is_empty() {
            return Err(RouterError::internal(
                "provider pool requires at least one enabled provider",
            ));
        }

        sort_by_priority(&mut providers);

        info!(provider_count = providers.len(), "provider pool initialized");

        Ok(Self {
            providers: RwLock::new(providers),
            cursor: AtomicUsize::new(0),
            settings,
        })
    }

    /// Number of providers currently in the pool
    pub async fn len(&self) -> usize {
        self.providers.read().await.len()
    }

    /// Select the next available provider
    ///
    /// Walks the sorted list from a rotating cursor and returns the first
    /// provider whose availability check passes (the check itself debits a
    /// rate-limit token). If none is immediately available, sleeps for the
    /// shortest refill wait among healthy, quota-remaining providers, as
    /// long as it lands within the wait ceiling.
    pub async fn select(&self) -> Option<Arc<ProviderState>> {
        let providers = self.providers.read().await.clone();
        if providers.is_empty() {
            return None;
        }

        let backoff = self.settings.backoff();
        let start = self.cursor.fetch_add(1, Ordering::Relaxed);

        for offset in 0..providers.len() {
            let provider = &providers[(start + offset) % providers.len()];
            if provider.try_acquire(backoff) {
                debug!(provider = %provider.name(), "selected provider");
                return Some(Arc::clone(provider));
            }
        }

        let mut shortest: Option<(Arc<ProviderState>, Duration)> = None;
        for provider in &providers {
            if let Some(wait) = provider.time_until_available(backoff) {
                let is_shorter = shortest
                    .as_ref()
                    .map(|(_, current)| wait < *current)
                    .unwrap_or(true);
                if is_shorter {
                    shortest = Some((Arc::clone(provider), wait));
                }
            }
        }

        match shortest {
            Some((provider, wait)) if wait <= self.settings.max_token_wait() => {
                debug!(
                    provider = %provider.name(),
                    wait_ms = wait.as_millis() as u64,
                    "waiting for rate budget"
                );
                tokio::time::sleep(wait).await;
                provider.consume_token_now();
                Some(provider)
            }
            _ => {
                warn!("no provider available within the wait ceiling");
                None
            }
        }
    }

    /// Add a provider at runtime, keeping the pool sorted by priority
    pub async fn add(&self, config: ProviderConfig) -> Result<()> {
        let state = Arc::new(ProviderState::new(config)?);
        let mut providers = self.providers.write().await;
        info!(provider = %state.name(), priority = state.config().priority, "adding provider");
        providers.push(state);
        sort_by_priority(&mut providers);
        Ok(())
    }

    /// Remove a provider by name; returns whether anything was removed
    pub async fn remove(&self, name: &str) -> bool {
        let mut providers = self.providers.write().await;
        let before = providers.len();
        providers.retain(|provider| provider.name() != name);

        let removed = providers.len() != before;
        if removed {
            info!(provider = name, "removed provider");
        }
        removed
    }

    /// Highest-priority healthy provider that advertises a capability.
    /// Callers take its client handle directly, bypassing the queue and
    /// rate budget. No fallback to non-capable providers.
    pub async fn capable_provider(&self, capability: Capability) -> Option<Arc<ProviderState>> {
        let backoff = self.settings.backoff();
        let providers = self.providers.read().await;

        providers
            .iter()
            .find(|provider| {
                provider.config().supports(capability) && provider.is_healthy(backoff)
            })
            .map(Arc::clone)
    }

    /// Display-only snapshot of every provider
    pub async fn snapshot(&self) -> Vec<ProviderStatusSnapshot> {
        let providers = self.providers.read().await;
        providers.iter().map(|provider| provider.snapshot()).collect()
    }

    /// Full provider configurations, authoritative for rebuilding clients
    pub async fn configs(&self) -> Vec<ProviderConfig> {
        let providers = self.providers.read().await;
        providers
            .iter()
            .map(|provider| provider.config().clone())
            .collect()
    }
}

fn sort_by_priority(providers: &mut [Arc<ProviderState>]) {
    providers.sort_by(|a, b| b.config().priority.cmp(&a.config().priority));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn test_config(name: &str, priority: i32, calls_per_second: f64) -> ProviderConfig {
        ProviderConfig {
            name: name.to_string(),
            http_url: format!("https://{}.example.com/v2/key", name),
            calls_per_second,
            calls_per_day: None,
            priority,
            enabled: true,
            capabilities: HashMap::new(),
        }
    }

    fn fast_settings() -> RouterSettings {
        RouterSettings::default()
    }

    #[tokio::test]
    async fn test_round_robin_fairness() {
        let pool = ProviderPool::new(
            vec![test_config("a", 0, 1000.0), test_config("b", 0, 1000.0)],
            fast_settings(),
        )
        .unwrap();

        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..100 {
            let provider = pool.select().await.expect("provider available");
            *counts.entry(provider.name().to_string()).or_insert(0) += 1;
        }

        assert!(*counts.get("a").unwrap() >= 40, "counts: {:?}", counts);
        assert!(*counts.get("b").unwrap() >= 40, "counts: {:?}", counts);
    }

    #[tokio::test]
    async fn test_unhealthy_provider_is_skipped() {
        let pool = ProviderPool::new(
            vec![test_config("a", 10, 1000.0), test_config("b", 0, 1000.0)],
            fast_settings(),
        )
        .unwrap();

        // Strike out provider a
        {
            let providers = pool.providers.read().await.clone();
            let a = providers.iter().find(|p| p.name() == "a").unwrap();
            for _ in 0..3 {
                a.record_failure("connection reset", 3);
            }
        }

        for _ in 0..10 {
            let provider = pool.select().await.expect("provider available");
            assert_eq!(provider.name(), "b");
        }
    }

    #[tokio::test]
    async fn test_bounded_wait_for_refill() {
        let pool = ProviderPool::new(vec![test_config("a", 0, 5.0)], fast_settings()).unwrap();

        // Drain the burst allowance
        let mut drained = 0;
        while pool.select().await.is_some() {
            drained += 1;
            if drained >= 10 {
                break;
            }
        }
        assert_eq!(drained, 10);

        let started = std::time::Instant::now();
        let provider = pool.select().await;
        assert!(provider.is_some());
        assert!(
            started.elapsed() >= Duration::from_millis(100),
            "selection returned too quickly: {:?}",
            started.elapsed()
        );
    }

    #[tokio::test]
    async fn test_returns_none_past_wait_ceiling() {
        let mut settings = fast_settings();
        settings.max_token_wait_ms = 50;

        // One token of burst, then a two-second refill wait, far past the ceiling
        let pool = ProviderPool::new(vec![test_config("a", 0, 0.5)], settings).unwrap();

        assert!(pool.select().await.is_some());
        assert!(pool.select().await.is_none());
    }

    #[tokio::test]
    async fn test_add_and_remove_keep_priority_order() {
        let pool = ProviderPool::new(vec![test_config("a", 1, 10.0)], fast_settings()).unwrap();

        pool.add(test_config("b", 5, 10.0)).await.unwrap();
        pool.add(test_config("c", 3, 10.0)).await.unwrap();

        let names: Vec<String> = pool
            .snapshot()
            .await
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["b", "c", "a"]);

        assert!(pool.remove("c").await);
        assert!(!pool.remove("c").await);
        assert_eq!(pool.len().await, 2);
    }

    #[tokio::test]
    async fn test_capability_lookup_respects_flags_and_priority() {
        let mut a = test_config("a", 10, 10.0);
        a.capabilities.insert("large_block_scans".to_string(), false);
        let mut b = test_config("b", 5, 10.0);
        b.capabilities.insert("large_block_scans".to_string(), true);
        let mut c = test_config("c", 1, 10.0);
        c.capabilities.insert("large_block_scans".to_string(), true);

        let pool = ProviderPool::new(vec![a, b, c], fast_settings()).unwrap();

        // Highest-priority flagged provider wins even though "a" outranks it
        let capable = pool
            .capable_provider(Capability::LargeBlockScans)
            .await
            .unwrap();
        assert_eq!(capable.name(), "b");

        assert!(pool.remove("b").await);
        let capable = pool
            .capable_provider(Capability::LargeBlockScans)
            .await
            .unwrap();
        assert_eq!(capable.name(), "c");

        assert!(pool.remove("c").await);
        assert!(pool
            .capable_provider(Capability::LargeBlockScans)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_empty_pool_rejected() {
        let mut config = test_config("a", 0, 10.0);
        config.enabled = false;
        assert!(ProviderPool::new(vec![config], fast_settings()).is_err());
    }
}
