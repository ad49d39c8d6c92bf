//! Facade over the provider pool, call executor, and admission queue
//!
//! Everything in the application that talks to the chain depends on this
//! one object: `send` for load-balanced calls, the status queries for
//! monitoring, the capability lookup for calls that must land on a
//! specific class of provider, and runtime topology changes.

use ethers::providers::{Http, Provider};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::{
    config::{ProviderConfig, RouterConfig},
    error::{Result, RouterError},
    providers::{
        capability::Capability,
        executor::{CallExecutor, FailoverExecutor},
        queue::{QueueStatus, RequestQueue},
        selector::ProviderPool,
        state::ProviderStatusSnapshot,
    },
};

/// Aggregate request accounting for the router
#[derive(Debug, Clone)]
pub struct RouterMetrics {
    /// Total requests executed
    pub total_requests: u64,

    /// Successful requests
    pub successful_requests: u64,

    /// Failed request attempts, counted per provider attempt
    pub failed_requests: u64,

    /// Per-provider usage distribution
    pub provider_usage: HashMap<String, u64>,
}

impl RouterMetrics {
    /// Create empty metrics
    pub fn new() -> Self {
        Self {
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            provider_usage: HashMap::new(),
        }
    }

    /// Record a successful request
    pub fn record_success(&mut self, provider_name: &str) {
        self.total_requests += 1;
        self.successful_requests += 1;
        *self
            .provider_usage
            .entry(provider_name.to_string())
            .or_insert(0) += 1;
    }

    /// Record a failed request attempt
    pub fn record_failure(&mut self, provider_name: &str) {
        self.total_requests += 1;
        self.failed_requests += 1;
        *self
            .provider_usage
            .entry(provider_name.to_string())
            .or_insert(0) += 1;
    }

    /// Get success rate
    pub fn success_rate(&self) -> f64 {
        if self.total_requests > 0 {
            self.successful_requests as f64 / self.total_requests as f64
        } else {
            1.0
        }
    }
}

impl Default for RouterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Multi-provider RPC manager
#[derive(Debug)]
pub struct RpcProviderManager {
    pool: Arc<ProviderPool>,
    queue: RequestQueue,
    metrics: Arc<RwLock<RouterMetrics>>,
}

impl RpcProviderManager {
    /// Build the manager from configuration; fails when the enabled
    /// provider set is empty or any entry is invalid
    pub fn new(config: RouterConfig) -> Result<Self> {
        config.validate()?;

        let settings = config.settings.clone();
        let pool = Arc::new(ProviderPool::new(config.providers, settings.clone())?);
        let metrics = Arc::new(RwLock::new(RouterMetrics::new()));

        let executor: Arc<dyn CallExecutor> = Arc::new(FailoverExecutor::new(
            Arc::clone(&pool),
            settings.max_consecutive_errors,
            Arc::clone(&metrics),
        ));
        let queue = RequestQueue::new(settings.max_queue_size, settings.max_concurrency, executor);

        info!(
            max_queue_size = settings.max_queue_size,
            max_concurrency = settings.max_concurrency,
            "RPC provider manager initialized"
        );

        Ok(Self {
            pool,
            queue,
            metrics,
        })
    }

    /// Send a JSON-RPC call through the admission queue and load balancer
    pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
        self.queue
            .enqueue(method, params)?
            .await
            .map_err(|_| RouterError::ChannelClosed)?
    }

    /// Display-only per-provider snapshot; endpoint URLs are truncated
    pub async fn get_status(&self) -> Vec<ProviderStatusSnapshot> {
        self.pool.snapshot().await
    }

    /// Full provider configurations, authoritative for rebuilding clients
    pub async fn get_configs(&self) -> Vec<ProviderConfig> {
        self.pool.configs().await
    }

    /// Queue occupancy and configured ceilings
    pub fn get_queue_status(&self) -> QueueStatus {
        self.queue.status()
    }

    /// Direct client handle for the highest-priority healthy provider
    /// advertising a capability, or `None` when no provider qualifies
    pub async fn get_capable_provider(&self, capability: Capability) -> Option<Provider<Http>> {
        self.pool
            .capable_provider(capability)
            .await
            .map(|provider| provider.client().clone())
    }

    /// Add a provider at runtime
    pub async fn add_provider(&self, config: ProviderConfig) -> Result<()> {
        self.pool.add(config).await
    }

    /// Remove a provider by name; returns whether anything was removed
    pub async fn remove_provider(&self, name: &str) -> bool {
        self.pool.remove(name).await
    }

    /// Aggregate request accounting
    pub async fn get_metrics(&self) -> RouterMetrics {
        self.metrics.read().await.clone()
    }
}
