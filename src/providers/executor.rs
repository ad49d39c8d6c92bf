//! Call execution with automatic provider failover
//!
//! Retryable failures are absorbed here: the executor walks providers via
//! the selector until one succeeds, the pool is exhausted, or the error
//! turns out to be the caller's fault.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::{
    error::{is_non_retryable_message, Result, RouterError},
    providers::{manager::RouterMetrics, selector::ProviderPool},
};

/// Seam between the admission queue and whatever executes a call
#[async_trait]
pub trait CallExecutor: Debug + Send + Sync + 'static {
    /// Execute one remote call to completion
    async fn execute(&self, method: &str, params: Value) -> Result<Value>;
}

/// Executes calls against the provider pool, failing over between
/// providers on retryable errors
#[derive(Debug)]
pub struct FailoverExecutor {
    pool: Arc<ProviderPool>,
    max_consecutive_errors: u32,
    metrics: Arc<RwLock<RouterMetrics>>,
}

impl FailoverExecutor {
    /// Create a new failover executor over a pool
    pub fn new(
        pool: Arc<ProviderPool>,
        max_consecutive_errors: u32,
        metrics: Arc<RwLock<RouterMetrics>>,
    ) -> Self {
        Self {
            pool,
            max_consecutive_errors,
            metrics,
        }
    }
}

#[async_trait]
impl CallExecutor for FailoverExecutor {
    async fn execute(&self, method: &str, params: Value) -> Result<Value> {
        let attempts = self.pool.len().await.max(1);
        let mut last_error: Option<String> = None;

        for attempt in 0..attempts {
            let Some(provider) = self.pool.select().await else {
                break;
            };

            match provider
                .client()
                .request::<_, Value>(method, params.clone())
                .await
            {
                Ok(result) => {
                    provider.record_success();
                    self.metrics.write().await.record_success(provider.name());
                    debug!(method, provider = %provider.name(), "call succeeded");
                    return Ok(result);
                }
                Err(source) => {
                    let message = source.to_string();

                    if is_non_retryable_message(&message) {
                        // Caller fault; no failover, no strike against the provider
                        debug!(method, error = %message, "call failed with a non-retryable error");
                        return Err(RouterError::NonRetryableCall(message));
                    }

                    provider.record_failure(&message, self.max_consecutive_errors);
                    self.metrics.write().await.record_failure(provider.name());
                    warn!(
                        method,
                        provider = %provider.name(),
                        attempt,
                        error = %message,
                        "provider call failed, trying next provider"
                    );
                    last_error = Some(message);
                }
            }
        }

        Err(RouterError::exhausted(last_error))
    }
}
