//! Per-provider bookkeeping: rate budget, daily quota, and health
//!
//! A provider is available only when it is healthy, under its daily quota,
//! and its token bucket yields a token. Backoff recovery and the UTC-midnight
//! quota reset both happen lazily inside the availability check.

use chrono::{DateTime, Days, Utc};
use ethers::providers::{Http, Provider};
use parking_lot::Mutex;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use url::Url;

use crate::{
    config::ProviderConfig,
    error::{Result, RouterError},
    providers::rate_limiter::TokenBucket,
};

/// Mutable runtime record for a provider
#[derive(Debug)]
struct ProviderRuntime {
    daily_calls: u64,
    daily_reset_at: DateTime<Utc>,
    consecutive_errors: u32,
    last_error_at: Option<Instant>,
    healthy: bool,
}

/// One configured RPC endpoint with its rate, quota, and health state
#[derive(Debug)]
pub struct ProviderState {
    config: ProviderConfig,
    client: Provider<Http>,
    bucket: Mutex<TokenBucket>,
    runtime: Mutex<ProviderRuntime>,
}

impl ProviderState {
    /// Create provider state and its underlying HTTP client
    pub fn new(config: ProviderConfig) -> Result<Self> {
        if config.calls_per_second <= 0.0 {
            return Err(RouterError::provider(
                config.name,
                "calls_per_second must be positive",
            ));
        }

        let url = Url::parse(&config.http_url)?;

        // No request timeout on the client: an admitted call runs until the
        // node responds (see DESIGN.md).
        let http_client = reqwest::Client::builder().build()?;
        let client = Provider::new(Http::new_with_client(url, http_client));

        Ok(Self {
            bucket: Mutex::new(TokenBucket::new(config.calls_per_second)),
            runtime: Mutex::new(ProviderRuntime {
                daily_calls: 0,
                daily_reset_at: next_utc_midnight(Utc::now()),
                consecutive_errors: 0,
                last_error_at: None,
                healthy: true,
            }),
            client,
            config,
        })
    }

    /// Provider name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Full provider configuration
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Underlying client handle
    pub fn client(&self) -> &Provider<Http> {
        &self.client
    }

    /// Availability check; consumes one rate-limit token when it passes
    pub fn try_acquire(&self, backoff: Duration) -> bool {
        {
            let mut runtime = self.runtime.lock();
            self.recover_if_due(&mut runtime, backoff);
            self.roll_daily_window(&mut runtime);

            if !runtime.healthy || self.over_daily_quota(&runtime) {
                return false;
            }
        }

        self.bucket.lock().try_consume()
    }

    /// Time until the bucket would yield a token, or `None` when the
    /// provider is unhealthy or out of daily quota
    pub fn time_until_available(&self, backoff: Duration) -> Option<Duration> {
        {
            let mut runtime = self.runtime.lock();
            self.recover_if_due(&mut runtime, backoff);
            self.roll_daily_window(&mut runtime);

            if !runtime.healthy || self.over_daily_quota(&runtime) {
                return None;
            }
        }

        Some(self.bucket.lock().time_until_next_token())
    }

    /// Debit a token after the selector has waited out the refill interval
    pub fn consume_token_now(&self) {
        self.bucket.lock().consume_now();
    }

    /// Health flag, with lazy backoff recovery applied first
    pub fn is_healthy(&self, backoff: Duration) -> bool {
        let mut runtime = self.runtime.lock();
        self.recover_if_due(&mut runtime, backoff);
        runtime.healthy
    }

    /// Record a successful call: the error streak resets, an unhealthy
    /// provider recovers, and the daily counter advances
    pub fn record_success(&self) {
        let mut runtime = self.runtime.lock();
        runtime.consecutive_errors = 0;
        if !runtime.healthy {
            runtime.healthy = true;
            info!(provider = %self.config.name, "provider recovered");
        }
        runtime.daily_calls += 1;
    }

    /// Record a retryable failure; at `max_consecutive_errors` strikes the
    /// provider is marked unhealthy and enters backoff
    pub fn record_failure(&self, message: &str, max_consecutive_errors: u32) {
        let mut runtime = self.runtime.lock();
        runtime.consecutive_errors += 1;
        runtime.last_error_at = Some(Instant::now());

        if runtime.consecutive_errors >= max_consecutive_errors && runtime.healthy {
            runtime.healthy = false;
            warn!(
                provider = %self.config.name,
                consecutive_errors = runtime.consecutive_errors,
                error = message,
                "provider marked unhealthy, entering backoff"
            );
        } else {
            warn!(
                provider = %self.config.name,
                consecutive_errors = runtime.consecutive_errors,
                error = message,
                "provider call failed"
            );
        }
    }

    /// Display-only snapshot for status queries
    pub fn snapshot(&self) -> ProviderStatusSnapshot {
        let runtime = self.runtime.lock();
        ProviderStatusSnapshot {
            name: self.config.name.clone(),
            endpoint: truncated_endpoint(&self.config.http_url),
            healthy: runtime.healthy,
            consecutive_errors: runtime.consecutive_errors,
            available_tokens: self.bucket.lock().available_tokens(),
            daily_calls: runtime.daily_calls,
            calls_per_day: self.config.calls_per_day,
            priority: self.config.priority,
        }
    }

    fn recover_if_due(&self, runtime: &mut ProviderRuntime, backoff: Duration) {
        if runtime.healthy {
            return;
        }

        if let Some(last_error_at) = runtime.last_error_at {
            if last_error_at.elapsed() >= backoff {
                runtime.consecutive_errors = 0;
                runtime.healthy = true;
                info!(provider = %self.config.name, "provider backoff elapsed, eligible again");
            }
        }
    }

    fn roll_daily_window(&self, runtime: &mut ProviderRuntime) {
        let now = Utc::now();
        if now >= runtime.daily_reset_at {
            runtime.daily_calls = 0;
            runtime.daily_reset_at = next_utc_midnight(now);
        }
    }

    fn over_daily_quota(&self, runtime: &ProviderRuntime) -> bool {
        self.config
            .calls_per_day
            .map(|quota| runtime.daily_calls >= quota)
            .unwrap_or(false)
    }
}

/// Display-only provider snapshot. The endpoint is truncated for safe
/// logging; anything that needs to reconstruct a client must go through
/// the full configuration instead.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatusSnapshot {
    pub name: String,
    pub endpoint: String,
    pub healthy: bool,
    pub consecutive_errors: u32,
    pub available_tokens: f64,
    pub daily_calls: u64,
    pub calls_per_day: Option<u64>,
    pub priority: i32,
}

/// Scheme and host only, so API keys in URL paths never reach logs
fn truncated_endpoint(http_url: &str) -> String {
    match Url::parse(http_url) {
        Ok(url) => match url.host_str() {
            Some(host) => format!("{}://{}/…", url.scheme(), host),
            None => "<invalid>".to_string(),
        },
        Err(_) => "<invalid>".to_string(),
    }
}

/// First UTC midnight strictly after `now`
fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    (now.date_naive() + Days::new(1))
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time")
        .and_utc()
}
