//! Configuration for the RPC request router

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use url::Url;

use crate::providers::Capability;

/// Top-level router configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Provider endpoints, in any order
    pub providers: Vec<ProviderConfig>,

    /// Admission and failover settings
    #[serde(default)]
    pub settings: RouterSettings,
}

/// Individual provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider name/identifier, used for logging and status
    pub name: String,

    /// HTTP RPC URL, including any API key path segment
    pub http_url: String,

    /// Sustained rate budget (calls per second)
    pub calls_per_second: f64,

    /// Optional daily call quota, reset at UTC midnight
    #[serde(default)]
    pub calls_per_day: Option<u64>,

    /// Selection priority, higher is preferred
    #[serde(default)]
    pub priority: i32,

    /// Enable this provider
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Capability flags, keyed by capability name. Absent flags fall back
    /// to each capability's own default.
    #[serde(default)]
    pub capabilities: HashMap<String, bool>,
}

impl ProviderConfig {
    /// Check whether this provider advertises a capability
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities
            .get(capability.key())
            .copied()
            .unwrap_or_else(|| capability.default_enabled())
    }
}

/// Admission control and failover settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterSettings {
    /// Maximum pending calls before admission rejects outright
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Maximum concurrent in-flight calls
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Consecutive retryable failures before a provider is marked unhealthy
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,

    /// Cooldown before an unhealthy provider becomes eligible again
    #[serde(default = "default_backoff_seconds")]
    pub backoff_seconds: u64,

    /// Ceiling on how long the selector will wait for a rate-limit token
    #[serde(default = "default_max_token_wait_ms")]
    pub max_token_wait_ms: u64,
}

impl RouterSettings {
    /// Backoff window as a duration
    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_seconds)
    }

    /// Token wait ceiling as a duration
    pub fn max_token_wait(&self) -> Duration {
        Duration::from_millis(self.max_token_wait_ms)
    }
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            max_queue_size: default_max_queue_size(),
            max_concurrency: default_max_concurrency(),
            max_consecutive_errors: default_max_consecutive_errors(),
            backoff_seconds: default_backoff_seconds(),
            max_token_wait_ms: default_max_token_wait_ms(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_max_queue_size() -> usize {
    1000
}

fn default_max_concurrency() -> usize {
    50
}

fn default_max_consecutive_errors() -> u32 {
    3
}

fn default_backoff_seconds() -> u64 {
    60
}

fn default_max_token_wait_ms() -> u64 {
    5000
}

impl RouterConfig {
    /// Load configuration from files and environment
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from("config/rpc-router")
    }

    /// Load configuration from a specific file, with environment-specific
    /// and local overlays plus `FOLIO_RPC__`-prefixed variables on top
    pub fn load_from(path: &str) -> std::result::Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                File::with_name(&format!(
                    "{}-{}",
                    path,
                    std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into())
                ))
                .required(false),
            )
            .add_source(File::with_name(&format!("{}-local", path)).required(false))
            .add_source(Environment::with_prefix("FOLIO_RPC").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let mut names = HashSet::new();
        for provider in &self.providers {
            if provider.name.is_empty() {
                return Err(ConfigError::Message(
                    "provider name must not be empty".into(),
                ));
            }

            if !names.insert(provider.name.as_str()) {
                return Err(ConfigError::Message(format!(
                    "duplicate provider name: {}",
                    provider.name
                )));
            }

            if Url::parse(&provider.http_url).is_err() {
                return Err(ConfigError::Message(format!(
                    "invalid HTTP URL for provider {}: {}",
                    provider.name, provider.http_url
                )));
            }

            if provider.calls_per_second <= 0.0 {
                return Err(ConfigError::Message(format!(
                    "calls_per_second must be positive for provider: {}",
                    provider.name
                )));
            }
        }

        if self.enabled_providers().next().is_none() {
            return Err(ConfigError::Message(
                "at least one enabled provider must be configured".into(),
            ));
        }

        if self.settings.max_concurrency == 0 {
            return Err(ConfigError::Message(
                "max_concurrency must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Iterate over the enabled subset of providers
    pub fn enabled_providers(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.providers.iter().filter(|p| p.enabled)
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            providers: vec![
                ProviderConfig {
                    name: "alchemy".to_string(),
                    http_url: "https://eth-mainnet.g.alchemy.com/v2/YOUR_KEY".to_string(),
                    calls_per_second: 25.0,
                    calls_per_day: None,
                    priority: 10,
                    enabled: true,
                    capabilities: HashMap::from([("large_block_scans".to_string(), true)]),
                },
                ProviderConfig {
                    name: "infura".to_string(),
                    http_url: "https://mainnet.infura.io/v3/YOUR_KEY".to_string(),
                    calls_per_second: 10.0,
                    calls_per_day: Some(100_000),
                    priority: 5,
                    enabled: true,
                    capabilities: HashMap::new(),
                },
                ProviderConfig {
                    name: "ankr".to_string(),
                    http_url: "https://rpc.ankr.com/eth".to_string(),
                    calls_per_second: 5.0,
                    calls_per_day: Some(50_000),
                    priority: 1,
                    enabled: true,
                    capabilities: HashMap::from([("ens".to_string(), false)]),
                },
            ],
            settings: RouterSettings::default(),
        }
    }
}
