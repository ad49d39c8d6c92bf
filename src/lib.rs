//! # folio-rpc
//!
//! Multi-provider JSON-RPC request router for DeFi portfolio tracking.
//! Load-balances calls across configured node endpoints with per-provider
//! token-bucket rate budgets and daily quotas, tracks health and fails
//! over automatically with backoff, routes capability-gated calls to
//! providers that advertise support, and applies admission control
//! (bounded queue, bounded worker concurrency) to callers.

pub mod config;
pub mod error;
pub mod providers;

// Re-export the surface the rest of the application depends on
pub use config::{ProviderConfig, RouterConfig, RouterSettings};
pub use error::{Result, RouterError};
pub use providers::{
    Capability, ProviderStatusSnapshot, QueueStatus, RouterMetrics, RouterTransport,
    RpcProviderManager,
};

/// Current crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
