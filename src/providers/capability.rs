//! Capability flags for provider routing
//!
//! Some call classes must go to a provider known to support them rather
//! than whichever endpoint the load balancer picks next. Capabilities are
//! an open set of named booleans on the provider configuration; each
//! capability declares how an absent flag is interpreted, so adding a new
//! one never touches the selector.

use serde::{Deserialize, Serialize};

use crate::error::RouterError;

/// A call class that only some providers can serve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Historical log scans spanning tens of thousands of blocks. Many
    /// endpoints cap `eth_getLogs` ranges, so this is opt-in.
    LargeBlockScans,

    /// Name-service resolution calls. Supported by most full nodes, so an
    /// absent flag counts as supported.
    EnsResolution,
}

impl Capability {
    /// Flag key used in provider configuration
    pub fn key(&self) -> &'static str {
        match self {
            Capability::LargeBlockScans => "large_block_scans",
            Capability::EnsResolution => "ens",
        }
    }

    /// How an absent flag is interpreted for this capability
    pub fn default_enabled(&self) -> bool {
        match self {
            Capability::LargeBlockScans => false,
            Capability::EnsResolution => true,
        }
    }

    /// All known capabilities
    pub fn all() -> &'static [Capability] {
        &[Capability::LargeBlockScans, Capability::EnsResolution]
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl std::str::FromStr for Capability {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "large_block_scans" => Ok(Capability::LargeBlockScans),
            "ens" | "ens_resolution" => Ok(Capability::EnsResolution),
            _ => Err(RouterError::UnknownCapability(s.to_string())),
        }
    }
}
