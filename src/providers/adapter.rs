//! Transport adapter for the surrounding blockchain-access library
//!
//! Implements the `JsonRpcClient` interface expected by `ethers` on top of
//! the provider manager, so the rest of the application can build a
//! standard `Provider` whose every call funnels through the router.

use async_trait::async_trait;
use ethers::providers::{JsonRpcClient, JsonRpcError, ProviderError, RpcError};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

use crate::{error::RouterError, providers::manager::RpcProviderManager};

/// JSON-RPC transport backed by the multi-provider router
#[derive(Debug, Clone)]
pub struct RouterTransport {
    manager: Arc<RpcProviderManager>,
}

impl RouterTransport {
    /// Wrap a manager as an `ethers` transport
    pub fn new(manager: Arc<RpcProviderManager>) -> Self {
        Self { manager }
    }

    /// The underlying manager, for status queries and topology changes
    pub fn manager(&self) -> &Arc<RpcProviderManager> {
        &self.manager
    }
}

impl RpcError for RouterError {
    fn as_error_response(&self) -> Option<&JsonRpcError> {
        None
    }

    fn as_serde_error(&self) -> Option<&serde_json::Error> {
        match self {
            RouterError::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RouterError> for ProviderError {
    fn from(err: RouterError) -> Self {
        ProviderError::JsonRpcClientError(Box::new(err))
    }
}

#[async_trait]
impl JsonRpcClient for RouterTransport {
    type Error = RouterError;

    async fn request<T, R>(&self, method: &str, params: T) -> Result<R, Self::Error>
    where
        T: Debug + Serialize + Send + Sync,
        R: DeserializeOwned + Send,
    {
        let params = serde_json::to_value(params)?;
        let raw = self.manager.send(method, params).await?;
        Ok(serde_json::from_value(raw)?)
    }
}
