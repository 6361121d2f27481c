//! Chain capability seam.
//!
//! The reconciler never talks to a chain directly; it goes through one
//! [`ChainAdapter`] per chain id. Adapters carry no retry or timeout logic of
//! their own, both are applied by the caller.

use std::collections::BTreeMap;
use std::sync::Arc;

use alloy::primitives::FixedBytes;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::graph::{ChainId, Endpoint};
use crate::settings::PathwaySettings;

/// Full view of one local endpoint's configured peers.
pub type PeerSnapshot = BTreeMap<Endpoint, PathwaySettings>;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum AdapterError {
    #[error("chain unavailable: {0}")]
    ChainUnavailable(String),
    #[error("call timed out")]
    Timeout,
    #[error("transaction rejected: {0}")]
    Rejected(String),
    #[error("transaction underpriced: {0}")]
    Underpriced(String),
    #[error("unknown chain error: {0}")]
    Unknown(String),
}

impl AdapterError {
    /// Whether the same call may succeed if attempted again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AdapterError::Timeout | AdapterError::Underpriced(_) | AdapterError::ChainUnavailable(_)
        )
    }
}

/// Acceptance receipt for a submitted configuration change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxResult {
    /// Hash of the last transaction sent for the change, if any was needed.
    pub tx_hash: Option<FixedBytes<32>>,
}

#[async_trait]
pub trait ChainAdapter: Send + Sync {
    /// Reads the peers `local` has registered for the given remote chains.
    ///
    /// Returns either a complete snapshot or an error, never a partial map.
    async fn read_peer_config(
        &self,
        local: &Endpoint,
        remote_chains: &[ChainId],
    ) -> Result<PeerSnapshot, AdapterError>;

    /// Registers `peer` on `local` with `desired` settings.
    ///
    /// Returns once the chain has accepted the change. Must be safe to call
    /// again with the same arguments.
    async fn submit_config_change(
        &self,
        local: &Endpoint,
        peer: &Endpoint,
        desired: &PathwaySettings,
    ) -> Result<TxResult, AdapterError>;
}

/// Adapters keyed by the chain they serve.
#[derive(Clone, Default)]
pub struct Adapters {
    inner: BTreeMap<ChainId, Arc<dyn ChainAdapter>>,
}

impl Adapters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, chain: ChainId, adapter: Arc<dyn ChainAdapter>) {
        self.inner.insert(chain, adapter);
    }

    pub fn with(mut self, chain: ChainId, adapter: Arc<dyn ChainAdapter>) -> Self {
        self.insert(chain, adapter);
        self
    }

    pub fn get(&self, chain: ChainId) -> Result<&Arc<dyn ChainAdapter>, AdapterError> {
        self.inner
            .get(&chain)
            .ok_or_else(|| AdapterError::ChainUnavailable(format!("no adapter for chain {chain}")))
    }
}
