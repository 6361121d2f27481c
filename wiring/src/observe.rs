//! Live state reader.
//!
//! Queries every endpoint that has outbound edges and records either its
//! peer snapshot or the reason it could not be read. One unreadable chain
//! never blocks the others.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use futures_util::{stream, StreamExt};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::adapter::{AdapterError, Adapters, PeerSnapshot};
use crate::graph::{ChainId, Endpoint, Graph};

/// Snapshot of live configuration taken during one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct ObservedState {
    peers: BTreeMap<Endpoint, PeerSnapshot>,
    failures: BTreeMap<Endpoint, AdapterError>,
}

/// The nodes whose configuration could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} node(s) could not be observed", nodes.len())]
pub struct PartialObserveFailure {
    pub nodes: Vec<(Endpoint, AdapterError)>,
}

impl ObservedState {
    pub fn record(&mut self, local: Endpoint, snapshot: PeerSnapshot) {
        self.failures.remove(&local);
        self.peers.insert(local, snapshot);
    }

    pub fn record_failure(&mut self, local: Endpoint, err: AdapterError) {
        self.peers.remove(&local);
        self.failures.insert(local, err);
    }

    /// `None` when `local` was not observed.
    pub fn peers_of(&self, local: &Endpoint) -> Option<&PeerSnapshot> {
        self.peers.get(local)
    }

    pub fn is_observed(&self, local: &Endpoint) -> bool {
        self.peers.contains_key(local)
    }

    pub fn failure(&self, local: &Endpoint) -> Option<&AdapterError> {
        self.failures.get(local)
    }

    pub fn partial_failure(&self) -> Option<PartialObserveFailure> {
        if self.failures.is_empty() {
            return None;
        }
        Some(PartialObserveFailure {
            nodes: self
                .failures
                .iter()
                .map(|(ep, err)| (*ep, err.clone()))
                .collect(),
        })
    }
}

pub struct StateReader<'a> {
    adapters: &'a Adapters,
    call_timeout: Duration,
    max_concurrency: usize,
}

impl<'a> StateReader<'a> {
    pub fn new(adapters: &'a Adapters, call_timeout: Duration, max_concurrency: usize) -> Self {
        Self {
            adapters,
            call_timeout,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub async fn observe(&self, graph: &Graph) -> ObservedState {
        let reads: Vec<_> = stream::iter(graph.sources())
            .map(|local| async move {
                let remotes: BTreeSet<ChainId> = graph.outbound(&local).map(|e| e.to.chain).collect();
                let remotes: Vec<ChainId> = remotes.into_iter().collect();
                let result = self.read_one(&local, &remotes).await;
                (local, result)
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        let mut observed = ObservedState::default();
        for (local, result) in reads {
            match result {
                Ok(snapshot) => {
                    debug!(node = %local, peers = snapshot.len(), "observed node");
                    observed.record(local, snapshot);
                }
                Err(err) => {
                    warn!(node = %local, error = %err, "could not observe node");
                    observed.record_failure(local, err);
                }
            }
        }
        observed
    }

    async fn read_one(
        &self,
        local: &Endpoint,
        remotes: &[ChainId],
    ) -> Result<PeerSnapshot, AdapterError> {
        let adapter = self.adapters.get(local.chain)?;
        timeout(self.call_timeout, adapter.read_peer_config(local, remotes))
            .await
            .map_err(|_| AdapterError::Timeout)?
    }
}
