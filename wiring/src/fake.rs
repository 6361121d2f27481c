//! In-memory chains for exercising the reconciler without a network.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::adapter::{Adapters, AdapterError, ChainAdapter, PeerSnapshot, TxResult};
use crate::graph::{ChainId, Endpoint};
use crate::settings::PathwaySettings;

#[derive(Default)]
struct World {
    peers: BTreeMap<Endpoint, PeerSnapshot>,
    read_failures: HashMap<Endpoint, AdapterError>,
    read_delays: HashMap<Endpoint, Duration>,
    submit_script: HashMap<(Endpoint, Endpoint), VecDeque<AdapterError>>,
    submissions: Vec<(Endpoint, Endpoint)>,
    submit_delay: Option<Duration>,
}

/// Every chain's state in one place. Cloning shares the state, so the same
/// `FakeChain` can back several chain ids.
#[derive(Clone, Default)]
pub struct FakeChain {
    world: Arc<Mutex<World>>,
}

impl FakeChain {
    pub fn new() -> Self {
        Self::default()
    }

    fn world(&self) -> MutexGuard<'_, World> {
        // a panic while holding the lock only happens inside a failing test
        self.world.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adapters registering this fake for each of `chains`.
    pub fn adapters(&self, chains: impl IntoIterator<Item = ChainId>) -> Adapters {
        let shared: Arc<dyn ChainAdapter> = Arc::new(self.clone());
        chains
            .into_iter()
            .fold(Adapters::new(), |acc, chain| acc.with(chain, Arc::clone(&shared)))
    }

    pub fn set_peer(&self, local: Endpoint, peer: Endpoint, settings: PathwaySettings) {
        self.world()
            .peers
            .entry(local)
            .or_default()
            .insert(peer, settings);
    }

    pub fn peer(&self, local: &Endpoint, peer: &Endpoint) -> Option<PathwaySettings> {
        self.world()
            .peers
            .get(local)
            .and_then(|snapshot| snapshot.get(peer))
            .cloned()
    }

    /// Every read of `local` fails with `err` until cleared.
    pub fn fail_reads(&self, local: Endpoint, err: AdapterError) {
        self.world().read_failures.insert(local, err);
    }

    pub fn clear_read_failures(&self) {
        self.world().read_failures.clear();
    }

    /// Reads of `local` take `delay` before answering.
    pub fn set_read_delay(&self, local: Endpoint, delay: Duration) {
        self.world().read_delays.insert(local, delay);
    }

    /// Queue errors returned by successive submissions of `local -> peer`.
    /// Once the queue drains, submissions succeed.
    pub fn script_submit(
        &self,
        local: Endpoint,
        peer: Endpoint,
        errors: impl IntoIterator<Item = AdapterError>,
    ) {
        self.world()
            .submit_script
            .entry((local, peer))
            .or_default()
            .extend(errors);
    }

    pub fn set_submit_delay(&self, delay: Duration) {
        self.world().submit_delay = Some(delay);
    }

    /// Every submission attempt, in the order it reached the fake.
    pub fn submissions(&self) -> Vec<(Endpoint, Endpoint)> {
        self.world().submissions.clone()
    }
}

#[async_trait]
impl ChainAdapter for FakeChain {
    async fn read_peer_config(
        &self,
        local: &Endpoint,
        remote_chains: &[ChainId],
    ) -> Result<PeerSnapshot, AdapterError> {
        let delay = self.world().read_delays.get(local).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let world = self.world();
        if let Some(err) = world.read_failures.get(local) {
            return Err(err.clone());
        }
        Ok(world
            .peers
            .get(local)
            .map(|snapshot| {
                snapshot
                    .iter()
                    .filter(|(peer, _)| remote_chains.contains(&peer.chain))
                    .map(|(peer, settings)| (*peer, settings.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn submit_config_change(
        &self,
        local: &Endpoint,
        peer: &Endpoint,
        desired: &PathwaySettings,
    ) -> Result<TxResult, AdapterError> {
        let delay = self.world().submit_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut world = self.world();
        world.submissions.push((*local, *peer));
        let scripted = world
            .submit_script
            .get_mut(&(*local, *peer))
            .and_then(VecDeque::pop_front);
        if let Some(err) = scripted {
            return Err(err);
        }

        let snapshot = world.peers.entry(*local).or_default();
        let previous = snapshot
            .iter()
            .find(|(existing, _)| existing.chain == peer.chain)
            .map(|(_, settings)| settings.clone())
            .unwrap_or_default();
        // a chain holds one peer per remote chain id
        snapshot.retain(|existing, _| existing.chain != peer.chain);
        snapshot.insert(*peer, desired.overlay(&previous));
        Ok(TxResult { tx_hash: None })
    }
}
