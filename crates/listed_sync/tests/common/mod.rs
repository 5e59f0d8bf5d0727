//! Shared fixtures for the replication tests.

#![allow(dead_code)]

use listed_core::LwwEngine;
use listed_sync::{
    CpuPressure, FlushPolicy, MemoryPresence, MemoryRelay, MemoryStore, NetworkLinkMonitor,
    PeerId, PeerMetrics, PresenceMember, RelayEndpoint, SyncConfig, SyncProvider,
};
use std::sync::Arc;

pub const SCOPE: &str = "groceries";

pub type TestProvider = SyncProvider<LwwEngine, MemoryStore, RelayEndpoint, PresenceMember>;

/// Metrics whose score is exactly `score`.
pub fn metrics_scoring(score: f64) -> PeerMetrics {
    PeerMetrics::new(score, -1.0, -1.0, CpuPressure::Unknown)
}

/// One replica and handles to its collaborators.
pub struct Replica {
    pub provider: TestProvider,
    pub store: MemoryStore,
    pub endpoint: RelayEndpoint,
    pub monitor: Arc<NetworkLinkMonitor>,
}

impl Replica {
    pub fn new(peer_id: PeerId, score: f64, network: &Network) -> Self {
        Self::with_policy(peer_id, score, network, FlushPolicy::OnReconnect)
    }

    pub fn with_policy(
        peer_id: PeerId,
        score: f64,
        network: &Network,
        policy: FlushPolicy,
    ) -> Self {
        Self::with_store(peer_id, score, network, policy, MemoryStore::new())
    }

    pub fn with_store(
        peer_id: PeerId,
        score: f64,
        network: &Network,
        policy: FlushPolicy,
        store: MemoryStore,
    ) -> Self {
        let endpoint = network.relay.endpoint();
        let monitor = Arc::new(NetworkLinkMonitor::new(true));
        let config = SyncConfig::new(SCOPE)
            .with_flush_policy(policy)
            .with_metrics(metrics_scoring(score));
        let provider = SyncProvider::new(
            config,
            LwwEngine::new(peer_id),
            store.clone(),
            endpoint.clone(),
            network.presence.join(peer_id),
            Arc::clone(&monitor),
        );
        Self {
            provider,
            store,
            endpoint,
            monitor,
        }
    }

    /// Cuts the replica off from the relay and tells it so.
    pub fn go_offline(&self) {
        self.endpoint.set_connected(false);
        self.monitor.signal_offline();
    }

    /// Reconnects the replica and tells it so.
    pub fn go_online(&self) {
        self.endpoint.set_connected(true);
        self.monitor.signal_online();
    }

    pub fn text(&self, key: &str) -> Option<String> {
        self.provider.document().get(key).map(str::to_string)
    }

    pub fn full(&self) -> Vec<u8> {
        self.provider.encode_full().unwrap()
    }
}

/// A relay and presence table shared by every replica in a test.
#[derive(Default)]
pub struct Network {
    pub relay: MemoryRelay,
    pub presence: MemoryPresence,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Handles queued events on every replica until none are left.
pub async fn settle(replicas: &mut [&mut Replica]) {
    loop {
        let mut handled = 0;
        for replica in replicas.iter_mut() {
            handled += replica.provider.process_pending().await;
        }
        if handled == 0 {
            break;
        }
    }
}
