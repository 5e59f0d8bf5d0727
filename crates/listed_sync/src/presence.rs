//! Ephemeral peer membership.
//!
//! Every replica publishes one [`PeerRecord`] describing itself and reads
//! everyone else's. Records are never persisted and disappear when a peer
//! leaves.

use crate::election::{PeerMetrics, PeerRecord};
use listed_core::{Listeners, Subscription};
use parking_lot::Mutex;
use std::sync::Arc;

/// Identifier of a replica in the membership view.
pub type PeerId = u64;

/// A membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceChange {
    /// A peer published its first record.
    Joined(PeerId),
    /// A peer replaced its record.
    Updated(PeerId),
    /// A peer left.
    Left(PeerId),
}

impl PresenceChange {
    /// Returns the peer the change is about.
    pub fn peer_id(&self) -> PeerId {
        match self {
            PresenceChange::Joined(id) | PresenceChange::Updated(id) | PresenceChange::Left(id) => {
                *id
            }
        }
    }
}

/// Callback invoked on every membership change.
pub type PresenceHandler = Box<dyn Fn(&PresenceChange) + Send + Sync>;

/// A shared, ephemeral membership view.
///
/// Each peer writes only its own record.
pub trait Presence: Send + Sync + 'static {
    /// Returns this replica's peer id.
    fn local_peer_id(&self) -> PeerId;

    /// Publishes or replaces this replica's record.
    fn set_local_metrics(&self, metrics: PeerMetrics);

    /// Returns every current record, in the order peers joined.
    fn states(&self) -> Vec<PeerRecord>;

    /// Registers a membership observer.
    fn subscribe(&self, handler: PresenceHandler) -> Subscription;

    /// Withdraws this replica's record.
    fn leave(&self);
}

/// Generates a random peer id.
pub fn random_peer_id() -> PeerId {
    rand::random::<PeerId>()
}

#[derive(Debug, Default)]
struct PresenceTable {
    records: Mutex<Vec<PeerRecord>>,
    listeners: Listeners<PresenceChange>,
}

/// In-process membership table shared by several replicas.
///
/// Cloning yields another handle to the same table.
#[derive(Debug, Clone, Default)]
pub struct MemoryPresence {
    table: Arc<PresenceTable>,
}

impl MemoryPresence {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a membership handle for `peer_id`.
    ///
    /// The peer appears in the table once it publishes metrics.
    pub fn join(&self, peer_id: PeerId) -> PresenceMember {
        PresenceMember {
            table: self.clone(),
            peer_id,
        }
    }

    /// Returns every current record, in join order.
    pub fn members(&self) -> Vec<PeerRecord> {
        self.table.records.lock().clone()
    }

    /// Drops a peer's record as if it timed out.
    pub fn remove(&self, peer_id: PeerId) -> bool {
        let removed = {
            let mut records = self.table.records.lock();
            let before = records.len();
            records.retain(|record| record.peer_id != peer_id);
            records.len() != before
        };
        if removed {
            self.table.listeners.emit(&PresenceChange::Left(peer_id));
        }
        removed
    }

    fn upsert(&self, record: PeerRecord) {
        let change = {
            let mut records = self.table.records.lock();
            match records.iter_mut().find(|r| r.peer_id == record.peer_id) {
                Some(existing) => {
                    *existing = record;
                    PresenceChange::Updated(record.peer_id)
                }
                None => {
                    records.push(record);
                    PresenceChange::Joined(record.peer_id)
                }
            }
        };
        self.table.listeners.emit(&change);
    }
}

/// One replica's handle on a [`MemoryPresence`] table.
///
/// Dropping the member withdraws its record.
#[derive(Debug)]
pub struct PresenceMember {
    table: MemoryPresence,
    peer_id: PeerId,
}

impl Presence for PresenceMember {
    fn local_peer_id(&self) -> PeerId {
        self.peer_id
    }

    fn set_local_metrics(&self, metrics: PeerMetrics) {
        self.table.upsert(PeerRecord::new(self.peer_id, metrics));
    }

    fn states(&self) -> Vec<PeerRecord> {
        self.table.members()
    }

    fn subscribe(&self, handler: PresenceHandler) -> Subscription {
        self.table.table.listeners.subscribe(move |change| handler(change))
    }

    fn leave(&self) {
        self.table.remove(self.peer_id);
    }
}

impl Drop for PresenceMember {
    fn drop(&mut self) {
        self.leave();
    }
}
