//! Janitor election over the presence view.
//!
//! Every replica scores every published record and picks the highest. The
//! same records produce the same winner on every replica, so at most one
//! janitor exists per consistent membership view.

use crate::presence::{PeerId, Presence, PresenceChange};
use listed_core::Subscription;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Reported CPU pressure of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CpuPressure {
    /// Plenty of headroom.
    Nominal,
    /// Some load.
    Fair,
    /// Heavy load.
    Serious,
    /// Throttling.
    Critical,
    /// Not reported.
    #[default]
    Unknown,
}

impl CpuPressure {
    /// Returns the score bonus for this pressure level.
    pub fn bonus(&self) -> f64 {
        match self {
            CpuPressure::Nominal => 100.0,
            CpuPressure::Fair => 50.0,
            _ => 0.0,
        }
    }

    /// Parses a pressure label. Unrecognised labels are [`CpuPressure::Unknown`].
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "nominal" => CpuPressure::Nominal,
            "fair" => CpuPressure::Fair,
            "serious" => CpuPressure::Serious,
            "critical" => CpuPressure::Critical,
            _ => CpuPressure::Unknown,
        }
    }
}

impl fmt::Display for CpuPressure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CpuPressure::Nominal => "nominal",
            CpuPressure::Fair => "fair",
            CpuPressure::Serious => "serious",
            CpuPressure::Critical => "critical",
            CpuPressure::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Device capability metrics published for the election.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PeerMetrics {
    /// Effective downlink bandwidth.
    pub downlink: Option<f64>,
    /// Round-trip time.
    pub rtt: Option<f64>,
    /// Device memory.
    pub device_memory: Option<f64>,
    /// CPU pressure.
    pub cpu_pressure: CpuPressure,
}

impl PeerMetrics {
    /// Creates metrics from raw platform readings.
    ///
    /// Negative or non-finite readings (the platform reports `-1` when it
    /// cannot measure) are treated as unknown.
    pub fn new(downlink: f64, rtt: f64, device_memory: f64, cpu_pressure: CpuPressure) -> Self {
        Self {
            downlink: known(downlink),
            rtt: known(rtt),
            device_memory: known(device_memory),
            cpu_pressure,
        }
    }

    /// Metrics with nothing known.
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Returns the election score. Unknown readings contribute nothing.
    pub fn score(&self) -> f64 {
        self.downlink.unwrap_or(0.0) - self.rtt.unwrap_or(0.0)
            + self.device_memory.unwrap_or(0.0)
            + self.cpu_pressure.bonus()
    }
}

fn known(reading: f64) -> Option<f64> {
    (reading.is_finite() && reading >= 0.0).then_some(reading)
}

/// One peer's published presence record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeerRecord {
    /// Peer id.
    pub peer_id: PeerId,
    /// Published metrics.
    pub metrics: PeerMetrics,
}

impl PeerRecord {
    /// Creates a record.
    pub fn new(peer_id: PeerId, metrics: PeerMetrics) -> Self {
        Self { peer_id, metrics }
    }

    /// Returns the record's election score.
    pub fn score(&self) -> f64 {
        self.metrics.score()
    }
}

/// How equal scores are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TieBreak {
    /// The earliest record in membership order wins.
    ///
    /// Only deterministic when every replica sees the same order.
    FirstSeen,
    /// The lowest peer id wins.
    #[default]
    LowestPeerId,
}

/// Picks the janitor among `records`.
///
/// Returns `None` only when `records` is empty.
pub fn select_janitor(records: &[PeerRecord], tie_break: TieBreak) -> Option<PeerId> {
    let mut candidates = records.iter();
    let mut best = candidates.next()?;
    for record in candidates {
        let (score, best_score) = (record.score(), best.score());
        let wins = score > best_score
            || (score == best_score
                && tie_break == TieBreak::LowestPeerId
                && record.peer_id < best.peer_id);
        if wins {
            best = record;
        }
    }
    Some(best.peer_id)
}

/// Keeps track of the current janitor in this replica's view.
///
/// The winner is recomputed on every membership change and cached, so
/// [`is_janitor`](LeaderElector::is_janitor) is a read of the cache.
#[derive(Debug)]
pub struct LeaderElector<P: Presence> {
    presence: Arc<P>,
    tie_break: TieBreak,
    janitor: Arc<RwLock<Option<PeerId>>>,
    _subscription: Subscription,
}

impl<P: Presence> LeaderElector<P> {
    /// Creates an elector over `presence` and runs a first election.
    pub fn new(presence: Arc<P>, tie_break: TieBreak) -> Self {
        let janitor = Arc::new(RwLock::new(None));

        let weak: Weak<P> = Arc::downgrade(&presence);
        let cache = Arc::clone(&janitor);
        let subscription = presence.subscribe(Box::new(move |change: &PresenceChange| {
            if let Some(presence) = weak.upgrade() {
                let winner = select_janitor(&presence.states(), tie_break);
                let previous = std::mem::replace(&mut *cache.write(), winner);
                if previous != winner {
                    debug!(?change, ?previous, ?winner, "janitor changed");
                }
            }
        }));

        let elector = Self {
            presence,
            tie_break,
            janitor,
            _subscription: subscription,
        };
        elector.elect();
        elector
    }

    /// Recomputes the janitor from the current membership.
    pub fn elect(&self) -> Option<PeerId> {
        let winner = select_janitor(&self.presence.states(), self.tie_break);
        *self.janitor.write() = winner;
        winner
    }

    /// Returns the cached janitor.
    pub fn janitor(&self) -> Option<PeerId> {
        *self.janitor.read()
    }

    /// Returns true if this replica is the janitor.
    pub fn is_janitor(&self) -> bool {
        self.janitor() == Some(self.local_peer_id())
    }

    /// Returns this replica's peer id.
    pub fn local_peer_id(&self) -> PeerId {
        self.presence.local_peer_id()
    }

    /// Returns the tie-break rule in use.
    pub fn tie_break(&self) -> TieBreak {
        self.tie_break
    }

    /// Publishes local metrics and re-elects.
    pub fn publish(&self, metrics: PeerMetrics) -> Option<PeerId> {
        self.presence.set_local_metrics(metrics);
        self.elect()
    }

    /// Returns the current membership.
    pub fn members(&self) -> Vec<PeerRecord> {
        self.presence.states()
    }

    /// Withdraws this replica from the membership.
    pub fn leave(&self) {
        self.presence.leave();
        self.elect();
    }
}
