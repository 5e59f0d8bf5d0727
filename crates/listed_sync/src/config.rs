//! Configuration for the sync provider.

use crate::election::{PeerMetrics, TieBreak};
use crate::message::DOC_KEY;

/// What happens to buffered offline updates when the link comes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushPolicy {
    /// Send buffered updates, oldest first, after the catch-up request.
    #[default]
    OnReconnect,
    /// Keep them buffered until [`flush_pending`] is called.
    ///
    /// [`flush_pending`]: crate::SyncProvider::flush_pending
    Manual,
}

/// Configuration for a sync provider.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Collection name the document is stored and relayed under.
    pub scope: String,
    /// Storage key of the persisted baseline within the scope.
    pub doc_key: String,
    /// Buffered update policy.
    pub flush_policy: FlushPolicy,
    /// Janitor tie-break rule.
    pub tie_break: TieBreak,
    /// Metrics this replica publishes for the election.
    pub metrics: PeerMetrics,
}

impl SyncConfig {
    /// Creates a configuration for the given scope.
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            doc_key: DOC_KEY.to_string(),
            flush_policy: FlushPolicy::default(),
            tie_break: TieBreak::default(),
            metrics: PeerMetrics::unknown(),
        }
    }

    /// Sets the storage key of the persisted baseline.
    pub fn with_doc_key(mut self, key: impl Into<String>) -> Self {
        self.doc_key = key.into();
        self
    }

    /// Sets the flush policy.
    pub fn with_flush_policy(mut self, policy: FlushPolicy) -> Self {
        self.flush_policy = policy;
        self
    }

    /// Sets the tie-break rule.
    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    /// Sets the published metrics.
    pub fn with_metrics(mut self, metrics: PeerMetrics) -> Self {
        self.metrics = metrics;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("default")
    }
}
