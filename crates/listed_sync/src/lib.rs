//! # Listed Sync
//!
//! Offline-first replication for Listed documents.
//!
//! This crate provides:
//! - [`SyncProvider`], which bootstraps a document from local storage,
//!   applies inbound updates, routes or buffers outbound ones and drives the
//!   reconnection handshake
//! - [`LeaderElector`], which picks exactly one janitor from the presence view
//! - [`NetworkLinkMonitor`] and [`PendingUpdateQueue`] for offline operation
//! - Collaborator traits ([`LocalStore`], [`RemoteChannel`], [`Presence`])
//!   with in-memory implementations
//!
//! ## Reconnection handshake
//!
//! 1. The reconnecting peer broadcasts `state-vector-request` with its state
//!    vector and peer id
//! 2. The janitor answers `state-vector-response:<peer id>` with a diff
//! 3. The reconnecting peer applies the diff; everyone else ignores it
//!
//! With no janitor elected the request goes unanswered.
//!
//! ## Key Invariants
//!
//! - At most one janitor per consistent membership view
//! - The persisted baseline is always the full document, never a log
//! - Updates applied from the relay are never sent back to it
//! - State vectors are passed to the merge engine unexamined

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod compactor;
mod config;
mod election;
mod error;
mod handle;
mod message;
mod network;
mod presence;
mod provider;
mod queue;
mod store;
mod transport;

pub use compactor::ReplicaCompactor;
pub use config::{FlushPolicy, SyncConfig};
pub use election::{select_janitor, CpuPressure, LeaderElector, PeerMetrics, PeerRecord, TieBreak};
pub use error::{SyncError, SyncResult};
pub use handle::SyncHandle;
pub use message::{
    MessageKind, RemoteMessage, DOC_KEY, STATE_VECTOR_REQUEST, STATE_VECTOR_RESPONSE_PREFIX,
};
pub use network::NetworkLinkMonitor;
pub use presence::{
    random_peer_id, MemoryPresence, PeerId, Presence, PresenceChange, PresenceHandler,
    PresenceMember,
};
pub use provider::{ProviderEvent, SyncProvider, SyncState, SyncStats, SyncStatus};
pub use queue::PendingUpdateQueue;
pub use store::{LocalStore, MemoryStore};
pub use transport::{MemoryRelay, MessageHandler, RelayEndpoint, RemoteChannel};
