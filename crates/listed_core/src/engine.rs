//! The merge-engine contract driven by the sync layer.

use crate::error::MergeResult;
use crate::subscription::Subscription;

/// An opaque, commutative, idempotent delta to a document.
pub type Update = Vec<u8>;

/// An opaque digest of replica progress.
///
/// Only the merge engine that produced it interprets the bytes.
pub type StateVector = Vec<u8>;

/// Where a document mutation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateOrigin {
    /// Produced by an edit on this replica.
    Local,
    /// Produced by applying an update received from elsewhere.
    Remote,
}

impl UpdateOrigin {
    /// Returns true for edits made on this replica.
    pub fn is_local(&self) -> bool {
        matches!(self, UpdateOrigin::Local)
    }
}

/// A mutation event emitted by a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocUpdate {
    /// The delta that was applied.
    pub update: Update,
    /// Where the delta came from.
    pub origin: UpdateOrigin,
}

impl DocUpdate {
    /// Creates a mutation event for a local edit.
    pub fn local(update: Update) -> Self {
        Self {
            update,
            origin: UpdateOrigin::Local,
        }
    }

    /// Creates a mutation event for an applied remote update.
    pub fn remote(update: Update) -> Self {
        Self {
            update,
            origin: UpdateOrigin::Remote,
        }
    }
}

/// Callback invoked synchronously on every document mutation.
pub type UpdateHandler = Box<dyn Fn(&DocUpdate) + Send + Sync>;

/// A conflict-free merge engine.
///
/// The sync layer treats documents, updates and state vectors as opaque and
/// only ever touches them through this trait.
///
/// # Contract
///
/// - `apply` is idempotent and commutative across updates
/// - Replicas that applied the same set of updates produce identical
///   `encode_full` bytes
/// - `encode_diff(doc, sv)` contains everything `doc` holds that a replica
///   at `sv` is missing
/// - Handlers registered with `observe` fire synchronously for every
///   mutation that changed the document
pub trait MergeEngine: Send + Sync + 'static {
    /// The replicated document type.
    type Document: Send + 'static;

    /// Creates an empty, initialized document.
    fn create(&self) -> Self::Document;

    /// Applies an update received from elsewhere.
    fn apply(&self, doc: &mut Self::Document, update: &[u8]) -> MergeResult<()>;

    /// Encodes the full document state as a single update.
    fn encode_full(&self, doc: &Self::Document) -> MergeResult<Update>;

    /// Encodes the document's state vector.
    fn encode_state_vector(&self, doc: &Self::Document) -> MergeResult<StateVector>;

    /// Encodes what a replica at `state_vector` is missing.
    fn encode_diff(&self, doc: &Self::Document, state_vector: &[u8]) -> MergeResult<Update>;

    /// Registers a mutation handler.
    fn observe(&self, doc: &Self::Document, handler: UpdateHandler) -> Subscription;
}
