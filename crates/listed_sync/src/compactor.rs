//! Full snapshots and state digests of a replica.

use listed_core::{MergeEngine, MergeResult, StateVector, Update};
use std::sync::Arc;

/// Produces compaction artifacts for a document.
///
/// Stateless; the provider decides who may call it.
#[derive(Debug)]
pub struct ReplicaCompactor<E> {
    engine: Arc<E>,
}

impl<E: MergeEngine> ReplicaCompactor<E> {
    /// Creates a compactor over `engine`.
    pub fn new(engine: Arc<E>) -> Self {
        Self { engine }
    }

    /// Encodes the complete document.
    pub fn create_snapshot(&self, doc: &E::Document) -> MergeResult<Update> {
        self.engine.encode_full(doc)
    }

    /// Encodes the document's state vector.
    pub fn create_state_vector(&self, doc: &E::Document) -> MergeResult<StateVector> {
        self.engine.encode_state_vector(doc)
    }
}

impl<E> Clone for ReplicaCompactor<E> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
        }
    }
}
