//! Reference last-writer-wins document.
//!
//! A key/value document built on an [`OpSet`]. Every local write becomes one
//! [`Operation`]; the visible value of a key is the write with the greatest
//! `(lamport, client)`. Updates are CBOR-encoded operation batches, so
//! applying them is idempotent and order-independent, and two replicas that
//! hold the same operations encode byte-identically.

use crate::engine::{DocUpdate, MergeEngine, StateVector, Update, UpdateHandler, UpdateOrigin};
use crate::error::{MergeError, MergeResult};
use crate::operation::{decode_batch, encode_batch, Operation};
use crate::opset::{decode_vector, encode_vector, OpSet};
use crate::subscription::{Listeners, Subscription};
use std::collections::BTreeMap;

/// A replicated key/value document.
#[derive(Debug)]
pub struct LwwDocument {
    client_id: u64,
    ops: OpSet,
    listeners: Listeners<DocUpdate>,
}

impl LwwDocument {
    /// Creates an empty document written to as `client_id`.
    pub fn new(client_id: u64) -> Self {
        Self {
            client_id,
            ops: OpSet::new(),
            listeners: Listeners::new(),
        }
    }

    /// Returns the client id local writes are stamped with.
    pub fn client_id(&self) -> u64 {
        self.client_id
    }

    /// Writes `value` under `key`.
    ///
    /// Returns the update describing the write; observers receive it with
    /// [`UpdateOrigin::Local`].
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> MergeResult<Update> {
        let op = Operation::set(
            self.client_id,
            self.next_seq()?,
            self.next_lamport()?,
            key,
            value,
        );
        self.commit_local(op)
    }

    /// Removes `key`.
    pub fn remove(&mut self, key: impl Into<String>) -> MergeResult<Update> {
        let op = Operation::remove(self.client_id, self.next_seq()?, self.next_lamport()?, key);
        self.commit_local(op)
    }

    /// Returns the visible value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.ops.winner(key).and_then(|op| op.value.as_deref())
    }

    /// Returns every visible entry.
    pub fn entries(&self) -> BTreeMap<String, String> {
        self.ops
            .visible()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// Returns the number of operations held.
    pub fn operation_count(&self) -> usize {
        self.ops.len()
    }

    /// Returns the underlying operation set.
    pub fn operations(&self) -> &OpSet {
        &self.ops
    }

    /// Applies an update, notifying observers if anything was new.
    ///
    /// Returns the number of operations that were not already present.
    pub fn apply_update(&mut self, update: &[u8], origin: UpdateOrigin) -> MergeResult<usize> {
        let incoming = decode_batch(update)?;
        let mut fresh = Vec::new();
        for op in incoming {
            if self.ops.insert(op.clone()) {
                fresh.push(op);
            }
        }

        let count = fresh.len();
        if count > 0 {
            let update = encode_batch(fresh)?;
            self.listeners.emit(&DocUpdate { update, origin });
        }
        Ok(count)
    }

    /// Encodes every operation held.
    pub fn encode_full(&self) -> MergeResult<Update> {
        encode_batch(self.ops.iter().cloned().collect())
    }

    /// Encodes the contiguous per-client progress.
    pub fn encode_state_vector(&self) -> MergeResult<StateVector> {
        encode_vector(&self.ops.state_vector())
    }

    /// Encodes what a replica at `state_vector` is missing.
    pub fn encode_diff(&self, state_vector: &[u8]) -> MergeResult<Update> {
        let vector = decode_vector(state_vector)?;
        encode_batch(self.ops.missing_from(&vector))
    }

    /// Registers a mutation observer.
    pub fn observe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&DocUpdate) + Send + Sync + 'static,
    {
        self.listeners.subscribe(handler)
    }

    fn next_seq(&self) -> MergeResult<u64> {
        self.ops.max_seq(self.client_id).checked_add(1).ok_or_else(|| {
            MergeError::invalid_update(format!(
                "sequence space of client {} is exhausted",
                self.client_id
            ))
        })
    }

    fn next_lamport(&self) -> MergeResult<u64> {
        self.ops
            .max_lamport()
            .checked_add(1)
            .ok_or_else(|| MergeError::invalid_update("lamport clock is exhausted"))
    }

    fn commit_local(&mut self, op: Operation) -> MergeResult<Update> {
        let update = encode_batch(vec![op.clone()])?;
        self.ops.insert(op);
        self.listeners.emit(&DocUpdate::local(update.clone()));
        Ok(update)
    }
}

/// [`MergeEngine`] over [`LwwDocument`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LwwEngine {
    client_id: u64,
}

impl LwwEngine {
    /// Creates an engine whose documents write as `client_id`.
    pub fn new(client_id: u64) -> Self {
        Self { client_id }
    }

    /// Returns the client id new documents are created with.
    pub fn client_id(&self) -> u64 {
        self.client_id
    }
}

impl MergeEngine for LwwEngine {
    type Document = LwwDocument;

    fn create(&self) -> LwwDocument {
        LwwDocument::new(self.client_id)
    }

    fn apply(&self, doc: &mut LwwDocument, update: &[u8]) -> MergeResult<()> {
        doc.apply_update(update, UpdateOrigin::Remote).map(|_| ())
    }

    fn encode_full(&self, doc: &LwwDocument) -> MergeResult<Update> {
        doc.encode_full()
    }

    fn encode_state_vector(&self, doc: &LwwDocument) -> MergeResult<StateVector> {
        doc.encode_state_vector()
    }

    fn encode_diff(&self, doc: &LwwDocument, state_vector: &[u8]) -> MergeResult<Update> {
        doc.encode_diff(state_vector)
    }

    fn observe(&self, doc: &LwwDocument, handler: UpdateHandler) -> Subscription {
        doc.observe(handler)
    }
}
