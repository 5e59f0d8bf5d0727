//! Replicated operations of the LWW document.

use crate::error::{MergeError, MergeResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Identifies an operation: the producing client and its per-client
/// sequence number (starting at 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OpId {
    /// Client that produced the operation.
    pub client: u64,
    /// Per-client sequence number.
    pub seq: u64,
}

impl OpId {
    /// Creates an operation id.
    pub fn new(client: u64, seq: u64) -> Self {
        Self { client, seq }
    }
}

/// A single replicated write.
///
/// `value == None` removes the key.
///
/// # Fields
///
/// - `client`, `seq`: identity of the operation
/// - `lamport`: logical timestamp used to order concurrent writes
/// - `key`: the entry written
/// - `value`: the new value, or `None` for a removal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Client that produced the operation.
    pub client: u64,
    /// Per-client sequence number.
    pub seq: u64,
    /// Lamport timestamp.
    pub lamport: u64,
    /// Entry key.
    pub key: String,
    /// New value, `None` for a removal.
    pub value: Option<String>,
}

impl Operation {
    /// Creates a write operation.
    pub fn set(
        client: u64,
        seq: u64,
        lamport: u64,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            client,
            seq,
            lamport,
            key: key.into(),
            value: Some(value.into()),
        }
    }

    /// Creates a removal operation.
    pub fn remove(client: u64, seq: u64, lamport: u64, key: impl Into<String>) -> Self {
        Self {
            client,
            seq,
            lamport,
            key: key.into(),
            value: None,
        }
    }

    /// Returns the operation id.
    pub fn id(&self) -> OpId {
        OpId::new(self.client, self.seq)
    }

    /// Orders two writes to the same key: greater `(lamport, client)` wins.
    pub fn precedence(&self, other: &Self) -> Ordering {
        (self.lamport, self.client).cmp(&(other.lamport, other.client))
    }

    /// Returns true if this is a removal.
    pub fn is_remove(&self) -> bool {
        self.value.is_none()
    }

    /// Checks structural validity.
    pub fn validate(&self) -> MergeResult<()> {
        if self.seq == 0 {
            return Err(MergeError::invalid_update(format!(
                "operation from client {} has sequence 0",
                self.client
            )));
        }
        if self.lamport == 0 {
            return Err(MergeError::invalid_update(format!(
                "operation {}:{} has lamport 0",
                self.client, self.seq
            )));
        }
        Ok(())
    }
}

/// Wire form of an update: a batch of operations.
#[derive(Debug, Default, Serialize, Deserialize)]
struct OperationBatch {
    ops: Vec<Operation>,
}

/// Encodes a batch of operations to CBOR.
pub(crate) fn encode_batch(ops: Vec<Operation>) -> MergeResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(&OperationBatch { ops }, &mut bytes)
        .map_err(|e| MergeError::encoding(e.to_string()))?;
    Ok(bytes)
}

/// Decodes and validates a batch of operations.
pub(crate) fn decode_batch(bytes: &[u8]) -> MergeResult<Vec<Operation>> {
    let batch: OperationBatch =
        ciborium::from_reader(bytes).map_err(|e| MergeError::decoding(e.to_string()))?;
    for op in &batch.ops {
        op.validate()?;
    }
    Ok(batch.ops)
}
