//! Deduplicated, canonically ordered operation storage.

use crate::error::{MergeError, MergeResult};
use crate::operation::{OpId, Operation};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// The set of operations a replica has seen.
///
/// # Invariants
///
/// - Each [`OpId`] is stored at most once; re-inserting is a no-op
/// - Iteration order is `(client, seq)` regardless of arrival order
/// - The state vector only counts contiguous sequences from 1, so a gap
///   is re-requested rather than skipped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpSet {
    ops: BTreeMap<OpId, Operation>,
}

impl OpSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an operation.
    ///
    /// Returns false if an operation with the same id was already present.
    pub fn insert(&mut self, op: Operation) -> bool {
        match self.ops.entry(op.id()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(op);
                true
            }
        }
    }

    /// Returns true if the operation id is present.
    pub fn contains(&self, id: &OpId) -> bool {
        self.ops.contains_key(id)
    }

    /// Iterates operations in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.ops.values()
    }

    /// Returns the number of operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Returns the highest sequence number seen from `client`.
    pub fn max_seq(&self, client: u64) -> u64 {
        self.ops
            .range(OpId::new(client, 0)..=OpId::new(client, u64::MAX))
            .next_back()
            .map(|(id, _)| id.seq)
            .unwrap_or(0)
    }

    /// Returns the highest lamport timestamp seen.
    pub fn max_lamport(&self) -> u64 {
        self.ops.values().map(|op| op.lamport).max().unwrap_or(0)
    }

    /// Computes the contiguous progress per client.
    pub fn state_vector(&self) -> BTreeMap<u64, u64> {
        let mut vector = BTreeMap::new();
        for id in self.ops.keys() {
            let seen = vector.entry(id.client).or_insert(0u64);
            if seen.checked_add(1) == Some(id.seq) {
                *seen = id.seq;
            }
        }
        vector.retain(|_, seq| *seq > 0);
        vector
    }

    /// Returns the operations a replica at `vector` has not seen.
    pub fn missing_from(&self, vector: &BTreeMap<u64, u64>) -> Vec<Operation> {
        self.ops
            .values()
            .filter(|op| op.seq > vector.get(&op.client).copied().unwrap_or(0))
            .cloned()
            .collect()
    }

    /// Resolves the visible value of every key.
    ///
    /// Keys whose winning operation is a removal are omitted.
    pub fn visible(&self) -> BTreeMap<&str, &str> {
        let mut winners: BTreeMap<&str, &Operation> = BTreeMap::new();
        for op in self.ops.values() {
            match winners.get(op.key.as_str()) {
                Some(current) if current.precedence(op).is_ge() => {}
                _ => {
                    winners.insert(op.key.as_str(), op);
                }
            }
        }
        winners
            .into_iter()
            .filter_map(|(key, op)| op.value.as_deref().map(|value| (key, value)))
            .collect()
    }

    /// Returns the winning operation for a single key.
    pub fn winner(&self, key: &str) -> Option<&Operation> {
        self.ops
            .values()
            .filter(|op| op.key == key)
            .max_by(|a, b| a.precedence(b))
    }
}

/// Encodes a state vector to CBOR.
pub(crate) fn encode_vector(vector: &BTreeMap<u64, u64>) -> MergeResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(vector, &mut bytes).map_err(|e| MergeError::encoding(e.to_string()))?;
    Ok(bytes)
}

/// Decodes a state vector from CBOR.
pub(crate) fn decode_vector(bytes: &[u8]) -> MergeResult<BTreeMap<u64, u64>> {
    ciborium::from_reader(bytes).map_err(|e| MergeError::decoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(client: u64, seq: u64, lamport: u64, key: &str, value: &str) -> Operation {
        Operation::set(client, seq, lamport, key, value)
    }

    #[test]
    fn insert_is_idempotent() {
        let mut set = OpSet::new();
        assert!(set.insert(op(1, 1, 1, "a", "x")));
        assert!(!set.insert(op(1, 1, 1, "a", "x")));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn state_vector_stops_at_gap() {
        let mut set = OpSet::new();
        set.insert(op(1, 1, 1, "a", "x"));
        set.insert(op(1, 2, 2, "a", "y"));
        set.insert(op(1, 4, 4, "a", "z"));
        set.insert(op(2, 2, 3, "b", "w"));

        let vector = set.state_vector();
        assert_eq!(vector.get(&1), Some(&2));
        assert_eq!(vector.get(&2), None);
        assert_eq!(set.max_seq(1), 4);
    }

    #[test]
    fn missing_from_vector() {
        let mut set = OpSet::new();
        set.insert(op(1, 1, 1, "a", "x"));
        set.insert(op(1, 2, 2, "a", "y"));
        set.insert(op(2, 1, 3, "b", "w"));

        let mut vector = BTreeMap::new();
        vector.insert(1, 1);
        let missing = set.missing_from(&vector);
        let ids: Vec<_> = missing.iter().map(Operation::id).collect();
        assert_eq!(ids, vec![OpId::new(1, 2), OpId::new(2, 1)]);
    }

    #[test]
    fn visible_resolves_last_writer() {
        let mut set = OpSet::new();
        set.insert(op(1, 1, 1, "text", "hello"));
        set.insert(op(2, 1, 2, "text", "hello world"));
        set.insert(Operation::remove(1, 2, 3, "gone"));

        let visible = set.visible();
        assert_eq!(visible.get("text"), Some(&"hello world"));
        assert!(!visible.contains_key("gone"));
        assert_eq!(set.winner("text").map(|o| o.client), Some(2));
    }

    #[test]
    fn concurrent_writes_break_ties_by_client() {
        let mut set = OpSet::new();
        set.insert(op(7, 1, 5, "k", "seven"));
        set.insert(op(3, 1, 5, "k", "three"));
        assert_eq!(set.visible().get("k"), Some(&"seven"));
    }

    #[test]
    fn vector_roundtrip() {
        let mut vector = BTreeMap::new();
        vector.insert(10u64, 3u64);
        vector.insert(2u64, 1u64);
        let bytes = encode_vector(&vector).unwrap();
        assert_eq!(decode_vector(&bytes).unwrap(), vector);
    }
}
