//! Local persistence collaborator.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Scoped key/value persistence for the document baseline.
#[async_trait]
pub trait LocalStore: Send + Sync + 'static {
    /// Reads one entry.
    async fn get(&self, scope: &str, key: &str) -> SyncResult<Option<Vec<u8>>>;

    /// Reads every entry in a scope.
    async fn get_all(&self, scope: &str) -> SyncResult<BTreeMap<String, Vec<u8>>>;

    /// Writes one entry, replacing any previous value.
    async fn put(&self, scope: &str, key: &str, value: Vec<u8>) -> SyncResult<()>;

    /// Writes several entries.
    async fn put_all(&self, scope: &str, entries: BTreeMap<String, Vec<u8>>) -> SyncResult<()>;

    /// Deletes one entry.
    async fn delete(&self, scope: &str, key: &str) -> SyncResult<()>;

    /// Deletes every entry in a scope.
    async fn delete_all(&self, scope: &str) -> SyncResult<()>;
}

#[derive(Debug, Default)]
struct StoreInner {
    scopes: HashMap<String, BTreeMap<String, Vec<u8>>>,
    failing: bool,
    writes: u64,
}

impl StoreInner {
    fn check(&self) -> SyncResult<()> {
        if self.failing {
            Err(SyncError::storage("store unavailable"))
        } else {
            Ok(())
        }
    }
}

/// In-memory [`LocalStore`].
///
/// Cloning yields another handle to the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent operation fail with a storage error.
    pub fn set_failing(&self, failing: bool) {
        self.inner.lock().failing = failing;
    }

    /// Returns the number of successful writes.
    pub fn write_count(&self) -> u64 {
        self.inner.lock().writes
    }

    /// Reads an entry without going through the async interface.
    pub fn peek(&self, scope: &str, key: &str) -> Option<Vec<u8>> {
        self.inner
            .lock()
            .scopes
            .get(scope)
            .and_then(|entries| entries.get(key))
            .cloned()
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn get(&self, scope: &str, key: &str) -> SyncResult<Option<Vec<u8>>> {
        let inner = self.inner.lock();
        inner.check()?;
        Ok(inner
            .scopes
            .get(scope)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn get_all(&self, scope: &str) -> SyncResult<BTreeMap<String, Vec<u8>>> {
        let inner = self.inner.lock();
        inner.check()?;
        Ok(inner.scopes.get(scope).cloned().unwrap_or_default())
    }

    async fn put(&self, scope: &str, key: &str, value: Vec<u8>) -> SyncResult<()> {
        let mut inner = self.inner.lock();
        inner.check()?;
        inner
            .scopes
            .entry(scope.to_string())
            .or_default()
            .insert(key.to_string(), value);
        inner.writes += 1;
        Ok(())
    }

    async fn put_all(&self, scope: &str, entries: BTreeMap<String, Vec<u8>>) -> SyncResult<()> {
        let mut inner = self.inner.lock();
        inner.check()?;
        inner
            .scopes
            .entry(scope.to_string())
            .or_default()
            .extend(entries);
        inner.writes += 1;
        Ok(())
    }

    async fn delete(&self, scope: &str, key: &str) -> SyncResult<()> {
        let mut inner = self.inner.lock();
        inner.check()?;
        if let Some(entries) = inner.scopes.get_mut(scope) {
            entries.remove(key);
        }
        inner.writes += 1;
        Ok(())
    }

    async fn delete_all(&self, scope: &str) -> SyncResult<()> {
        let mut inner = self.inner.lock();
        inner.check()?;
        inner.scopes.remove(scope);
        inner.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete() {
        let store = MemoryStore::new();
        assert_eq!(store.get("list", "doc").await.unwrap(), None);

        store.put("list", "doc", vec![1, 2]).await.unwrap();
        store.put("list", "doc", vec![3]).await.unwrap();
        assert_eq!(store.get("list", "doc").await.unwrap(), Some(vec![3]));
        assert_eq!(store.get("other", "doc").await.unwrap(), None);

        store.delete("list", "doc").await.unwrap();
        assert_eq!(store.peek("list", "doc"), None);
        assert_eq!(store.write_count(), 3);
    }

    #[tokio::test]
    async fn bulk_operations() {
        let store = MemoryStore::new();
        let entries: BTreeMap<_, _> = [("a".to_string(), vec![1]), ("b".to_string(), vec![2])]
            .into_iter()
            .collect();
        store.put_all("list", entries.clone()).await.unwrap();
        assert_eq!(store.get_all("list").await.unwrap(), entries);

        store.delete_all("list").await.unwrap();
        assert!(store.get_all("list").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_store() {
        let store = MemoryStore::new();
        store.set_failing(true);
        let err = store.put("list", "doc", vec![1]).await.unwrap_err();
        assert!(matches!(err, SyncError::Storage { .. }));
        assert!(store.get("list", "doc").await.is_err());

        store.set_failing(false);
        store.put("list", "doc", vec![1]).await.unwrap();
        assert_eq!(store.write_count(), 1);
    }
}
