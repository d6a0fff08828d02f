// # Memory Store
//
// In-memory implementation of Store.
//
// ## Crash Behavior
//
// - All entities are lost on restart
// - No recovery possible
//
// ## When to Use
//
// - Tests and local development
// - Ephemeral control planes seeded by their callers

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::Error;
use crate::dataset::Dataset;
use crate::traits::store::{Store, StoreFactory};

/// In-memory store
///
/// Holds the committed dataset behind a `RwLock`; commits compare the
/// revision and swap the dataset under the write lock.
///
/// # Example
///
/// ```rust,no_run
/// use zoneplane_core::state::MemoryStore;
/// use zoneplane_core::traits::Store;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryStore::new();
///     let snapshot = store.snapshot().await?;
///     let revision = store.commit(snapshot.revision, (*snapshot).clone()).await?;
///     assert_eq!(revision, 1);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Arc<Dataset>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing dataset
    pub fn with_dataset(dataset: Dataset) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(dataset))),
        }
    }

    /// Current revision
    pub async fn revision(&self) -> u64 {
        self.inner.read().await.revision
    }
}

/// Compare-and-swap shared by the in-process stores
pub(crate) fn swap_if_current(
    current: &mut Arc<Dataset>,
    expected_revision: u64,
    mut next: Dataset,
) -> Result<u64, Error> {
    if current.revision != expected_revision {
        return Err(Error::RevisionMismatch {
            expected: expected_revision,
            found: current.revision,
        });
    }
    next.revision = expected_revision + 1;
    let revision = next.revision;
    *current = Arc::new(next);
    Ok(revision)
}

#[async_trait]
impl Store for MemoryStore {
    async fn snapshot(&self) -> Result<Arc<Dataset>, Error> {
        Ok(Arc::clone(&*self.inner.read().await))
    }

    async fn commit(&self, expected_revision: u64, next: Dataset) -> Result<u64, Error> {
        let mut guard = self.inner.write().await;
        let revision = swap_if_current(&mut guard, expected_revision, next)?;
        tracing::trace!(revision, "memory store commit");
        Ok(revision)
    }

    async fn flush(&self) -> Result<(), Error> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Factory for creating memory stores
pub struct MemoryStoreFactory;

#[async_trait]
impl StoreFactory for MemoryStoreFactory {
    async fn create(&self, _config: &serde_json::Value) -> Result<Arc<dyn Store>, Error> {
        Ok(Arc::new(MemoryStore::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn commit_bumps_revision() {
        let store = MemoryStore::new();
        let snapshot = store.snapshot().await.unwrap();
        assert_eq!(snapshot.revision, 0);

        let revision = store.commit(0, (*snapshot).clone()).await.unwrap();
        assert_eq!(revision, 1);
        assert_eq!(store.revision().await, 1);
    }

    #[tokio::test]
    async fn stale_commit_is_rejected() {
        let store = MemoryStore::new();
        let stale = store.snapshot().await.unwrap();
        store.commit(0, (*stale).clone()).await.unwrap();

        let err = store.commit(stale.revision, (*stale).clone()).await.unwrap_err();
        assert!(matches!(err, Error::RevisionMismatch { expected: 0, found: 1 }));
    }

    #[tokio::test]
    async fn snapshots_are_isolated_from_later_commits() {
        let store = MemoryStore::new();
        let before = store.snapshot().await.unwrap();
        let mut next = (*before).clone();
        next.zones.clear();
        store.commit(0, next).await.unwrap();
        assert_eq!(before.revision, 0);
    }
}
