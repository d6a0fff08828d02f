// # Store Trait
//
// Defines the interface of the consistent backing store.
//
// ## Consistency
//
// Callers read a [`Dataset`] snapshot, derive a new dataset from it and hand
// it back with the revision they started from. The store accepts the commit
// only if nothing else committed in between; otherwise it returns
// `Error::RevisionMismatch` and the caller starts over from a fresh snapshot.
//
// Every uniqueness check (zone names per instance, VPC per zone, ...) is made
// inside such a read-modify-commit cycle, so two racing creates cannot both
// succeed.
//
// ## Implementations
//
// - `MemoryStore`: process-local
// - `FileStore`: JSON file with atomic replace and backup recovery

use std::sync::Arc;

use async_trait::async_trait;

use crate::dataset::Dataset;

/// Backing store for all control-plane entities
///
/// Implementations must be safe to call concurrently from many request
/// tasks. Transient infrastructure failures are reported as
/// `Error::StoreUnavailable` so the control plane can retry them.
#[async_trait]
pub trait Store: Send + Sync {
    /// Current committed dataset
    async fn snapshot(&self) -> Result<Arc<Dataset>, crate::Error>;

    /// Replace the dataset if `expected_revision` is still current
    ///
    /// # Returns
    ///
    /// - `Ok(revision)`: the new revision
    /// - `Err(Error::RevisionMismatch)`: another commit won the race
    /// - `Err(Error::StoreUnavailable)`: transient failure; nothing committed
    async fn commit(&self, expected_revision: u64, next: Dataset) -> Result<u64, crate::Error>;

    /// Persist anything buffered
    async fn flush(&self) -> Result<(), crate::Error>;

    /// Short name used in logs
    fn backend_name(&self) -> &'static str;
}

/// Helper trait for constructing stores from configuration
#[async_trait]
pub trait StoreFactory: Send + Sync {
    /// Create a store from backend-specific JSON configuration
    async fn create(&self, config: &serde_json::Value) -> Result<Arc<dyn Store>, crate::Error>;
}
