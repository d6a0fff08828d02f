//! Control-plane services
//!
//! [`ControlPlane`] owns the consistency policy: every mutation reads a
//! store snapshot, applies a pure change to a copy and commits it against
//! the revision it read. Subsystem operations live in the submodules as
//! further `impl ControlPlane` blocks.
//!
//! ## Retry policy
//!
//! ```text
//! RevisionMismatch            -> re-read and re-apply (up to 16 times), then Conflict
//! StoreUnavailable / Fabric   -> sleep retry_delay_ms, retry up to max_retries,
//!                                then ServiceUnavailable
//! anything else               -> surfaced unchanged
//! ```
//!
//! Calls to the network fabric happen before a mutation starts, never
//! inside the closure passed to `mutate`, so a re-applied closure performs
//! no I/O.

mod linking;
mod load_balancing;
mod resolvers;
mod zones;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::ControlPlaneConfig;
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::events::{ControlPlaneEvent, EventSink};
use crate::fabric::CachingFabric;
use crate::pagination::{Page, PageRequest, paginate};
use crate::traits::{NetworkFabric, Store};

/// Optimistic-concurrency attempts before a mutation gives up with Conflict
const MAX_COMMIT_ATTEMPTS: usize = 16;

/// The control plane
///
/// Stateless apart from its collaborators: every request works from a
/// fresh store snapshot, so any number of `ControlPlane` values may share
/// one store.
pub struct ControlPlane {
    store: Arc<dyn Store>,
    fabric: Arc<dyn NetworkFabric>,
    config: ControlPlaneConfig,
    events: EventSink,
}

impl ControlPlane {
    /// Create a control plane
    ///
    /// The fabric is wrapped in a [`CachingFabric`] so subnet resolution is
    /// performed once per CRN.
    ///
    /// # Returns
    ///
    /// A tuple of (control plane, event receiver)
    pub fn new(
        store: Arc<dyn Store>,
        fabric: Arc<dyn NetworkFabric>,
        config: ControlPlaneConfig,
    ) -> Result<(Self, mpsc::Receiver<ControlPlaneEvent>)> {
        config.validate()?;
        let (events, rx) = EventSink::channel(config.event_channel_capacity);
        debug!(
            store = store.backend_name(),
            fabric = fabric.fabric_name(),
            "control plane created"
        );
        let plane = Self {
            store,
            fabric: Arc::new(CachingFabric::new(fabric)),
            config,
            events,
        };
        Ok((plane, rx))
    }

    pub fn config(&self) -> &ControlPlaneConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Sink shared with the reconciler
    pub fn event_sink(&self) -> EventSink {
        self.events.clone()
    }

    pub(crate) fn emit(&self, event: ControlPlaneEvent) {
        self.events.emit(event);
    }

    pub(crate) fn fabric(&self) -> &Arc<dyn NetworkFabric> {
        &self.fabric
    }

    /// Current dataset, retrying transient store failures
    pub(crate) async fn read(&self) -> Result<Arc<Dataset>> {
        self.retry_transient("store snapshot", || self.store.snapshot())
            .await
    }

    /// Apply `apply` to a copy of the dataset and commit it atomically
    ///
    /// `apply` may run more than once when commits race; it must be a pure
    /// function of the dataset it is given.
    pub(crate) async fn mutate<T, F>(&self, mut apply: F) -> Result<T>
    where
        F: FnMut(&mut Dataset) -> Result<T> + Send,
        T: Send,
    {
        let mut collisions = 0;
        let mut transient = 0;
        loop {
            let snapshot = match self.store.snapshot().await {
                Ok(snapshot) => snapshot,
                Err(e) if e.is_retryable() => {
                    self.back_off("store snapshot", &mut transient, e).await?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let mut next = (*snapshot).clone();
            let out = apply(&mut next)?;

            match self.store.commit(snapshot.revision, next).await {
                Ok(revision) => {
                    debug!(revision, "committed");
                    return Ok(out);
                }
                Err(Error::RevisionMismatch { expected, found }) => {
                    collisions += 1;
                    if collisions >= MAX_COMMIT_ATTEMPTS {
                        return Err(Error::conflict(format!(
                            "concurrent modification: gave up after {collisions} attempts"
                        )));
                    }
                    debug!(expected, found, attempt = collisions, "commit raced, re-applying");
                }
                Err(e) if e.is_retryable() => {
                    self.back_off("store commit", &mut transient, e).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run `op`, retrying transient failures within the retry budget
    pub(crate) async fn retry_transient<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempts = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => self.back_off(what, &mut attempts, e).await?,
                Err(e) => return Err(e),
            }
        }
    }

    async fn back_off(&self, what: &str, attempts: &mut usize, err: Error) -> Result<()> {
        *attempts += 1;
        if *attempts > self.config.retry.max_retries {
            return Err(Error::ServiceUnavailable(format!(
                "{what} failed after {} attempts: {err}",
                *attempts
            )));
        }
        warn!("{} attempt {} failed: {}", what, *attempts, err);
        tokio::time::sleep(Duration::from_millis(self.config.retry.retry_delay_ms)).await;
        Ok(())
    }

    pub(crate) fn page<T>(&self, items: Vec<T>, request: &PageRequest, base: &str) -> Result<Page<T>> {
        paginate(items, request, &self.config.pagination, base)
    }
}

/// Path prefix for instance-scoped resources, used in page links
pub(crate) fn instance_path(instance_id: &str) -> String {
    format!("/instances/{instance_id}")
}

pub(crate) fn now() -> crate::model::Timestamp {
    chrono::Utc::now()
}

/// Apply an optional text field
pub(crate) fn set_text(target: &mut String, value: Option<String>) {
    if let Some(value) = value {
        *target = value;
    }
}
