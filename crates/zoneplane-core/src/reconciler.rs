// # Removal Reconciler
//
// Completes the asynchronous deletions started by the control plane:
//
// 1. Periodically read the dataset
// 2. Purge permitted networks and linked zones whose removal has settled
//    (`removal_settle_secs` after it was requested)
// 3. Re-derive the state of every zone that lost a network
// 4. Emit one event per purged entity
//
// The reconciler shares the control plane's store and commit policy, so
// a pass racing a request simply re-applies against the newer revision.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::error::Result;
use crate::events::ControlPlaneEvent;
use crate::model::Timestamp;
use crate::service::ControlPlane;

/// Entities purged by one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// `(zone_id, permitted_network_id)` pairs
    pub permitted_networks_removed: Vec<(String, String)>,
    pub linked_zones_removed: Vec<String>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.permitted_networks_removed.is_empty() && self.linked_zones_removed.is_empty()
    }
}

/// Background worker purging settled removals
pub struct Reconciler {
    plane: Arc<ControlPlane>,
    interval: Duration,
    settle: chrono::Duration,
}

impl Reconciler {
    pub fn new(plane: Arc<ControlPlane>) -> Self {
        let config = plane.config().reconciler.clone();
        Self {
            plane,
            interval: Duration::from_secs(config.interval_secs),
            settle: chrono::Duration::seconds(config.removal_settle_secs as i64),
        }
    }

    /// Run one pass against the current time
    pub async fn reconcile_once(&self) -> Result<ReconcileReport> {
        self.reconcile_at(chrono::Utc::now()).await
    }

    /// Run one pass as if the clock read `now`
    pub async fn reconcile_at(&self, now: Timestamp) -> Result<ReconcileReport> {
        let settle = self.settle;
        let snapshot = self.plane.read().await?;
        let pending = snapshot
            .permitted_networks
            .iter()
            .any(|p| p.lifecycle.is_settled(now, settle))
            || snapshot.linked_zones.iter().any(|lz| lz.is_settled(now, settle));
        if !pending {
            debug!("nothing to reconcile");
            return Ok(ReconcileReport::default());
        }

        let report = self
            .plane
            .mutate(|data| {
                let mut report = ReconcileReport::default();
                data.permitted_networks.retain(|p| {
                    let settled = p.lifecycle.is_settled(now, settle);
                    if settled {
                        report
                            .permitted_networks_removed
                            .push((p.zone_id.clone(), p.id.clone()));
                    }
                    !settled
                });
                data.linked_zones.retain(|lz| {
                    let settled = lz.is_settled(now, settle);
                    if settled {
                        report.linked_zones_removed.push(lz.id.clone());
                    }
                    !settled
                });
                for (zone_id, _) in &report.permitted_networks_removed {
                    data.refresh_zone_state(zone_id, now);
                }
                Ok(report)
            })
            .await?;

        for (zone_id, permitted_network_id) in &report.permitted_networks_removed {
            info!(zone_id = %zone_id, permitted_network_id = %permitted_network_id, "permitted network removed");
            self.plane.emit(ControlPlaneEvent::PermittedNetworkRemoved {
                zone_id: zone_id.clone(),
                permitted_network_id: permitted_network_id.clone(),
            });
        }
        for linked_zone_id in &report.linked_zones_removed {
            info!(linked_zone_id = %linked_zone_id, "linked zone removed");
            self.plane.emit(ControlPlaneEvent::LinkedZoneRemoved {
                linked_zone_id: linked_zone_id.clone(),
            });
        }
        Ok(report)
    }

    /// Run until SIGINT/SIGTERM
    pub async fn run(&self) -> Result<()> {
        self.run_with_shutdown(None).await
    }

    /// Run until `shutdown_rx` fires, or until a signal when `None`
    ///
    /// Failed passes are logged and retried on the next tick. The store is
    /// flushed before returning.
    pub async fn run_with_shutdown(
        &self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        self.plane.emit(ControlPlaneEvent::ReconcilerStarted);
        info!(interval_secs = self.interval.as_secs(), "reconciler started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let reason = match shutdown_rx {
            Some(mut rx) => loop {
                tokio::select! {
                    _ = ticker.tick() => self.pass().await,
                    _ = &mut rx => break "Shutdown signal",
                }
            },
            None => loop {
                tokio::select! {
                    _ = ticker.tick() => self.pass().await,
                    _ = tokio::signal::ctrl_c() => break "Shutdown signal",
                }
            },
        };

        info!("Shutdown signal received");
        self.plane.emit(ControlPlaneEvent::ReconcilerStopped {
            reason: reason.to_string(),
        });
        self.plane.store().flush().await?;
        info!("Store flushed, reconciler stopped");
        Ok(())
    }

    async fn pass(&self) {
        match self.reconcile_once().await {
            Ok(report) if !report.is_empty() => debug!(?report, "reconcile pass complete"),
            Ok(_) => {}
            Err(e) => error!("Reconcile pass failed: {}", e),
        }
    }
}
