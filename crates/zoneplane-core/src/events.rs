//! Control-plane events
//!
//! State transitions worth observing outside a request are published on a
//! bounded channel created together with the
//! [`ControlPlane`](crate::service::ControlPlane). Publishing never blocks a
//! request: when the channel is full the event is dropped with a warning.

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use crate::model::{AccessAction, AccessRequestState};

/// Events emitted by the control plane and its reconciler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlPlaneEvent {
    ZoneCreated {
        zone_id: String,
        name: String,
    },

    ZoneDeleted {
        zone_id: String,
        records_removed: usize,
    },

    ZoneImported {
        zone_id: String,
        records_added: usize,
        records_failed: usize,
    },

    /// Permitted network moved to `REMOVAL_IN_PROGRESS`
    PermittedNetworkRemovalRequested {
        zone_id: String,
        permitted_network_id: String,
    },

    /// Reconciler finished removing a permitted network
    PermittedNetworkRemoved {
        zone_id: String,
        permitted_network_id: String,
    },

    /// Linked zone moved to `REMOVAL_IN_PROGRESS`
    LinkedZoneRemovalRequested {
        linked_zone_id: String,
    },

    /// Reconciler finished removing a linked zone
    LinkedZoneRemoved {
        linked_zone_id: String,
    },

    AccessRequestTransitioned {
        access_request_id: String,
        action: AccessAction,
        from: AccessRequestState,
        to: AccessRequestState,
        /// Triggered by linked-zone deletion rather than the owner
        cascade: bool,
    },

    ReconcilerStarted,

    ReconcilerStopped {
        reason: String,
    },
}

/// Sending half shared by the control plane and the reconciler
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<ControlPlaneEvent>,
}

impl EventSink {
    /// Create a sink and its receiver with the given capacity
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ControlPlaneEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: ControlPlaneEvent) {
        if let Err(err) = self.tx.try_send(event) {
            match err {
                mpsc::error::TrySendError::Full(event) => {
                    warn!(?event, "Event channel full, dropping event. Consider increasing event_channel_capacity.");
                }
                // Nobody is listening; events are optional.
                mpsc::error::TrySendError::Closed(_) => {}
            }
        }
    }
}

/// Consume events as a `Stream`
pub fn event_stream(rx: mpsc::Receiver<ControlPlaneEvent>) -> ReceiverStream<ControlPlaneEvent> {
    ReceiverStream::new(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn full_channel_drops_instead_of_blocking() {
        let (sink, mut rx) = EventSink::channel(1);
        sink.emit(ControlPlaneEvent::ReconcilerStarted);
        sink.emit(ControlPlaneEvent::ReconcilerStopped {
            reason: "test".to_string(),
        });
        assert_eq!(rx.recv().await, Some(ControlPlaneEvent::ReconcilerStarted));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn stream_ends_when_sinks_drop() {
        let (sink, rx) = EventSink::channel(4);
        sink.emit(ControlPlaneEvent::ReconcilerStarted);
        drop(sink);
        let events: Vec<_> = event_stream(rx).collect().await;
        assert_eq!(events, vec![ControlPlaneEvent::ReconcilerStarted]);
    }

    #[test]
    fn closed_channel_is_ignored() {
        let (sink, rx) = EventSink::channel(1);
        drop(rx);
        sink.emit(ControlPlaneEvent::ReconcilerStarted);
    }
}
