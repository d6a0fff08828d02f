//! Contract: cross-account access requests
//!
//! The owner approves, rejects or revokes; the consumer's linked zone
//! mirrors the outcome and can read records only while access is active.

mod common;

use std::sync::Arc;

use common::*;
use zoneplane_core::codec::{RdataFields, RecordType};
use zoneplane_core::model::{
    AccessAction, AccessRequestState, LinkedZone, LinkedZoneSpec, LinkedZoneState, RecordFilter,
    RecordSpec, Zone, ZoneSpec,
};
use zoneplane_core::traits::Store;
use zoneplane_core::{
    ControlPlane, ControlPlaneEvent, Error, MemoryStore, PageRequest, StaticFabric,
};

async fn linked_pair(plane: &Arc<ControlPlane>) -> (Zone, LinkedZone) {
    let zone = plane.create_zone(&owner(), ZoneSpec::new("example.com")).await.unwrap();
    plane
        .create_record(
            &owner(),
            &zone.id,
            RecordSpec::new("www", RecordType::A, RdataFields::ip("10.0.0.1")),
        )
        .await
        .unwrap();
    let linked = plane
        .create_linked_zone(
            &consumer(),
            LinkedZoneSpec {
                owner_instance_id: zone.instance_id.clone(),
                owner_zone_id: zone.id.clone(),
                label: Some("shared".into()),
                description: None,
            },
        )
        .await
        .unwrap();
    (zone, linked)
}

async fn readable(plane: &ControlPlane, linked: &LinkedZone) -> Result<usize, Error> {
    plane
        .list_linked_zone_records(
            &consumer(),
            &linked.id,
            &RecordFilter::default(),
            &PageRequest::default(),
        )
        .await
        .map(|page| page.total_count)
}

#[tokio::test]
async fn approval_grants_read_access() {
    let (plane, mut rx) = plane();
    let (zone, linked) = linked_pair(&plane).await;
    assert_eq!(linked.state, LinkedZoneState::PendingApproval);
    assert_eq!(linked.name, "example.com");
    assert!(matches!(
        readable(&plane, &linked).await,
        Err(Error::Authorization(_))
    ));

    let pending = plane
        .list_access_requests(&owner(), &zone.id, &PageRequest::default())
        .await
        .unwrap();
    assert_eq!(pending.total_count, 1);
    let request = &pending.items[0];
    assert_eq!(request.id, linked.access_request_id);
    assert_eq!(request.state, AccessRequestState::Pending);
    assert_eq!(request.requestor.account_id, "account-consumer");

    let approved = plane
        .update_access_request(&owner(), &zone.id, &request.id, AccessAction::Approve)
        .await
        .unwrap();
    assert_eq!(approved.state, AccessRequestState::Active);
    assert_eq!(approved.history.len(), 1);
    assert!(!approved.history[0].cascade);

    let linked = plane.get_linked_zone(&consumer(), &linked.id).await.unwrap();
    assert_eq!(linked.state, LinkedZoneState::Approved);
    assert_eq!(readable(&plane, &linked).await.unwrap(), 1);

    assert!(drain(&mut rx).iter().any(|e| matches!(
        e,
        ControlPlaneEvent::AccessRequestTransitioned {
            action: AccessAction::Approve,
            from: AccessRequestState::Pending,
            to: AccessRequestState::Active,
            cascade: false,
            ..
        }
    )));
}

#[tokio::test]
async fn only_the_owner_may_act() {
    let (plane, _rx) = plane();
    let (zone, linked) = linked_pair(&plane).await;

    // Right instance, wrong account.
    let impostor = zoneplane_core::RequestContext::new("instance-owner", "account-consumer");
    let err = plane
        .update_access_request(&impostor, &zone.id, &linked.access_request_id, AccessAction::Approve)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Authorization(_)));

    let err = plane
        .update_access_request(&consumer(), &zone.id, &linked.access_request_id, AccessAction::Approve)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Authorization(_)));

    let request = plane
        .get_access_request(&owner(), &zone.id, &linked.access_request_id)
        .await
        .unwrap();
    assert_eq!(request.state, AccessRequestState::Pending);
    assert!(request.history.is_empty());
}

#[tokio::test]
async fn illegal_transitions_conflict_and_change_nothing() {
    let (plane, _rx) = plane();
    let (zone, linked) = linked_pair(&plane).await;
    let id = &linked.access_request_id;

    plane
        .update_access_request(&owner(), &zone.id, id, AccessAction::Reject)
        .await
        .unwrap();
    for action in [AccessAction::Approve, AccessAction::Reject, AccessAction::Revoke] {
        let err = plane
            .update_access_request(&owner(), &zone.id, id, action)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)), "{action:?} gave {err:?}");
    }

    let request = plane.get_access_request(&owner(), &zone.id, id).await.unwrap();
    assert_eq!(request.state, AccessRequestState::Rejected);
    assert_eq!(request.history.len(), 1);
    let linked = plane.get_linked_zone(&consumer(), &linked.id).await.unwrap();
    assert_eq!(linked.state, LinkedZoneState::Rejected);
}

#[tokio::test]
async fn revoking_cuts_off_reads() {
    let (plane, _rx) = plane();
    let (zone, linked) = linked_pair(&plane).await;
    let id = &linked.access_request_id;

    plane
        .update_access_request(&owner(), &zone.id, id, AccessAction::Approve)
        .await
        .unwrap();
    let revoked = plane
        .update_access_request(&owner(), &zone.id, id, AccessAction::Revoke)
        .await
        .unwrap();
    assert_eq!(revoked.state, AccessRequestState::Revoked);
    assert_eq!(revoked.history.len(), 2);

    let linked = plane.get_linked_zone(&consumer(), &linked.id).await.unwrap();
    assert_eq!(linked.state, LinkedZoneState::Revoked);
    assert!(matches!(
        readable(&plane, &linked).await,
        Err(Error::Authorization(_))
    ));
}

#[tokio::test]
async fn deleting_a_linked_zone_revokes_its_request() {
    let (plane, mut rx) = plane();
    let (zone, linked) = linked_pair(&plane).await;
    plane
        .update_access_request(&owner(), &zone.id, &linked.access_request_id, AccessAction::Approve)
        .await
        .unwrap();
    drain(&mut rx);

    let removing = plane.delete_linked_zone(&consumer(), &linked.id).await.unwrap();
    assert_eq!(removing.state, LinkedZoneState::RemovalInProgress);

    let request = plane
        .get_access_request(&owner(), &zone.id, &linked.access_request_id)
        .await
        .unwrap();
    assert_eq!(request.state, AccessRequestState::Revoked);
    let last = request.history.last().unwrap();
    assert_eq!(last.action, AccessAction::Revoke);
    assert!(last.cascade);
    assert_eq!(last.from, AccessRequestState::Active);

    assert!(drain(&mut rx).iter().any(|e| matches!(
        e,
        ControlPlaneEvent::AccessRequestTransitioned {
            action: AccessAction::Revoke,
            cascade: true,
            ..
        }
    )));
}

#[tokio::test]
async fn linking_rules() {
    let (plane, _rx) = plane();
    let (zone, _linked) = linked_pair(&plane).await;

    let own = LinkedZoneSpec {
        owner_instance_id: zone.instance_id.clone(),
        owner_zone_id: zone.id.clone(),
        label: None,
        description: None,
    };
    let err = plane.create_linked_zone(&owner(), own.clone()).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let err = plane.create_linked_zone(&consumer(), own.clone()).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)), "one live link per zone");

    let missing = LinkedZoneSpec {
        owner_zone_id: "no-such-zone".into(),
        ..own
    };
    assert!(
        plane
            .create_linked_zone(&consumer(), missing)
            .await
            .unwrap_err()
            .is_not_found()
    );

    // Linked zones belong to the consumer only.
    let listed = plane
        .list_linked_zones(&consumer(), &PageRequest::default())
        .await
        .unwrap();
    assert_eq!(listed.total_count, 1);
    assert!(listed.first.href.contains("/linked_dnszones?"));
    let listed = plane.list_linked_zones(&owner(), &PageRequest::default()).await.unwrap();
    assert_eq!(listed.total_count, 0);
}

#[tokio::test]
async fn deleting_the_owner_zone_drops_its_requests() {
    let store = Arc::new(MemoryStore::new());
    let (plane, _rx) = plane_with(store.clone(), Arc::new(StaticFabric::new()), fast_config());
    let (zone, linked) = linked_pair(&plane).await;
    let other = plane.create_zone(&owner(), ZoneSpec::new("example.org")).await.unwrap();
    plane
        .create_linked_zone(
            &consumer(),
            LinkedZoneSpec {
                owner_instance_id: other.instance_id.clone(),
                owner_zone_id: other.id.clone(),
                label: None,
                description: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(store.snapshot().await.unwrap().access_requests.len(), 2);

    plane.delete_zone(&owner(), &zone.id).await.unwrap();

    let remaining = store.snapshot().await.unwrap().access_requests.clone();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].zone_id, other.id);
    assert!(
        plane
            .get_access_request(&owner(), &zone.id, &linked.access_request_id)
            .await
            .unwrap_err()
            .is_not_found()
    );
}
