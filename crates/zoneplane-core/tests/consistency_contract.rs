//! Contract: consistency under concurrency and store outages
//!
//! Racing writers are serialized by optimistic commits; transient store
//! failures are retried within the budget and surface as 503 beyond it.

mod common;

use std::sync::Arc;

use common::*;
use zoneplane_core::codec::{RdataFields, RecordType};
use zoneplane_core::model::{RecordFilter, RecordSpec, ZoneSpec};
use zoneplane_core::{Error, FileStore, PageRequest, StaticFabric};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_creates_of_one_name_admit_exactly_one() {
    let (plane, _rx) = plane();
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let plane = plane.clone();
        tasks.push(tokio::spawn(async move {
            plane.create_zone(&owner(), ZoneSpec::new("race.example.com")).await
        }));
    }

    let mut created = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => created += 1,
            Err(Error::Conflict(_)) => {}
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }
    assert_eq!(created, 1);
    let zones = plane.list_zones(&owner(), &PageRequest::default()).await.unwrap();
    assert_eq!(zones.total_count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_record_writes_are_all_kept() {
    let (plane, _rx) = plane();
    let zone = plane.create_zone(&owner(), ZoneSpec::new("example.com")).await.unwrap();
    let mut tasks = Vec::new();
    for i in 0..8 {
        let plane = plane.clone();
        let zone_id = zone.id.clone();
        tasks.push(tokio::spawn(async move {
            plane
                .create_record(
                    &owner(),
                    &zone_id,
                    RecordSpec::new(format!("host{i}"), RecordType::A, RdataFields::ip(format!("10.0.0.{i}"))),
                )
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    let records = plane
        .list_records(&owner(), &zone.id, &RecordFilter::default(), &PageRequest::default())
        .await
        .unwrap();
    assert_eq!(records.total_count, 8);
}

#[tokio::test]
async fn transient_failures_within_budget_succeed() {
    let store = Arc::new(FlakyStore::new(3));
    let (plane, _rx) = plane_with(store.clone(), Arc::new(StaticFabric::new()), fast_config());
    let zone = tokio_test::assert_ok!(plane.create_zone(&owner(), ZoneSpec::new("example.com")).await);
    // Three failed snapshots, then a snapshot and a commit.
    assert_eq!(store.calls(), 5);
    tokio_test::assert_ok!(plane.get_zone(&owner(), &zone.id).await);
}

#[tokio::test]
async fn exhausted_budget_is_service_unavailable() {
    let store = Arc::new(FlakyStore::new(100));
    let (plane, _rx) = plane_with(store.clone(), Arc::new(StaticFabric::new()), fast_config());
    let err = plane
        .create_zone(&owner(), ZoneSpec::new("example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ServiceUnavailable(_)), "got {err:?}");
    assert_eq!(err.status_code(), 503);
    assert_eq!(store.calls(), 4, "one try plus max_retries");

    let err = plane.list_zones(&owner(), &PageRequest::default()).await.unwrap_err();
    assert!(matches!(err, Error::ServiceUnavailable(_)));
}

#[tokio::test]
async fn file_store_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("zoneplane.json");

    let zone_id = {
        let store = Arc::new(FileStore::open(&path).await.unwrap());
        let (plane, _rx) = plane_with(store, Arc::new(StaticFabric::new()), fast_config());
        let zone = plane.create_zone(&owner(), ZoneSpec::new("example.com")).await.unwrap();
        plane
            .create_record(
                &owner(),
                &zone.id,
                RecordSpec::new("www", RecordType::A, RdataFields::ip("10.0.0.1")),
            )
            .await
            .unwrap();
        zone.id
    };

    let store = Arc::new(FileStore::open(&path).await.unwrap());
    let (plane, _rx) = plane_with(store, Arc::new(StaticFabric::new()), fast_config());
    let records = plane
        .list_records(&owner(), &zone_id, &RecordFilter::default(), &PageRequest::default())
        .await
        .unwrap();
    assert_eq!(records.total_count, 1);
    assert_eq!(records.items[0].name, "www.example.com");
}
