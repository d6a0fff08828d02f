//! Test doubles and shared setup for the contract tests
//!
//! Each contract file uses a subset of these helpers.
#![allow(dead_code)]

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;
use zoneplane_core::dataset::Dataset;
use zoneplane_core::model::VsiDescriptor;
use zoneplane_core::traits::{NetworkFabric, Store};
use zoneplane_core::{
    ControlPlane, ControlPlaneConfig, ControlPlaneEvent, Error, MemoryStore, RequestContext,
    Result, StaticFabric,
};

pub const VPC_A: &str = "crn:v1:bluemix:public:is:us-south:a/abc123::vpc:r006-aaaa";
pub const VPC_B: &str = "crn:v1:bluemix:public:is:us-south:a/abc123::vpc:r006-bbbb";
pub const SUBNET_1: &str = "crn:v1:bluemix:public:is:us-south-1:a/abc123::subnet:0717-1111";
pub const SUBNET_2: &str = "crn:v1:bluemix:public:is:us-south-2:a/abc123::subnet:0727-2222";
pub const SUBNET_3: &str = "crn:v1:bluemix:public:is:us-south-3:a/abc123::subnet:0737-3333";

/// Owner-side context
pub fn owner() -> RequestContext {
    RequestContext::new("instance-owner", "account-owner")
}

/// Consumer-side context in another instance and account
pub fn consumer() -> RequestContext {
    RequestContext::new("instance-consumer", "account-consumer")
}

/// Config with fast retries so failure paths finish quickly
pub fn fast_config() -> ControlPlaneConfig {
    let mut config = ControlPlaneConfig::default();
    config.retry.retry_delay_ms = 1;
    config
}

/// Control plane over a fresh memory store and static fabric
pub fn plane() -> (Arc<ControlPlane>, mpsc::Receiver<ControlPlaneEvent>) {
    plane_with(
        Arc::new(MemoryStore::new()),
        Arc::new(StaticFabric::new()),
        fast_config(),
    )
}

pub fn plane_with(
    store: Arc<dyn Store>,
    fabric: Arc<dyn NetworkFabric>,
    config: ControlPlaneConfig,
) -> (Arc<ControlPlane>, mpsc::Receiver<ControlPlaneEvent>) {
    let (plane, rx) = ControlPlane::new(store, fabric, config).unwrap();
    (Arc::new(plane), rx)
}

/// Drain every event currently queued
pub fn drain(rx: &mut mpsc::Receiver<ControlPlaneEvent>) -> Vec<ControlPlaneEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Fabric that counts calls and delegates to a [`StaticFabric`]
pub struct CountingFabric {
    inner: StaticFabric,
    resolve_calls: Arc<AtomicUsize>,
    provision_calls: Arc<AtomicUsize>,
}

impl CountingFabric {
    pub fn new() -> Self {
        Self {
            inner: StaticFabric::new(),
            resolve_calls: Arc::new(AtomicUsize::new(0)),
            provision_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn provision_calls(&self) -> usize {
        self.provision_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl NetworkFabric for CountingFabric {
    async fn resolve_subnet(&self, subnet_crn: &str) -> Result<VsiDescriptor> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.resolve_subnet(subnet_crn).await
    }

    async fn provision_dns_server_ip(&self, subnet_crn: &str) -> Result<IpAddr> {
        self.provision_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.provision_dns_server_ip(subnet_crn).await
    }

    fn fabric_name(&self) -> &'static str {
        "counting"
    }
}

/// Store whose first `failures` calls fail with `StoreUnavailable`
///
/// Snapshots and commits share the failure budget.
pub struct FlakyStore {
    inner: MemoryStore,
    failures_left: AtomicUsize,
    calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new(failures: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            failures_left: AtomicUsize::new(failures),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn trip(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let tripped = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            Err(Error::store_unavailable("store is warming up"))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl Store for FlakyStore {
    async fn snapshot(&self) -> Result<Arc<Dataset>> {
        self.trip()?;
        self.inner.snapshot().await
    }

    async fn commit(&self, expected_revision: u64, next: Dataset) -> Result<u64> {
        self.trip()?;
        self.inner.commit(expected_revision, next).await
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "flaky"
    }
}
