// # Network Fabric Implementations
//
// - `StaticFabric`: in-process fabric with deterministic answers, for
//   development and tests
// - `CachingFabric`: decorator that makes subnet resolution idempotent by
//   caching each CRN's descriptor

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::Error;
use crate::model::{Crn, VsiDescriptor};
use crate::traits::network_fabric::{FabricFactory, NetworkFabric};

/// First host address handed out by [`StaticFabric`] (10.240.0.4)
const STATIC_POOL_START: u32 = u32::from_be_bytes([10, 240, 0, 4]);

/// Deterministic fabric
///
/// Subnets registered with [`StaticFabric::register_subnet`] resolve to the
/// registered VPC; any other well-formed subnet CRN resolves to a VPC CRN
/// derived from it. DNS server addresses are allocated sequentially from
/// `10.240.0.4`.
#[derive(Debug)]
pub struct StaticFabric {
    subnets: RwLock<HashMap<String, VsiDescriptor>>,
    next_address: AtomicU32,
}

impl StaticFabric {
    pub fn new() -> Self {
        Self {
            subnets: RwLock::new(HashMap::new()),
            next_address: AtomicU32::new(STATIC_POOL_START),
        }
    }

    /// Pin a subnet to a VPC
    pub fn register_subnet(&self, subnet_crn: &str, vpc_crn: &str) -> Result<(), Error> {
        let mut subnets = self
            .subnets
            .write()
            .map_err(|e| Error::fabric(format!("Failed to acquire subnet table lock: {}", e)))?;
        subnets.insert(
            subnet_crn.to_string(),
            VsiDescriptor {
                subnet_crn: subnet_crn.to_string(),
                vpc_crn: vpc_crn.to_string(),
            },
        );
        Ok(())
    }
}

impl Default for StaticFabric {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkFabric for StaticFabric {
    async fn resolve_subnet(&self, subnet_crn: &str) -> Result<VsiDescriptor, Error> {
        {
            let subnets = self
                .subnets
                .read()
                .map_err(|e| Error::fabric(format!("Failed to acquire subnet table lock: {}", e)))?;
            if let Some(descriptor) = subnets.get(subnet_crn) {
                return Ok(descriptor.clone());
            }
        }
        let subnet = Crn::subnet(subnet_crn)?;
        let vpc = subnet.with_resource("vpc", &format!("vpc-{}", subnet.resource()));
        Ok(VsiDescriptor {
            subnet_crn: subnet_crn.to_string(),
            vpc_crn: vpc.to_string(),
        })
    }

    async fn provision_dns_server_ip(&self, subnet_crn: &str) -> Result<IpAddr, Error> {
        Crn::subnet(subnet_crn)?;
        let raw = self.next_address.fetch_add(1, Ordering::Relaxed);
        let ip = IpAddr::V4(Ipv4Addr::from(raw));
        tracing::debug!(subnet_crn, %ip, "static fabric reserved DNS server address");
        Ok(ip)
    }

    fn fabric_name(&self) -> &'static str {
        "static"
    }
}

/// Factory for creating static fabrics
///
/// Accepts an optional `{"subnets": {"<subnet crn>": "<vpc crn>"}}` table.
pub struct StaticFabricFactory;

impl FabricFactory for StaticFabricFactory {
    fn create(&self, config: &serde_json::Value) -> Result<Arc<dyn NetworkFabric>, Error> {
        let fabric = StaticFabric::new();
        if let Some(subnets) = config.get("subnets").and_then(|v| v.as_object()) {
            for (subnet, vpc) in subnets {
                let vpc = vpc
                    .as_str()
                    .ok_or_else(|| Error::config(format!("VPC for subnet {subnet} must be a string")))?;
                fabric.register_subnet(subnet, vpc)?;
            }
        }
        Ok(Arc::new(fabric))
    }
}

/// Caches successful subnet resolutions per CRN
///
/// Address provisioning is passed through untouched: every location gets
/// its own reservation.
pub struct CachingFabric {
    inner: Arc<dyn NetworkFabric>,
    resolved: Mutex<HashMap<String, VsiDescriptor>>,
}

impl CachingFabric {
    pub fn new(inner: Arc<dyn NetworkFabric>) -> Self {
        Self {
            inner,
            resolved: Mutex::new(HashMap::new()),
        }
    }

    /// Number of cached subnets
    pub async fn cached(&self) -> usize {
        self.resolved.lock().await.len()
    }
}

#[async_trait]
impl NetworkFabric for CachingFabric {
    async fn resolve_subnet(&self, subnet_crn: &str) -> Result<VsiDescriptor, Error> {
        if let Some(hit) = self.resolved.lock().await.get(subnet_crn) {
            tracing::trace!(subnet_crn, "subnet resolution served from cache");
            return Ok(hit.clone());
        }
        let descriptor = self.inner.resolve_subnet(subnet_crn).await?;
        self.resolved
            .lock()
            .await
            .insert(subnet_crn.to_string(), descriptor.clone());
        Ok(descriptor)
    }

    async fn provision_dns_server_ip(&self, subnet_crn: &str) -> Result<IpAddr, Error> {
        self.inner.provision_dns_server_ip(subnet_crn).await
    }

    fn fabric_name(&self) -> &'static str {
        self.inner.fabric_name()
    }
}
