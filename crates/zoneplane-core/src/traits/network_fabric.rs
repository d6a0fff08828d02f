// # Network Fabric Trait
//
// The VPC infrastructure the control plane consults but does not own:
// resolving a subnet CRN to the VPC it belongs to (for pool health-check
// VSIs) and reserving a DNS server address inside a subnet (for custom
// resolver locations).
//
// Implementations are collaborators, not business logic: they answer single
// questions, perform no retries and leave caching to `CachingFabric`.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::model::VsiDescriptor;

#[async_trait]
pub trait NetworkFabric: Send + Sync {
    /// Resolve a subnet CRN into its VSI descriptor
    ///
    /// # Errors
    ///
    /// - `Error::Validation`: the subnet does not exist
    /// - `Error::Fabric`: transient failure, may be retried
    async fn resolve_subnet(&self, subnet_crn: &str) -> Result<VsiDescriptor, crate::Error>;

    /// Reserve the DNS server address for a resolver location
    async fn provision_dns_server_ip(&self, subnet_crn: &str) -> Result<IpAddr, crate::Error>;

    /// Short name used in logs
    fn fabric_name(&self) -> &'static str;
}

/// Helper trait for constructing fabrics from configuration
pub trait FabricFactory: Send + Sync {
    fn create(&self, config: &serde_json::Value) -> Result<Arc<dyn NetworkFabric>, crate::Error>;
}
