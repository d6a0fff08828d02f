//! Core traits for the control plane
//!
//! The seams to the collaborators the control plane calls into.
//!
//! - [`Store`]: consistent backing store for every entity
//! - [`NetworkFabric`]: VPC subnet lookups and address reservation

pub mod network_fabric;
pub mod store;

pub use network_fabric::{FabricFactory, NetworkFabric};
pub use store::{Store, StoreFactory};
