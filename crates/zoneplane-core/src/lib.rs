// # zoneplane-core
//
// Core library for the zoneplane DNS control plane.
//
// ## Architecture Overview
//
// - **Record codec**: typed rdata, name rules and zone-file import/export
// - **Pagination**: offset/limit windows with first/last/next links
// - **ControlPlane**: zone store, load balancing, custom resolvers and
//   cross-account linking, all as operations over one consistent store
// - **Store**: trait for the backing store (optimistic concurrency)
// - **NetworkFabric**: trait for VPC subnet lookups and address reservation
// - **Reconciler**: completes asynchronous removals in the background
// - **ControlPlaneApi**: JSON operation dispatcher with status mapping
// - **BackendRegistry**: named store and fabric factories
//
// ## Design Principles
//
// 1. **Request-scoped context**: identity travels in `RequestContext`,
//    never in globals
// 2. **Pure mutations**: every write is a function of a dataset snapshot,
//    committed against the revision it read
// 3. **Plugin-based backends**: stores and fabrics are registered by name
// 4. **Library-first**: the daemon is a thin shell around this crate

pub mod api;
pub mod codec;
pub mod config;
pub mod context;
pub mod dataset;
pub mod error;
pub mod events;
pub mod fabric;
pub mod model;
pub mod pagination;
pub mod poll;
pub mod reconciler;
pub mod registry;
pub mod service;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use api::{ApiRequest, ApiResponse, ControlPlaneApi, Operation};
pub use config::{ControlPlaneConfig, FabricConfig, StoreConfig};
pub use context::RequestContext;
pub use dataset::Dataset;
pub use error::{Error, ErrorKind, Result};
pub use events::{ControlPlaneEvent, EventSink, event_stream};
pub use fabric::{CachingFabric, StaticFabric};
pub use pagination::{Page, PageRequest};
pub use poll::{PollPolicy, wait_until_removed};
pub use reconciler::{ReconcileReport, Reconciler};
pub use registry::BackendRegistry;
pub use service::ControlPlane;
pub use state::{FileStore, MemoryStore};
pub use traits::{NetworkFabric, Store};
