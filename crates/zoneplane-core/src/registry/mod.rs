//! Backend registry
//!
//! Stores and network fabrics are registered by name at startup and picked
//! from configuration, so the daemon never hardcodes which backends exist.
//!
//! ## Registration
//!
//! Collaborator crates register their factories during initialization:
//!
//! ```rust,ignore
//! // In zoneplane-fabric-http
//! pub fn register(registry: &BackendRegistry) {
//!     registry.register_fabric("http", Box::new(HttpFabricFactory));
//! }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::config::{FabricConfig, StoreConfig};
use crate::error::{Error, Result};
use crate::fabric::StaticFabricFactory;
use crate::state::{FileStoreFactory, MemoryStoreFactory};
use crate::traits::{FabricFactory, NetworkFabric, Store, StoreFactory};

/// Registry of store and fabric factories
///
/// Uses interior mutability with `RwLock`, allowing concurrent lookups and
/// exclusive registration.
#[derive(Default)]
pub struct BackendRegistry {
    stores: RwLock<HashMap<String, Arc<dyn StoreFactory>>>,
    fabrics: RwLock<HashMap<String, Arc<dyn FabricFactory>>>,
}

fn poisoned<T>(_: T) -> Error {
    Error::Other("backend registry lock poisoned".to_string())
}

impl BackendRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the backends built into this crate
    ///
    /// - stores: `memory`, `file`
    /// - fabrics: `static`
    pub fn with_builtin() -> Result<Self> {
        let registry = Self::new();
        registry.register_store("memory", Box::new(MemoryStoreFactory))?;
        registry.register_store("file", Box::new(FileStoreFactory))?;
        registry.register_fabric("static", Box::new(StaticFabricFactory))?;
        Ok(registry)
    }

    /// Register a store factory under `name`
    pub fn register_store(
        &self,
        name: impl Into<String>,
        factory: Box<dyn StoreFactory>,
    ) -> Result<()> {
        let mut stores = self.stores.write().map_err(poisoned)?;
        stores.insert(name.into(), Arc::from(factory));
        Ok(())
    }

    /// Register a fabric factory under `name`
    pub fn register_fabric(
        &self,
        name: impl Into<String>,
        factory: Box<dyn FabricFactory>,
    ) -> Result<()> {
        let mut fabrics = self.fabrics.write().map_err(poisoned)?;
        fabrics.insert(name.into(), Arc::from(factory));
        Ok(())
    }

    /// Create a store from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Arc<dyn Store>)`: created store
    /// - `Err(Error::Config)`: store type not registered
    pub async fn create_store(&self, config: &StoreConfig) -> Result<Arc<dyn Store>> {
        let store_type = config.type_name();
        let factory = {
            let stores = self.stores.read().map_err(poisoned)?;
            stores
                .get(store_type)
                .cloned()
                .ok_or_else(|| Error::config(format!("Unknown store type: {}", store_type)))?
        };

        let config_json = match config {
            StoreConfig::Custom { config, .. } => config.clone(),
            other => serde_json::to_value(other)?,
        };

        // Lock released above; factories may await.
        factory.create(&config_json).await
    }

    /// Create a network fabric from configuration
    pub fn create_fabric(&self, config: &FabricConfig) -> Result<Arc<dyn NetworkFabric>> {
        let fabric_type = config.type_name();
        let fabrics = self.fabrics.read().map_err(poisoned)?;
        let factory = fabrics
            .get(fabric_type)
            .ok_or_else(|| Error::config(format!("Unknown fabric type: {}", fabric_type)))?;

        let config_json = match config {
            FabricConfig::Custom { config, .. } => config.clone(),
            other => serde_json::to_value(other)?,
        };
        factory.create(&config_json)
    }

    pub fn list_stores(&self) -> Vec<String> {
        self.stores
            .read()
            .map(|stores| stores.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn list_fabrics(&self) -> Vec<String> {
        self.fabrics
            .read()
            .map(|fabrics| fabrics.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_store(&self, name: &str) -> bool {
        self.stores
            .read()
            .map(|stores| stores.contains_key(name))
            .unwrap_or(false)
    }

    pub fn has_fabric(&self, name: &str) -> bool {
        self.fabrics
            .read()
            .map(|fabrics| fabrics.contains_key(name))
            .unwrap_or(false)
    }
}
