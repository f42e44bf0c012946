//! Registry of the protocol adapters known to the daemon.
//!
//! Adapters are registered on a [`RegistryBuilder`] while the daemon starts up. Freezing the
//! builder yields an immutable [`AdapterRegistry`] which can be shared by any number of threads.
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::adapter::ProtocolAdapter;
use crate::error::{IngestError, RegistryError};

static REGISTRY: OnceLock<AdapterRegistry> = OnceLock::new();

#[derive(Default)]
/// Startup phase of the registry, accepts registrations.
pub struct RegistryBuilder
{
    adapters: HashMap<String, Arc<dyn ProtocolAdapter>>,
}

impl RegistryBuilder {
    pub fn new() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Registers `adapter` under its station type, replacing an adapter with the same tag.
    pub fn register<A: ProtocolAdapter + 'static>(mut self, adapter: A) -> RegistryBuilder {
        let station_type = adapter.station_type().to_string();
        if self.adapters.insert(station_type.clone(), Arc::new(adapter)).is_some() {
            log::warn!(target: "wxlogd", "Replaced adapter for station type \'{}\'", station_type);
        }
        self
    }

    /// Ends the startup phase.
    pub fn freeze(self) -> AdapterRegistry {
        AdapterRegistry { adapters: self.adapters }
    }
}

/// Read only mapping from station type to adapter.
pub struct AdapterRegistry
{
    adapters: HashMap<String, Arc<dyn ProtocolAdapter>>,
}

impl AdapterRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn lookup(&self, station_type: &str) -> Result<Arc<dyn ProtocolAdapter>, IngestError> {
        self.adapters
            .get(station_type)
            .cloned()
            .ok_or_else(|| IngestError::UnknownStationType(station_type.to_string()))
    }

    /// All registered adapters in no particular order.
    pub fn list_all(&self) -> Vec<Arc<dyn ProtocolAdapter>> {
        self.adapters.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

/// Makes `registry` the process wide registry. Can only succeed once.
pub fn install(registry: AdapterRegistry) -> Result<&'static AdapterRegistry, RegistryError> {
    REGISTRY.set(registry).map_err(|_| RegistryError::AlreadyInstalled)?;
    global()
}

/// The process wide registry.
pub fn global() -> Result<&'static AdapterRegistry, RegistryError> {
    REGISTRY.get().ok_or(RegistryError::NotInstalled)
}
