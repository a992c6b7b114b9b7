//! DNS provider plugins
//!
//! Provider crates register a factory under their type name; the daemon
//! turns its [`ProviderConfig`] into the provider shared by every host.
//!
//! ```rust,ignore
//! use peerscanner_core::ProviderRegistry;
//!
//! let providers = ProviderRegistry::with_builtin();
//! peerscanner_provider_cloudflare::register(&providers);
//!
//! let provider = providers.create_provider(&config.provider, &config.domain)?;
//! let registry = HostRegistry::new(provider, prober, config.lifecycle);
//! ```

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::traits::{DnsProvider, DnsProviderFactory};
use crate::zone::MemoryZoneFactory;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

/// Factories by provider type name
#[derive(Default)]
pub struct ProviderRegistry {
    factories: RwLock<BTreeMap<String, Box<dyn DnsProviderFactory>>>,
}

impl ProviderRegistry {
    /// Create a registry with no providers
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the in-process `memory` provider registered
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register_provider("memory", Box::new(MemoryZoneFactory));
        registry
    }

    /// Register `factory` under the type name `name`
    ///
    /// A later registration under the same name replaces the earlier one.
    pub fn register_provider(&self, name: impl Into<String>, factory: Box<dyn DnsProviderFactory>) {
        let name = name.into();
        let mut factories = self.factories.write().unwrap_or_else(PoisonError::into_inner);
        if factories.insert(name.clone(), factory).is_some() {
            warn!("Provider {} registered twice, keeping the latest", name);
        } else {
            debug!("Registered provider {}", name);
        }
    }

    /// Build the provider for the managed `domain`
    ///
    /// # Returns
    ///
    /// - `Ok(Arc<dyn DnsProvider>)`: Ready to be shared by the host registry
    /// - `Err(Error::Config)`: If no factory is registered for the config's type
    /// - `Err(_)`: Whatever the factory reports
    pub fn create_provider(
        &self,
        config: &ProviderConfig,
        domain: &str,
    ) -> Result<Arc<dyn DnsProvider>> {
        let type_name = config.type_name();
        let factories = self.factories.read().unwrap_or_else(PoisonError::into_inner);
        let factory = factories.get(type_name).ok_or_else(|| {
            Error::config(format!(
                "Unknown provider type: {} (registered: {})",
                type_name,
                factories.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })?;

        factory.create(config, domain).map(Arc::from)
    }

    /// Registered type names, sorted
    pub fn list_providers(&self) -> Vec<String> {
        let factories = self.factories.read().unwrap_or_else(PoisonError::into_inner);
        factories.keys().cloned().collect()
    }

    pub fn has_provider(&self, name: &str) -> bool {
        let factories = self.factories.read().unwrap_or_else(PoisonError::into_inner);
        factories.contains_key(name)
    }
}
