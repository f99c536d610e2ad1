//! Provider registry
//!
//! Maps provider names to factories. Construction is deferred until a name is
//! actually requested, so missing configuration for an unused provider never
//! fails a run.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::Provider;
use crate::secrets::{self, DotenvProvider, SecretsError, VaultProvider};

/// Builds a provider from the process configuration.
pub type ProviderFactory =
    Arc<dyn Fn() -> secrets::Result<Box<dyn Provider>> + Send + Sync + 'static>;

/// Failure to resolve a provider by name.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// No factory registered under this name.
    #[error("Unregistered provider: {name}")]
    Unregistered { name: String },

    /// The factory ran but could not build the provider.
    #[error("Failed to construct provider {name}: {source}")]
    Construction {
        name: String,
        #[source]
        source: SecretsError,
    },
}

impl RegistryError {
    /// Name of the provider that failed to resolve.
    pub fn name(&self) -> &str {
        match self {
            Self::Unregistered { name } | Self::Construction { name, .. } => name,
        }
    }
}

/// Name to factory table, built once at startup and shared with the aggregator.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: HashMap<String, ProviderFactory>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry").field("providers", &self.names()).finish()
    }
}

impl ProviderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in `vault` and `dotenv` providers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(VaultProvider::NAME, || {
            Ok(Box::new(VaultProvider::from_env()?) as Box<dyn Provider>)
        });
        registry.register(DotenvProvider::NAME, || {
            Ok(Box::new(DotenvProvider::from_env()?) as Box<dyn Provider>)
        });
        registry
    }

    /// Bind `name` to `factory`, replacing any previous binding.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> secrets::Result<Box<dyn Provider>> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(provider = %name, "Registering provider");
        self.factories.insert(name, Arc::new(factory));
    }

    /// Whether a factory is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Construct the provider registered under `name`.
    pub fn get(&self, name: &str) -> Result<Box<dyn Provider>, RegistryError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| RegistryError::Unregistered { name: name.to_string() })?;

        factory().map_err(|source| RegistryError::Construction { name: name.to_string(), source })
    }
}
