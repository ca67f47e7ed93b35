//! In-memory secret store.

use std::{collections::HashMap, sync::RwLock};

use vm_gateway_core::{ExposeSecret, SecretError, SecretStore, SecretString};

/// In-memory secret store.
///
/// Useful for tests and for hosts that load credentials themselves.
/// Values are dropped (and zeroized) with the store.
#[derive(Default)]
pub struct MemorySecretStore {
    secrets: RwLock<HashMap<String, SecretString>>,
}

impl MemorySecretStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a secret.
    ///
    /// # Errors
    /// Returns error if the store lock is poisoned.
    pub fn insert(
        &self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), SecretError> {
        self.secrets
            .write()
            .map_err(|e| SecretError::Unavailable(e.to_string()))?
            .insert(name.into(), SecretString::from(value.into()));
        Ok(())
    }

    /// Remove a secret. Returns whether it existed.
    ///
    /// # Errors
    /// Returns error if the store lock is poisoned.
    pub fn remove(&self, name: &str) -> Result<bool, SecretError> {
        Ok(self
            .secrets
            .write()
            .map_err(|e| SecretError::Unavailable(e.to_string()))?
            .remove(name)
            .is_some())
    }

    /// Names of stored secrets, sorted.
    ///
    /// # Errors
    /// Returns error if the store lock is poisoned.
    pub fn names(&self) -> Result<Vec<String>, SecretError> {
        let mut names: Vec<String> = self
            .secrets
            .read()
            .map_err(|e| SecretError::Unavailable(e.to_string()))?
            .keys()
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }
}

impl std::fmt::Debug for MemorySecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySecretStore")
            .field("names", &self.names().unwrap_or_default())
            .finish()
    }
}

impl SecretStore for MemorySecretStore {
    fn resolve(&self, name: &str, _prompt: Option<&str>) -> Result<SecretString, SecretError> {
        self.secrets
            .read()
            .map_err(|e| SecretError::Unavailable(e.to_string()))?
            .get(name)
            .map(|secret| SecretString::from(secret.expose_secret().to_owned()))
            .ok_or_else(|| SecretError::NotFound(name.to_string()))
    }
}
