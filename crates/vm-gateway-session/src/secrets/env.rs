//! Secrets read from environment variables.

use std::sync::Arc;

use vm_gateway_core::{SecretError, SecretStore, SecretString};

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Resolves `name` from the variable `<prefix><NAME>`.
///
/// The name is upper-cased and anything outside `[A-Z0-9_]` becomes `_`,
/// so `db-password` with prefix `GATEWAY_SECRET_` reads
/// `GATEWAY_SECRET_DB_PASSWORD`. Misses go to the fallback store, if any.
pub struct EnvSecretStore {
    prefix: String,
    lookup: Lookup,
    fallback: Option<Arc<dyn SecretStore>>,
}

impl EnvSecretStore {
    /// Read from the process environment.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::with_lookup(prefix, |key| std::env::var(key).ok())
    }

    /// Read through a custom lookup.
    #[must_use]
    pub fn with_lookup<F>(prefix: impl Into<String>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            prefix: prefix.into(),
            lookup: Box::new(lookup),
            fallback: None,
        }
    }

    /// Ask `store` when the variable is missing.
    #[must_use]
    pub fn with_fallback(mut self, store: Arc<dyn SecretStore>) -> Self {
        self.fallback = Some(store);
        self
    }

    /// Variable name a secret is read from.
    #[must_use]
    pub fn variable_for(&self, name: &str) -> String {
        let suffix: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}{suffix}", self.prefix)
    }
}

impl std::fmt::Debug for EnvSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvSecretStore")
            .field("prefix", &self.prefix)
            .field("fallback", &self.fallback.is_some())
            .finish_non_exhaustive()
    }
}

impl SecretStore for EnvSecretStore {
    fn resolve(&self, name: &str, prompt: Option<&str>) -> Result<SecretString, SecretError> {
        let variable = self.variable_for(name);
        if let Some(value) = (self.lookup)(&variable) {
            return Ok(SecretString::from(value));
        }
        match &self.fallback {
            Some(store) => {
                tracing::debug!(
                    secret = name,
                    %variable,
                    "Secret not in environment, using fallback"
                );
                store.resolve(name, prompt)
            }
            None => Err(SecretError::NotFound(name.to_string())),
        }
    }
}
