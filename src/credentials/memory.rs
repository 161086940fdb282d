use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use secrecy::SecretString;

use super::CredentialStore;

/// In-process store, filled from the config file's `[banks.<name>]` table.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    values: HashMap<String, SecretString>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, key: &str, value: impl Into<String>) -> Self {
        self.values
            .insert(key.to_string(), SecretString::from(value.into()));
        self
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<SecretString>> {
        Ok(self.values.get(key).cloned())
    }
}
