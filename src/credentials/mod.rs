//! Credential lookup for bank tokens and OAuth client secrets.
//!
//! Keys are short names such as `token`, `client_id` and `client_secret`.
//! Each backend decides where a key lives: [`EnvCredentialStore`] maps
//! `token` for Monzo to `MONZO_TOKEN`, [`MemoryCredentialStore`] holds values
//! read from the config file. [`ChainedCredentialStore`] tries backends in
//! order.

mod env;
mod memory;

pub use env::EnvCredentialStore;
pub use memory::MemoryCredentialStore;

use anyhow::Result;
use async_trait::async_trait;
use secrecy::SecretString;

pub const TOKEN: &str = "token";
pub const CLIENT_ID: &str = "client_id";
pub const CLIENT_SECRET: &str = "client_secret";

/// Read-only source of credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Retrieve a credential by key.
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    async fn get(&self, key: &str) -> Result<Option<SecretString>>;
}

/// Looks a key up in each store in turn; the first hit wins.
#[derive(Default)]
pub struct ChainedCredentialStore {
    stores: Vec<Box<dyn CredentialStore>>,
}

impl ChainedCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, store: impl CredentialStore + 'static) -> Self {
        self.stores.push(Box::new(store));
        self
    }
}

#[async_trait]
impl CredentialStore for ChainedCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<SecretString>> {
        for store in &self.stores {
            if let Some(value) = store.get(key).await? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}
