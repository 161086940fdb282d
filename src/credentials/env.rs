use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use secrecy::SecretString;

use super::CredentialStore;

type Lookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Store backed by `<PREFIX>_<KEY>` environment variables.
#[derive(Clone)]
pub struct EnvCredentialStore {
    prefix: String,
    lookup: Lookup,
}

impl fmt::Debug for EnvCredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvCredentialStore")
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl EnvCredentialStore {
    /// Store for a bank, e.g. `monzo` reads `MONZO_TOKEN`.
    pub fn new(bank: &str) -> Self {
        Self::with_lookup(bank, |name| std::env::var(name).ok())
    }

    /// Store with a custom variable source (for testing).
    pub fn with_lookup(
        bank: &str,
        lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            prefix: bank.trim().to_uppercase(),
            lookup: Arc::new(lookup),
        }
    }

    /// Environment variable consulted for `key`.
    pub fn var_name(&self, key: &str) -> String {
        format!("{}_{}", self.prefix, key.to_uppercase())
    }
}

#[async_trait]
impl CredentialStore for EnvCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<SecretString>> {
        Ok((self.lookup)(&self.var_name(key))
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(SecretString::from))
    }
}
