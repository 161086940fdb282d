use std::future::Future;

use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use tokio::io::BufReader;

use crate::config::Config;
use crate::credentials::{
    ChainedCredentialStore, CredentialStore, EnvCredentialStore, CLIENT_ID, CLIENT_SECRET, TOKEN,
};
use crate::export::{monzo, starling, ExportType};
use crate::oauth;

/// OAuth endpoints for a bank; client credentials are filled in later.
pub fn oauth_endpoints(bank: &ExportType) -> Option<oauth::Config> {
    let (auth_url, token_url, wait_for_approval_in_app) = match bank.as_str() {
        monzo::EXPORT_TYPE => (
            "https://auth.monzo.com",
            "https://api.monzo.com/oauth2/token",
            true,
        ),
        starling::EXPORT_TYPE => (
            "https://oauth.starlingbank.com/oauth/authorize",
            "https://api.starlingbank.com/oauth2/token",
            false,
        ),
        _ => return None,
    };

    Some(oauth::Config {
        client_id: String::new(),
        client_secret: SecretString::from(String::new()),
        auth_url: auth_url.to_string(),
        token_url: token_url.to_string(),
        wait_for_approval_in_app,
        scopes: Vec::new(),
    })
}

/// `<BANK>_*` environment variables first, then the config file.
pub fn credential_store(bank: &ExportType, config: &Config) -> ChainedCredentialStore {
    ChainedCredentialStore::new()
        .with(EnvCredentialStore::new(bank.as_str()))
        .with(config.credential_store(bank.as_str()))
}

/// A token from the `--token` flag or the credential store, if either has one.
pub async fn stored_token(
    flag: Option<&str>,
    store: &dyn CredentialStore,
) -> Result<Option<SecretString>> {
    if let Some(token) = flag.map(str::trim).filter(|token| !token.is_empty()) {
        tracing::debug!("using auth token from cli flag");
        return Ok(Some(SecretString::from(token.to_string())));
    }

    let token = store.get(TOKEN).await.context("Failed to read stored token")?;
    if token.is_some() {
        tracing::debug!("using auth token from credential store");
    }
    Ok(token)
}

/// The bank's OAuth endpoints with client credentials from `store`.
pub async fn oauth_config(bank: &ExportType, store: &dyn CredentialStore) -> Result<oauth::Config> {
    let mut config = oauth_endpoints(bank).with_context(|| {
        let supported: Vec<String> = crate::export::all()
            .iter()
            .map(ToString::to_string)
            .collect();
        format!(
            "unsupported bank type: {bank} (supported types: {})",
            supported.join(", ")
        )
    })?;

    if let Some(client_id) = store.get(CLIENT_ID).await? {
        config.client_id = client_id.expose_secret().to_string();
    }
    if let Some(client_secret) = store.get(CLIENT_SECRET).await? {
        config.client_secret = client_secret;
    }
    Ok(config)
}

/// Resolve an auth token: flag, then stored credentials, then the browser flow.
///
/// `shutdown` cancels the browser flow while it waits on the user.
pub async fn auth_token<S>(
    bank: &ExportType,
    flag: Option<&str>,
    store: &dyn CredentialStore,
    shutdown: S,
) -> Result<SecretString>
where
    S: Future<Output = ()>,
{
    if let Some(token) = stored_token(flag, store).await? {
        return Ok(token);
    }

    tracing::debug!(bank = %bank, "no auth token found, starting OAuth flow");
    let config = oauth_config(bank, store).await?;
    oauth::exchange(&config, BufReader::new(tokio::io::stdin()), shutdown).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;

    #[tokio::test]
    async fn flag_wins_over_store() -> Result<()> {
        let store = MemoryCredentialStore::new().with_value(TOKEN, "stored");
        let token = stored_token(Some(" flag-token "), &store).await?.expect("token");
        assert_eq!(token.expose_secret(), "flag-token");

        let token = stored_token(Some("  "), &store).await?.expect("token");
        assert_eq!(token.expose_secret(), "stored");

        assert!(stored_token(None, &MemoryCredentialStore::new()).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn oauth_config_uses_store_credentials() -> Result<()> {
        let store = MemoryCredentialStore::new()
            .with_value(CLIENT_ID, "client")
            .with_value(CLIENT_SECRET, "secret");

        let config = oauth_config(&ExportType::from("Monzo"), &store).await?;
        assert_eq!(config.client_id, "client");
        assert_eq!(config.client_secret.expose_secret(), "secret");
        assert_eq!(config.token_url, "https://api.monzo.com/oauth2/token");
        assert!(config.wait_for_approval_in_app);
        assert!(config.validate().is_ok());

        let config = oauth_config(&ExportType::from("Starling"), &MemoryCredentialStore::new()).await?;
        assert!(!config.wait_for_approval_in_app);
        assert_eq!(
            config.validate().unwrap_err().to_string(),
            "client id is required"
        );
        Ok(())
    }

    #[tokio::test]
    async fn stored_token_skips_oauth() -> Result<()> {
        let store = MemoryCredentialStore::new().with_value(TOKEN, "stored");
        let token = auth_token(&ExportType::from("Monzo"), None, &store, std::future::ready(())).await?;
        assert_eq!(token.expose_secret(), "stored");
        Ok(())
    }

    #[tokio::test]
    async fn oauth_config_rejects_unknown_bank() {
        let err = oauth_config(&ExportType::from("Barclays"), &MemoryCredentialStore::new())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "unsupported bank type: Barclays (supported types: Monzo, Starling)"
        );
    }
}
