use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::Deserialize;

use crate::credentials::{MemoryCredentialStore, CLIENT_ID, CLIENT_SECRET};
use crate::duration::deserialize_duration;
use crate::export::DEFAULT_TIMEOUT;
use crate::format::moneydance;

pub const CONFIG_FILE_NAME: &str = "fingrab.toml";

fn default_format() -> String {
    moneydance::FORMAT_TYPE.to_string()
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// Per-bank settings under `[banks.<name>]`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BankConfig {
    /// OAuth client id registered with the bank.
    pub client_id: Option<String>,

    /// OAuth client secret. Prefer `<BANK>_CLIENT_SECRET` over storing it here.
    pub client_secret: Option<String>,

    /// Account exported when `--account` is not given.
    pub account_id: Option<String>,
}

/// Application configuration.
///
/// ```toml
/// format = "ynab"
/// timeout = "10s"
/// timezone = "Europe/London"
///
/// [banks.monzo]
/// client_id = "oauth2client_0000"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Output format used when `--format` is not given.
    #[serde(default = "default_format")]
    pub format: String,

    /// Per-request HTTP timeout.
    #[serde(default = "default_timeout", deserialize_with = "deserialize_duration")]
    pub timeout: Duration,

    /// IANA timezone output dates are rendered in.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    pub banks: BTreeMap<String, BankConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            format: default_format(),
            timeout: default_timeout(),
            timezone: default_timezone(),
            banks: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.timezone()?;
        Ok(config)
    }

    /// Load config from a file, or return default config if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|err| anyhow::anyhow!("Invalid timezone {:?}: {err}", self.timezone))
    }

    /// Settings for a bank, matching the table name case-insensitively.
    pub fn bank(&self, name: &str) -> Option<&BankConfig> {
        self.banks
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, bank)| bank)
    }

    /// OAuth client credentials from the config file, as a credential store.
    pub fn credential_store(&self, bank: &str) -> MemoryCredentialStore {
        let mut store = MemoryCredentialStore::new();
        if let Some(bank) = self.bank(bank) {
            if let Some(client_id) = &bank.client_id {
                store = store.with_value(CLIENT_ID, client_id.clone());
            }
            if let Some(client_secret) = &bank.client_secret {
                store = store.with_value(CLIENT_SECRET, client_secret.clone());
            }
        }
        store
    }
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./fingrab.toml` if it exists in current directory
/// 2. `<config dir>/fingrab/fingrab.toml` (e.g. `~/.config/fingrab/fingrab.toml`)
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from(CONFIG_FILE_NAME);
    if local_config.exists() {
        return local_config;
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("fingrab").join(CONFIG_FILE_NAME);
    }

    local_config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialStore;
    use secrecy::ExposeSecret;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.format, "moneydance");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.timezone().unwrap(), chrono_tz::UTC);
        assert!(config.banks.is_empty());
    }

    #[test]
    fn test_load_full_config() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(
            file,
            r#"
format = "ynab"
timeout = "1m30s"
timezone = "Europe/London"

[banks.Monzo]
client_id = "oauth2client_123"
account_id = "acc_1"
"#
        )?;

        let config = Config::load(file.path())?;
        assert_eq!(config.format, "ynab");
        assert_eq!(config.timeout, Duration::from_secs(90));
        assert_eq!(config.timezone()?, chrono_tz::Europe::London);
        assert_eq!(
            config.bank("monzo").and_then(|b| b.account_id.as_deref()),
            Some("acc_1")
        );
        assert!(config.bank("starling").is_none());
        Ok(())
    }

    #[test]
    fn test_partial_config_uses_defaults() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, r#"format = "ynab""#)?;

        let config = Config::load(file.path())?;
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.timezone, "UTC");
        Ok(())
    }

    #[test]
    fn test_invalid_timezone_is_rejected() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, r#"timezone = "Mars/Olympus""#)?;
        assert!(Config::load(file.path()).is_err());
        Ok(())
    }

    #[test]
    fn test_missing_file_uses_default() -> Result<()> {
        let dir = TempDir::new()?;
        let config = Config::load_or_default(&dir.path().join(CONFIG_FILE_NAME))?;
        assert_eq!(config.format, "moneydance");
        Ok(())
    }

    #[tokio::test]
    async fn test_credential_store_from_bank_table() -> Result<()> {
        let config: Config = toml::from_str(
            r#"
[banks.starling]
client_id = "id-1"
client_secret = "secret-1"
"#,
        )?;

        let store = config.credential_store("Starling");
        let secret = store.get(CLIENT_SECRET).await?.expect("secret");
        assert_eq!(secret.expose_secret(), "secret-1");
        assert!(config.credential_store("monzo").get(CLIENT_ID).await?.is_none());
        Ok(())
    }
}
