use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};

use super::ExportError;
use crate::api;
use crate::clock::Clock;

/// Per-request timeout used when the caller does not pick one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared input to every exporter.
#[derive(Debug, Clone)]
pub struct Options {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    /// Provider account to export; the first account is used when unset.
    pub account_id: Option<String>,
    pub auth_token: SecretString,
    pub timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            start_date: None,
            end_date: None,
            account_id: None,
            auth_token: SecretString::from(String::new()),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl Options {
    pub fn new(auth_token: impl Into<String>) -> Self {
        Self {
            auth_token: SecretString::from(auth_token.into()),
            ..Self::default()
        }
    }

    pub fn with_date_range(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Account id with surrounding whitespace removed; blank ids count as unset.
    pub fn account_id(&self) -> Option<&str> {
        self.account_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// `Authorization` header value: trimmed, with exactly one `Bearer ` prefix.
    pub fn bearer_auth_token(&self) -> String {
        api::bearer(self.auth_token.expose_secret())
    }

    pub fn validate_auth(&self) -> Result<(), ExportError> {
        if self.auth_token.expose_secret().trim().is_empty() {
            return Err(ExportError::InvalidOptions(
                "auth token is required".to_string(),
            ));
        }
        Ok(())
    }

    /// The requested `(start, end)` pair, checking presence and ordering.
    pub fn date_range(&self) -> Result<(DateTime<Utc>, DateTime<Utc>), ExportError> {
        let start = self
            .start_date
            .ok_or_else(|| ExportError::InvalidOptions("start date is required".to_string()))?;
        let end = self
            .end_date
            .ok_or_else(|| ExportError::InvalidOptions("end date is required".to_string()))?;
        if end < start {
            return Err(ExportError::InvalidOptions(
                "end date must not be before start date".to_string(),
            ));
        }
        Ok((start, end))
    }

    /// Full validation for a transaction export.
    pub fn validate(&self, clock: &dyn Clock) -> Result<(DateTime<Utc>, DateTime<Utc>), ExportError> {
        let (start, end) = self.date_range()?;
        self.validate_auth()?;
        if start > clock.now() {
            return Err(ExportError::InvalidOptions(
                "start date cannot be in the future".to_string(),
            ));
        }
        Ok((start, end))
    }
}
