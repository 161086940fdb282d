//! Monzo API client.
//!
//! See <https://docs.monzo.com/> for the upstream reference.

mod types;

pub use types::{Account, CounterParty, Merchant, MonzoError, Owner, Pot, Transaction};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;

use super::{ApiClient, ApiError, RetryPolicy};

/// Page size used when the caller passes `0`.
pub const DEFAULT_PAGE_LIMIT: u32 = 100;

/// Operations the Monzo exporter needs from the API.
#[async_trait]
pub trait MonzoApi: Send + Sync {
    async fn fetch_accounts(&self) -> Result<Vec<Account>, ApiError>;

    async fn fetch_pots(&self, account_id: &str) -> Result<Vec<Pot>, ApiError>;

    async fn fetch_transaction(&self, transaction_id: &str) -> Result<Transaction, ApiError>;

    async fn fetch_transactions_since(
        &self,
        opts: &FetchTransactionsOptions,
    ) -> Result<Vec<Transaction>, ApiError>;
}

/// Arguments for one page of `GET /transactions`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchTransactionsOptions {
    pub account_id: String,
    /// Inclusive lower bound, used when `since_id` is unset.
    pub start: Option<DateTime<Utc>>,
    /// Exclusive upper bound sent as `before`.
    pub end: Option<DateTime<Utc>>,
    /// Cursor: only transactions after this id are returned.
    pub since_id: Option<String>,
    /// Page size; `0` means [`DEFAULT_PAGE_LIMIT`].
    pub limit: u32,
}

impl FetchTransactionsOptions {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.account_id.trim().is_empty() {
            return Err(ApiError::MissingField("account id"));
        }
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start >= end {
                return Err(ApiError::InvalidTimeRange);
            }
        }
        Ok(())
    }

    fn query(&self) -> Vec<(&'static str, String)> {
        let limit = if self.limit == 0 {
            DEFAULT_PAGE_LIMIT
        } else {
            self.limit
        };
        let mut query = vec![
            ("account_id", self.account_id.clone()),
            ("expand[]", "merchant".to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(end) = self.end {
            query.push(("before", rfc3339(end)));
        }
        match (&self.since_id, self.start) {
            (Some(since_id), _) => query.push(("since", since_id.clone())),
            (None, Some(start)) => query.push(("since", rfc3339(start))),
            (None, None) => {}
        }
        query
    }
}

fn rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Monzo API client.
#[derive(Debug, Clone)]
pub struct MonzoClient {
    api: ApiClient,
}

impl MonzoClient {
    pub const API_BASE: &'static str = "https://api.monzo.com";

    pub fn new(http: reqwest::Client) -> Self {
        Self {
            api: ApiClient::new(Self::API_BASE, http).with_error::<MonzoError>(),
        }
    }

    /// Set the `Authorization` header value (already `Bearer `-prefixed).
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.api = self.api.with_auth_token(token);
        self
    }

    /// Override the API base URL (for testing).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api = self.api.with_base_url(base_url);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.api = self.api.with_retry_policy(retry);
        self
    }
}

#[async_trait]
impl MonzoApi for MonzoClient {
    async fn fetch_accounts(&self) -> Result<Vec<Account>, ApiError> {
        #[derive(Deserialize)]
        struct Response {
            accounts: Vec<Account>,
        }

        let response: Response = self.api.get("/accounts", &[]).await?;
        Ok(response.accounts)
    }

    async fn fetch_pots(&self, account_id: &str) -> Result<Vec<Pot>, ApiError> {
        #[derive(Deserialize)]
        struct Response {
            pots: Vec<Pot>,
        }

        if account_id.trim().is_empty() {
            return Err(ApiError::MissingField("account id"));
        }
        let response: Response = self
            .api
            .get("/pots", &[("current_account_id", account_id.to_string())])
            .await?;
        Ok(response.pots)
    }

    async fn fetch_transaction(&self, transaction_id: &str) -> Result<Transaction, ApiError> {
        #[derive(Deserialize)]
        struct Response {
            transaction: Transaction,
        }

        if transaction_id.trim().is_empty() {
            return Err(ApiError::MissingField("transaction id"));
        }
        let response: Response = self
            .api
            .get(
                &format!("/transactions/{transaction_id}"),
                &[("expand[]", "merchant".to_string())],
            )
            .await?;
        Ok(response.transaction)
    }

    async fn fetch_transactions_since(
        &self,
        opts: &FetchTransactionsOptions,
    ) -> Result<Vec<Transaction>, ApiError> {
        #[derive(Deserialize)]
        struct Response {
            transactions: Vec<Transaction>,
        }

        opts.validate()?;
        let response: Response = self.api.get("/transactions", &opts.query()).await?;
        Ok(response.transactions)
    }
}
