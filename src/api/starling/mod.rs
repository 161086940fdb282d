//! Starling Bank API client.
//!
//! See <https://developer.starlingbank.com/docs> for the upstream reference.

mod types;

pub use types::{
    Account, Direction, ErrorMessage, FeedItem, RoundUp, SavingsGoal, StarlingError, Status,
};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::{ApiClient, ApiError, RetryPolicy};

/// Operations the Starling exporter needs from the API.
#[async_trait]
pub trait StarlingApi: Send + Sync {
    async fn fetch_accounts(&self) -> Result<Vec<Account>, ApiError>;

    async fn fetch_savings_goals(&self, account_id: Uuid) -> Result<Vec<SavingsGoal>, ApiError>;

    async fn fetch_feed_item(
        &self,
        account_id: Uuid,
        category_id: Uuid,
        feed_item_id: Uuid,
    ) -> Result<FeedItem, ApiError>;

    async fn fetch_transactions_since(
        &self,
        opts: &FetchTransactionsOptions,
    ) -> Result<Vec<FeedItem>, ApiError>;
}

/// Arguments for `GET .../transactions-between`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTransactionsOptions {
    pub account_id: Uuid,
    pub category_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

impl FetchTransactionsOptions {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.account_id.is_nil() {
            return Err(ApiError::MissingField("account id"));
        }
        if self.category_id.is_nil() {
            return Err(ApiError::MissingField("category id"));
        }
        let end = self.end.ok_or(ApiError::MissingField("end time"))?;
        if self.start >= end {
            return Err(ApiError::InvalidTimeRange);
        }
        Ok(())
    }
}

fn rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Starling API client.
#[derive(Debug, Clone)]
pub struct StarlingClient {
    api: ApiClient,
}

impl StarlingClient {
    pub const API_BASE: &'static str = "https://api.starlingbank.com";

    pub fn new(http: reqwest::Client) -> Self {
        Self {
            api: ApiClient::new(Self::API_BASE, http).with_error::<StarlingError>(),
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
impl StarlingApi for StarlingClient {
    async fn fetch_accounts(&self) -> Result<Vec<Account>, ApiError> {
        #[derive(Deserialize)]
        struct Response {
            accounts: Vec<Account>,
        }

        let response: Response = self.api.get("/api/v2/accounts", &[]).await?;
        Ok(response.accounts)
    }

    async fn fetch_savings_goals(&self, account_id: Uuid) -> Result<Vec<SavingsGoal>, ApiError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Response {
            savings_goal_list: Vec<SavingsGoal>,
        }

        if account_id.is_nil() {
            return Err(ApiError::MissingField("account id"));
        }
        let response: Response = self
            .api
            .get(&format!("/api/v2/account/{account_id}/savings-goals"), &[])
            .await?;
        Ok(response.savings_goal_list)
    }

    async fn fetch_feed_item(
        &self,
        account_id: Uuid,
        category_id: Uuid,
        feed_item_id: Uuid,
    ) -> Result<FeedItem, ApiError> {
        if account_id.is_nil() {
            return Err(ApiError::MissingField("account id"));
        }
        if category_id.is_nil() {
            return Err(ApiError::MissingField("category id"));
        }
        if feed_item_id.is_nil() {
            return Err(ApiError::MissingField("feed item id"));
        }
        self.api
            .get(
                &format!("/api/v2/feed/account/{account_id}/category/{category_id}/{feed_item_id}"),
                &[],
            )
            .await
    }

    async fn fetch_transactions_since(
        &self,
        opts: &FetchTransactionsOptions,
    ) -> Result<Vec<FeedItem>, ApiError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Response {
            feed_items: Vec<FeedItem>,
        }

        opts.validate()?;
        let mut query = vec![("minTransactionTimestamp", rfc3339(opts.start))];
        if let Some(end) = opts.end {
            query.push(("maxTransactionTimestamp", rfc3339(end)));
        }

        let response: Response = self
            .api
            .get(
                &format!(
                    "/api/v2/feed/account/{}/category/{}/transactions-between",
                    opts.account_id, opts.category_id
                ),
                &query,
            )
            .await?;
        Ok(response.feed_items)
    }
}
