//! Starling exporter.
//!
//! Round-ups live in the savings goal's category rather than the spending
//! category, so each goal referenced by a round-up is fetched once and its
//! matching items are appended as outgoing transfers.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

use super::{ExportError, ExportType, Exporter, Options};
use crate::api::http_client;
use crate::api::starling::{
    self as api, Direction, FeedItem, FetchTransactionsOptions, StarlingApi, StarlingClient,
    Status,
};
use crate::error::BoxError;
use crate::models::{Account, Money, Transaction};

pub const EXPORT_TYPE: &str = "Starling";

pub struct StarlingExporter<C = StarlingClient> {
    api: C,
}

impl StarlingExporter<StarlingClient> {
    /// Build an exporter talking to the live Starling API.
    pub fn from_options(opts: &Options) -> Result<Self, BoxError> {
        let http = http_client(opts.timeout)?;
        let client = StarlingClient::new(http).with_auth_token(opts.bearer_auth_token());
        Ok(Self::new(client))
    }
}

impl<C: StarlingApi> StarlingExporter<C> {
    pub fn new(api: C) -> Self {
        Self { api }
    }

    async fn select_account(&self, account_id: Uuid) -> Result<api::Account, ExportError> {
        let accounts = self
            .api
            .fetch_accounts()
            .await
            .map_err(ExportError::api("fetch accounts"))?;

        tracing::debug!(
            bank = EXPORT_TYPE,
            account.total = accounts.len(),
            "found accounts"
        );

        let idx = if account_id.is_nil() {
            0
        } else {
            accounts
                .iter()
                .position(|account| account.id == account_id)
                .unwrap_or_else(|| {
                    tracing::warn!(
                        bank = EXPORT_TYPE,
                        account.id = %account_id,
                        "requested account not found, using the first account"
                    );
                    0
                })
        };
        let account = accounts
            .into_iter()
            .nth(idx)
            .ok_or(ExportError::NoAccounts)?;

        tracing::info!(
            bank = EXPORT_TYPE,
            account.id = %account.id,
            category.id = %account.default_category_id,
            "selected account"
        );
        Ok(account)
    }

    async fn fetch_feed(
        &self,
        account_id: Uuid,
        category_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FeedItem>, ExportError> {
        tracing::debug!(
            bank = EXPORT_TYPE,
            account.id = %account_id,
            category.id = %category_id,
            start = %start,
            end = %end,
            "fetching transactions"
        );

        self.api
            .fetch_transactions_since(&FetchTransactionsOptions {
                account_id,
                category_id,
                start,
                end: Some(end),
            })
            .await
            .map_err(ExportError::api("fetch transactions"))
    }

    /// Fetch the savings-side half of every round-up in `feed`.
    async fn fetch_round_ups(
        &self,
        account_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        feed: &[FeedItem],
    ) -> Result<Vec<FeedItem>, ExportError> {
        let mut seen = HashSet::new();
        let mut round_ups = Vec::new();

        for item in feed {
            let Some(round_up) = &item.round_up else {
                continue;
            };
            if !seen.insert(round_up.goal_category_id) {
                continue;
            }

            let goal_feed = self
                .fetch_feed(account_id, round_up.goal_category_id, start, end)
                .await?;
            round_ups.extend(
                goal_feed
                    .into_iter()
                    .filter(|goal_item| goal_item.counter_party_id == item.category_id)
                    .map(|mut goal_item| {
                        goal_item.direction = Direction::Out;
                        goal_item
                    }),
            );
        }

        Ok(round_ups)
    }
}

#[async_trait]
impl<C: StarlingApi + 'static> Exporter for StarlingExporter<C> {
    fn export_type(&self) -> ExportType {
        ExportType::from(EXPORT_TYPE)
    }

    fn max_date_range(&self) -> Option<TimeDelta> {
        None
    }

    async fn export_transactions(&self, opts: &Options) -> Result<Vec<Transaction>, ExportError> {
        let (start, end) = opts.date_range()?;
        let account_id = match opts.account_id() {
            Some(raw) => Uuid::parse_str(raw).map_err(|source| ExportError::ParseAccountId {
                value: raw.to_string(),
                source,
            })?,
            None => Uuid::nil(),
        };

        tracing::info!(
            bank = EXPORT_TYPE,
            export.start = %start.format("%Y-%m-%d"),
            export.end = %end.format("%Y-%m-%d"),
            "starting export of transactions"
        );

        let account = self.select_account(account_id).await?;
        let mut feed = self
            .fetch_feed(account.id, account.default_category_id, start, end)
            .await?;
        let round_ups = self.fetch_round_ups(account.id, start, end, &feed).await?;
        feed.extend(round_ups);
        feed.retain(|item| item.status != Status::Declined);

        tracing::info!(
            bank = EXPORT_TYPE,
            transaction.count = feed.len(),
            "exported transactions"
        );

        Ok(feed.iter().map(to_domain).collect())
    }

    async fn export_accounts(&self) -> Result<Vec<Account>, ExportError> {
        let accounts = self
            .api
            .fetch_accounts()
            .await
            .map_err(ExportError::api("fetch accounts"))?;

        Ok(accounts
            .into_iter()
            .map(|account| Account {
                id: account.id.to_string(),
                account_type: account.account_type,
                created_at: account.created_at,
            })
            .collect())
    }
}

fn determine_reference(item: &FeedItem) -> String {
    let category = item.spending_category.as_str();
    let counter_party = item.counter_party_type.as_str();
    let source = item.source.as_str();
    let sub_type = item.source_sub_type.as_str();

    match (category, counter_party, source, sub_type) {
        ("TRANSFERS", "CATEGORY", "INTERNAL_TRANSFER", "") => "Savings Pot".to_string(),
        ("INCOME", "STARLING", "INTEREST_PAYMENT", "DEPOSIT") => {
            "Interest Capitalisation".to_string()
        }
        (_, "MERCHANT", _, _) if !item.counter_party_name.is_empty() => {
            item.counter_party_name.clone()
        }
        (_, "SENDER", _, _) if !item.counter_party_name.is_empty() => {
            format!("{} ({})", item.description, item.counter_party_name)
        }
        _ => item.description.trim().to_string(),
    }
}

fn to_domain(item: &FeedItem) -> Transaction {
    let is_deposit = item.direction == Direction::In;
    let sign = if is_deposit { 1 } else { -1 };

    Transaction {
        amount: Money::new(item.amount.minor_units * sign, item.amount.currency.clone()),
        reference: determine_reference(item),
        category: item.spending_category.clone(),
        created_at: item.transacted_at,
        is_deposit,
        bank_name: EXPORT_TYPE.to_string(),
        notes: item.user_note.clone(),
    }
}
