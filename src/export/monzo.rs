//! Monzo exporter.
//!
//! Monzo pages `GET /transactions` with a `since` cursor but does not combine
//! the cursor with `before` reliably, so paging stops once a page reaches past
//! the requested window. A page bound guards against feeds that never do.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};

use super::{ExportError, ExportType, Exporter, Options};
use crate::api::monzo::{self as api, FetchTransactionsOptions, MonzoApi, MonzoClient};
use crate::api::http_client;
use crate::error::BoxError;
use crate::models::{Account, Transaction};

pub const EXPORT_TYPE: &str = "Monzo";
pub const MAX_DATE_RANGE_DAYS: i64 = 90;

const PAGE_LIMIT: u32 = 100;
const MIN_PAGES: usize = 10;
const ACTIVE_CARD_CHECK: &str = "Active card check";

pub struct MonzoExporter<C = MonzoClient> {
    api: C,
}

impl MonzoExporter<MonzoClient> {
    /// Build an exporter talking to the live Monzo API.
    pub fn from_options(opts: &Options) -> Result<Self, BoxError> {
        let http = http_client(opts.timeout)?;
        let client = MonzoClient::new(http).with_auth_token(opts.bearer_auth_token());
        Ok(Self::new(client))
    }
}

impl<C: MonzoApi> MonzoExporter<C> {
    pub fn new(api: C) -> Self {
        Self { api }
    }

    async fn select_account(&self, account_id: Option<&str>) -> Result<api::Account, ExportError> {
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

        let selected = match account_id {
            Some(id) => match accounts.iter().position(|account| account.id == id) {
                Some(idx) => Some(idx),
                None => {
                    tracing::warn!(
                        bank = EXPORT_TYPE,
                        account.id = id,
                        "requested account not found, using the first account"
                    );
                    None
                }
            },
            None => None,
        };
        let account = accounts
            .into_iter()
            .nth(selected.unwrap_or(0))
            .ok_or(ExportError::NoAccounts)?;

        tracing::info!(bank = EXPORT_TYPE, account.id = %account.id, "selected account");
        Ok(account)
    }

    /// Page through `[start, end + 24h)`, dropping card checks and declines.
    async fn fetch_transactions(
        &self,
        account_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<api::Transaction>, ExportError> {
        let end_exclusive = end + TimeDelta::days(1);
        let max_pages = max_pages(start, end);

        tracing::debug!(
            bank = EXPORT_TYPE,
            account.id = account_id,
            start = %start,
            end = %end_exclusive,
            limit = PAGE_LIMIT,
            "fetching transactions"
        );

        let mut kept = Vec::new();
        let mut since_id: Option<String> = None;
        for page in 0..max_pages {
            let transactions = self
                .api
                .fetch_transactions_since(&FetchTransactionsOptions {
                    account_id: account_id.to_string(),
                    start: Some(start),
                    end: Some(end_exclusive),
                    since_id: since_id.clone(),
                    limit: PAGE_LIMIT,
                })
                .await
                .map_err(ExportError::api("fetch transactions"))?;

            let Some((latest_id, latest_created)) = latest(&transactions) else {
                tracing::debug!(
                    bank = EXPORT_TYPE,
                    account.id = account_id,
                    transaction.total = kept.len(),
                    pages = page,
                    "fetched transactions"
                );
                return Ok(kept);
            };

            kept.extend(
                transactions
                    .into_iter()
                    .filter(is_exportable)
                    // The window is [start, end + 24h): the instant end + 24h is out.
                    .filter(|txn| txn.created < end_exclusive),
            );

            // Reaching end + 24h means later pages are outside the window too.
            if latest_created >= end_exclusive {
                tracing::debug!(
                    bank = EXPORT_TYPE,
                    account.id = account_id,
                    transaction.total = kept.len(),
                    pages = page + 1,
                    "fetched transactions"
                );
                return Ok(kept);
            }
            since_id = Some(latest_id);
        }

        Err(ExportError::PaginationLimit { pages: max_pages })
    }

    /// Replace descriptions that are pot ids with `"<name> Pot"`.
    async fn enrich_descriptions(
        &self,
        account_id: &str,
        transactions: &mut [api::Transaction],
    ) -> Result<(), ExportError> {
        tracing::debug!(
            bank = EXPORT_TYPE,
            account.id = account_id,
            "enriching transaction descriptions"
        );

        let pots = self
            .api
            .fetch_pots(account_id)
            .await
            .map_err(ExportError::api("fetch pots"))?;

        tracing::debug!(
            bank = EXPORT_TYPE,
            account.id = account_id,
            pots.total = pots.len(),
            "fetched pots"
        );

        let names: HashMap<String, String> =
            pots.into_iter().map(|pot| (pot.id, pot.name)).collect();
        for txn in transactions.iter_mut() {
            if let Some(name) = names.get(&txn.description) {
                txn.description = format!("{name} Pot");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<C: MonzoApi + 'static> Exporter for MonzoExporter<C> {
    fn export_type(&self) -> ExportType {
        ExportType::from(EXPORT_TYPE)
    }

    fn max_date_range(&self) -> Option<TimeDelta> {
        Some(TimeDelta::days(MAX_DATE_RANGE_DAYS))
    }

    async fn export_transactions(&self, opts: &Options) -> Result<Vec<Transaction>, ExportError> {
        let (start, end) = opts.date_range()?;

        tracing::info!(
            bank = EXPORT_TYPE,
            export.start = %start.format("%Y-%m-%d"),
            export.end = %end.format("%Y-%m-%d"),
            "starting export of transactions"
        );

        let account = self.select_account(opts.account_id()).await?;
        let mut transactions = self.fetch_transactions(&account.id, start, end).await?;
        self.enrich_descriptions(&account.id, &mut transactions)
            .await?;

        tracing::info!(
            bank = EXPORT_TYPE,
            transaction.count = transactions.len(),
            "exported transactions"
        );

        Ok(transactions.iter().map(to_domain).collect())
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
                id: account.id,
                account_type: account.account_type,
                created_at: account.created,
            })
            .collect())
    }
}

/// Requests allowed for one export: two pages per day, never fewer than ten,
/// plus the final empty page.
fn max_pages(start: DateTime<Utc>, end: DateTime<Utc>) -> usize {
    let hours = (end - start).num_hours().max(0) as usize;
    let per_days = (hours * 2).div_ceil(24);
    per_days.max(MIN_PAGES) + 1
}

/// Id and timestamp of the newest transaction on a page, first one winning ties.
fn latest(page: &[api::Transaction]) -> Option<(String, DateTime<Utc>)> {
    let mut iter = page.iter();
    let first = iter.next()?;
    let newest = iter.fold(first, |newest, txn| {
        if txn.created > newest.created {
            txn
        } else {
            newest
        }
    });
    Some((newest.id.clone(), newest.created))
}

fn is_exportable(txn: &api::Transaction) -> bool {
    let active_card_check = txn.amount.minor_units == 0
        && txn.metadata.get("notes").map(String::as_str) == Some(ACTIVE_CARD_CHECK);
    !active_card_check && txn.decline_reason.is_empty()
}

/// Pick the payee and the derived notes for a transaction.
fn determine_reference(txn: &api::Transaction) -> (String, String) {
    let counterparty = txn
        .counterparty
        .as_ref()
        .map(|c| c.name.as_str())
        .filter(|name| !name.is_empty());
    let merchant = txn
        .merchant
        .as_ref()
        .map(|m| m.name.as_str())
        .filter(|name| !name.is_empty());

    let (reference, notes) = match (counterparty, merchant) {
        (Some(counterparty), Some(merchant)) => (counterparty, merchant),
        (Some(counterparty), None) => (counterparty, ""),
        (None, Some(merchant)) => (merchant, ""),
        (None, None) => (txn.description.as_str(), ""),
    };
    (reference.trim().to_string(), notes.trim().to_string())
}

fn to_domain(txn: &api::Transaction) -> Transaction {
    let (reference, derived_notes) = determine_reference(txn);
    let notes = if txn.user_notes.is_empty() {
        derived_notes
    } else {
        txn.user_notes.clone()
    };

    Transaction {
        amount: txn.amount.clone(),
        reference,
        category: txn.category.clone(),
        created_at: txn.created,
        is_deposit: txn.local_amount.minor_units > 0,
        bank_name: EXPORT_TYPE.to_string(),
        notes,
    }
}
