use std::collections::HashMap;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::api::{DecodeProviderError, ProviderError};
use crate::models::Money;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Account {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub closed: bool,
    #[serde(default)]
    pub currency: String,
    #[serde(rename = "type", default)]
    pub account_type: String,
    #[serde(default)]
    pub owner_type: String,
    #[serde(default)]
    pub country_code: String,
    #[serde(default)]
    pub account_number: String,
    #[serde(default)]
    pub sort_code: String,
    #[serde(default)]
    pub owners: Vec<Owner>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct Owner {
    pub user_id: String,
    pub preferred_name: String,
    pub preferred_first_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Pot {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct Merchant {
    pub id: String,
    pub name: String,
    pub category: String,
    pub online: bool,
    pub atm: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct CounterParty {
    pub account_number: String,
    pub name: String,
    pub sort_code: String,
    pub user_id: String,
}

impl CounterParty {
    pub fn is_empty(&self) -> bool {
        self == &CounterParty::default()
    }
}

/// A Monzo transaction.
///
/// The API splits each amount into an integer and a currency field and sends
/// `settled` as a possibly-empty string; both are normalized here.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawTransaction")]
pub struct Transaction {
    pub id: String,
    pub description: String,
    pub created: DateTime<Utc>,
    /// Amount in the account currency. Outgoing payments are negative.
    pub amount: Money,
    /// Amount in the currency the payment was made in.
    pub local_amount: Money,
    pub user_notes: String,
    pub category: String,
    pub settled: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub account_id: String,
    pub amount_is_pending: bool,
    pub scheme: String,
    pub merchant: Option<Merchant>,
    pub counterparty: Option<CounterParty>,
    pub decline_reason: String,
    pub metadata: HashMap<String, String>,
}

/// `merchant` is an object when `expand[]=merchant` is sent, a bare id otherwise.
#[derive(Deserialize)]
#[serde(untagged)]
enum MerchantField {
    Expanded(Merchant),
    Id(String),
}

#[derive(Deserialize)]
struct RawTransaction {
    id: String,
    #[serde(default)]
    description: String,
    created: DateTime<Utc>,
    amount: i64,
    currency: String,
    #[serde(default)]
    local_amount: i64,
    #[serde(default)]
    local_currency: String,
    #[serde(default)]
    notes: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    settled: Option<String>,
    #[serde(default)]
    updated: Option<String>,
    #[serde(default)]
    account_id: String,
    #[serde(default)]
    amount_is_pending: bool,
    #[serde(default)]
    scheme: String,
    #[serde(default)]
    merchant: Option<MerchantField>,
    #[serde(default)]
    counterparty: Option<CounterParty>,
    #[serde(default)]
    decline_reason: String,
    #[serde(default)]
    metadata: HashMap<String, serde_json::Value>,
}

fn parse_optional_time(value: Option<String>) -> Result<Option<DateTime<Utc>>, chrono::ParseError> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(s).map(|t| Some(t.with_timezone(&Utc))),
    }
}

impl TryFrom<RawTransaction> for Transaction {
    type Error = chrono::ParseError;

    fn try_from(raw: RawTransaction) -> Result<Self, Self::Error> {
        let merchant = raw.merchant.map(|m| match m {
            MerchantField::Expanded(merchant) => merchant,
            MerchantField::Id(id) => Merchant {
                id,
                ..Merchant::default()
            },
        });
        let metadata = raw
            .metadata
            .into_iter()
            .map(|(key, value)| match value {
                serde_json::Value::String(s) => (key, s),
                other => (key, other.to_string()),
            })
            .collect();

        Ok(Self {
            id: raw.id,
            description: raw.description,
            created: raw.created,
            amount: Money::new(raw.amount, raw.currency),
            local_amount: Money::new(raw.local_amount, raw.local_currency),
            user_notes: raw.notes,
            category: raw.category,
            settled: parse_optional_time(raw.settled)?,
            updated: parse_optional_time(raw.updated)?,
            account_id: raw.account_id,
            amount_is_pending: raw.amount_is_pending,
            scheme: raw.scheme,
            merchant,
            counterparty: raw.counterparty.filter(|c| !c.is_empty()),
            decline_reason: raw.decline_reason,
            metadata,
        })
    }
}

/// Error body returned by the Monzo API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (http status={})", .status.as_u16())]
pub struct MonzoError {
    pub code: String,
    pub message: String,
    pub status: StatusCode,
}

impl ProviderError for MonzoError {
    fn http_status(&self) -> StatusCode {
        self.status
    }

    fn code(&self) -> &str {
        &self.code
    }
}

impl DecodeProviderError for MonzoError {
    fn decode(status: StatusCode, body: &[u8]) -> Option<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Some(Self {
                code: "unknown".to_string(),
                message: "unknown".to_string(),
                status,
            });
        }

        #[derive(Deserialize)]
        struct Body {
            code: Option<String>,
            message: Option<String>,
        }

        let body: Body = serde_json::from_slice(body).ok()?;
        if body.code.is_none() && body.message.is_none() {
            return None;
        }
        Some(Self {
            code: body.code.unwrap_or_default(),
            message: body.message.unwrap_or_default(),
            status,
        })
    }
}
