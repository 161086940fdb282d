use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{de, Deserialize, Deserializer};
use uuid::Uuid;

use crate::api::{DecodeProviderError, ProviderError};
use crate::models::Money;

/// Starling sends identifiers as strings that occasionally carry whitespace.
/// Empty values decode as the nil UUID.
fn trimmed_uuid<'de, D>(deserializer: D) -> Result<Uuid, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(Uuid::nil()),
        Some(s) => Uuid::parse_str(s).map_err(de::Error::custom),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(rename = "accountUid", deserialize_with = "trimmed_uuid")]
    pub id: Uuid,
    #[serde(default)]
    pub account_type: String,
    #[serde(rename = "defaultCategory", deserialize_with = "trimmed_uuid")]
    pub default_category_id: Uuid,
    #[serde(default)]
    pub currency: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsGoal {
    #[serde(rename = "savingsGoalUid", deserialize_with = "trimmed_uuid")]
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub target: Option<Money>,
    #[serde(default)]
    pub total_saved: Option<Money>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    In,
    Out,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Upcoming,
    UpcomingCancelled,
    Pending,
    Reversed,
    Settled,
    Declined,
    Refunded,
    Retrying,
    AccountCheck,
    #[serde(other)]
    Unknown,
}

/// Money moved to a savings goal by rounding up a card payment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundUp {
    #[serde(rename = "goalCategoryUid", deserialize_with = "trimmed_uuid")]
    pub goal_category_id: Uuid,
    pub amount: Money,
}

/// One entry of an account category's activity feed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    #[serde(rename = "feedItemUid", default, deserialize_with = "trimmed_uuid")]
    pub id: Uuid,
    #[serde(rename = "categoryUid", default, deserialize_with = "trimmed_uuid")]
    pub category_id: Uuid,
    /// Unsigned; the sign comes from `direction`.
    pub amount: Money,
    #[serde(default)]
    pub source_amount: Option<Money>,
    pub direction: Direction,
    #[serde(rename = "transactionTime")]
    pub transacted_at: DateTime<Utc>,
    #[serde(default)]
    pub settlement_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub source_sub_type: String,
    pub status: Status,
    #[serde(default)]
    pub counter_party_type: String,
    #[serde(rename = "counterPartyUid", default, deserialize_with = "trimmed_uuid")]
    pub counter_party_id: Uuid,
    #[serde(
        rename = "counterPartySubEntityUid",
        default,
        deserialize_with = "trimmed_uuid"
    )]
    pub counter_party_sub_entity_id: Uuid,
    #[serde(default)]
    pub counter_party_name: String,
    #[serde(rename = "reference", default)]
    pub description: String,
    #[serde(default)]
    pub user_note: String,
    #[serde(default)]
    pub spending_category: String,
    #[serde(default)]
    pub round_up: Option<RoundUp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct ErrorMessage {
    #[serde(default)]
    pub message: String,
}

/// Error body returned by the Starling API. Either the OAuth-style
/// `{error, error_description}` pair or a list of `errors` is populated.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct StarlingError {
    #[serde(skip, default = "default_status")]
    pub status: StatusCode,
    #[serde(rename = "error", default)]
    pub code: String,
    #[serde(rename = "error_description", default)]
    pub message: String,
    #[serde(default)]
    pub success: bool,
    #[serde(rename = "errors", default)]
    pub error_messages: Vec<ErrorMessage>,
}

fn default_status() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

impl std::fmt::Display for StarlingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.message.is_empty() {
            write!(f, "{} ", self.message)?;
        }
        if !self.error_messages.is_empty() {
            let messages: Vec<&str> = self
                .error_messages
                .iter()
                .map(|e| e.message.as_str())
                .collect();
            write!(f, "[{}] ", messages.join(", "))?;
        }
        write!(f, "(http status={})", self.status.as_u16())
    }
}

impl std::error::Error for StarlingError {}

impl ProviderError for StarlingError {
    fn http_status(&self) -> StatusCode {
        self.status
    }

    fn code(&self) -> &str {
        &self.code
    }
}

impl DecodeProviderError for StarlingError {
    fn decode(status: StatusCode, body: &[u8]) -> Option<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Some(Self {
                status,
                code: "unknown".to_string(),
                message: "unknown".to_string(),
                ..Self::default()
            });
        }

        let mut err: StarlingError = serde_json::from_slice(body).ok()?;
        if err.code.is_empty() && err.message.is_empty() && err.error_messages.is_empty() {
            return None;
        }
        err.status = status;
        Some(err)
    }
}
