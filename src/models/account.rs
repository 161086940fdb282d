use chrono::{DateTime, Utc};

/// Bank-agnostic account summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Provider identifier, passed back as `--account` on later exports.
    pub id: String,
    pub account_type: String,
    pub created_at: DateTime<Utc>,
}
