use chrono::{DateTime, Utc};

use super::Money;

/// Bank-agnostic transaction produced by an exporter and consumed by a formatter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Signed amount: money leaving the account is negative.
    pub amount: Money,
    /// Payee or description shown in the finance software.
    pub reference: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub is_deposit: bool,
    pub bank_name: String,
    pub notes: String,
}
