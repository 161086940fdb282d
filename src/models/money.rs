use std::fmt;

use rust_decimal::Decimal;
use serde::Deserialize;

use super::currency::fraction_digits;

/// An amount in a currency's smallest unit (pence, cents, yen).
///
/// The wire shape matches Starling's `{"currency": "GBP", "minorUnits": 123}`
/// so provider payloads deserialize straight into it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Money {
    pub minor_units: i64,
    pub currency: String,
}

impl Money {
    pub fn new(minor_units: i64, currency: impl Into<String>) -> Self {
        Self {
            minor_units,
            currency: currency.into(),
        }
    }

    /// Fraction digits of this amount's currency, `None` when the code is unknown.
    pub fn fraction_digits(&self) -> Option<u32> {
        fraction_digits(&self.currency)
    }

    /// Amount in major units (pounds, dollars). Unknown currencies return the
    /// raw minor-unit value unscaled.
    pub fn to_major_unit(&self) -> Decimal {
        Decimal::new(self.minor_units, self.fraction_digits().unwrap_or(0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.fraction_digits() {
            Some(digits) => write!(f, "{}", Decimal::new(self.minor_units, digits)),
            None => write!(
                f,
                "invalid currency: {} ({})",
                self.minor_units, self.currency
            ),
        }
    }
}
