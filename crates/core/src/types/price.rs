//! Price parsing for the two shapes the store hands out.
//!
//! - The cart endpoint sends each line `price` and the cart totals as a bare
//!   number, a numeric string, or a `{value, formattedValue}` object, and the
//!   fee fields may be `null`. [`FlexiblePrice`] accepts every shape and
//!   coerces to a [`Decimal`].
//! - Search results carry a unit-normalized compare price as display text
//!   (`"24,90 kr"`). [`parse_compare_price`] turns it into a number
//!   suitable for ranking.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A price field whose JSON type is not fixed.
///
/// Unparseable or missing values coerce to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlexiblePrice {
    /// `59.0`
    Number(serde_json::Number),
    /// `"59.00"`
    Text(String),
    /// `{"value": 59.0, "formattedValue": "59,00 kr"}`
    Wrapped {
        /// The nested amount, itself in any of the accepted shapes.
        value: Box<FlexiblePrice>,
    },
    /// Anything else (`null`, booleans, objects without `value`).
    Other(serde_json::Value),
}

impl Default for FlexiblePrice {
    fn default() -> Self {
        Self::Other(serde_json::Value::Null)
    }
}

impl FlexiblePrice {
    /// Coerce to a decimal amount, defaulting to zero.
    #[must_use]
    pub fn amount(&self) -> Decimal {
        match self {
            Self::Number(n) => decimal_from_text(&n.to_string()),
            Self::Text(s) => decimal_from_text(s.trim()),
            Self::Wrapped { value } => value.amount(),
            Self::Other(_) => Decimal::ZERO,
        }
    }
}

fn decimal_from_text(s: &str) -> Decimal {
    if s.is_empty() {
        return Decimal::ZERO;
    }
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .unwrap_or(Decimal::ZERO)
}

/// Parse a compare-price display string into a number.
///
/// Strips a trailing `kr` currency suffix and converts the Swedish decimal
/// comma. Returns `0.0` when the text cannot be parsed, which makes such
/// products pass any price ceiling.
#[must_use]
pub fn parse_compare_price(text: &str) -> f64 {
    let trimmed = text.trim();
    let without_currency = trimmed.strip_suffix("kr").unwrap_or(trimmed).trim_end();
    without_currency
        .replace(',', ".")
        .parse::<f64>()
        .unwrap_or(0.0)
}
