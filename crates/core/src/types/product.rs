//! Search result products.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::nullable;
use super::price::parse_compare_price;

/// A product as returned by the search endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Product {
    /// Product code, e.g. `101233933_ST` (pieces) or `101205823_KG` (weight).
    #[serde(deserialize_with = "nullable::or_default")]
    pub code: String,
    #[serde(deserialize_with = "nullable::or_default")]
    pub name: String,
    /// Absolute price of one package.
    #[serde(deserialize_with = "nullable::or_default")]
    pub price_value: Decimal,
    /// Display price, e.g. `"24,90 kr"`.
    #[serde(deserialize_with = "nullable::or_default")]
    pub price: String,
    /// Unit-normalized price text, e.g. `"49,80 kr"`.
    #[serde(deserialize_with = "nullable::or_default")]
    pub compare_price: String,
    /// Unit the compare price refers to, e.g. `"kg"` or `"l"`.
    #[serde(deserialize_with = "nullable::or_default")]
    pub compare_price_unit: String,
    #[serde(deserialize_with = "nullable::or_default")]
    pub display_volume: String,
    #[serde(deserialize_with = "nullable::or_default")]
    pub manufacturer: String,
    /// Quality and origin labels such as `"KRAV"` or `"Svenskt kött"`.
    #[serde(deserialize_with = "nullable::or_default")]
    pub labels: Vec<String>,
    #[serde(deserialize_with = "nullable::or_default")]
    pub online: bool,
    #[serde(deserialize_with = "nullable::or_default")]
    pub out_of_stock: bool,
    pub savings_amount: Option<Decimal>,
    #[serde(deserialize_with = "nullable::or_default")]
    pub image: ProductImage,
}

/// Product image reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProductImage {
    #[serde(deserialize_with = "nullable::or_default")]
    pub url: String,
}

impl Product {
    /// Parsed unit compare price (`0.0` when unparseable).
    #[must_use]
    pub fn unit_price(&self) -> f64 {
        parse_compare_price(&self.compare_price)
    }
}
