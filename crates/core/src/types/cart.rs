//! Cart snapshot types.
//!
//! The cart lives server-side. A [`Cart`] is a read-only snapshot taken by the
//! most recent fetch and is never reused to answer a later read.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One line of the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub code: String,
    pub name: String,
    pub quantity: u32,
    /// Price of one unit.
    pub price: Decimal,
    /// `price * quantity`.
    pub total_price: Decimal,
    pub image_url: String,
}

/// Current basket contents and totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub items: Vec<CartItem>,
    /// Sum of product prices as reported by the store.
    pub total_price: Decimal,
    /// Sum of all line quantities.
    pub item_count: u32,
    pub delivery_fee: Decimal,
    pub picking_fee: Decimal,
    /// `total_price + delivery_fee + picking_fee`.
    pub final_total: Decimal,
}

impl Cart {
    /// Assemble a cart from its lines and the store-reported fees.
    #[must_use]
    pub fn new(
        items: Vec<CartItem>,
        total_price: Decimal,
        delivery_fee: Decimal,
        picking_fee: Decimal,
    ) -> Self {
        let item_count = items.iter().map(|item| item.quantity).sum();
        Self {
            items,
            total_price,
            item_count,
            delivery_fee,
            picking_fee,
            final_total: total_price + delivery_fee + picking_fee,
        }
    }

    /// Find the line for a product code.
    #[must_use]
    pub fn item(&self, code: &str) -> Option<&CartItem> {
        self.items.iter().find(|item| item.code == code)
    }

    /// Returns `true` if the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl CartItem {
    /// Build a line, computing its total from the unit price.
    #[must_use]
    pub fn new(
        code: String,
        name: String,
        quantity: u32,
        price: Decimal,
        image_url: String,
    ) -> Self {
        Self {
            code,
            name,
            quantity,
            price,
            total_price: price * Decimal::from(quantity),
            image_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cart_totals() {
        let cart = Cart::new(
            vec![
                CartItem::new(
                    "101233933_ST".to_string(),
                    "Mjölk".to_string(),
                    2,
                    Decimal::new(1790, 2),
                    String::new(),
                ),
                CartItem::new(
                    "101205823_KG".to_string(),
                    "Bananer".to_string(),
                    3,
                    Decimal::new(2500, 2),
                    String::new(),
                ),
            ],
            Decimal::new(11080, 2),
            Decimal::new(99, 0),
            Decimal::new(59, 0),
        );

        assert_eq!(cart.item_count, 5);
        assert_eq!(cart.items[0].total_price, Decimal::new(3580, 2));
        assert_eq!(cart.final_total, Decimal::new(26880, 2));
        assert_eq!(cart.item("101205823_KG").map(|i| i.quantity), Some(3));
        assert!(cart.item("999_ST").is_none());
    }

    #[test]
    fn test_empty_cart() {
        let cart = Cart::new(vec![], Decimal::ZERO, Decimal::ZERO, Decimal::ZERO);
        assert!(cart.is_empty());
        assert_eq!(cart.item_count, 0);
        assert_eq!(cart.final_total, Decimal::ZERO);
    }
}
