//! Response and request bodies as the store sends them, and their
//! conversion into `willys_core` types.

use chrono::{DateTime, Local, NaiveDate, TimeZone};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use willys_core::types::nullable;
use willys_core::{Cart, CartItem, FlexiblePrice, Product, SlotRouting, TimeSlot};

// =============================================================================
// Search
// =============================================================================

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct SearchResponse {
    #[serde(deserialize_with = "nullable::or_default")]
    pub results: Vec<Product>,
}

// =============================================================================
// Cart
// =============================================================================

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct CartResponse {
    #[serde(deserialize_with = "nullable::or_default")]
    pub products: Vec<CartProduct>,
    pub total_price: FlexiblePrice,
    pub delivery_fee: FlexiblePrice,
    pub picking_fee: FlexiblePrice,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct CartProduct {
    #[serde(deserialize_with = "nullable::or_default")]
    pub code: String,
    #[serde(deserialize_with = "nullable::or_default")]
    pub name: String,
    #[serde(deserialize_with = "nullable::or_default")]
    pub quantity: i64,
    pub price: FlexiblePrice,
    #[serde(deserialize_with = "nullable::or_default")]
    pub image: CartImage,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct CartImage {
    #[serde(deserialize_with = "nullable::or_default")]
    pub url: String,
}

impl From<CartResponse> for Cart {
    fn from(response: CartResponse) -> Self {
        let items = response
            .products
            .into_iter()
            .map(|p| {
                let quantity = u32::try_from(p.quantity).unwrap_or(0);
                CartItem::new(p.code, p.name, quantity, p.price.amount(), p.image.url)
            })
            .collect();
        Self::new(
            items,
            response.total_price.amount(),
            response.delivery_fee.amount(),
            response.picking_fee.amount(),
        )
    }
}

/// Body of an add-products (or set-quantity) call.
#[derive(Debug, Serialize)]
pub(crate) struct AddProductsRequest<'a> {
    pub products: [AddProduct<'a>; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AddProduct<'a> {
    pub product_code_post: &'a str,
    pub qty: u32,
    pub pick_unit: &'static str,
    pub hide_discount_tool_tip: bool,
    pub no_replacement_flag: bool,
}

impl<'a> AddProductsRequest<'a> {
    /// Set `code` to exactly `qty` pieces. Zero removes the line.
    pub const fn single(code: &'a str, qty: u32) -> Self {
        Self {
            products: [AddProduct {
                product_code_post: code,
                qty,
                pick_unit: "pieces",
                hide_discount_tool_tip: false,
                no_replacement_flag: false,
            }],
        }
    }
}

// =============================================================================
// Delivery
// =============================================================================

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct DeliverabilityResponse {
    pub deliverable: bool,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct SlotsResponse {
    #[serde(deserialize_with = "nullable::or_default")]
    pub slots: Vec<WireSlot>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct WireSlot {
    #[serde(deserialize_with = "nullable::or_default")]
    pub code: String,
    /// Unix milliseconds.
    pub start_time: i64,
    /// Unix milliseconds.
    pub end_time: i64,
    #[serde(deserialize_with = "nullable::or_default")]
    pub delivery_cost: DeliveryCost,
    pub available: bool,
    #[serde(deserialize_with = "nullable::or_default")]
    pub tms_delivery_window_reference: SlotRouting,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct DeliveryCost {
    pub value: FlexiblePrice,
}

impl WireSlot {
    /// Convert to a [`TimeSlot`], rendering the window in `tz`.
    pub fn into_time_slot_in<Tz: TimeZone>(self, tz: &Tz) -> TimeSlot
    where
        Tz::Offset: std::fmt::Display,
    {
        let start = local_time(self.start_time, tz);
        let end = local_time(self.end_time, tz);
        TimeSlot {
            slot_id: self.code,
            date: start
                .as_ref()
                .map_or(NaiveDate::default(), DateTime::date_naive),
            start_time: format_hhmm(start.as_ref()),
            end_time: format_hhmm(end.as_ref()),
            fee: self.delivery_cost.value.amount(),
            available: self.available,
            routing: self.tms_delivery_window_reference,
        }
    }

    pub fn into_time_slot(self) -> TimeSlot {
        self.into_time_slot_in(&Local)
    }
}

fn local_time<Tz: TimeZone>(millis: i64, tz: &Tz) -> Option<DateTime<Tz>> {
    DateTime::from_timestamp_millis(millis).map(|utc| utc.with_timezone(tz))
}

fn format_hhmm<Tz: TimeZone>(time: Option<&DateTime<Tz>>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    time.map(|t| t.format("%H:%M").to_string()).unwrap_or_default()
}

/// Body echoed back when booking a slot: exactly its routing tokens.
#[must_use]
pub(crate) fn slot_selection_body(slot: &TimeSlot) -> serde_json::Value {
    serde_json::to_value(&slot.routing).unwrap_or(serde_json::Value::Null)
}

/// The picking fee is not reported by the slot listing; this is the store's
/// standard fee.
pub(crate) const DEFAULT_PICKING_FEE: Decimal = Decimal::from_parts(59, 0, 0, false, 0);
