//! Core types for the Willys agent.
//!
//! Field names follow the camelCase JSON the store speaks, so most types
//! deserialize straight from response bodies.

pub mod cart;
pub mod customer;
pub mod delivery;
pub mod nullable;
pub mod preferences;
pub mod price;
pub mod product;

pub use cart::{Cart, CartItem};
pub use customer::CustomerInfo;
pub use delivery::{
    DeliveryAddress, DeliveryInfo, SlotRouting, TimeSlot, available_windows_by_date,
};
pub use preferences::{SearchPreferences, SortMode};
pub use price::{FlexiblePrice, parse_compare_price};
pub use product::{Product, ProductImage};
