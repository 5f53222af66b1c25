//! Grocery tool definitions and executor.
//!
//! Provides tools for searching the catalog, editing the cart, booking a
//! home delivery slot and getting the checkout link.

use std::fmt::Write as _;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;
use willys_client::WillysClient;
use willys_core::validation::{validate_delivery_date, validate_time_slot};
use willys_core::{
    DeliveryAddress, SearchPreferences, TimeSlot, ValidationError, available_windows_by_date,
};

use crate::error::ToolError;

const DEFAULT_PAGE_SIZE: u32 = 30;
const CHECKOUT_MESSAGE: &str = "Visit this URL to complete payment";

/// A tool definition as listed by `tools/list`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: serde_json::Value,
}

/// Get the list of grocery tools.
#[must_use]
pub fn willys_tools() -> Vec<Tool> {
    vec![
        Tool {
            name: "search_groceries".to_string(),
            description: "Search for products on Willys.se with optional filters and sorting. Returns matching products with prices, compare prices and labels.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query for products (e.g., 'mjölk', 'bröd', 'grönsaker')"
                    },
                    "page": {
                        "type": "integer",
                        "description": "Page number for pagination (default 0)",
                        "minimum": 0
                    },
                    "size": {
                        "type": "integer",
                        "description": "Number of results per page (1-100, default 30)",
                        "minimum": 1,
                        "maximum": 100
                    },
                    "preferences": {
                        "type": "object",
                        "description": "Search preferences for filtering and sorting",
                        "properties": {
                            "price_sensitivity": {
                                "type": "string",
                                "description": "Price preference: 'cheapest', 'balanced', or 'quality'"
                            },
                            "max_price_per_unit": {
                                "type": "number",
                                "description": "Maximum price per unit (kr/kg or kr/l)"
                            },
                            "required_labels": {
                                "type": "array",
                                "items": { "type": "string" },
                                "description": "Labels every result must carry (e.g., ['KRAV', 'Ekologisk'])"
                            },
                            "preferred_labels": {
                                "type": "array",
                                "items": { "type": "string" },
                                "description": "Labels you prefer"
                            },
                            "sort_by": {
                                "type": "string",
                                "enum": ["cheapest", "best_value", "highest_quality"],
                                "description": "Sort method"
                            }
                        }
                    }
                },
                "required": ["query"]
            }),
        },
        Tool {
            name: "add_to_cart".to_string(),
            description: "Add a product to the cart. Returns the updated cart.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "product_code": {
                        "type": "string",
                        "description": "Product code in format {id}_{ST|KG} (e.g., '101233933_ST')"
                    },
                    "quantity": {
                        "type": "integer",
                        "description": "Quantity to add (1-999, default 1)",
                        "minimum": 1,
                        "maximum": 999
                    }
                },
                "required": ["product_code"]
            }),
        },
        Tool {
            name: "view_cart".to_string(),
            description: "View current cart contents, fees and totals.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
        },
        Tool {
            name: "remove_from_cart".to_string(),
            description: "Remove a product from the cart, entirely or by a quantity. Returns the updated cart.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "product_code": {
                        "type": "string",
                        "description": "Product code to remove"
                    },
                    "quantity": {
                        "type": "integer",
                        "description": "Quantity to remove (default: removes all)"
                    }
                },
                "required": ["product_code"]
            }),
        },
        Tool {
            name: "get_available_time_slots".to_string(),
            description: "Get home delivery time slots for a postal code.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "postal_code": {
                        "type": "string",
                        "description": "Postal code to check availability for (e.g., '11151')"
                    }
                },
                "required": ["postal_code"]
            }),
        },
        Tool {
            name: "select_delivery_time".to_string(),
            description: "Set the delivery address and book a delivery time slot.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "address": {
                        "type": "object",
                        "description": "Delivery address",
                        "properties": {
                            "first_name": { "type": "string", "description": "Recipient's first name" },
                            "last_name": { "type": "string", "description": "Recipient's last name" },
                            "address": { "type": "string", "description": "Street address (e.g., 'Drottninggatan 1')" },
                            "postal_code": { "type": "string", "description": "Postal code (e.g., '11151')" },
                            "city": { "type": "string", "description": "City name (e.g., 'Stockholm')" },
                            "door_code": { "type": "string", "description": "Optional door code for building access" },
                            "message_to_driver": { "type": "string", "description": "Optional message to the driver" }
                        },
                        "required": ["first_name", "last_name", "address", "postal_code", "city"]
                    },
                    "delivery_date": {
                        "type": "string",
                        "description": "Delivery date as YYYY-MM-DD, at most 14 days ahead"
                    },
                    "time_slot": {
                        "type": "string",
                        "description": "Time slot in format 'HH:MM-HH:MM' (e.g., '15:00-17:00')"
                    }
                },
                "required": ["address", "delivery_date", "time_slot"]
            }),
        },
        Tool {
            name: "proceed_to_checkout".to_string(),
            description: "Get the checkout URL to complete payment.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
        },
    ]
}

// =============================================================================
// Arguments
// =============================================================================

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    page: u32,
    #[serde(default = "default_page_size")]
    size: u32,
    #[serde(default)]
    preferences: Option<SearchPreferences>,
}

const fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

#[derive(Debug, Deserialize)]
struct AddToCartArgs {
    product_code: String,
    #[serde(default = "default_quantity")]
    quantity: i64,
}

const fn default_quantity() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
struct RemoveFromCartArgs {
    product_code: String,
    #[serde(default)]
    quantity: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TimeSlotsArgs {
    postal_code: String,
}

#[derive(Debug, Deserialize)]
struct SelectDeliveryArgs {
    address: AddressArgs,
    delivery_date: String,
    time_slot: String,
}

/// Address as callers send it; blank fields are left for validation to report.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AddressArgs {
    first_name: String,
    last_name: String,
    address: String,
    postal_code: String,
    city: String,
    door_code: Option<String>,
    message_to_driver: Option<String>,
}

impl From<AddressArgs> for DeliveryAddress {
    fn from(args: AddressArgs) -> Self {
        Self {
            first_name: args.first_name,
            last_name: args.last_name,
            address: args.address,
            postal_code: args.postal_code,
            city: args.city,
            door_code: args.door_code.filter(|c| !c.is_empty()),
            message_to_driver: args.message_to_driver.filter(|m| !m.is_empty()),
        }
    }
}

fn parse_args<T: DeserializeOwned>(input: &serde_json::Value) -> Result<T, ToolError> {
    let input = if input.is_null() { json!({}) } else { input.clone() };
    Ok(serde_json::from_value(input)?)
}

// =============================================================================
// Executor
// =============================================================================

/// Executor for grocery tools.
///
/// Handles tool execution by mapping tool names to client calls.
pub struct ToolExecutor {
    client: WillysClient,
}

impl ToolExecutor {
    #[must_use]
    pub const fn new(client: WillysClient) -> Self {
        Self { client }
    }

    /// Execute a tool and return its JSON result.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown tools, malformed arguments or failed calls.
    #[instrument(skip(self, input), fields(tool_name = %name))]
    pub async fn execute(
        &self,
        name: &str,
        input: &serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        match name {
            "search_groceries" => self.search_groceries(parse_args(input)?).await,
            "add_to_cart" => self.add_to_cart(parse_args(input)?).await,
            "view_cart" => self.view_cart().await,
            "remove_from_cart" => self.remove_from_cart(parse_args(input)?).await,
            "get_available_time_slots" => self.get_available_time_slots(parse_args(input)?).await,
            "select_delivery_time" => self.select_delivery_time(parse_args(input)?).await,
            "proceed_to_checkout" => Ok(self.proceed_to_checkout()),
            _ => Err(ToolError::UnknownTool(name.to_string())),
        }
    }

    async fn search_groceries(&self, args: SearchArgs) -> Result<serde_json::Value, ToolError> {
        let products = self
            .client
            .search_products(&args.query, args.page, args.size, args.preferences.as_ref())
            .await?;
        Ok(json!({
            "count": products.len(),
            "products": products,
        }))
    }

    async fn add_to_cart(&self, args: AddToCartArgs) -> Result<serde_json::Value, ToolError> {
        let cart = self.client.add_to_cart(&args.product_code, args.quantity).await?;
        Ok(serde_json::to_value(cart)?)
    }

    async fn view_cart(&self) -> Result<serde_json::Value, ToolError> {
        let cart = self.client.get_cart().await?;
        Ok(serde_json::to_value(cart)?)
    }

    async fn remove_from_cart(
        &self,
        args: RemoveFromCartArgs,
    ) -> Result<serde_json::Value, ToolError> {
        // Zero or negative means the whole line.
        let quantity = args.quantity.and_then(|q| u32::try_from(q).ok());
        let cart = self
            .client
            .remove_from_cart(&args.product_code, quantity)
            .await?;
        Ok(serde_json::to_value(cart)?)
    }

    async fn get_available_time_slots(
        &self,
        args: TimeSlotsArgs,
    ) -> Result<serde_json::Value, ToolError> {
        let slots = self.client.get_available_time_slots(&args.postal_code).await?;
        Ok(json!({
            "count": slots.len(),
            "slots": slots,
        }))
    }

    async fn select_delivery_time(
        &self,
        args: SelectDeliveryArgs,
    ) -> Result<serde_json::Value, ToolError> {
        let (start, end) = validate_time_slot(&args.time_slot)?;
        let date = validate_delivery_date(&args.delivery_date)?;
        let address = DeliveryAddress::from(args.address);

        let slots = self
            .client
            .get_available_time_slots(&address.postal_code)
            .await?;
        if slots.is_empty() {
            return Err(ValidationError::new(
                "postal_code",
                format!("no delivery slots available for postal code {}", address.postal_code),
            )
            .into());
        }

        let Some(slot) = slots.iter().find(|s| s.matches(date, &start, &end)) else {
            return Err(ValidationError::new(
                "time_slot",
                no_match_message(date, &start, &end, &slots),
            )
            .into());
        };

        let info = self.client.setup_delivery(&address, slot).await?;
        Ok(serde_json::to_value(info)?)
    }

    fn proceed_to_checkout(&self) -> serde_json::Value {
        json!({
            "checkout_url": self.client.checkout_url(),
            "message": CHECKOUT_MESSAGE,
        })
    }
}

/// Explain a failed slot match, listing what can be booked instead.
fn no_match_message(date: NaiveDate, start: &str, end: &str, slots: &[TimeSlot]) -> String {
    let mut message = format!("no matching time slot found for {date} {start}-{end}.");
    let available = available_windows_by_date(slots);
    if available.is_empty() {
        message.push_str(" No slots are currently available.");
    } else {
        message.push_str(" Available slots:");
        for (day, windows) in &available {
            let _ = write!(message, "\n{day}: {}", windows.join(", "));
        }
    }
    message.push_str("\nUse get_available_time_slots to see all options.");
    message
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;
    use willys_core::SlotRouting;

    use super::*;

    fn slot(date: &str, start: &str, end: &str, available: bool) -> TimeSlot {
        TimeSlot {
            slot_id: format!("{date}_{start}"),
            date: date.parse().unwrap(),
            start_time: start.to_string(),
            end_time: end.to_string(),
            fee: Decimal::new(49, 0),
            available,
            routing: SlotRouting::default(),
        }
    }

    #[test]
    fn test_catalog_names_and_schemas() {
        let tools = willys_tools();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "search_groceries",
                "add_to_cart",
                "view_cart",
                "remove_from_cart",
                "get_available_time_slots",
                "select_delivery_time",
                "proceed_to_checkout",
            ]
        );
        for tool in &tools {
            assert_eq!(tool.input_schema["type"], "object", "{}", tool.name);
        }
        let listed = serde_json::to_value(&tools[0]).unwrap();
        assert!(listed.get("inputSchema").is_some());
    }

    #[test]
    fn test_search_args_defaults() {
        let args: SearchArgs = parse_args(&json!({"query": "mjölk"})).unwrap();
        assert_eq!(args.page, 0);
        assert_eq!(args.size, DEFAULT_PAGE_SIZE);
        assert!(args.preferences.is_none());

        let args: SearchArgs = parse_args(&json!({
            "query": "kaffe",
            "preferences": {"sort_by": "best_value", "required_labels": ["KRAV"]}
        }))
        .unwrap();
        let prefs = args.preferences.unwrap();
        assert_eq!(prefs.sort_by, Some(willys_core::SortMode::BestValue));
        assert_eq!(prefs.required_labels, vec!["KRAV".to_string()]);
    }

    #[test]
    fn test_missing_required_argument() {
        let err = parse_args::<SearchArgs>(&serde_json::Value::Null).unwrap_err();
        assert_eq!(err.kind(), "invalid_arguments");
        let err = parse_args::<AddToCartArgs>(&json!({"quantity": 2})).unwrap_err();
        assert!(err.to_string().contains("product_code"));
    }

    #[test]
    fn test_address_args_conversion() {
        let args: AddressArgs = parse_args(&json!({
            "first_name": "Anna",
            "last_name": "Svensson",
            "address": "Drottninggatan 1",
            "postal_code": "11151",
            "city": "Stockholm",
            "door_code": ""
        }))
        .unwrap();
        let address = DeliveryAddress::from(args);
        assert_eq!(address.city, "Stockholm");
        assert!(address.door_code.is_none());
        assert!(address.message_to_driver.is_none());
    }

    #[test]
    fn test_no_match_message_groups_by_date() {
        let slots = vec![
            slot("2026-10-16", "08:00", "10:00", true),
            slot("2026-10-15", "15:00", "17:00", true),
            slot("2026-10-15", "17:00", "19:00", false),
            slot("2026-10-15", "19:00", "21:00", true),
        ];
        let date = "2026-10-15".parse().unwrap();
        let message = no_match_message(date, "17:00", "19:00", &slots);
        assert_eq!(
            message,
            "no matching time slot found for 2026-10-15 17:00-19:00. Available slots:\n\
             2026-10-15: 15:00-17:00, 19:00-21:00\n\
             2026-10-16: 08:00-10:00\n\
             Use get_available_time_slots to see all options."
        );
    }

    #[test]
    fn test_no_match_message_nothing_available() {
        let slots = vec![slot("2026-10-15", "15:00", "17:00", false)];
        let date = "2026-10-15".parse().unwrap();
        let message = no_match_message(date, "15:00", "17:00", &slots);
        assert!(message.contains("No slots are currently available."));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let executor = ToolExecutor::new(WillysClient::new("http://127.0.0.1:9").unwrap());
        let err = executor.execute("order_pizza", &json!({})).await.unwrap_err();
        assert_eq!(err.kind(), "unknown_tool");
    }

    #[tokio::test]
    async fn test_checkout_needs_no_network() {
        let executor = ToolExecutor::new(WillysClient::new("https://www.willys.se").unwrap());
        let result = executor.execute("proceed_to_checkout", &json!({})).await.unwrap();
        assert_eq!(result["checkout_url"], "https://www.willys.se/kassa");
        assert_eq!(result["message"], CHECKOUT_MESSAGE);
    }

    #[tokio::test]
    async fn test_validation_runs_before_network() {
        let executor = ToolExecutor::new(WillysClient::new("http://127.0.0.1:9").unwrap());
        let err = executor
            .execute("add_to_cart", &json!({"product_code": "not-a-code"}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");

        let err = executor
            .execute(
                "select_delivery_time",
                &json!({"address": {}, "delivery_date": "2026-10-15", "time_slot": "17:00-15:00"}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(err.to_string().starts_with("time_slot"));
    }
}
