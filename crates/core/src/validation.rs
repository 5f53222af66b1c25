//! Input validation.
//!
//! Every check here runs before a request is built. A [`ValidationError`]
//! therefore always means "fix your input" and never "the store said no".

use std::sync::LazyLock;

use chrono::{Days, Local, NaiveDate, NaiveTime};
use regex::Regex;
use thiserror::Error;

use crate::types::DeliveryAddress;

static POSTAL_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{5}$|^[0-9]{3} [0-9]{2}$").expect("Invalid regex")
});

static PRODUCT_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+_(ST|KG)$").expect("Invalid regex"));

static TIME_OF_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([01][0-9]|2[0-3]):([0-5][0-9])$").expect("Invalid regex")
});

pub const MAX_QUANTITY: u32 = 999;
pub const MAX_PAGE_SIZE: u32 = 100;
pub const MAX_DELIVERY_DAYS_AHEAD: u64 = 14;

const MAX_NAME_LENGTH: usize = 50;
const MAX_ADDRESS_LENGTH: usize = 100;
const MAX_CITY_LENGTH: usize = 50;
const MAX_DOOR_CODE_LENGTH: usize = 20;
const MAX_MESSAGE_LENGTH: usize = 500;

/// A local precondition failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", format_validation_error(.field, .message))]
pub struct ValidationError {
    /// Name of the offending input, e.g. `postal_code`.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

fn format_validation_error(field: &str, message: &str) -> String {
    if field.is_empty() {
        message.to_string()
    } else {
        format!("{field}: {message}")
    }
}

/// Validate a Swedish postal code (`12345` or `123 45`).
///
/// # Errors
///
/// Returns an error if the code is empty or malformed.
pub fn validate_postal_code(postal_code: &str) -> Result<(), ValidationError> {
    if postal_code.is_empty() {
        return Err(ValidationError::new("postal_code", "cannot be empty"));
    }
    if !POSTAL_CODE.is_match(postal_code) {
        return Err(ValidationError::new(
            "postal_code",
            "invalid format (expected: 12345 or 123 45)",
        ));
    }
    Ok(())
}

/// Strip the optional space from a postal code (`123 45` -> `12345`).
#[must_use]
pub fn normalize_postal_code(postal_code: &str) -> String {
    postal_code.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Validate a product code such as `101233933_ST`.
///
/// # Errors
///
/// Returns an error if the code is empty or not `{digits}_{ST|KG}`.
pub fn validate_product_code(code: &str) -> Result<(), ValidationError> {
    if code.is_empty() {
        return Err(ValidationError::new("product_code", "cannot be empty"));
    }
    if !PRODUCT_CODE.is_match(code) {
        return Err(ValidationError::new(
            "product_code",
            "invalid format (expected: 123456_ST or 123456_KG)",
        ));
    }
    Ok(())
}

/// Validate a cart quantity and narrow it to `u32`.
///
/// # Errors
///
/// Returns an error if the quantity is outside `1..=999`.
pub fn validate_quantity(quantity: i64) -> Result<u32, ValidationError> {
    if quantity < 1 {
        return Err(ValidationError::new("quantity", "must be at least 1"));
    }
    u32::try_from(quantity)
        .ok()
        .filter(|q| *q <= MAX_QUANTITY)
        .ok_or_else(|| ValidationError::new("quantity", format!("max {MAX_QUANTITY}")))
}

/// Validate search parameters.
///
/// # Errors
///
/// Returns an error if the query is blank or the page size is outside `1..=100`.
pub fn validate_search(query: &str, size: u32) -> Result<(), ValidationError> {
    if query.trim().is_empty() {
        return Err(ValidationError::new("query", "search query cannot be empty"));
    }
    if size == 0 || size > MAX_PAGE_SIZE {
        return Err(ValidationError::new(
            "size",
            format!("page size must be between 1 and {MAX_PAGE_SIZE}"),
        ));
    }
    Ok(())
}

fn check_required(field: &str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "required"));
    }
    check_length(field, value, max)
}

fn check_length(field: &str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::new(field, format!("max {max} characters")));
    }
    Ok(())
}

/// Validate a delivery address.
///
/// # Errors
///
/// Returns an error naming the first missing or over-long field, or an
/// invalid postal code.
pub fn validate_delivery_address(address: &DeliveryAddress) -> Result<(), ValidationError> {
    check_required("first_name", &address.first_name, MAX_NAME_LENGTH)?;
    check_required("last_name", &address.last_name, MAX_NAME_LENGTH)?;
    check_required("address", &address.address, MAX_ADDRESS_LENGTH)?;
    check_required("city", &address.city, MAX_CITY_LENGTH)?;
    if let Some(door_code) = &address.door_code {
        check_length("door_code", door_code, MAX_DOOR_CODE_LENGTH)?;
    }
    if let Some(message) = &address.message_to_driver {
        check_length("message_to_driver", message, MAX_MESSAGE_LENGTH)?;
    }
    validate_postal_code(&address.postal_code)
}

/// Validate a delivery date against the local calendar.
///
/// # Errors
///
/// See [`validate_delivery_date_from`].
pub fn validate_delivery_date(date: &str) -> Result<NaiveDate, ValidationError> {
    validate_delivery_date_from(date, Local::now().date_naive())
}

/// Validate a `YYYY-MM-DD` delivery date within `[today, today + 14 days]`.
///
/// # Errors
///
/// Returns an error if the date is empty, malformed, in the past, or too far ahead.
pub fn validate_delivery_date_from(
    date: &str,
    today: NaiveDate,
) -> Result<NaiveDate, ValidationError> {
    if date.is_empty() {
        return Err(ValidationError::new("delivery_date", "cannot be empty"));
    }
    let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| {
        ValidationError::new("delivery_date", "invalid format (expected: YYYY-MM-DD)")
    })?;

    if parsed < today {
        return Err(ValidationError::new("delivery_date", "cannot be in the past"));
    }
    let latest = today
        .checked_add_days(Days::new(MAX_DELIVERY_DAYS_AHEAD))
        .unwrap_or(NaiveDate::MAX);
    if parsed > latest {
        return Err(ValidationError::new(
            "delivery_date",
            format!("max {MAX_DELIVERY_DAYS_AHEAD} days ahead"),
        ));
    }
    Ok(parsed)
}

/// Split an `HH:MM-HH:MM` window into its start and end.
///
/// # Errors
///
/// Returns an error if the window is empty, either time is not zero-padded
/// 24-hour `HH:MM`, or the end is not after the start.
pub fn validate_time_slot(time_slot: &str) -> Result<(String, String), ValidationError> {
    if time_slot.is_empty() {
        return Err(ValidationError::new("time_slot", "cannot be empty"));
    }

    let mut parts = time_slot.split('-');
    let (Some(start), Some(end), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(ValidationError::new(
            "time_slot",
            "invalid format (expected: HH:MM-HH:MM)",
        ));
    };
    let (start, end) = (start.trim(), end.trim());

    let start_time = parse_time_of_day(start)
        .ok_or_else(|| ValidationError::new("time_slot", format!("invalid start time: {start}")))?;
    let end_time = parse_time_of_day(end)
        .ok_or_else(|| ValidationError::new("time_slot", format!("invalid end time: {end}")))?;

    if end_time <= start_time {
        return Err(ValidationError::new(
            "time_slot",
            "end time must be after start time",
        ));
    }

    Ok((start.to_string(), end.to_string()))
}

fn parse_time_of_day(s: &str) -> Option<NaiveTime> {
    if !TIME_OF_DAY.is_match(s) {
        return None;
    }
    NaiveTime::parse_from_str(s, "%H:%M").ok()
}
