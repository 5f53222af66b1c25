//! Home delivery types: address, time slots and the resulting booking.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Where a home delivery goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAddress {
    pub first_name: String,
    pub last_name: String,
    /// Street address, e.g. `"Drottninggatan 1"`.
    pub address: String,
    pub postal_code: String,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub door_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_to_driver: Option<String>,
}

/// Routing tokens issued by the store's transport planner.
///
/// These are opaque: they are read from the slot listing and must be sent
/// back unmodified when the slot is booked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SlotRouting {
    /// Window start, Unix milliseconds.
    pub earliest_date_time: i64,
    /// Window end, Unix milliseconds.
    pub latest_date_time: i64,
    #[serde(rename = "routeID")]
    pub route_id: i64,
    pub resource_key: String,
    pub schedule_key: String,
    pub preceding_stop_id: i64,
    pub stop_number: i64,
    pub profitability: f64,
}

/// A bookable delivery window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    pub slot_id: String,
    pub date: NaiveDate,
    /// Local start time, `HH:MM`.
    pub start_time: String,
    /// Local end time, `HH:MM`.
    pub end_time: String,
    pub fee: Decimal,
    pub available: bool,
    #[serde(flatten)]
    pub routing: SlotRouting,
}

impl TimeSlot {
    /// Returns `true` if this is an available slot for exactly this window.
    #[must_use]
    pub fn matches(&self, date: NaiveDate, start: &str, end: &str) -> bool {
        self.available && self.date == date && self.start_time == start && self.end_time == end
    }

    /// Window formatted as `HH:MM-HH:MM`.
    #[must_use]
    pub fn window(&self) -> String {
        format!("{}-{}", self.start_time, self.end_time)
    }
}

/// Group the windows of available slots by date, earliest date first.
#[must_use]
pub fn available_windows_by_date(slots: &[TimeSlot]) -> BTreeMap<NaiveDate, Vec<String>> {
    let mut grouped: BTreeMap<NaiveDate, Vec<String>> = BTreeMap::new();
    for slot in slots.iter().filter(|s| s.available) {
        grouped.entry(slot.date).or_default().push(slot.window());
    }
    grouped
}

/// Outcome of a completed delivery setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryInfo {
    pub address: DeliveryAddress,
    pub time_slot: TimeSlot,
    pub picking_fee: Decimal,
    pub delivery_fee: Decimal,
    pub total_fee: Decimal,
}

impl DeliveryInfo {
    /// Combine a booked slot with the store's picking fee.
    #[must_use]
    pub fn new(address: DeliveryAddress, time_slot: TimeSlot, picking_fee: Decimal) -> Self {
        let delivery_fee = time_slot.fee;
        Self {
            address,
            time_slot,
            picking_fee,
            delivery_fee,
            total_fee: picking_fee + delivery_fee,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn slot(date: &str, start: &str, end: &str, available: bool) -> TimeSlot {
        TimeSlot {
            slot_id: format!("{date}-{start}"),
            date: date.parse().unwrap(),
            start_time: start.to_string(),
            end_time: end.to_string(),
            fee: Decimal::new(49, 0),
            available,
            routing: SlotRouting::default(),
        }
    }

    #[test]
    fn test_slot_matches_only_available_exact_window() {
        let date: NaiveDate = "2026-10-15".parse().unwrap();
        assert!(slot("2026-10-15", "15:00", "17:00", true).matches(date, "15:00", "17:00"));
        assert!(!slot("2026-10-15", "15:00", "17:00", false).matches(date, "15:00", "17:00"));
        assert!(!slot("2026-10-15", "15:00", "17:00", true).matches(date, "15:00", "18:00"));
        assert!(!slot("2026-10-16", "15:00", "17:00", true).matches(date, "15:00", "17:00"));
    }

    #[test]
    fn test_available_windows_grouped_and_sorted() {
        let slots = vec![
            slot("2026-10-16", "08:00", "10:00", true),
            slot("2026-10-15", "15:00", "17:00", true),
            slot("2026-10-15", "17:00", "19:00", false),
            slot("2026-10-15", "19:00", "21:00", true),
        ];
        let grouped = available_windows_by_date(&slots);
        let dates: Vec<String> = grouped.keys().map(ToString::to_string).collect();
        assert_eq!(dates, vec!["2026-10-15", "2026-10-16"]);
        assert_eq!(
            grouped.values().next().unwrap(),
            &vec!["15:00-17:00".to_string(), "19:00-21:00".to_string()]
        );
    }

    #[test]
    fn test_routing_uses_store_field_names() {
        let routing = SlotRouting {
            earliest_date_time: 1_760_533_200_000,
            latest_date_time: 1_760_540_400_000,
            route_id: 42,
            resource_key: "R1".to_string(),
            schedule_key: "S9".to_string(),
            preceding_stop_id: 7,
            stop_number: 8,
            profitability: 0.75,
        };
        let value = serde_json::to_value(&routing).unwrap();
        assert_eq!(value["routeID"], 42);
        assert_eq!(value["earliestDateTime"], 1_760_533_200_000_i64);
        assert_eq!(value["precedingStopId"], 7);
        assert_eq!(value["profitability"], 0.75);
    }

    #[test]
    fn test_delivery_info_totals() {
        let info = DeliveryInfo::new(
            DeliveryAddress::default(),
            slot("2026-10-15", "15:00", "17:00", true),
            Decimal::new(59, 0),
        );
        assert_eq!(info.delivery_fee, Decimal::new(49, 0));
        assert_eq!(info.total_fee, Decimal::new(108, 0));
    }
}
