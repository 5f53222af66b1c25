//! Caller-supplied search preferences.

use serde::{Deserialize, Deserializer, Serialize};

/// How ranked results are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    /// Ascending unit compare price.
    Cheapest,
    /// Descending composite value score.
    BestValue,
    /// Descending label count, then ascending unit price.
    HighestQuality,
}

impl SortMode {
    /// Parse a sort mode name. Unknown names yield `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "cheapest" => Some(Self::Cheapest),
            "best_value" => Some(Self::BestValue),
            "highest_quality" => Some(Self::HighestQuality),
            _ => None,
        }
    }

    /// Wire name of this mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cheapest => "cheapest",
            Self::BestValue => "best_value",
            Self::HighestQuality => "highest_quality",
        }
    }
}

/// Filter and sort directives applied to search results.
///
/// Every field is optional; an unrecognized `sort_by` is treated as unset so
/// the results keep the store's order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchPreferences {
    /// Free-form price attitude: `cheapest`, `balanced` or `quality`.
    pub price_sensitivity: Option<String>,
    /// Upper bound on the unit compare price (kr/kg, kr/l). Ignored when `<= 0`.
    pub max_price_per_unit: Option<f64>,
    /// Labels that must all be present (case-insensitive substring match).
    pub required_labels: Vec<String>,
    /// Labels the caller likes; informational only.
    pub preferred_labels: Vec<String>,
    #[serde(deserialize_with = "lenient_sort_mode")]
    pub sort_by: Option<SortMode>,
}

fn lenient_sort_mode<'de, D>(deserializer: D) -> Result<Option<SortMode>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(SortMode::parse))
}
