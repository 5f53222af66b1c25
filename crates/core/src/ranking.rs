//! Preference-driven filtering and ordering of search results.
//!
//! [`rank_products`] is a pure function: the same inputs always produce the
//! same output. Filters run first, then the sort selected by
//! [`SearchPreferences::sort_by`]. Ties are left in their incoming order.

use core::cmp::Ordering;

use rust_decimal::prelude::ToPrimitive;

use crate::types::{Product, SearchPreferences, SortMode};

/// Labels that earn the best-value quality bonus (matched as lowercase substrings).
pub const QUALITY_LABELS: [&str; 4] = ["krav", "ekologisk", "nyckelhål", "svensk"];

const QUALITY_BONUS: f64 = 10.0;
const SAVINGS_WEIGHT: f64 = 0.5;

/// Filter and order products according to `preferences`.
#[must_use]
pub fn rank_products(products: Vec<Product>, preferences: &SearchPreferences) -> Vec<Product> {
    let required: Vec<String> = preferences
        .required_labels
        .iter()
        .map(|l| l.to_lowercase())
        .collect();
    let ceiling = preferences.max_price_per_unit.filter(|max| *max > 0.0);

    let mut ranked: Vec<Product> = products
        .into_iter()
        .filter(|p| ceiling.is_none_or(|max| p.unit_price() <= max))
        .filter(|p| has_all_labels(p, &required))
        .collect();

    match preferences.sort_by {
        Some(SortMode::Cheapest) => {
            ranked.sort_by(|a, b| a.unit_price().total_cmp(&b.unit_price()));
        }
        Some(SortMode::BestValue) => {
            ranked.sort_by(|a, b| value_score(b).total_cmp(&value_score(a)));
        }
        Some(SortMode::HighestQuality) => ranked.sort_by(by_quality),
        None => {}
    }

    ranked
}

/// Composite best-value score. Higher is better.
///
/// `100 / unit price`, plus a bonus for every label that matches one of
/// [`QUALITY_LABELS`], plus half of any positive savings amount.
#[must_use]
pub fn value_score(product: &Product) -> f64 {
    let unit_price = product.unit_price();
    let mut score = if unit_price > 0.0 {
        100.0 / unit_price
    } else {
        0.0
    };

    score += QUALITY_BONUS * f64::from(quality_label_count(product));

    if let Some(savings) = product.savings_amount.and_then(|s| s.to_f64())
        && savings > 0.0
    {
        score += savings * SAVINGS_WEIGHT;
    }

    score
}

fn quality_label_count(product: &Product) -> u32 {
    let matching = product
        .labels
        .iter()
        .filter(|label| {
            let label = label.to_lowercase();
            QUALITY_LABELS.iter().any(|q| label.contains(q))
        })
        .count();
    u32::try_from(matching).unwrap_or(u32::MAX)
}

fn has_all_labels(product: &Product, required_lowercase: &[String]) -> bool {
    if required_lowercase.is_empty() {
        return true;
    }
    let labels: Vec<String> = product.labels.iter().map(|l| l.to_lowercase()).collect();
    required_lowercase
        .iter()
        .all(|req| labels.iter().any(|label| label.contains(req.as_str())))
}

fn by_quality(a: &Product, b: &Product) -> Ordering {
    b.labels
        .len()
        .cmp(&a.labels.len())
        .then_with(|| a.unit_price().total_cmp(&b.unit_price()))
}
