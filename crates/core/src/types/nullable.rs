//! Serde helper for fields the store sometimes sends as `null`.

use serde::{Deserialize, Deserializer};

/// Deserialize a value, mapping an explicit `null` to `T::default()`.
pub fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}
