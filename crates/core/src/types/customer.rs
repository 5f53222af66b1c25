//! Logged-in customer profile.

use serde::{Deserialize, Serialize};

use super::nullable;

/// Profile of the account the session is logged in as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomerInfo {
    #[serde(deserialize_with = "nullable::or_default")]
    pub customer_id: String,
    #[serde(deserialize_with = "nullable::or_default")]
    pub email: String,
    #[serde(deserialize_with = "nullable::or_default")]
    pub first_name: String,
    #[serde(deserialize_with = "nullable::or_default")]
    pub last_name: String,
    #[serde(deserialize_with = "nullable::or_default")]
    pub phone_number: String,
    /// Member of the Willys Plus loyalty programme.
    #[serde(deserialize_with = "nullable::or_default")]
    pub plus_customer: bool,
}
