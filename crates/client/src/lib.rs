//! Willys Client - authenticated access to willys.se.
//!
//! The store has no public API; this crate drives the endpoints its own web
//! frontend uses. A [`WillysClient`] owns one session (cookie store, CSRF
//! token, credentials) and transparently refreshes the token and logs in
//! again when the session expires.
//!
//! # Example
//!
//! ```rust,ignore
//! use willys_client::{HttpLoginBootstrap, WillysClient, WillysConfig};
//!
//! let config = WillysConfig::from_env()?;
//! let client = WillysClient::from_config(&config)?;
//! client
//!     .bootstrap(&HttpLoginBootstrap::default(), &config.username, &config.password)
//!     .await?;
//!
//! let products = client.search_products("mjölk", 0, 30, None).await?;
//! let cart = client.add_to_cart(&products[0].code, 2).await?;
//! ```
//!
//! # Modules
//!
//! - [`auth`] - Session bootstrap (browser or direct HTTP) and login
//! - [`config`] - Environment-driven configuration
//! - [`endpoints`] - Store paths
//! - [`error`] - Error taxonomy

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
pub mod config;
pub mod endpoints;
pub mod error;

mod cart;
mod delivery;
mod search;
mod session;
mod wire;

#[cfg(feature = "browser")]
pub use auth::BrowserBootstrap;
pub use auth::{HttpLoginBootstrap, SessionBootstrap, SessionCookie, validate_credentials};
pub use config::{BrowserSettings, ConfigError, LoginMode, WillysConfig};
pub use error::{BoxError, ErrorKind, WillysError};
pub use session::{Credentials, MAX_AUTH_RETRY_ATTEMPTS, WillysClient};

pub use willys_core;
