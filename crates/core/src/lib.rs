//! Willys Core - Shared types library.
//!
//! This crate provides the domain types used across the Willys agent:
//! - `client` - Authenticated session and domain operations against willys.se
//! - `mcp` - Tool catalog and stdio server exposing those operations
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients. Everything here can be unit tested without a network.
//!
//! # Modules
//!
//! - [`types`] - Products, carts, delivery slots and their wire-tolerant parsing
//! - [`validation`] - Local preconditions checked before any request is sent
//! - [`ranking`] - Preference-driven filtering and ordering of search results

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod ranking;
pub mod types;
pub mod validation;

pub use ranking::rank_products;
pub use types::*;
pub use validation::ValidationError;
