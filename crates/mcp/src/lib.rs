//! Willys MCP - grocery tools for agents over the Model Context Protocol.
//!
//! Exposes search, cart and delivery operations of [`willys_client`] as MCP
//! tools on a line-delimited JSON-RPC stdio transport.
//!
//! # Modules
//!
//! - [`config`] - Server configuration
//! - [`error`] - Tool-level errors and their structured payload
//! - [`protocol`] - JSON-RPC message types
//! - [`server`] - Stdio server loop
//! - [`tools`] - Tool catalog and executor

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod tools;

pub use config::{Overrides, ServerConfig};
pub use error::ToolError;
pub use server::Server;
pub use tools::{Tool, ToolExecutor, willys_tools};
