//! Tool-level errors.
//!
//! Every failure is reported to the caller as a tool result flagged as an
//! error, carrying `{kind, message}`. Protocol-level failures (malformed
//! JSON-RPC) are handled in [`crate::server`] instead.

use serde_json::json;
use thiserror::Error;
use willys_client::WillysError;
use willys_core::ValidationError;

/// Errors that can occur while executing a tool.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The client rejected the input or the store call failed.
    #[error(transparent)]
    Client(#[from] WillysError),

    /// A tool-level precondition failed before any store call.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Arguments did not match the tool's input schema.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

impl ToolError {
    /// Stable machine-readable category.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Client(e) => e.kind().as_str(),
            Self::Validation(_) => "validation",
            Self::InvalidArguments(_) => "invalid_arguments",
            Self::UnknownTool(_) => "unknown_tool",
        }
    }

    /// Structured error body returned to the caller.
    #[must_use]
    pub fn to_payload(&self) -> serde_json::Value {
        json!({
            "kind": self.kind(),
            "message": self.to_string(),
        })
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidArguments(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_kinds() {
        let err = ToolError::UnknownTool("order_pizza".to_string());
        assert_eq!(
            err.to_payload(),
            json!({"kind": "unknown_tool", "message": "unknown tool: order_pizza"})
        );

        let err = ToolError::from(ValidationError::new("time_slot", "cannot be empty"));
        assert_eq!(err.kind(), "validation");
        assert_eq!(err.to_string(), "time_slot: cannot be empty");

        let err = ToolError::from(WillysError::NotFound {
            resource: "product".to_string(),
            id: "1_ST".to_string(),
        });
        assert_eq!(err.kind(), "not_found");
        assert_eq!(err.to_string(), "product not found: 1_ST");
    }

    #[test]
    fn test_serde_errors_are_invalid_arguments() {
        let err: ToolError = serde_json::from_str::<u32>("\"x\"").unwrap_err().into();
        assert_eq!(err.kind(), "invalid_arguments");
    }
}
