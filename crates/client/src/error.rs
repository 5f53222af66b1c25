//! Error taxonomy for the Willys client.
//!
//! Callers branch on [`WillysError::kind`] to tell "fix your input"
//! ([`ErrorKind::Validation`]) apart from "session problem"
//! ([`ErrorKind::Authentication`]) and "upstream problem"
//! ([`ErrorKind::Api`], [`ErrorKind::NotFound`]).

use reqwest::StatusCode;
use thiserror::Error;
use willys_core::ValidationError;

/// Boxed underlying cause.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned by [`crate::WillysClient`].
#[derive(Debug, Error)]
pub enum WillysError {
    /// Input failed a local precondition. No request was sent.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Bootstrap failed, credentials were rejected, or the re-authentication
    /// budget is exhausted.
    #[error("{}", format_with_cause(.message, .source.as_deref()))]
    Authentication {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Non-success response, unreadable response, or transport failure.
    ///
    /// `status` is `None` when no response was received.
    #[error("{}", format_api_error(.status.as_ref(), .endpoint, .message, .source.as_deref()))]
    Api {
        status: Option<StatusCode>,
        endpoint: String,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The store reports the referenced resource does not exist.
    #[error("{resource} not found: {id}")]
    NotFound { resource: String, id: String },

    /// The caller cancelled before the request was dispatched.
    #[error("request to {endpoint} cancelled")]
    Cancelled { endpoint: String },
}

/// Discriminator for [`WillysError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Authentication,
    Api,
    NotFound,
    Cancelled,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Authentication => "authentication",
            Self::Api => "api",
            Self::NotFound => "not_found",
            Self::Cancelled => "cancelled",
        }
    }
}

impl WillysError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::Api { .. } => ErrorKind::Api,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    pub(crate) fn auth(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn auth_with(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Authentication {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub(crate) fn api(status: StatusCode, endpoint: &str, message: impl Into<String>) -> Self {
        Self::Api {
            status: Some(status),
            endpoint: endpoint.to_string(),
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn api_with(
        status: Option<StatusCode>,
        endpoint: &str,
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Api {
            status,
            endpoint: endpoint.to_string(),
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Wrap as an authentication failure, keeping cancellation distinct.
    pub(crate) fn into_auth(self, message: &str) -> Self {
        match self {
            Self::Cancelled { .. } => self,
            other => Self::auth_with(message, other),
        }
    }

    pub(crate) fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation(ValidationError::new(field, message))
    }

    /// HTTP status of an [`WillysError::Api`] error, if a response was received.
    #[must_use]
    pub const fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } => *status,
            _ => None,
        }
    }
}

fn format_with_cause(
    message: &str,
    source: Option<&(dyn std::error::Error + Send + Sync)>,
) -> String {
    match source {
        Some(cause) => format!("{message}: {cause}"),
        None => message.to_string(),
    }
}

fn format_api_error(
    status: Option<&StatusCode>,
    endpoint: &str,
    message: &str,
    source: Option<&(dyn std::error::Error + Send + Sync)>,
) -> String {
    let mut out = match status {
        Some(status) => format!(
            "{} ({})",
            status.canonical_reason().unwrap_or("Unknown Status"),
            status.as_u16()
        ),
        None => "Request failed".to_string(),
    };
    if !endpoint.is_empty() {
        out.push_str(" at ");
        out.push_str(endpoint);
    }
    if !message.is_empty() {
        out.push_str(": ");
        out.push_str(message);
    }
    format_with_cause(&out, source)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = WillysError::api(StatusCode::NOT_FOUND, "/axfood/rest/cart", "get cart failed");
        assert_eq!(
            err.to_string(),
            "Not Found (404) at /axfood/rest/cart: get cart failed"
        );
        assert_eq!(err.kind(), ErrorKind::Api);
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_api_error_without_response() {
        let cause = std::io::Error::other("connection reset");
        let err = WillysError::api_with(None, "/search", "search request failed", cause);
        assert_eq!(
            err.to_string(),
            "Request failed at /search: search request failed: connection reset"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_authentication_error_display() {
        assert_eq!(
            WillysError::auth("invalid username or password").to_string(),
            "invalid username or password"
        );
        let err = WillysError::auth_with(
            "failed to re-authenticate",
            WillysError::auth("invalid username or password"),
        );
        assert_eq!(
            err.to_string(),
            "failed to re-authenticate: invalid username or password"
        );
        assert_eq!(err.kind().as_str(), "authentication");
    }

    #[test]
    fn test_validation_and_not_found_display() {
        let err = WillysError::validation("quantity", "max 999");
        assert_eq!(err.to_string(), "quantity: max 999");
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = WillysError::NotFound {
            resource: "product".to_string(),
            id: "101233933_ST".to_string(),
        };
        assert_eq!(err.to_string(), "product not found: 101233933_ST");
        assert_eq!(err.kind().as_str(), "not_found");
    }
}
