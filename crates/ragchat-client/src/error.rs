//! Client error types.

use thiserror::Error;

/// Message reported when a token refresh fails.
pub const AUTH_FAILED_MESSAGE: &str = "Authentication failed";

/// Message reported when no response could be obtained at all.
pub const NETWORK_ERROR_MESSAGE: &str = "Network error";

/// Client error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport failure, no response was obtained.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Server returned a non-success response.
    #[error("API error ({status}): {detail}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Detail message from the server, or a generic fallback.
        detail: String,
    },

    /// A stream event payload could not be decoded.
    #[error("Failed to parse '{event}' event: {message}")]
    Parse {
        /// Event name the payload belonged to.
        event: String,
        /// Decoder message.
        message: String,
    },

    /// The access token could not be refreshed.
    #[error("{}", AUTH_FAILED_MESSAGE)]
    AuthFailed,

    /// Failure while reading an open stream.
    #[error("Stream error: {0}")]
    Stream(String),

    /// Request rejected before it was sent.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::AuthFailed => Some(401),
            Error::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Api { status: 404, .. })
    }

    /// Check if this is an authentication error.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Error::AuthFailed) || matches!(self, Error::Api { status: 401, .. })
    }

    /// Check if this is a rate limit error.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::Api { status: 429, .. })
    }

    /// Check if this is a server error.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Error::Api { status, .. } if *status >= 500)
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error body returned by the server.
///
/// `detail` is a plain string for application errors and a list of
/// field errors for request validation failures.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct ErrorResponse {
    pub detail: serde_json::Value,
}

impl ErrorResponse {
    /// Flatten the detail into a single display message.
    pub(crate) fn message(&self) -> String {
        match &self.detail {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Array(items) => {
                let parts: Vec<String> = items
                    .iter()
                    .map(|item| {
                        item.get("msg")
                            .and_then(|m| m.as_str())
                            .map(str::to_string)
                            .unwrap_or_else(|| item.to_string())
                    })
                    .collect();
                parts.join("; ")
            }
            other => other.to_string(),
        }
    }
}

/// Decode an error body, falling back to a generic message.
pub(crate) fn error_detail(status: u16, body: &[u8]) -> String {
    serde_json::from_slice::<ErrorResponse>(body)
        .map(|e| e.message())
        .unwrap_or_else(|_| format!("HTTP {}", status))
}
