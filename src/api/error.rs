//! API error types for the Lighthouse client.

use thiserror::Error;

/// Errors that can occur when interacting with the Lighthouse API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network or HTTP transport error.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server answered with a status other than the one the operation expects.
    #[error("{}", unexpected_status_message(*status, *expected, message.as_deref()))]
    UnexpectedStatus {
        /// Status code returned by the server.
        status: u16,
        /// Status code the operation expected.
        expected: u16,
        /// Error message extracted from the response body, if any.
        message: Option<String>,
    },

    /// The response body could not be decoded.
    #[error("Invalid API response: {0}")]
    Decode(String),

    /// A name or title lookup found no match.
    #[error("{0}")]
    NotFound(String),

    /// A ticket number could not be parsed.
    #[error("invalid ticket number {0:?}")]
    InvalidTicketNumber(String),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A token, email or password that cannot be sent in a header.
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Keyring error when storing/retrieving tokens.
    #[error("Keyring error: {0}")]
    Keyring(String),
}

/// Result type for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    /// Create an error for a status mismatch.
    pub fn from_status(status: reqwest::StatusCode, expected: reqwest::StatusCode, message: Option<String>) -> Self {
        ApiError::UnexpectedStatus {
            status: status.as_u16(),
            expected: expected.as_u16(),
            message,
        }
    }

    /// The HTTP status carried by this error, if it came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::UnexpectedStatus { status, .. } => Some(*status),
            ApiError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the server rejected the credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status(), Some(401))
    }

    /// Whether the error means the resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_)) || matches!(self.status(), Some(404))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}

fn unexpected_status_message(status: u16, expected: u16, message: Option<&str>) -> String {
    match message {
        Some(msg) => format!("Lighthouse API error (HTTP {}): {}", status, msg),
        None => format!("unexpected HTTP status {}, expected {}", status, expected),
    }
}
