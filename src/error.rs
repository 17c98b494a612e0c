//! Custom error types for the Iron Dash application
//!
//! This module defines custom error types and implements the necessary traits
//! to properly handle errors throughout the application, including the mapping
//! from each error class to an HTTP response.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::fmt;

/// Main error type for the Iron Dash application
#[derive(Debug)]
pub enum IronDashError {
    /// Error occurred while parsing address
    AddressParse(std::net::AddrParseError),

    /// Filesystem error while reading or writing the document, favicon or icon cache
    Io(std::io::Error),

    /// Error occurred while parsing a hand-edited document
    ConfigParse(json5::Error),

    /// Error occurred while (de)serializing JSON
    Serialization(serde_json::Error),

    /// Malformed or missing request input; never touches storage
    Validation(String),

    /// A referenced identifier is absent from the document
    NotFound(String),

    /// An external fetch failed or returned unusable content
    Upstream(String),

    /// Generic error with a message
    Generic(String),
}

impl fmt::Display for IronDashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IronDashError::AddressParse(e) => {
                write!(f, "Failed to parse network address: {e}")
            }
            IronDashError::Io(e) => {
                write!(f, "Filesystem error: {e}")
            }
            IronDashError::ConfigParse(e) => {
                write!(f, "Failed to parse document: {e}")
            }
            IronDashError::Serialization(e) => {
                write!(f, "Serialization error: {e}")
            }
            IronDashError::Validation(msg) => {
                write!(f, "Invalid request: {msg}")
            }
            IronDashError::NotFound(what) => {
                write!(f, "Not found: {what}")
            }
            IronDashError::Upstream(msg) => {
                write!(f, "Upstream error: {msg}")
            }
            IronDashError::Generic(msg) => {
                write!(f, "Error: {msg}")
            }
        }
    }
}

impl std::error::Error for IronDashError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IronDashError::AddressParse(e) => Some(e),
            IronDashError::Io(e) => Some(e),
            IronDashError::ConfigParse(e) => Some(e),
            IronDashError::Serialization(e) => Some(e),
            IronDashError::Validation(_)
            | IronDashError::NotFound(_)
            | IronDashError::Upstream(_)
            | IronDashError::Generic(_) => None,
        }
    }
}

impl IronDashError {
    /// HTTP status code for this error class
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            IronDashError::Validation(_) => StatusCode::BAD_REQUEST,
            IronDashError::NotFound(_) => StatusCode::NOT_FOUND,
            IronDashError::Upstream(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message sent to API clients; only the payload, without the class prefix
    fn client_message(&self) -> String {
        match self {
            IronDashError::Validation(msg)
            | IronDashError::Upstream(msg)
            | IronDashError::Generic(msg) => msg.clone(),
            IronDashError::NotFound(what) => format!("{what} not found"),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for IronDashError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() && status != StatusCode::BAD_GATEWAY {
            tracing::error!("Request failed: {self}");
        } else {
            tracing::debug!("Request rejected with {status}: {self}");
        }
        let body = Json(serde_json::json!({ "error": self.client_message() }));
        (status, body).into_response()
    }
}

impl From<std::net::AddrParseError> for IronDashError {
    fn from(error: std::net::AddrParseError) -> Self {
        IronDashError::AddressParse(error)
    }
}

impl From<std::io::Error> for IronDashError {
    fn from(error: std::io::Error) -> Self {
        IronDashError::Io(error)
    }
}

impl From<json5::Error> for IronDashError {
    fn from(error: json5::Error) -> Self {
        IronDashError::ConfigParse(error)
    }
}

impl From<serde_json::Error> for IronDashError {
    fn from(error: serde_json::Error) -> Self {
        IronDashError::Serialization(error)
    }
}

impl From<&str> for IronDashError {
    fn from(msg: &str) -> Self {
        IronDashError::Generic(msg.to_string())
    }
}

impl From<String> for IronDashError {
    fn from(msg: String) -> Self {
        IronDashError::Generic(msg)
    }
}

/// Result type alias using our custom error type
pub type Result<T> = std::result::Result<T, IronDashError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_follow_error_class() {
        assert_eq!(
            IronDashError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            IronDashError::NotFound("group".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            IronDashError::Upstream("boom".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            IronDashError::from("oops").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_display_includes_message() {
        let err = IronDashError::from("Document root is not an object");
        assert_eq!(err.to_string(), "Error: Document root is not an object");

        let err = IronDashError::NotFound("link abc".into());
        assert_eq!(err.to_string(), "Not found: link abc");
        assert_eq!(err.client_message(), "link abc not found");
    }
}
