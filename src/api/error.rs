//! Error types for the evaluation service boundary.

use thiserror::Error;

/// Additional context from service errors for debugging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// HTTP status code returned by the service.
    pub http_status: Option<u16>,
    /// Request ID from the service (x-request-id header).
    pub request_id: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }
}

/// Errors that can occur when calling the evaluation service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The service answered with a non-success status.
    #[error("service returned HTTP {status}: {}", .message.as_deref().unwrap_or("no detail"))]
    Api {
        status: u16,
        /// Human-readable detail reported by the service, if any.
        message: Option<String>,
        context: ErrorContext,
    },

    /// HTTP/network error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The body could not be decoded into the expected shape.
    #[error("invalid response: {0}")]
    Decode(String),

    /// The body exceeded the client's size cap.
    #[error("response too large: {0} bytes")]
    TooLarge(usize),

    /// Client configuration error (bad base URL, etc.).
    #[error("configuration error: {0}")]
    Config(String),
}

impl ServiceError {
    /// Create an API error without extra context.
    pub fn api(status: u16, message: Option<String>) -> Self {
        Self::Api {
            status,
            message,
            context: ErrorContext::new().with_status(status),
        }
    }

    /// Create an API error with context.
    pub fn api_with_context(status: u16, message: Option<String>, context: ErrorContext) -> Self {
        Self::Api {
            status,
            message,
            context,
        }
    }

    /// Create a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Message worth showing to a user, if the error carries one.
    ///
    /// Only an API error without a usable detail has none.
    pub fn user_message(&self) -> Option<String> {
        match self {
            Self::Api { message, .. } => message
                .as_deref()
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string),
            Self::Http(_) | Self::Decode(_) | Self::TooLarge(_) | Self::Config(_) => {
                Some(self.to_string())
            }
        }
    }

    /// Get a short error code for logging.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Api { status, .. } if *status >= 500 => "server_error",
            Self::Api { .. } => "rejected",
            Self::Http(e) if e.is_timeout() => "timeout",
            Self::Http(_) => "http_error",
            Self::Decode(_) => "decode_error",
            Self::TooLarge(_) => "too_large",
            Self::Config(_) => "config_error",
        }
    }

    /// Get the error context if available.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::Api { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Get the request ID if available.
    pub fn request_id(&self) -> Option<&str> {
        self.context().and_then(|c| c.request_id.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_message_is_trimmed_and_blank_is_none() {
        let err = ServiceError::api(400, Some("  bad input  ".into()));
        assert_eq!(err.user_message().as_deref(), Some("bad input"));

        let err = ServiceError::api(500, Some("   ".into()));
        assert_eq!(err.user_message(), None);
        assert_eq!(err.code(), "server_error");
    }

    #[test]
    fn display_falls_back_when_detail_missing() {
        let err = ServiceError::api(502, None);
        assert_eq!(err.to_string(), "service returned HTTP 502: no detail");
        assert_eq!(err.context().and_then(|c| c.http_status), Some(502));
        assert_eq!(err.user_message(), None);
    }

    #[test]
    fn local_failures_carry_their_own_message() {
        let err = ServiceError::decode("expected value at line 1 column 1");
        assert_eq!(
            err.user_message().as_deref(),
            Some("invalid response: expected value at line 1 column 1")
        );
        assert_eq!(
            ServiceError::TooLarge(10).user_message().as_deref(),
            Some("response too large: 10 bytes")
        );
    }
}
