//! Typed errors for agent chat operations

use thiserror::Error;

/// Agent service errors with typed variants
///
/// - `Unauthorized` (401) - token missing, expired or revoked
/// - `RateLimited` (429) - quota exceeded
/// - `BadRequest` (400) - malformed request or unknown bot
/// - `ServiceError` (5xx) - server-side issue
/// - `Network` - connection failure or stalled stream
/// - `Agent` - the service answered with a non-zero business code or a failed turn
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Service error: {0}")]
    ServiceError(String),

    #[error("Network error: {0}")]
    Network(String),

    /// Error reported inside an otherwise successful response
    #[error("Agent error {code}: {message}")]
    Agent { code: i64, message: String },

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl ChatError {
    /// Check if this error indicates the token should be replaced
    pub fn needs_new_token(&self) -> bool {
        matches!(self, ChatError::Unauthorized(_))
    }

    /// Convert HTTP status code and error text into typed ChatError
    pub fn from_http_status(status: reqwest::StatusCode, error_text: String) -> Self {
        match status.as_u16() {
            401 | 403 => ChatError::Unauthorized(error_text),
            429 => ChatError::RateLimited(error_text),
            400 => ChatError::BadRequest(error_text),
            500..=599 => ChatError::ServiceError(error_text),
            _ => ChatError::Other(anyhow::anyhow!("HTTP {}: {}", status, error_text)),
        }
    }

    /// Convert network/connection errors into typed ChatError
    pub fn from_network_error(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ChatError::Network(format!("Request timeout: {}", e))
        } else if e.is_connect() {
            ChatError::Network(format!("Connection failed: {}", e))
        } else if let Some(status) = e.status() {
            let error_text = e.to_string();
            Self::from_http_status(status, error_text)
        } else {
            ChatError::Other(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_http_status() {
        let err = ChatError::from_http_status(
            reqwest::StatusCode::UNAUTHORIZED,
            "Invalid token".to_string(),
        );
        assert!(matches!(err, ChatError::Unauthorized(_)));
        assert!(err.needs_new_token());

        let err = ChatError::from_http_status(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            "Rate limit exceeded".to_string(),
        );
        assert!(matches!(err, ChatError::RateLimited(_)));

        let err =
            ChatError::from_http_status(reqwest::StatusCode::BAD_REQUEST, "Bad request".to_string());
        assert!(matches!(err, ChatError::BadRequest(_)));

        let err = ChatError::from_http_status(
            reqwest::StatusCode::BAD_GATEWAY,
            "upstream".to_string(),
        );
        assert!(matches!(err, ChatError::ServiceError(_)));

        let err = ChatError::from_http_status(reqwest::StatusCode::IM_A_TEAPOT, "tea".to_string());
        assert!(matches!(err, ChatError::Other(_)));
    }

    #[test]
    fn test_error_display() {
        let err = ChatError::Agent {
            code: 4100,
            message: "authentication is invalid".to_string(),
        };
        assert_eq!(err.to_string(), "Agent error 4100: authentication is invalid");

        let err = ChatError::Network("Request timeout".to_string());
        assert_eq!(err.to_string(), "Network error: Request timeout");
    }

    #[test]
    fn test_convert_to_anyhow() {
        let chat_err = ChatError::Unauthorized("test".to_string());
        let anyhow_err: anyhow::Error = chat_err.into();
        assert!(anyhow_err.to_string().contains("Unauthorized"));
    }
}
