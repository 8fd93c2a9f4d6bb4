//! Error types for quote fetching.

use thiserror::Error;

/// Errors that can occur while fetching a ticker.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Unexpected HTTP status: {0}")]
    Status(u16),

    #[error("Failed to parse ticker: {0}")]
    ParseError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Exchange returned an error: {0}")]
    ExchangeError(String),
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FeedError::Timeout(err.to_string())
        } else if err.is_decode() {
            FeedError::ParseError(err.to_string())
        } else if let Some(status) = err.status() {
            FeedError::Status(status.as_u16())
        } else {
            FeedError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::ParseError(err.to_string())
    }
}

impl FeedError {
    /// Returns true if this error is transient and likely to succeed next cycle.
    pub fn is_transient(&self) -> bool {
        match self {
            FeedError::Http(_) | FeedError::Timeout(_) => true,
            FeedError::Status(code) => *code == 429 || *code >= 500,
            FeedError::ParseError(_) | FeedError::ExchangeError(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(FeedError::Timeout("5s".into()).is_transient());
        assert!(FeedError::Http("connection reset".into()).is_transient());
        assert!(FeedError::Status(503).is_transient());
        assert!(FeedError::Status(429).is_transient());
        assert!(!FeedError::Status(404).is_transient());
        assert!(!FeedError::ParseError("bad json".into()).is_transient());
        assert!(!FeedError::ExchangeError("maintenance".into()).is_transient());
    }

    #[test]
    fn test_from_serde_error() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(FeedError::from(err), FeedError::ParseError(_)));
    }
}
