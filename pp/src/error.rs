//! Prompt provider error types

use thiserror::Error;

use crate::remote::retry::is_retryable_status;

/// Errors that can occur while resolving, fetching or mutating prompts
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Remote prompt service is not configured: {0}")]
    NotConfigured(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Remote API error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Unexpected response: {0}")]
    Protocol(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl PromptError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            PromptError::Http { status, .. } => is_retryable_status(*status),
            PromptError::Connection(_) => true,
            PromptError::InvalidArgument(_)
            | PromptError::NotConfigured(_)
            | PromptError::NotFound(_)
            | PromptError::Decode(_)
            | PromptError::Protocol(_)
            | PromptError::Cancelled => false,
        }
    }

    /// Check if the caller asked to abort
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PromptError::Cancelled)
    }

    /// Failures of the remote service that read operations absorb and fall back from
    pub fn is_remote_failure(&self) -> bool {
        matches!(
            self,
            PromptError::NotFound(_)
                | PromptError::Http { .. }
                | PromptError::Connection(_)
                | PromptError::Decode(_)
                | PromptError::Protocol(_)
        )
    }
}

impl From<reqwest::Error> for PromptError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            PromptError::Protocol(err.to_string())
        } else {
            PromptError::Connection(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        // 5xx, 408 and 429 should be retryable
        for status in [408, 429, 500, 502, 503, 504] {
            assert!(
                PromptError::Http {
                    status,
                    message: "err".to_string()
                }
                .is_retryable(),
                "status {status} should be retryable"
            );
        }

        // Other 4xx errors should not be retryable
        for status in [400, 401, 403, 404, 422] {
            assert!(
                !PromptError::Http {
                    status,
                    message: "err".to_string()
                }
                .is_retryable(),
                "status {status} should not be retryable"
            );
        }

        assert!(PromptError::Connection("connection reset".to_string()).is_retryable());
        assert!(!PromptError::Protocol("bad shape".to_string()).is_retryable());
        assert!(!PromptError::Cancelled.is_retryable());
    }

    #[test]
    fn test_cancelled_is_not_a_remote_failure() {
        assert!(PromptError::Cancelled.is_cancelled());
        assert!(!PromptError::Cancelled.is_remote_failure());
        assert!(!PromptError::InvalidArgument("blank".to_string()).is_remote_failure());
        assert!(!PromptError::NotConfigured("no url".to_string()).is_remote_failure());
    }

    #[test]
    fn test_remote_failures() {
        assert!(
            PromptError::Http {
                status: 503,
                message: "unavailable".to_string()
            }
            .is_remote_failure()
        );
        assert!(PromptError::Connection("refused".to_string()).is_remote_failure());
        assert!(PromptError::Protocol("chat prompt where text expected".to_string()).is_remote_failure());

        let decode = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(PromptError::from(decode).is_remote_failure());
    }

    #[test]
    fn test_http_message_includes_status() {
        let err = PromptError::Http {
            status: 503,
            message: "Service Unavailable".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("503"));
        assert!(msg.contains("Service Unavailable"));
    }
}
