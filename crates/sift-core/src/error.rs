use std::fmt;

use thiserror::Error;

use crate::models::Outcome;

/// Why a single URL could not be turned into article text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionFailureReason {
    Timeout,
    Paywall,
    NoText,
    Error,
}

impl fmt::Display for ExtractionFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionFailureReason::Timeout => write!(f, "timeout"),
            ExtractionFailureReason::Paywall => write!(f, "paywall"),
            ExtractionFailureReason::NoText => write!(f, "no-text"),
            ExtractionFailureReason::Error => write!(f, "error"),
        }
    }
}

/// Application-wide error types for Sift.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// LLM API call failed.
    #[error("LLM error (HTTP {status_code}): {message}")]
    LlmError {
        message: String,
        status_code: u16,
        retryable: bool,
    },

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Request timed out.
    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// One upstream search call failed.
    #[error("Provider '{provider}' failed: {message}")]
    ProviderError { provider: String, message: String },

    /// Article extraction for one URL failed.
    #[error("Extraction failed for {url}: {reason}")]
    ExtractionFailure {
        url: String,
        reason: ExtractionFailureReason,
    },

    /// Query classification or relevance filtering returned unusable output.
    #[error("Classification error: {0}")]
    ClassificationFailure(String),

    /// Reading or writing a persisted document failed.
    #[error("Persistence error: {0}")]
    PersistenceFailure(String),

    /// Invalid configuration.
    #[error("Config error: {0}")]
    ConfigError(String),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) | AppError::RateLimitExceeded => true,
            AppError::LlmError { retryable, .. } => *retryable,
            AppError::HttpError(msg) => {
                msg.contains("timeout") || msg.contains("connect") || msg.contains("reset")
            }
            AppError::ExtractionFailure { reason, .. } => {
                *reason == ExtractionFailureReason::Timeout
            }
            _ => false,
        }
    }

    /// Ledger outcome for an error raised while extracting an article.
    pub fn outcome(&self) -> Outcome {
        match self {
            AppError::Timeout(_) => Outcome::Timeout,
            AppError::ExtractionFailure { reason, .. } => match reason {
                ExtractionFailureReason::Timeout => Outcome::Timeout,
                ExtractionFailureReason::Paywall => Outcome::Paywall,
                ExtractionFailureReason::NoText | ExtractionFailureReason::Error => {
                    Outcome::NoText
                }
            },
            AppError::HttpError(msg) if msg.contains("timeout") => Outcome::Timeout,
            _ => Outcome::NoText,
        }
    }

    /// Whether the failure is stable enough to cache as a known failure.
    ///
    /// Timeouts and transport errors are not cached; the next search retries them.
    pub fn is_cacheable_failure(&self) -> bool {
        matches!(
            self,
            AppError::ExtractionFailure {
                reason: ExtractionFailureReason::Paywall | ExtractionFailureReason::NoText,
                ..
            }
        )
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::PersistenceFailure(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(AppError::NetworkError("reset".into()).is_retryable());
        assert!(AppError::Timeout(6000).is_retryable());
        assert!(AppError::RateLimitExceeded.is_retryable());
        assert!(
            AppError::LlmError {
                message: "server error".into(),
                status_code: 500,
                retryable: true,
            }
            .is_retryable()
        );
        assert!(!AppError::ClassificationFailure("bad json".into()).is_retryable());
    }

    #[test]
    fn test_extraction_errors_map_to_outcomes() {
        let paywall = AppError::ExtractionFailure {
            url: "https://wsj.com/a".into(),
            reason: ExtractionFailureReason::Paywall,
        };
        assert_eq!(paywall.outcome(), Outcome::Paywall);
        assert!(paywall.is_cacheable_failure());

        assert_eq!(AppError::Timeout(6000).outcome(), Outcome::Timeout);
        assert!(!AppError::Timeout(6000).is_cacheable_failure());

        assert_eq!(
            AppError::HttpError("HTTP 500".into()).outcome(),
            Outcome::NoText
        );
    }
}
