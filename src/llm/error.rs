//! Backend error types with retry classification.
//!
//! Distinguishes transient failures (worth retrying) from permanent ones.
//! The engine treats these values as opaque: they are wrapped and re-raised
//! without alteration.

use std::time::Duration;

use thiserror::Error;

/// Error surfaced by a completion backend or model catalog.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// The backend throttled the request (HTTP 429). Transient.
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        /// Delay requested by the backend (Retry-After), if any.
        retry_after: Option<Duration>,
    },

    /// The backend answered with a non-success HTTP status.
    /// Transient for 5xx, permanent for 4xx.
    #[error("backend returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// Connection-level failure (refused, reset, timed out). Transient.
    #[error("network error: {0}")]
    Network(String),

    /// The response body did not match the expected wire format. Permanent.
    #[error("malformed backend response: {0}")]
    Parse(String),

    /// The chunk stream broke before the final chunk arrived.
    #[error("stream interrupted: {0}")]
    Stream(String),
}

impl BackendError {
    /// Classify an HTTP status into the matching error variant.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        match status {
            429 => BackendError::RateLimited {
                message: message.into(),
                retry_after: None,
            },
            _ => BackendError::Api {
                status,
                message: message.into(),
            },
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::RateLimited { .. } | BackendError::Network(_) => true,
            BackendError::Api { status, .. } => matches!(status, 500 | 502 | 503 | 504),
            BackendError::Parse(_) | BackendError::Stream(_) => false,
        }
    }

    /// Suggested delay before retry attempt number `attempt` (0-based).
    ///
    /// Honors a backend-provided `retry_after` when present; otherwise
    /// exponential backoff with deterministic jitter, capped at 60 seconds.
    pub fn suggested_delay(&self, attempt: u32) -> Duration {
        if let BackendError::RateLimited {
            retry_after: Some(delay),
            ..
        } = self
        {
            return *delay;
        }

        let base_secs: u64 = match self {
            BackendError::RateLimited { .. } => 5,
            BackendError::Api { .. } => 2,
            _ => 1,
        };

        let delay_secs = base_secs.saturating_mul(2u64.saturating_pow(attempt));

        // Deterministic jitter (up to 25% of the delay), applied before the cap.
        let jitter_range = delay_secs / 4;
        let jitter = if jitter_range > 0 {
            (attempt as u64 * 7) % jitter_range
        } else {
            0
        };

        Duration::from_secs(delay_secs.saturating_add(jitter).min(60))
    }
}

/// Retry budget for a single logical backend call.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the initial request.
    pub max_retries: u32,
    /// Maximum total time to spend including retries.
    pub max_retry_duration: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_retry_duration: Duration::from_secs(120),
        }
    }
}

impl RetryConfig {
    /// A config that never retries; used where retry loops would distort
    /// invocation accounting.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            max_retry_duration: Duration::ZERO,
        }
    }

    /// Whether `error` should be retried as attempt number `attempt`.
    pub fn should_retry(&self, error: &BackendError, attempt: u32) -> bool {
        error.is_transient() && attempt < self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(BackendError::from_status(429, "slow down").is_transient());
        assert!(BackendError::from_status(500, "oops").is_transient());
        assert!(BackendError::from_status(503, "busy").is_transient());
        assert!(BackendError::Network("refused".into()).is_transient());

        assert!(!BackendError::from_status(400, "bad request").is_transient());
        assert!(!BackendError::from_status(401, "no auth").is_transient());
        assert!(!BackendError::Parse("truncated json".into()).is_transient());
        assert!(!BackendError::Stream("connection dropped".into()).is_transient());
    }

    #[test]
    fn test_status_mapping() {
        match BackendError::from_status(429, "x") {
            BackendError::RateLimited { retry_after, .. } => assert!(retry_after.is_none()),
            other => panic!("expected RateLimited, got {other:?}"),
        }
        match BackendError::from_status(502, "x") {
            BackendError::Api { status, .. } => assert_eq!(status, 502),
            other => panic!("expected Api, got {other:?}"),
        }
    }

    #[test]
    fn test_exponential_backoff_grows_and_caps() {
        let error = BackendError::RateLimited {
            message: "test".into(),
            retry_after: None,
        };

        let d0 = error.suggested_delay(0);
        let d1 = error.suggested_delay(1);
        let d2 = error.suggested_delay(2);
        assert!(d1 > d0);
        assert!(d2 > d1);
        assert!(error.suggested_delay(10).as_secs() <= 60);
    }

    #[test]
    fn test_retry_after_respected() {
        let error = BackendError::RateLimited {
            message: "test".into(),
            retry_after: Some(Duration::from_secs(30)),
        };
        assert_eq!(error.suggested_delay(0), Duration::from_secs(30));
        assert_eq!(error.suggested_delay(5), Duration::from_secs(30));
    }

    #[test]
    fn test_retry_budget() {
        let config = RetryConfig::default();
        let transient = BackendError::Network("reset".into());
        let permanent = BackendError::Parse("bad".into());

        assert!(config.should_retry(&transient, 0));
        assert!(config.should_retry(&transient, 2));
        assert!(!config.should_retry(&transient, 3));
        assert!(!config.should_retry(&permanent, 0));

        assert!(!RetryConfig::none().should_retry(&transient, 0));
    }
}
