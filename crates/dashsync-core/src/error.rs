//! Sync error taxonomy.
//!
//! Every failure that crosses a layer boundary is expressed as a
//! `SyncError`. The variant decides whether the retry executor may try
//! again (`is_retryable`) or must surface the error immediately.

use thiserror::Error;

/// Message fragments that identify a network-layer failure.
const NETWORK_MARKERS: &[&str] = &[
    "econnrefused",
    "econnreset",
    "enotfound",
    "etimedout",
    "eai_again",
    "timeout",
    "timed out",
    "network",
    "connection refused",
    "connection reset",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    #[error("Server error: status={status}, message={message}")]
    Server { status: u16, message: String },

    #[error("Rate limited: retry_after_ms={retry_after_ms:?}")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Client error: status={status}, message={message}")]
    Client { status: u16, message: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Retry exhausted after {attempts} attempts: {last}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        last: Box<SyncError>,
    },

    #[error("Connectivity lost after {attempts} reconnect attempts")]
    ConnectivityLost { attempts: u32 },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Cancelled")]
    Cancelled,

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

pub type SyncResult<T> = Result<T, SyncError>;

impl SyncError {
    /// Whether a retry has a reasonable chance of succeeding.
    ///
    /// Network failures, 5xx responses and rate limiting are transient.
    /// 4xx responses, validation failures and everything else are fatal.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientNetwork(_) | Self::Server { .. } | Self::RateLimited { .. }
        )
    }

    /// Map an HTTP status code to the matching variant.
    ///
    /// Success codes are not expected here; they map to `Unexpected`.
    pub fn from_status(status: u16, message: impl Into<String>, retry_after_ms: Option<u64>) -> Self {
        let message = message.into();
        match status {
            429 => Self::RateLimited { retry_after_ms },
            500..=599 => Self::Server { status, message },
            400..=499 => Self::Client { status, message },
            _ => Self::Unexpected(format!("HTTP {status}: {message}")),
        }
    }

    /// Classify an error that is only known by its message.
    ///
    /// Recognises `status code NNN` fragments and common socket error codes.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();

        if let Some(status) = extract_status_code(&message) {
            return Self::from_status(status, message, None);
        }

        let lower = message.to_ascii_lowercase();
        if NETWORK_MARKERS.iter().any(|marker| lower.contains(marker)) {
            return Self::TransientNetwork(message);
        }

        Self::Unexpected(message)
    }

    /// The underlying error of a `RetryExhausted`, or `self` otherwise.
    pub fn root(&self) -> &SyncError {
        match self {
            Self::RetryExhausted { last, .. } => last.root(),
            other => other,
        }
    }

    /// Short class name, used as a metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TransientNetwork(_) => "network",
            Self::Server { .. } => "server",
            Self::RateLimited { .. } => "rate_limited",
            Self::Client { .. } => "client",
            Self::Validation(_) => "validation",
            Self::RetryExhausted { .. } => "retry_exhausted",
            Self::ConnectivityLost { .. } => "connectivity_lost",
            Self::Decode(_) => "decode",
            Self::NotConnected => "not_connected",
            Self::Cancelled => "cancelled",
            Self::Unexpected(_) => "unexpected",
        }
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. } | Self::Client { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            Self::RetryExhausted { last, .. } => last.status(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

/// Classify an error message without building a `SyncError` first.
pub fn is_retryable_message(message: &str) -> bool {
    SyncError::from_message(message).is_retryable()
}

fn extract_status_code(message: &str) -> Option<u16> {
    let lower = message.to_ascii_lowercase();
    let idx = lower.find("status code")?;
    let digits: String = lower[idx + "status code".len()..]
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_classification() {
        assert!(is_retryable_message("connect ECONNREFUSED 127.0.0.1:3000"));
        assert!(is_retryable_message("Request failed with status code 503"));
        assert!(!is_retryable_message("Request failed with status code 404"));
    }

    #[test]
    fn test_message_classification_variants() {
        assert_eq!(
            SyncError::from_message("Request failed with status code 429"),
            SyncError::RateLimited {
                retry_after_ms: None
            }
        );
        assert!(matches!(
            SyncError::from_message("getaddrinfo ENOTFOUND api.example.com"),
            SyncError::TransientNetwork(_)
        ));
        assert!(matches!(
            SyncError::from_message("operation timed out"),
            SyncError::TransientNetwork(_)
        ));
        assert!(matches!(
            SyncError::from_message("invalid token address"),
            SyncError::Unexpected(_)
        ));
    }

    #[test]
    fn test_status_mapping() {
        assert!(SyncError::from_status(502, "bad gateway", None).is_retryable());
        assert!(SyncError::from_status(429, "slow down", Some(2000)).is_retryable());
        assert!(!SyncError::from_status(400, "bad request", None).is_retryable());
        assert!(!SyncError::from_status(401, "unauthorized", None).is_retryable());
    }

    #[test]
    fn test_validation_not_retryable() {
        assert!(!SyncError::Validation("price required".to_string()).is_retryable());
        assert!(!SyncError::ConnectivityLost { attempts: 3 }.is_retryable());
    }

    #[test]
    fn test_root_unwraps_exhaustion() {
        let inner = SyncError::Server {
            status: 503,
            message: "unavailable".to_string(),
        };
        let err = SyncError::RetryExhausted {
            attempts: 3,
            last: Box::new(inner.clone()),
        };

        assert_eq!(err.root(), &inner);
        assert_eq!(err.status(), Some(503));
        assert!(!err.is_retryable());
    }
}
