use axum::http::StatusCode;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Returned by the rate limiter when a call arrives inside the minimum interval.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("rate limit exceeded, retry in {:.1}s", .retry_after.as_secs_f64())]
pub struct RateLimitExceeded {
    pub retry_after: Duration,
}

/// Every way a translation call can fail, surfaced as one kind to callers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TranslationError {
    #[error("request too frequent, retry in {:.1}s", .retry_after.as_secs_f64())]
    RateLimited { retry_after: Duration },

    #[error("translation failed: {0}")]
    Backend(String),

    #[error("translation service unavailable: {0}")]
    Unavailable(String),

    #[error("translation timed out after {:.1}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("batch response has {got} lines, expected {expected}")]
    BatchMismatch { expected: usize, got: usize },

    #[error("batch input #{0} contains a line break and cannot be batched")]
    AmbiguousBatch(usize),

    #[error("translation cancelled")]
    Cancelled,
}

impl TranslationError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            TranslationError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            TranslationError::Unavailable(_) | TranslationError::Timeout(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RateLimitExceeded> for TranslationError {
    fn from(err: RateLimitExceeded) -> Self {
        TranslationError::RateLimited {
            retry_after: err.retry_after,
        }
    }
}

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("failed to access tag library {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse tag library {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize tag library: {0}")]
    Serialize(#[from] serde_json::Error),
}
