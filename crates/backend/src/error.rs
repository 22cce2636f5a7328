use std::time::Duration;

use renderq_core::retry::parse_retry_after;

/// Errors from the rendering backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend refused the connection (process not running).
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    /// The backend asked us to slow down.
    #[error("rate limited, retry after {}s: {message}", .retry_after.as_secs())]
    RateLimited {
        retry_after: Duration,
        message: String,
    },

    /// The backend returned a non-2xx status code.
    #[error("api status code {status}: {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The backend answered with an error detail instead of a result.
    #[error("{0}")]
    Detail(String),

    /// Any other transport failure (timeout, TLS, body read).
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The response could not be decoded.
    #[error("invalid backend response: {0}")]
    Decode(String),

    /// A render or upscale produced nothing.
    #[error("backend returned no images")]
    NoImages,
}

impl BackendError {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, BackendError::Unreachable(_))
    }

    /// How long to wait before retrying, if this is a throttling error.
    ///
    /// Besides the typed variant, any error whose text carries a
    /// `{"retry_after":N}` hint counts.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            BackendError::RateLimited { retry_after, .. } => Some(*retry_after),
            BackendError::Unreachable(_) => None,
            other => parse_retry_after(&other.to_string()),
        }
    }

    /// Whether the backend answered `404 Not Found`, which the WebUI does
    /// for every API route when it was started without `--api`.
    pub fn is_not_found(&self) -> bool {
        match self {
            BackendError::Api { status, .. } => *status == 404,
            BackendError::Detail(detail) => detail == "Not Found",
            _ => false,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            BackendError::Unreachable(e.to_string())
        } else if e.is_decode() {
            BackendError::Decode(e.to_string())
        } else {
            BackendError::Request(e.to_string())
        }
    }
}

/// Errors from starting the backend process.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("can't start stable diffusion: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("can't start stable diffusion, api is not enabled")]
    ApiDisabled,

    #[error("can't start stable diffusion: ping timeout after {}s", .0.as_secs())]
    StartTimeout(Duration),

    #[error("can't start stable diffusion: {0}")]
    Ping(#[source] BackendError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_rate_limit_carries_wait() {
        let err = BackendError::RateLimited {
            retry_after: Duration::from_secs(3),
            message: "slow down".into(),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn hint_in_body_counts_as_rate_limit() {
        let err = BackendError::Api {
            status: 400,
            body: r#"{"retry_after":4}"#.into(),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(4)));
    }

    #[test]
    fn plain_errors_are_not_retryable() {
        assert_eq!(BackendError::NoImages.retry_after(), None);
        assert!(!BackendError::NoImages.is_unreachable());
        assert!(BackendError::Unreachable("refused".into()).is_unreachable());
    }

    #[test]
    fn not_found_detection() {
        assert!(BackendError::Detail("Not Found".into()).is_not_found());
        assert!(BackendError::Api {
            status: 404,
            body: String::new()
        }
        .is_not_found());
        assert!(!BackendError::Detail("Busy".into()).is_not_found());
    }
}
