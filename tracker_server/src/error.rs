//! Error taxonomy for external lookups and artifact resolution.

use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrackerError>;

#[derive(Debug, Error)]
pub enum TrackerError {
    /// The upstream service refused the call because of throttling.
    #[error("{service} rate limited the request: {message}")]
    RateLimited {
        service: &'static str,
        message: String,
    },

    #[error("{service} returned HTTP {status}: {message}")]
    Http {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("{service} call timed out after {after:?}")]
    Timeout {
        service: &'static str,
        after: Duration,
    },

    #[error("{service} transport error: {message}")]
    Transport {
        service: &'static str,
        message: String,
    },

    #[error("{service} returned an unreadable response: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },

    #[error("malformed artifact bundle: {0}")]
    MalformedBundle(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl TrackerError {
    /// Build the error for a failed upstream response, folding throttling
    /// responses into [`TrackerError::RateLimited`].
    pub fn from_response(
        service: &'static str,
        status: u16,
        error_class: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        if is_rate_limit_failure(Some(status), error_class, &message) {
            Self::RateLimited { service, message }
        } else {
            Self::Http {
                service,
                status,
                message,
            }
        }
    }

    pub fn transport(service: &'static str, err: reqwest::Error) -> Self {
        let message = err.to_string();
        if is_rate_limit_failure(err.status().map(|s| s.as_u16()), None, &message) {
            Self::RateLimited { service, message }
        } else {
            Self::Transport { service, message }
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Network failures, timeouts and 5xx responses. Rate limiting is not
    /// transient from the retry loop's point of view.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Transport { .. } => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn service(&self) -> &'static str {
        match self {
            Self::RateLimited { service, .. }
            | Self::Http { service, .. }
            | Self::Timeout { service, .. }
            | Self::Transport { service, .. }
            | Self::Decode { service, .. } => service,
            Self::MalformedBundle(_) => "artifact-bundle",
            Self::NotFound(_) | Self::Config(_) => "tracker",
        }
    }
}

const THROTTLE_TERMS: &[&str] = &[
    "throttl",
    "rate limit",
    "rate-limit",
    "ratelimit",
    "rate exceeded",
    "too many requests",
    "slow down",
];

/// Shared rate-limit predicate applied to every external failure.
///
/// A failure counts as rate limiting when the status is 429 or 403, the
/// upstream error class names throttling, or the message mentions it.
pub fn is_rate_limit_failure(
    status: Option<u16>,
    error_class: Option<&str>,
    message: &str,
) -> bool {
    if matches!(status, Some(429) | Some(403)) {
        return true;
    }
    if let Some(class) = error_class {
        let class = class.to_ascii_lowercase();
        if class.contains("throttl")
            || class.contains("ratelimit")
            || class.contains("toomanyrequests")
        {
            return true;
        }
    }
    let lower = message.to_ascii_lowercase();
    THROTTLE_TERMS.iter().any(|term| lower.contains(term))
}
