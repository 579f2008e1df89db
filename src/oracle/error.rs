//! Error types for oracle calls.

use std::time::Duration;
use thiserror::Error;

/// Extra detail captured from a failed provider response.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// HTTP status code from the provider.
    pub http_status: Option<u16>,
    /// Provider-specific error code (e.g. "rate_limit_exceeded").
    pub provider_code: Option<String>,
    /// Request ID from provider (x-request-id header).
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

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }
}

/// Everything that can go wrong between asking the oracle and getting text back.
///
/// A malformed *answer* is not an error here: the oracle returned text, and it is
/// the funnel's job to make sense of it. These variants cover transport and
/// provider failures only.
#[derive(Debug, Error)]
pub enum OracleError {
    /// Provider returned 429.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        retry_after: Duration,
        context: Option<ErrorContext>,
    },

    /// Request rejected before or by the provider; retrying won't help.
    #[error("invalid request: {message}")]
    InvalidRequest {
        message: String,
        context: Option<ErrorContext>,
    },

    /// Model refused to answer (content policy, etc.).
    #[error("refused: {message}")]
    Refused { message: String },

    /// Provider-side failure.
    #[error("{provider} error: {message}")]
    Provider {
        provider: &'static str,
        message: String,
        retryable: bool,
        context: Option<ErrorContext>,
    },

    #[error("timeout after {0:?}")]
    Timeout(Duration),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Missing API key, bad header value, etc.
    #[error("configuration error: {0}")]
    Config(String),
}

impl OracleError {
    pub fn rate_limited(retry_after: Duration, context: ErrorContext) -> Self {
        Self::RateLimited {
            retry_after,
            context: Some(context),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            context: None,
        }
    }

    pub fn refused(message: impl Into<String>) -> Self {
        Self::Refused {
            message: message.into(),
        }
    }

    pub fn provider(provider: &'static str, message: impl Into<String>, retryable: bool) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
            retryable,
            context: None,
        }
    }

    pub fn provider_with_context(
        provider: &'static str,
        message: impl Into<String>,
        retryable: bool,
        context: ErrorContext,
    ) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
            retryable,
            context: Some(context),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Timeout(_) => true,
            Self::Provider { retryable, .. } => *retryable,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::InvalidRequest { .. } => false,
            Self::Refused { .. } => false,
            Self::Config(_) => false,
        }
    }

    /// Short code for usage records and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::Refused { .. } => "refused",
            Self::Provider { .. } => "provider_error",
            Self::Timeout(_) => "timeout",
            Self::Http(_) => "http_error",
            Self::Config(_) => "config_error",
        }
    }

    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::RateLimited { context, .. } => context.as_ref(),
            Self::InvalidRequest { context, .. } => context.as_ref(),
            Self::Provider { context, .. } => context.as_ref(),
            Self::Refused { .. } | Self::Timeout(_) | Self::Http(_) | Self::Config(_) => None,
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        self.context().and_then(|c| c.request_id.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(OracleError::rate_limited(Duration::from_secs(1), ErrorContext::new()).is_retryable());
        assert!(OracleError::provider("openrouter", "502", true).is_retryable());
        assert!(!OracleError::provider("openrouter", "bad", false).is_retryable());
        assert!(!OracleError::refused("no").is_retryable());
        assert!(!OracleError::config("missing key").is_retryable());
    }

    #[test]
    fn request_id_comes_from_context() {
        let err = OracleError::provider_with_context(
            "openrouter",
            "boom",
            true,
            ErrorContext::new().with_status(503).with_request_id("req-1"),
        );
        assert_eq!(err.request_id(), Some("req-1"));
        assert_eq!(err.code(), "provider_error");
    }
}
