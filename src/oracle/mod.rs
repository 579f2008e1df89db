//! The LLM boundary.
//!
//! The funnel treats the model as an oracle: hand it role-tagged messages, get
//! free-form text back, eventually. Everything past that text (parsing,
//! validation, fallbacks) lives in the funnel, not here.

pub mod error;
pub mod openrouter;
pub mod types;
pub mod usage;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

pub use error::{ErrorContext, OracleError};
pub use openrouter::OpenRouterOracle;
pub use types::*;
pub use usage::{CallStatus, NoopUsageSink, OracleCallRecord, TracingUsageSink, UsageSink};

#[async_trait::async_trait]
pub trait Oracle: Send + Sync {
    /// Provider label for usage records.
    fn provider(&self) -> &'static str {
        "oracle"
    }

    async fn ask(&self, req: OracleRequest) -> Result<OracleReply, OracleError>;
}

#[async_trait::async_trait]
impl<T: Oracle + ?Sized> Oracle for Arc<T> {
    fn provider(&self) -> &'static str {
        (**self).provider()
    }

    async fn ask(&self, req: OracleRequest) -> Result<OracleReply, OracleError> {
        (**self).ask(req).await
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

/// Wraps an oracle with retry-on-transient-failure and usage recording.
pub struct RetryingOracle<O: Oracle, U: UsageSink> {
    inner: O,
    usage_sink: Arc<U>,
    config: RetryConfig,
}

impl<O: Oracle, U: UsageSink> RetryingOracle<O, U> {
    pub fn new(inner: O, usage_sink: Arc<U>) -> Self {
        Self::with_config(inner, usage_sink, RetryConfig::default())
    }

    pub fn with_config(inner: O, usage_sink: Arc<U>, config: RetryConfig) -> Self {
        Self {
            inner,
            usage_sink,
            config,
        }
    }

    async fn record(&self, req: &OracleRequest, attempt: u32, result: &Result<OracleReply, OracleError>) {
        let record = OracleCallRecord::new(self.inner.provider(), &req.model, req.attribution.caller)
            .attempt(attempt);
        let record = match result {
            Ok(reply) => record
                .tokens(reply.input_tokens, reply.output_tokens)
                .latency(reply.latency.as_millis() as u64),
            Err(err) => record.error(err.code()),
        };
        self.usage_sink.record(record).await;
    }
}

#[async_trait::async_trait]
impl<O: Oracle, U: UsageSink> Oracle for RetryingOracle<O, U> {
    fn provider(&self) -> &'static str {
        self.inner.provider()
    }

    async fn ask(&self, req: OracleRequest) -> Result<OracleReply, OracleError> {
        let mut attempt = 0;
        loop {
            let result = self.inner.ask(req.clone()).await;
            self.record(&req, attempt, &result).await;

            match result {
                Ok(reply) => return Ok(reply),
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    let delay = backoff_delay(self.config.retry_base_delay, attempt);
                    warn!(
                        error = %err,
                        caller = req.attribution.caller,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "oracle call failed; retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let multiplier = 2u32.pow(attempt.min(5));
    base * multiplier
}
