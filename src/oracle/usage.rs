//! Usage accounting for oracle calls.
//!
//! Every call through [`RetryingOracle`](super::RetryingOracle) produces one
//! [`OracleCallRecord`] per attempt. Where records go is up to the sink:
//! - the CLI uses `TracingUsageSink`
//! - tests use `NoopUsageSink`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Success,
    Error,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Success => "success",
            CallStatus::Error => "error",
        }
    }
}

/// One oracle call attempt.
#[derive(Debug, Clone)]
pub struct OracleCallRecord {
    pub provider: &'static str,
    pub model: String,
    /// Which stage asked.
    pub caller: &'static str,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub latency_ms: u64,
    pub attempt: u32,
    pub status: CallStatus,
    pub error_code: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl OracleCallRecord {
    pub fn new(provider: &'static str, model: impl Into<String>, caller: &'static str) -> Self {
        Self {
            provider,
            model: model.into(),
            caller,
            input_tokens: 0,
            output_tokens: 0,
            latency_ms: 0,
            attempt: 0,
            status: CallStatus::Success,
            error_code: None,
            timestamp: Utc::now(),
        }
    }

    pub fn tokens(mut self, input: u32, output: u32) -> Self {
        self.input_tokens = input;
        self.output_tokens = output;
        self
    }

    pub fn latency(mut self, ms: u64) -> Self {
        self.latency_ms = ms;
        self
    }

    pub fn attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    pub fn error(mut self, code: impl Into<String>) -> Self {
        self.status = CallStatus::Error;
        self.error_code = Some(code.into());
        self
    }
}

/// Where usage records go. Fire-and-forget: implementations log their own
/// failures and never propagate them.
#[async_trait]
pub trait UsageSink: Send + Sync {
    async fn record(&self, record: OracleCallRecord);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopUsageSink;

#[async_trait]
impl UsageSink for NoopUsageSink {
    async fn record(&self, _record: OracleCallRecord) {}
}

/// Emits one `info!` event per call under the `oracle_usage` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingUsageSink;

#[async_trait]
impl UsageSink for TracingUsageSink {
    async fn record(&self, record: OracleCallRecord) {
        info!(
            target: "oracle_usage",
            provider = record.provider,
            model = %record.model,
            caller = record.caller,
            attempt = record.attempt,
            tokens = record.input_tokens + record.output_tokens,
            latency_ms = record.latency_ms,
            status = record.status.as_str(),
            error_code = record.error_code.as_deref().unwrap_or(""),
            "oracle call"
        );
    }
}
