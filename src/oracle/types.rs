//! Request and response types for oracle calls.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which code path asked the oracle, for usage records and traces.
///
/// Use a static label like "funnel::intent" or "review::write".
#[derive(Debug, Clone, Copy, Default)]
pub struct Attribution {
    pub caller: &'static str,
}

impl Attribution {
    pub fn new(caller: &'static str) -> Self {
        Self { caller }
    }
}

/// Chat message role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A role-tagged message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One question for the oracle.
#[derive(Debug, Clone)]
pub struct OracleRequest {
    /// Provider model id, e.g. "openai/gpt-4o-mini".
    pub model: String,
    /// Ordered conversation.
    pub messages: Vec<Message>,
    /// Sampling temperature (0.0 - 2.0).
    pub temperature: f32,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    pub attribution: Attribution,
}

impl OracleRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>, attribution: Attribution) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: 0.0,
            max_tokens: None,
            attribution,
        }
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }

    pub fn max_tokens(mut self, max: Option<u32>) -> Self {
        self.max_tokens = max;
        self
    }

    /// Provider prefix of the model id ("openai" from "openai/gpt-4o-mini").
    pub fn route(&self) -> &str {
        self.model.split('/').next().unwrap_or(&self.model)
    }
}

/// Reason the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Unknown(String),
}

impl From<Option<String>> for FinishReason {
    fn from(s: Option<String>) -> Self {
        match s.as_deref() {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            Some(other) => FinishReason::Unknown(other.to_string()),
            None => FinishReason::Unknown("none".to_string()),
        }
    }
}

/// Free-form text answer plus accounting.
#[derive(Debug, Clone)]
pub struct OracleReply {
    /// Generated text. May or may not embed a fenced JSON block.
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub latency: Duration,
    pub finish_reason: FinishReason,
}

impl OracleReply {
    /// Reply carrying only text, for stubs and replays.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            input_tokens: 0,
            output_tokens: 0,
            latency: Duration::ZERO,
            finish_reason: FinishReason::Stop,
        }
    }
}
