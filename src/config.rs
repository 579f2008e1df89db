//! Orchestrator configuration.

use serde::{Deserialize, Serialize};

use crate::oracle::OracleError;

pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

/// Settings shared by every oracle call a [`crate::Agent`] makes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunnelConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Log rendered prompts and raw oracle replies at debug level.
    pub log_prompts: bool,
}

impl Default for FunnelConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.0,
            max_tokens: None,
            log_prompts: false,
        }
    }
}

impl FunnelConfig {
    /// Defaults overridden by `FUNNEL_MODEL`, `FUNNEL_TEMPERATURE`,
    /// `FUNNEL_MAX_TOKENS` and `FUNNEL_LOG_PROMPTS`.
    pub fn from_env() -> Result<Self, OracleError> {
        let mut config = Self::default();
        if let Ok(model) = std::env::var("FUNNEL_MODEL") {
            if !model.trim().is_empty() {
                config.model = model.trim().to_string();
            }
        }
        if let Ok(raw) = std::env::var("FUNNEL_TEMPERATURE") {
            config.temperature = raw
                .trim()
                .parse()
                .map_err(|_| OracleError::config(format!("Invalid FUNNEL_TEMPERATURE: {raw}")))?;
        }
        if let Ok(raw) = std::env::var("FUNNEL_MAX_TOKENS") {
            config.max_tokens = Some(
                raw.trim()
                    .parse()
                    .map_err(|_| OracleError::config(format!("Invalid FUNNEL_MAX_TOKENS: {raw}")))?,
            );
        }
        if let Ok(raw) = std::env::var("FUNNEL_LOG_PROMPTS") {
            config.log_prompts = parse_flag(&raw);
        }
        Ok(config)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_log_prompts(mut self, on: bool) -> Self {
        self.log_prompts = on;
        self
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
