//! OpenRouter chat-completions adapter.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::error::{ErrorContext, OracleError};
use super::types::{FinishReason, Message, OracleReply, OracleRequest};
use super::Oracle;

/// Maximum allowed response body (1MB).
const MAX_RESPONSE_LEN: usize = 1_024 * 1_024;

/// Maximum allowed input characters (~125k tokens). Venue listings with
/// review excerpts are the bulk of it.
const MAX_INPUT_CHARS: usize = 500_000;

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

#[derive(Debug, Clone)]
pub struct OpenRouterOracle {
    client: reqwest::Client,
    base_url: String,
}

impl OpenRouterOracle {
    pub fn new(api_key: impl Into<String>) -> Result<Self, OracleError> {
        Self::with_config(api_key, DEFAULT_BASE_URL, Duration::from_secs(120), None, None)
    }

    pub fn from_env() -> Result<Self, OracleError> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .map_err(|_| OracleError::config("OPENROUTER_API_KEY not set"))?;

        let base_url =
            std::env::var("OPENROUTER_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());

        let timeout = std::env::var("OPENROUTER_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(120));

        let referer = std::env::var("OPENROUTER_REFERER").ok();
        let app_title = std::env::var("OPENROUTER_APP_TITLE").ok();

        Self::with_config(api_key, base_url, timeout, referer, app_title)
    }

    pub fn with_config(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
        referer: Option<String>,
        app_title: Option<String>,
    ) -> Result<Self, OracleError> {
        let api_key = api_key.into();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let auth_value = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| OracleError::config("Invalid API key format"))?;
        headers.insert(AUTHORIZATION, auth_value);

        if let Some(v) = referer.as_deref().and_then(|r| HeaderValue::from_str(r).ok()) {
            headers.insert("HTTP-Referer", v);
        }
        if let Some(v) = app_title.as_deref().and_then(|t| HeaderValue::from_str(t).ok()) {
            headers.insert("X-Title", v);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .gzip(true)
            .build()
            .map_err(|e| OracleError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn is_refusal(msg: &str) -> bool {
        let l = msg.trim_start().to_lowercase();
        let first_line = l.lines().next().unwrap_or("");

        const PREFIXES: &[&str] = &[
            "i cannot",
            "i can't",
            "i won't",
            "i am unable to",
            "i'm unable to",
            "unable to comply",
            "unable to assist",
        ];

        PREFIXES.iter().any(|p| first_line.starts_with(p))
    }
}

// -----------------------------------------------------------------------------
// Wire types
// -----------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatApiRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatApiResponse {
    choices: Option<Vec<Choice>>,
    usage: Option<Usage>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ApiError {
    message: Option<String>,
    code: Option<serde_json::Value>,
}

#[async_trait]
impl Oracle for OpenRouterOracle {
    fn provider(&self) -> &'static str {
        "openrouter"
    }

    async fn ask(&self, req: OracleRequest) -> Result<OracleReply, OracleError> {
        let total_chars: usize = req.messages.iter().map(|m| m.content.len()).sum();
        if total_chars > MAX_INPUT_CHARS {
            return Err(OracleError::invalid_request(format!(
                "Input too large: {total_chars} chars (max {MAX_INPUT_CHARS})"
            )));
        }

        let start = Instant::now();
        let api_req = ChatApiRequest {
            model: &req.model,
            messages: &req.messages,
            temperature: req.temperature,
            max_tokens: req.max_tokens,
        };

        let mut response = self.client.post(self.chat_url()).json(&api_req).send().await?;

        let status = response.status();
        let request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let new_len = bytes.len() + chunk.len();
            if new_len > MAX_RESPONSE_LEN {
                return Err(OracleError::provider(
                    "openrouter",
                    format!("Response too large: {new_len} bytes"),
                    false,
                ));
            }
            bytes.extend_from_slice(&chunk);
        }
        let body = String::from_utf8_lossy(&bytes);

        let mut ctx = ErrorContext::new().with_status(status.as_u16());
        if let Some(id) = &request_id {
            ctx = ctx.with_request_id(id);
        }

        if !status.is_success() {
            let parsed_error = serde_json::from_str::<ChatApiResponse>(&body)
                .ok()
                .and_then(|p| p.error);
            if status.as_u16() == 429 {
                return Err(OracleError::rate_limited(Duration::from_secs(60), ctx));
            }
            let message = match parsed_error {
                Some(err) => {
                    if let Some(code) = err.code {
                        ctx = ctx.with_code(code.to_string());
                    }
                    err.message.unwrap_or_default()
                }
                None => format!("HTTP {}", status.as_u16()),
            };
            return Err(OracleError::provider_with_context(
                "openrouter",
                message,
                status.is_server_error(),
                ctx,
            ));
        }

        let parsed: ChatApiResponse = serde_json::from_str(&body)
            .map_err(|e| OracleError::provider("openrouter", format!("Invalid JSON: {e}"), false))?;

        if let Some(error) = parsed.error {
            let message = error.message.unwrap_or_default();
            if Self::is_refusal(&message) {
                return Err(OracleError::refused(message));
            }
            return Err(OracleError::provider("openrouter", message, false));
        }

        let choice = parsed
            .choices
            .and_then(|c| c.into_iter().next())
            .ok_or_else(|| OracleError::provider("openrouter", "No choices in response", false))?;

        let content = choice
            .message
            .and_then(|m| m.content)
            .unwrap_or_default();

        if Self::is_refusal(&content) {
            return Err(OracleError::refused(content));
        }

        let (input_tokens, output_tokens) = parsed
            .usage
            .map(|u| (u.prompt_tokens.unwrap_or(0), u.completion_tokens.unwrap_or(0)))
            .unwrap_or((0, 0));

        Ok(OracleReply {
            content,
            input_tokens,
            output_tokens,
            latency: start.elapsed(),
            finish_reason: FinishReason::from(choice.finish_reason),
        })
    }
}
