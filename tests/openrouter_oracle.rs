use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use venue_funnel::oracle::{
    Attribution, CallStatus, FinishReason, Message, OpenRouterOracle, Oracle, OracleCallRecord,
    OracleError, OracleRequest, RetryConfig, RetryingOracle, UsageSink,
};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

fn oracle(server: &MockServer) -> OpenRouterOracle {
    OpenRouterOracle::with_config("sk-test", server.uri(), Duration::from_secs(5), None, None).unwrap()
}

fn request() -> OracleRequest {
    OracleRequest::new(
        "openai/gpt-4o-mini",
        vec![Message::system("be brief"), Message::user("hi")],
        Attribution::new("test"),
    )
}

#[tokio::test]
async fn parses_content_and_usage() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "openai/gpt-4o-mini",
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "hi"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": { "content": "```json\n{\"stars\": 4}\n```" },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 7 }
        })))
        .mount(&server)
        .await;

    let reply = oracle(&server).ask(request()).await.unwrap();
    assert_eq!(reply.content, "```json\n{\"stars\": 4}\n```");
    assert_eq!(reply.finish_reason, FinishReason::Stop);
    assert_eq!(reply.input_tokens, 12);
    assert_eq!(reply.output_tokens, 7);
}

#[tokio::test]
async fn rate_limit_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let err = oracle(&server).ask(request()).await.unwrap_err();
    assert!(matches!(err, OracleError::RateLimited { .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn client_errors_carry_status_and_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(400)
                .insert_header("x-request-id", "req-42")
                .set_body_json(json!({"error": {"message": "bad model", "code": 400}})),
        )
        .mount(&server)
        .await;

    let err = oracle(&server).ask(request()).await.unwrap_err();
    assert!(!err.is_retryable());
    assert_eq!(err.request_id(), Some("req-42"));
    let ctx = err.context().unwrap();
    assert_eq!(ctx.http_status, Some(400));
    assert!(err.to_string().contains("bad model"));
}

#[tokio::test]
async fn refusal_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "I cannot help with that." }, "finish_reason": "stop" }]
        })))
        .mount(&server)
        .await;

    let err = oracle(&server).ask(request()).await.unwrap_err();
    assert!(matches!(err, OracleError::Refused { .. }));
}

struct FailThenSucceed {
    calls: Arc<AtomicUsize>,
}

impl Respond for FailThenSucceed {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            ResponseTemplate::new(503)
        } else {
            ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": "{}" }, "finish_reason": "stop" }],
                "usage": { "prompt_tokens": 1, "completion_tokens": 1 }
            }))
        }
    }
}

#[derive(Default)]
struct Records(Mutex<Vec<OracleCallRecord>>);

#[async_trait::async_trait]
impl UsageSink for Records {
    async fn record(&self, record: OracleCallRecord) {
        self.0.lock().unwrap().push(record);
    }
}

#[tokio::test]
async fn retrying_oracle_recovers_from_server_errors() {
    let server = MockServer::start().await;
    let calls = Arc::new(AtomicUsize::new(0));
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(FailThenSucceed {
            calls: calls.clone(),
        })
        .mount(&server)
        .await;

    let sink = Arc::new(Records::default());
    let retrying = RetryingOracle::with_config(
        oracle(&server),
        sink.clone(),
        RetryConfig {
            max_retries: 2,
            retry_base_delay: Duration::ZERO,
        },
    );

    let reply = retrying.ask(request()).await.unwrap();
    assert_eq!(reply.content, "{}");
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let records = sink.0.lock().unwrap();
    let statuses: Vec<CallStatus> = records.iter().map(|r| r.status).collect();
    assert_eq!(statuses, vec![CallStatus::Error, CallStatus::Success]);
    assert!(records.iter().all(|r| r.provider == "openrouter" && r.caller == "test"));
}
