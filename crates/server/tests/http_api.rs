use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use chat_relay_core::RelayBuilder;
use chat_relay_core::tool::{self, ToolProvider, ToolResult};
use chat_relay_model::{ModelTool, ToolCallRequest};
use chat_relay_server::router;
use chat_relay_test_model::{PresetEvent, PresetResponse, TestModelProvider};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tower::ServiceExt;

struct FakeTools {
    reachable: bool,
}

#[async_trait]
impl ToolProvider for FakeTools {
    async fn definitions(&self) -> Result<Vec<ModelTool>, tool::Error> {
        if !self.reachable {
            return Err(tool::Error::transport().with_reason("connection refused"));
        }
        Ok(vec![ModelTool {
            name: "semantic_search_code".to_owned(),
            description: "Searches code by meaning.".to_owned(),
            parameters: json!({ "type": "object" }),
        }])
    }

    async fn call_tool(&self, _name: &str, _arguments: Value) -> ToolResult {
        Ok("secret tool payload".to_owned())
    }
}

fn app(provider: TestModelProvider, reachable: bool) -> Router {
    let relay = RelayBuilder::with_model_provider(provider)
        .with_tools(Arc::new(FakeTools { reachable }))
        .with_system_instruction("Answer questions about code.")
        .build();
    router(relay)
}

async fn post_chat(app: Router, body: &str) -> (StatusCode, Option<String>, String) {
    let req = Request::post("/api/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_owned()))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let content_type = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|value| value.to_str().unwrap().to_owned());
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, content_type, String::from_utf8(bytes.to_vec()).unwrap())
}

fn error_message(body: &str) -> String {
    let value: Value = serde_json::from_str(body).unwrap();
    value["error"].as_str().unwrap().to_owned()
}

const ONE_QUESTION: &str =
    r#"{"messages":[{"role":"user","content":"which parsers exist?","id":"u1"}]}"#;

#[tokio::test]
async fn test_streams_answer_without_tool_payloads() {
    let mut provider = TestModelProvider::default();
    provider.add_response(PresetResponse::with_events(vec![
        PresetEvent::MessageDelta("Let me check. ".to_owned()),
        PresetEvent::ToolCall(ToolCallRequest {
            id: "call-1".to_owned(),
            name: "semantic_search_code".to_owned(),
            arguments: json!({ "query": "parser" }),
        }),
    ]));
    provider.add_response(PresetResponse::with_deltas(["<think>found one</think>", "The parser."]));

    let (status, content_type, body) = post_chat(app(provider.clone(), true), ONE_QUESTION).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("text/plain; charset=utf-8"));
    assert_eq!(body, "Let me check. <think>found one</think>The parser.");
    assert!(!body.contains("secret tool payload"));

    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(
        requests[0].system_instruction.as_deref(),
        Some("Answer questions about code.")
    );
}

#[tokio::test]
async fn test_rejects_invalid_bodies() {
    let bodies = [
        "not json",
        r#"{"messages":[]}"#,
        r#"{"messages":[{"role":"user","content":"x","id":"1","extra":true}]}"#,
        r#"{"messages":[{"role":"system","content":"x","id":"1"}]}"#,
        r#"{"messages":[{"role":"assistant","content":"x","id":"1"}]}"#,
        r#"{"messages":[{"role":"user","content":"x","id":"1"},{"role":"user","content":"y","id":"1"}]}"#,
    ];
    for body in bodies {
        let provider = TestModelProvider::default();
        let (status, content_type, resp) = post_chat(app(provider.clone(), true), body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {body}");
        assert_eq!(content_type.as_deref(), Some("application/json"));
        assert!(!error_message(&resp).is_empty());
        // Nothing reached the model.
        assert!(provider.requests().is_empty());
    }
}

#[tokio::test]
async fn test_provider_failure_is_bad_gateway() {
    let mut provider = TestModelProvider::default();
    provider.add_response(PresetResponse::with_deltas(["never"]).with_failures(0));

    let (status, _, body) = post_chat(app(provider, true), ONE_QUESTION).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(error_message(&body).starts_with("model provider error"));
}

#[tokio::test]
async fn test_unreachable_tools_are_bad_gateway() {
    let mut provider = TestModelProvider::default();
    provider.add_response(PresetResponse::with_deltas(["never"]));

    let (status, _, body) = post_chat(app(provider.clone(), false), ONE_QUESTION).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(error_message(&body).contains("connection refused"));
    assert!(provider.requests().is_empty());
}

#[tokio::test]
async fn test_failure_after_first_byte_aborts_body() {
    let mut provider = TestModelProvider::default();
    provider.add_response(PresetResponse::with_events(vec![
        PresetEvent::MessageDelta("The parser lives in".to_owned()),
        PresetEvent::Error("connection reset".to_owned()),
    ]));

    let req = Request::post("/api/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(ONE_QUESTION))
        .unwrap();
    let resp = app(provider, true).oneshot(req).await.unwrap();
    // Headers went out with the first chunk, the failure can only cut
    // the body short.
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(to_bytes(resp.into_body(), usize::MAX).await.is_err());
}

#[tokio::test]
async fn test_health() {
    let resp = app(TestModelProvider::default(), true)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
