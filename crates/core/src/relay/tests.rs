use std::sync::Mutex;

use async_trait::async_trait;
use chat_relay_model::{
    ModelMessage, ModelTool, ToolCallRequest, ToolCallResult, ToolOutput,
};
use chat_relay_test_model::{PresetEvent, PresetResponse, TestModelProvider};
use futures_util::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use super::*;
use crate::conversation::Role;
use crate::tool::{Error as ToolError, ToolResult};

/// A tool provider with one `lookup` tool whose answers are scripted.
struct ScriptedTools {
    answer: fn(&Value) -> ToolResult,
    calls: Mutex<Vec<(String, Value)>>,
}

impl ScriptedTools {
    fn new(answer: fn(&Value) -> ToolResult) -> Arc<Self> {
        Arc::new(Self {
            answer,
            calls: Mutex::new(vec![]),
        })
    }
}

#[async_trait]
impl ToolProvider for ScriptedTools {
    async fn definitions(&self) -> Result<Vec<ModelTool>, tool::Error> {
        Ok(vec![ModelTool {
            name: "lookup".to_owned(),
            description: "Looks things up.".to_owned(),
            parameters: json!({ "type": "object" }),
        }])
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> ToolResult {
        let answer = (self.answer)(&arguments);
        self.calls
            .lock()
            .unwrap()
            .push((name.to_owned(), arguments));
        answer
    }
}

fn lookup_call(id: &str) -> PresetEvent {
    PresetEvent::ToolCall(ToolCallRequest {
        id: id.to_owned(),
        name: "lookup".to_owned(),
        arguments: json!({ "q": "parsers" }),
    })
}

fn conversation() -> Vec<Message> {
    vec![
        Message::user("u1", "hi"),
        Message {
            role: Role::Assistant,
            content: "<think>greet</think>Hello!".to_owned(),
            id: "a1".to_owned(),
            streaming: false,
        },
        Message {
            role: Role::Assistant,
            content: String::new(),
            id: "a2".to_owned(),
            streaming: false,
        },
        Message::user("u2", "which parsers exist?"),
    ]
}

async fn collect_text(mut stream: RelayStream) -> Result<String, RelayError> {
    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        text.push_str(std::str::from_utf8(&chunk?).unwrap());
    }
    Ok(text)
}

#[tokio::test]
async fn test_plain_answer() {
    let mut model = TestModelProvider::default();
    model.add_response(PresetResponse::with_deltas([
        "<think>short</think>",
        "Tree-sitter ",
        "parsers.",
    ]));
    let relay = RelayBuilder::with_model_provider(model.clone())
        .with_system_instruction("Answer about the codebase.")
        .build();

    let stream = relay.open(&conversation()).await.unwrap();
    assert_eq!(
        collect_text(stream).await.unwrap(),
        "<think>short</think>Tree-sitter parsers."
    );

    let requests = model.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].system_instruction.as_deref(),
        Some("Answer about the codebase.")
    );
    assert_eq!(
        requests[0].messages,
        vec![
            ModelMessage::User("hi".to_owned()),
            ModelMessage::Assistant("<think>greet</think>Hello!".to_owned()),
            ModelMessage::User("which parsers exist?".to_owned()),
        ]
    );
    assert!(requests[0].tools.is_empty());
}

#[tokio::test]
async fn test_tool_round() {
    let mut model = TestModelProvider::default();
    model.add_response(PresetResponse::with_events([
        PresetEvent::MessageDelta("Let me check. ".to_owned()),
        lookup_call("call:0"),
    ]));
    model.add_response(PresetResponse::with_deltas(["Python and ", "Rust."]));
    let tools = ScriptedTools::new(|_| Ok("python, rust".to_owned()));
    let relay = RelayBuilder::with_model_provider(model.clone())
        .with_tools(tools.clone())
        .build();

    let stream = relay.open(&conversation()).await.unwrap();
    assert_eq!(
        collect_text(stream).await.unwrap(),
        "Let me check. Python and Rust."
    );

    assert_eq!(
        *tools.calls.lock().unwrap(),
        vec![("lookup".to_owned(), json!({ "q": "parsers" }))]
    );

    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].tools.len(), 1);
    assert_eq!(
        requests[1].messages[3..],
        [
            ModelMessage::Assistant("Let me check. ".to_owned()),
            ModelMessage::ToolCall(ToolCallRequest {
                id: "call:0".to_owned(),
                name: "lookup".to_owned(),
                arguments: json!({ "q": "parsers" }),
            }),
            ModelMessage::ToolResult(ToolCallResult {
                id: "call:0".to_owned(),
                name: "lookup".to_owned(),
                output: ToolOutput::Success("python, rust".to_owned()),
            }),
        ]
    );
}

#[tokio::test]
async fn test_tool_failure_is_fed_back() {
    let mut model = TestModelProvider::default();
    model.add_response(PresetResponse::with_events([lookup_call("c")]));
    model.add_response(PresetResponse::with_deltas(["Nothing found."]));
    let tools = ScriptedTools::new(|_| {
        Err(ToolError::execution_error().with_reason("index is empty"))
    });
    let relay = RelayBuilder::with_model_provider(model.clone())
        .with_tools(tools)
        .build();

    let stream = relay.open(&conversation()).await.unwrap();
    assert_eq!(collect_text(stream).await.unwrap(), "Nothing found.");

    let requests = model.requests();
    let last = requests[1].messages.last().unwrap();
    assert_eq!(
        *last,
        ModelMessage::ToolResult(ToolCallResult {
            id: "c".to_owned(),
            name: "lookup".to_owned(),
            output: ToolOutput::Failure("index is empty".to_owned()),
        })
    );
}

#[tokio::test]
async fn test_tool_transport_error_before_first_byte() {
    let mut model = TestModelProvider::default();
    model.add_response(PresetResponse::with_events([lookup_call("c")]));
    let tools = ScriptedTools::new(|_| {
        Err(ToolError::transport().with_reason("connection refused"))
    });
    let relay = RelayBuilder::with_model_provider(model)
        .with_tools(tools)
        .build();

    let err = relay.open(&conversation()).await.err().unwrap();
    assert!(matches!(err, RelayError::ToolTransport(_)));
}

#[tokio::test]
async fn test_provider_rejection_before_first_byte() {
    let mut model = TestModelProvider::default();
    model.add_response(PresetResponse::with_deltas(["never"]).with_failures(0));
    let relay = RelayBuilder::with_model_provider(model).build();

    let err = relay.open(&conversation()).await.err().unwrap();
    assert!(matches!(err, RelayError::Provider(_)));
    assert_eq!(
        err.provider_kind(),
        Some(chat_relay_model::ErrorKind::Transport)
    );
}

#[tokio::test]
async fn test_error_after_first_byte_ends_stream() {
    let mut model = TestModelProvider::default();
    model.add_response(PresetResponse::with_events([
        PresetEvent::MessageDelta("Partial".to_owned()),
        PresetEvent::Error("connection reset".to_owned()),
    ]));
    let relay = RelayBuilder::with_model_provider(model).build();

    let mut stream = relay.open(&conversation()).await.unwrap();
    assert_eq!(
        stream.next().await.unwrap().unwrap(),
        Bytes::from_static(b"Partial")
    );
    assert!(matches!(
        stream.next().await,
        Some(Err(RelayError::Provider(_)))
    ));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_tool_rounds_exceeded() {
    let mut model = TestModelProvider::default();
    model.add_response(PresetResponse::with_events([lookup_call("a")]));
    model.add_response(PresetResponse::with_events([lookup_call("b")]));
    let tools = ScriptedTools::new(|_| Ok("again".to_owned()));
    let relay = RelayBuilder::with_model_provider(model)
        .with_tools(tools.clone())
        .with_max_tool_rounds(1)
        .build();

    let err = relay.open(&conversation()).await.err().unwrap();
    assert!(matches!(err, RelayError::ToolRoundsExceeded(1)));
    assert_eq!(tools.calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_empty_answer() {
    let mut model = TestModelProvider::default();
    model.add_response(PresetResponse::with_events(Vec::new()));
    let relay = RelayBuilder::with_model_provider(model).build();

    let stream = relay.open(&conversation()).await.unwrap();
    assert_eq!(collect_text(stream).await.unwrap(), "");
}
