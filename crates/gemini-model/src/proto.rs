use chat_relay_model::{ModelMessage, ModelRequest, ModelTool, ToolOutput};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::GeminiConfig;

// ------------------------------
// Types shared by both directions
// ------------------------------

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Thought summaries are not answer text and never reach the caller.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub thought: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub response: Value,
}

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentChunk {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<PromptFeedback>,
    pub error: Option<ApiError>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<Content>,
    pub finish_reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: String,
}

/// The body of a non-2xx reply.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ApiError,
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters_json_schema: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

// -----------
// Conversions
// -----------

const ROLE_USER: &str = "user";
const ROLE_MODEL: &str = "model";

pub fn create_request(
    req: &ModelRequest,
    config: &GeminiConfig,
) -> GenerateContentRequest {
    let mut contents: Vec<Content> = Vec::with_capacity(req.messages.len());
    for msg in &req.messages {
        let (role, part) = create_part(msg);
        // Consecutive parts with the same role belong to one turn, e.g. all
        // function calls of a round or all their responses.
        match contents.last_mut() {
            Some(last) if last.role.as_deref() == Some(role) => {
                last.parts.push(part);
            }
            _ => contents.push(Content {
                role: Some(role.to_owned()),
                parts: vec![part],
            }),
        }
    }

    let tools = if req.tools.is_empty() {
        vec![]
    } else {
        vec![Tool {
            function_declarations: req.tools.iter().map(create_tool).collect(),
        }]
    };

    GenerateContentRequest {
        system_instruction: req.system_instruction.as_ref().map(|text| {
            Content {
                role: None,
                parts: vec![Part {
                    text: Some(text.clone()),
                    ..Default::default()
                }],
            }
        }),
        contents,
        tools,
        generation_config: config
            .temperature
            .map(|temperature| GenerationConfig { temperature }),
    }
}

fn create_part(msg: &ModelMessage) -> (&'static str, Part) {
    match msg {
        ModelMessage::User(text) => (
            ROLE_USER,
            Part {
                text: Some(text.clone()),
                ..Default::default()
            },
        ),
        ModelMessage::Assistant(text) => (
            ROLE_MODEL,
            Part {
                text: Some(text.clone()),
                ..Default::default()
            },
        ),
        ModelMessage::ToolCall(call) => (
            ROLE_MODEL,
            Part {
                function_call: Some(FunctionCall {
                    id: Some(call.id.clone()),
                    name: call.name.clone(),
                    args: call.arguments.clone(),
                }),
                ..Default::default()
            },
        ),
        ModelMessage::ToolResult(result) => {
            let response = match &result.output {
                ToolOutput::Success(output) => json!({ "output": output }),
                ToolOutput::Failure(reason) => json!({ "error": reason }),
            };
            (
                ROLE_USER,
                Part {
                    function_response: Some(FunctionResponse {
                        id: Some(result.id.clone()),
                        name: result.name.clone(),
                        response,
                    }),
                    ..Default::default()
                },
            )
        }
    }
}

#[inline]
fn create_tool(tool: &ModelTool) -> FunctionDeclaration {
    FunctionDeclaration {
        name: tool.name.clone(),
        description: tool.description.clone(),
        parameters_json_schema: tool.parameters.clone(),
    }
}
