use serde_json::Value;

use crate::response::ToolCallRequest;

/// Input of one model round.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ModelRequest {
    /// The system instruction, sent apart from the turns.
    pub system_instruction: Option<String>,
    /// The input messages, in turn order.
    pub messages: Vec<ModelMessage>,
    /// Tools the model may call this round.
    pub tools: Vec<ModelTool>,
}

/// One turn of the model-side conversation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ModelMessage {
    /// What the user typed.
    User(String),
    /// Text the model produced, reasoning markers included.
    Assistant(String),
    /// A tool call the model made earlier in this turn.
    ToolCall(ToolCallRequest),
    /// The result of a tool call.
    ToolResult(ToolCallResult),
}

/// The answer to a [`ToolCallRequest`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ToolCallResult {
    /// Id of the call this answers.
    pub id: String,
    /// Tool name, repeated for providers that match by name.
    pub name: String,
    /// What the tool produced.
    pub output: ToolOutput,
}

/// The outcome of a tool call as reported back to the model.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ToolOutput {
    /// The tool succeeded with the given text.
    Success(String),
    /// The tool failed, the text describes why.
    Failure(String),
}

/// A tool declaration.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ModelTool {
    /// Name the model calls the tool by.
    pub name: String,
    /// What the tool does, shown to the model.
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: Value,
}
