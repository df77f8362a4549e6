//! The seam between the relay and whatever executes tool calls.

mod error;

use async_trait::async_trait;
use chat_relay_model::ModelTool;
use serde_json::Value;

pub use error::{Error, ErrorKind};

/// The result of a tool call.
pub type ToolResult = Result<String, Error>;

/// A source of tools the model may call.
///
/// One provider is shared by every chat turn of the process, so
/// implementations must tolerate concurrent calls.
#[async_trait]
pub trait ToolProvider: Send + Sync + 'static {
    /// Returns the declarations of every available tool.
    async fn definitions(&self) -> Result<Vec<ModelTool>, Error>;

    /// Calls the tool `name` with JSON `arguments`.
    ///
    /// Errors of kind [`ErrorKind::Transport`] mean the provider itself is
    /// unusable. Any other error is a result the model should see.
    async fn call_tool(&self, name: &str, arguments: Value) -> ToolResult;
}

/// A provider without any tools.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoTools;

#[async_trait]
impl ToolProvider for NoTools {
    async fn definitions(&self) -> Result<Vec<ModelTool>, Error> {
        Ok(vec![])
    }

    async fn call_tool(&self, name: &str, _arguments: Value) -> ToolResult {
        Err(Error::not_found().with_reason(format!("unknown tool `{name}`")))
    }
}
