use chat_relay_core::tool;
use reqwest::StatusCode;

/// JSON-RPC code for invalid method parameters, which MCP servers also
/// use for unknown tools.
const INVALID_PARAMS: i64 = -32602;

/// Errors talking to an MCP server.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// The HTTP exchange failed.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The server answered with a non-success status.
    #[error("server replied with {status}: {body}")]
    Status {
        /// Status code of the reply.
        status: StatusCode,
        /// Body of the reply, possibly empty.
        body: String,
    },
    /// The server no longer knows our session.
    #[error("session expired")]
    SessionExpired,
    /// The reply was neither JSON nor an event stream.
    #[error("unexpected content type `{0}`")]
    ContentType(String),
    /// A message could not be decoded.
    #[error("malformed message: {0}")]
    Decode(#[from] serde_json::Error),
    /// The server answered with a JSON-RPC error.
    #[error("json-rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Error message from the server.
        message: String,
    },
    /// The reply ended without an answer to our request.
    #[error("no response to request {0}")]
    NoResponse(u64),
}

impl From<McpError> for tool::Error {
    fn from(err: McpError) -> Self {
        match err {
            // The model asked for something the server refused, let it
            // know and try again.
            McpError::Rpc { code, message } if code == INVALID_PARAMS => {
                tool::Error::invalid_input().with_reason(message)
            }
            McpError::Rpc { message, .. } => {
                tool::Error::execution_error().with_reason(message)
            }
            err => tool::Error::transport().with_reason(format!("{err}")),
        }
    }
}
