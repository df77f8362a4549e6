use crate::decode::DecodeError;

/// Errors of the chat client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The HTTP exchange with the relay failed.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The relay refused the turn.
    #[error("relay replied with {status}: {message}")]
    Relay {
        /// HTTP status of the reply.
        status: u16,
        /// The relay's error message.
        message: String,
    },
    /// The answer stream was not valid UTF-8.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// Reading or writing the history file failed.
    #[error("history file: {0}")]
    Io(#[from] std::io::Error),
    /// The history file is not valid JSON.
    #[error("malformed history file: {0}")]
    Json(#[from] serde_json::Error),
    /// The session task has stopped.
    #[error("the chat session has shut down")]
    SessionClosed,
}
