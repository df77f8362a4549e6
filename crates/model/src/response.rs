use std::pin::Pin;
use std::task::{self, Poll};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::provider::ModelProviderError;

/// The streamed output of one model round.
///
/// Events arrive in generation order: text deltas and tool calls
/// interleaved, then one [`ModelResponseEvent::Completed`]. A response is
/// driven by polling, like a stream.
pub trait ModelResponse: Sized + Send + 'static {
    /// Error produced once the stream breaks.
    type Error: ModelProviderError;

    /// Polls for the next event.
    ///
    /// Yields `Ok(Some(_))` per event and `Ok(None)` after the last one,
    /// including on every later poll. An `Err` ends the response, events
    /// already yielded stay valid.
    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>>;
}

/// Why the model stopped generating.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFinishReason {
    /// Tool results are needed before the answer can go on.
    ToolCalls,
    /// The answer is complete.
    Stop,
    /// The output hit the token limit.
    Length,
    /// The provider stopped the output for safety or policy reasons.
    ContentFiltered,
}

/// A tool invocation the model asked for.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Call id, echoed back with the result.
    pub id: String,
    /// Tool name as declared in [`ModelTool`](crate::ModelTool).
    pub name: String,
    /// The arguments object to pass to the tool.
    pub arguments: Value,
}

/// One step of a [`ModelResponse`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelResponseEvent {
    /// Generation ended for the given reason.
    Completed(ModelFinishReason),
    /// More answer text.
    MessageDelta(String),
    /// A tool the model wants called.
    ToolCall(ToolCallRequest),
}
