use std::sync::Arc;

use bytes::Bytes;
use chat_relay_model::{
    ModelFinishReason, ModelMessage, ModelRequest, ModelResponseEvent,
    ToolCallRequest, ToolCallResult, ToolOutput,
};
use tokio::sync::mpsc;
use tracing::Instrument;

use super::RelayError;
use crate::model_client::ModelClient;
use crate::tool::{ErrorKind as ToolErrorKind, ToolProvider};

/// One chat turn: model rounds interleaved with tool calls, until the
/// model answers without requesting tools.
pub(super) struct Turn {
    pub model_client: ModelClient,
    pub tools: Arc<dyn ToolProvider>,
    pub request: ModelRequest,
    pub max_tool_rounds: usize,
    pub tx: mpsc::Sender<Result<Bytes, RelayError>>,
}

/// What a model round left behind.
struct RoundOutput {
    text: String,
    tool_calls: Vec<ToolCallRequest>,
}

impl Turn {
    pub async fn run(mut self) {
        match self.drive().await {
            Ok(()) => info!("turn finished"),
            Err(err) => {
                error!("turn failed: {err}");
                // The consumer may be gone already, nothing to do then.
                self.tx.send(Err(err)).await.ok();
            }
        }
    }

    async fn drive(&mut self) -> Result<(), RelayError> {
        let mut tool_rounds = 0;
        let mut round = 0;
        loop {
            round += 1;
            let output = self
                .stream_round()
                .instrument(debug_span!("model round", round))
                .await?;
            let Some(RoundOutput { text, tool_calls }) = output else {
                debug!("consumer went away, stopping");
                return Ok(());
            };
            if tool_calls.is_empty() {
                return Ok(());
            }

            tool_rounds += 1;
            if tool_rounds > self.max_tool_rounds {
                return Err(RelayError::ToolRoundsExceeded(self.max_tool_rounds));
            }

            if !text.is_empty() {
                self.request.messages.push(ModelMessage::Assistant(text));
            }
            let mut results = Vec::with_capacity(tool_calls.len());
            for call in &tool_calls {
                results.push(self.call_tool(call).await?);
            }
            self.request
                .messages
                .extend(tool_calls.into_iter().map(ModelMessage::ToolCall));
            self.request
                .messages
                .extend(results.into_iter().map(ModelMessage::ToolResult));
        }
    }

    /// Streams one model response to the consumer. Returns `None` if the
    /// consumer went away.
    async fn stream_round(&mut self) -> Result<Option<RoundOutput>, RelayError> {
        let mut stream = self
            .model_client
            .send_request(self.request.clone())
            .await
            .map_err(RelayError::Provider)?;

        let mut text = String::new();
        let mut tool_calls = vec![];
        while let Some(event) =
            stream.next_event().await.map_err(RelayError::Provider)?
        {
            match event {
                ModelResponseEvent::MessageDelta(delta) => {
                    text.push_str(&delta);
                    if self.tx.send(Ok(Bytes::from(delta))).await.is_err() {
                        return Ok(None);
                    }
                }
                ModelResponseEvent::ToolCall(call) => {
                    debug!("model requested tool `{}`", call.name);
                    tool_calls.push(call);
                }
                ModelResponseEvent::Completed(reason) => match reason {
                    ModelFinishReason::Length => {
                        warn!("answer truncated by the token limit")
                    }
                    ModelFinishReason::ContentFiltered => {
                        warn!("answer stopped by the content filter")
                    }
                    _ => trace!("round completed: {reason:?}"),
                },
            }
        }
        Ok(Some(RoundOutput { text, tool_calls }))
    }

    async fn call_tool(
        &self,
        call: &ToolCallRequest,
    ) -> Result<ToolCallResult, RelayError> {
        trace!("calling `{}` with args: {:?}", call.name, call.arguments);
        let output = match self
            .tools
            .call_tool(&call.name, call.arguments.clone())
            .await
        {
            Ok(output) => ToolOutput::Success(output),
            Err(err) if err.kind() == ToolErrorKind::Transport => {
                return Err(RelayError::ToolTransport(err));
            }
            Err(err) => {
                warn!("tool `{}` failed: {err}", call.name);
                ToolOutput::Failure(err.reason().into_owned())
            }
        };
        Ok(ToolCallResult {
            id: call.id.clone(),
            name: call.name.clone(),
            output,
        })
    }
}
