use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use chat_relay_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
    ToolCallRequest,
};
use pin_project_lite::pin_project;

use crate::Error;
use crate::io::{Sse, SseError};
use crate::proto::GenerateContentChunk;

struct PartialState {
    sse: Sse,
    // Events parsed from the last chunk but not yet handed out. One chunk
    // may carry text, function calls and a finish reason at once.
    pending_events: VecDeque<ModelResponseEvent>,
    tool_call_count: usize,
    // This field will be cleared after the response returns the complete event.
    pending_finish_reason: Option<ModelFinishReason>,
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    pub struct GeminiResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
    }
}

impl GeminiResponse {
    #[inline]
    pub fn from_sse(sse: Sse) -> Self {
        let partial_state = PartialState {
            sse,
            pending_events: Default::default(),
            tool_call_count: 0,
            pending_finish_reason: None,
        };
        let next_event_fut = async move { next_event(partial_state).await };
        Self {
            next_event_fut: Some(Box::pin(next_event_fut)),
        }
    }
}

impl ModelResponse for GeminiResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, partial_state) =
            match ready!(next_event_fut.as_mut().poll(cx)) {
                Ok((Some(event), partial_state)) => (event, partial_state),
                Ok((None, _)) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        // The stream may still have more data to pull, create a new future for
        // the next event.
        let next_event_fut = async move { next_event(partial_state).await };
        *this.next_event_fut = Some(Box::pin(next_event_fut));

        Poll::Ready(Ok(Some(event)))
    }
}

async fn next_event(
    mut partial_state: PartialState,
) -> Result<(Option<ModelResponseEvent>, PartialState), Error> {
    loop {
        // The order of events is important. Always emit what the last chunk
        // produced first, and emit the finish reason only at the very end.
        if let Some(event) = partial_state.pending_events.pop_front() {
            return Ok((Some(event), partial_state));
        }

        let sse_event = match partial_state.sse.next_event().await {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(SseError::ChunksError(err)) => {
                return Err(Error::new(err.0, ErrorKind::Transport));
            }
            Err(SseError::InvalidPayload) => {
                return Err(Error::new("invalid SSE payload", ErrorKind::Other));
            }
        };
        trace!("got sse event: {sse_event}");

        let chunk = serde_json::from_str::<GenerateContentChunk>(&sse_event)
            .map_err(|err| Error::new(format!("{err}"), ErrorKind::Other))?;
        apply_chunk(&mut partial_state, chunk)?;
    }

    if let Some(finish_reason) = partial_state.pending_finish_reason.take() {
        let finish_reason = if partial_state.tool_call_count > 0 {
            // Gemini reports `STOP` even when the turn ends in calls.
            ModelFinishReason::ToolCalls
        } else {
            finish_reason
        };
        return Ok((
            Some(ModelResponseEvent::Completed(finish_reason)),
            partial_state,
        ));
    }

    Ok((None, partial_state))
}

fn apply_chunk(
    partial_state: &mut PartialState,
    chunk: GenerateContentChunk,
) -> Result<(), Error> {
    if let Some(err) = chunk.error {
        return Err(Error::from_api_error(err));
    }
    if let Some(reason) =
        chunk.prompt_feedback.and_then(|feedback| feedback.block_reason)
    {
        return Err(Error::new(
            format!("prompt blocked: {reason}"),
            ErrorKind::Moderated,
        ));
    }

    let Some(candidate) = chunk.candidates.into_iter().next() else {
        return Ok(());
    };

    for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
        if part.thought {
            continue;
        }
        if let Some(text) = part.text.filter(|text| !text.is_empty()) {
            partial_state
                .pending_events
                .push_back(ModelResponseEvent::MessageDelta(text));
        }
        if let Some(call) = part.function_call {
            let idx = partial_state.tool_call_count;
            partial_state.tool_call_count += 1;
            let id = call.id.unwrap_or_else(|| format!("call:{idx}"));
            partial_state.pending_events.push_back(
                ModelResponseEvent::ToolCall(ToolCallRequest {
                    id,
                    name: call.name,
                    arguments: call.args,
                }),
            );
        }
    }

    if let Some(reason) = candidate.finish_reason {
        partial_state.pending_finish_reason = Some(map_finish_reason(&reason));
    }
    Ok(())
}

fn map_finish_reason(reason: &str) -> ModelFinishReason {
    match reason {
        "MAX_TOKENS" => ModelFinishReason::Length,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT"
        | "SPII" | "IMAGE_SAFETY" => ModelFinishReason::ContentFiltered,
        _ => ModelFinishReason::Stop,
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::io::Chunks;

    async fn collect(
        chunks: Vec<Bytes>,
    ) -> Result<Vec<ModelResponseEvent>, Error> {
        let sse = Sse::new(Chunks::from_vec_deque(chunks.into()));
        let mut resp = pin!(GeminiResponse::from_sse(sse));
        let mut events = vec![];
        while let Some(event) =
            poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await?
        {
            events.push(event);
        }
        Ok(events)
    }

    #[tokio::test]
    async fn test_text_and_tool_calls() {
        let events = collect(vec![Bytes::from_static(include_bytes!(
            "../fixtures/stream_with_tool_call.txt"
        ))])
        .await
        .unwrap();
        assert_eq!(
            events,
            vec![
                ModelResponseEvent::MessageDelta("Let me ".to_owned()),
                ModelResponseEvent::MessageDelta("check.".to_owned()),
                ModelResponseEvent::ToolCall(ToolCallRequest {
                    id: "call:0".to_owned(),
                    name: "semantic_search_code".to_owned(),
                    arguments: json!({ "query": "parser languages", "k": 5 }),
                }),
                ModelResponseEvent::Completed(ModelFinishReason::ToolCalls),
            ]
        );
    }

    #[tokio::test]
    async fn test_thoughts_are_dropped() {
        let events = collect(vec![
            Bytes::from_static(
                b"data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"hmm\",\"thought\":true}]}}]}\r\n\r\n",
            ),
            Bytes::from_static(
                b"data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"Hi\"}]},\"finishReason\":\"STOP\"}]}\r\n\r\n",
            ),
        ])
        .await
        .unwrap();
        assert_eq!(
            events,
            vec![
                ModelResponseEvent::MessageDelta("Hi".to_owned()),
                ModelResponseEvent::Completed(ModelFinishReason::Stop),
            ]
        );
    }

    #[tokio::test]
    async fn test_in_stream_error() {
        let err = collect(vec![Bytes::from_static(
            b"data: {\"error\":{\"code\":503,\"message\":\"overloaded\",\"status\":\"UNAVAILABLE\"}}\n\n",
        )])
        .await
        .unwrap_err();
        assert_eq!(err.message(), "overloaded (UNAVAILABLE)");
    }

    #[tokio::test]
    async fn test_blocked_prompt() {
        let err = collect(vec![Bytes::from_static(
            b"data: {\"promptFeedback\":{\"blockReason\":\"SAFETY\"}}\n\n",
        )])
        .await
        .unwrap_err();
        assert_eq!(
            chat_relay_model::ModelProviderError::kind(&err),
            ErrorKind::Moderated
        );
    }
}
