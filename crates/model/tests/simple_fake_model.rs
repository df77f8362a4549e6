use std::collections::VecDeque;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::task::{self, Poll, ready};
use std::time::Duration;

use chat_relay_model::{
    ErrorKind, ModelFinishReason, ModelMessage, ModelProvider,
    ModelProviderError, ModelRequest, ModelResponse, ModelResponseEvent,
};
use tokio::time::{Sleep, sleep};

#[derive(Debug)]
struct EchoProviderError(ErrorKind);

impl Display for EchoProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Error for EchoProviderError {}

impl ModelProviderError for EchoProviderError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

/// Streams the last user input back, wrapped in a reasoning span, one
/// word per event.
#[derive(Debug)]
struct EchoResponse {
    pieces: VecDeque<String>,
    finished: bool,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl EchoResponse {
    fn new(input: &str) -> Self {
        let mut pieces: VecDeque<String> = ["<think>", "echoing", "</think>"]
            .into_iter()
            .map(ToString::to_string)
            .collect();
        let words: Vec<&str> = input.split(' ').collect();
        for (idx, word) in words.iter().enumerate() {
            if idx + 1 < words.len() {
                pieces.push_back(format!("{word} "));
            } else {
                pieces.push_back(word.to_string());
            }
        }
        Self {
            pieces,
            finished: false,
            sleep: None,
        }
    }
}

impl ModelResponse for EchoResponse {
    type Error = EchoProviderError;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();
        if let Some(sleep) = &mut this.sleep {
            ready!(sleep.as_mut().poll(cx));
            this.sleep = None;

            if let Some(piece) = this.pieces.pop_front() {
                return Poll::Ready(Ok(Some(
                    ModelResponseEvent::MessageDelta(piece),
                )));
            }
            if !this.finished {
                this.finished = true;
                return Poll::Ready(Ok(Some(ModelResponseEvent::Completed(
                    ModelFinishReason::Stop,
                ))));
            }
            return Poll::Ready(Ok(None));
        }
        this.sleep = Some(Box::pin(sleep(Duration::from_millis(1))));
        Pin::new(this).poll_next_event(cx)
    }
}

struct EchoProvider;

impl ModelProvider for EchoProvider {
    type Error = EchoProviderError;
    type Response = EchoResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let input = req.messages.iter().rev().find_map(|msg| match msg {
            ModelMessage::User(text) => Some(text.clone()),
            _ => None,
        });
        let result = match input {
            Some(input) => Ok(EchoResponse::new(&input)),
            None => Err(EchoProviderError(ErrorKind::Other)),
        };
        ready(result)
    }
}

mod tests {
    use std::future::poll_fn;

    use super::*;

    #[tokio::test]
    async fn test_streamed_completion() {
        let provider = EchoProvider;
        let req = ModelRequest {
            system_instruction: Some("Repeat after the user.".to_owned()),
            messages: vec![ModelMessage::User("Good morning".to_owned())],
            tools: vec![],
        };
        let mut resp = provider.send_request(&req).await.unwrap();

        let mut buffer = String::new();
        let mut finish_reason = None;
        loop {
            let event =
                poll_fn(|cx| Pin::new(&mut resp).poll_next_event(cx)).await;
            match event {
                Ok(Some(ModelResponseEvent::MessageDelta(delta))) => {
                    buffer.push_str(&delta);
                }
                Ok(Some(ModelResponseEvent::Completed(reason))) => {
                    finish_reason = Some(reason);
                }
                Ok(Some(event)) => unreachable!("unexpected event: {event:?}"),
                Ok(None) => break,
                Err(err) => unreachable!("unexpected error: {err:?}"),
            }
        }

        assert_eq!(buffer, "<think>echoing</think>Good morning");
        assert_eq!(finish_reason, Some(ModelFinishReason::Stop));
    }

    #[tokio::test]
    async fn test_rejected_request() {
        let provider = EchoProvider;
        let req = ModelRequest::default();
        let err = provider.send_request(&req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Other);
    }
}
