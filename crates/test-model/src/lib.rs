//! A local fake model for testing purpose.

mod preset;

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use chat_relay_model::{
    ErrorKind, ModelFinishReason, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub struct TestModelResponse {
    events: Vec<PresetEvent>,
    event_idx: usize,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();

        if let Some(sleep) = &mut this.sleep {
            ready!(sleep.as_mut().poll(cx));
            this.sleep = None;

            let idx = this.event_idx;
            this.event_idx += 1;
            if idx < this.events.len() {
                let event = match &this.events[idx] {
                    PresetEvent::MessageDelta(msg) => {
                        ModelResponseEvent::MessageDelta(msg.clone())
                    }
                    PresetEvent::ToolCall(req) => {
                        ModelResponseEvent::ToolCall(req.clone())
                    }
                    PresetEvent::Error(message) => {
                        // Nothing more is delivered after a broken stream.
                        this.event_idx = this.events.len() + 1;
                        return Poll::Ready(Err(Error {
                            message: message.clone(),
                            kind: ErrorKind::Transport,
                        }));
                    }
                };
                return Poll::Ready(Ok(Some(event)));
            } else if idx == this.events.len() {
                let has_tool_call = this
                    .events
                    .iter()
                    .any(|event| matches!(event, PresetEvent::ToolCall(_)));
                return Poll::Ready(Ok(Some(ModelResponseEvent::Completed(
                    if has_tool_call {
                        ModelFinishReason::ToolCalls
                    } else {
                        ModelFinishReason::Stop
                    },
                ))));
            } else {
                // In case this method is called after completion.
                this.event_idx = this.events.len() + 1;
                return Poll::Ready(Ok(None));
            }
        }
        this.sleep = Some(Box::pin(sleep(this.delay)));
        Pin::new(this).poll_next_event(cx)
    }
}

#[derive(Default)]
struct Script {
    responses: VecDeque<PresetResponse>,
    requests: Vec<ModelRequest>,
}

/// A local fake model for testing purpose.
///
/// Before sending requests, you need to queue the responses the model
/// should give. Every request takes the next response in the queue, so a
/// tool-calling turn consumes one response per model round. If the queue
/// runs dry, the request is rejected.
///
/// Clones share the same script, which lets a test keep a handle for
/// inspecting the requests after handing the provider to the code under
/// test.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    script: Arc<Mutex<Script>>,
    delay: Option<Duration>,
}

impl TestModelProvider {
    /// Queues the response for the next model round.
    #[inline]
    pub fn add_response(&mut self, preset: PresetResponse) {
        self.lock().responses.push_back(preset);
    }

    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns every request received so far, in order.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.lock().requests.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        // A panicking test thread may poison the lock, the script is
        // still usable for inspection.
        self.script.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn next_response(&self, req: &ModelRequest) -> Result<Vec<PresetEvent>, Error> {
        let mut script = self.lock();
        script.requests.push(req.clone());

        let Some(mut preset) = script.responses.pop_front() else {
            return Err(Error {
                message: "no more preset responses".to_owned(),
                kind: ErrorKind::Other,
            });
        };
        match preset.failures {
            Some(0) => {
                script.responses.push_front(preset);
                Err(Error {
                    message: "preset failure".to_owned(),
                    kind: ErrorKind::Transport,
                })
            }
            Some(n) => {
                preset.failures = if n == 1 { None } else { Some(n - 1) };
                script.responses.push_front(preset);
                Err(Error {
                    message: "preset failure".to_owned(),
                    kind: ErrorKind::Transport,
                })
            }
            None => Ok(preset.events),
        }
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let delay = self.delay.unwrap_or(Duration::from_millis(1));
        let resp = self.next_response(req).map(|events| TestModelResponse {
            events,
            event_idx: 0,
            delay,
            sleep: None,
        });
        ready(resp)
    }
}
