mod builder;
#[cfg(test)]
mod tests;
mod turn;

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use chat_relay_model::{ErrorKind, ModelProviderError, ModelRequest};
use futures_util::stream::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::conversation::{Message, to_model_messages};
use crate::model_client::ModelClient;
use crate::tool::{self, ToolProvider};
pub use builder::{DEFAULT_MAX_TOOL_ROUNDS, RelayBuilder};
use turn::Turn;

/// Errors that end a relayed turn.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The model provider rejected the request or broke the stream.
    #[error("model provider error: {0}")]
    Provider(Box<dyn ModelProviderError>),
    /// The tool provider could not be reached.
    #[error("tool provider error: {0}")]
    ToolTransport(tool::Error),
    /// The model kept asking for tools.
    #[error("the model requested tools in more than {0} rounds")]
    ToolRoundsExceeded(usize),
}

impl RelayError {
    /// Returns the provider error kind, if the model provider failed.
    #[inline]
    pub fn provider_kind(&self) -> Option<ErrorKind> {
        match self {
            RelayError::Provider(err) => Some(err.kind()),
            _ => None,
        }
    }
}

/// Turns chat conversations into streams of answer text.
///
/// A relay is cheap to clone, all clones share the same model client and
/// tool provider.
#[derive(Clone)]
pub struct Relay {
    inner: Arc<RelayInner>,
}

struct RelayInner {
    model_client: ModelClient,
    tools: Arc<dyn ToolProvider>,
    system_instruction: Option<String>,
    max_tool_rounds: usize,
}

impl Relay {
    fn from_builder(builder: RelayBuilder) -> Self {
        let RelayBuilder {
            model_client,
            tools,
            system_instruction,
            max_tool_rounds,
        } = builder;
        Self {
            inner: Arc::new(RelayInner {
                model_client,
                tools,
                system_instruction,
                max_tool_rounds,
            }),
        }
    }

    /// Starts generating the answer to `messages`, whose last element is
    /// the new user message.
    ///
    /// The returned future resolves once the first piece of answer text
    /// is available, or once the turn has ended without producing any.
    /// A failure before that point is returned as `Err`, a later one is
    /// yielded by the stream and ends it.
    pub async fn open(
        &self,
        messages: &[Message],
    ) -> Result<RelayStream, RelayError> {
        let span = info_span!("relay turn", messages = messages.len());
        let inner = &self.inner;

        let tools = inner
            .tools
            .definitions()
            .instrument(span.clone())
            .await
            .map_err(RelayError::ToolTransport)?;
        let request = ModelRequest {
            system_instruction: inner.system_instruction.clone(),
            messages: to_model_messages(messages),
            tools,
        };

        // Capacity 1: the generation never runs more than one chunk ahead
        // of the consumer.
        let (tx, mut rx) = mpsc::channel(1);
        let turn = Turn {
            model_client: inner.model_client.clone(),
            tools: Arc::clone(&inner.tools),
            request,
            max_tool_rounds: inner.max_tool_rounds,
            tx,
        };
        let task = TaskGuard(tokio::spawn(turn.run().instrument(span)));

        let first = match rx.recv().await {
            Some(Ok(chunk)) => Some(chunk),
            Some(Err(err)) => return Err(err),
            None => None,
        };
        Ok(RelayStream {
            first,
            rx,
            _task: task,
        })
    }
}

/// The answer text of one turn, in the order the model produced it.
///
/// Dropping the stream cancels the generation.
pub struct RelayStream {
    first: Option<Bytes>,
    rx: mpsc::Receiver<Result<Bytes, RelayError>>,
    _task: TaskGuard,
}

impl Stream for RelayStream {
    type Item = Result<Bytes, RelayError>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        if let Some(first) = self.first.take() {
            return Poll::Ready(Some(Ok(first)));
        }
        self.rx.poll_recv(cx)
    }
}

struct TaskGuard(JoinHandle<()>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}
