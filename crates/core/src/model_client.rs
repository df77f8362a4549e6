use std::future::poll_fn;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use chat_relay_model::{
    ModelProvider, ModelProviderError, ModelRequest, ModelResponse,
    ModelResponseEvent,
};
use tracing::Instrument;

type SendRequestResult = Result<ModelStream, Box<dyn ModelProviderError>>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
type HandlerFn =
    Arc<dyn Fn(ModelRequest) -> BoxedSendRequestFuture + Send + Sync>;

/// A wrapper around a model provider that provides a type-erased
/// interface for the other modules.
#[derive(Clone)]
pub struct ModelClient {
    handler_fn: HandlerFn,
}

impl ModelClient {
    /// Wraps `provider`.
    #[inline]
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // We have to erase the type `P`, since `ModelClient` doesn't have a
        // generic parameter and we don't want it either.
        let handler_fn: HandlerFn = Arc::new(move |req| {
            let fut = provider.send_request(&req);
            Box::pin(
                async move {
                    trace!("got a request: {:?}", req);
                    match fut.await {
                        Ok(resp) => Ok(ModelStream {
                            inner: Box::pin(resp),
                        }),
                        Err(err) => {
                            error!("request rejected: {err}");
                            Err(Box::new(err) as Box<dyn ModelProviderError>)
                        }
                    }
                }
                .instrument(trace_span!("model client req")),
            )
        });
        Self { handler_fn }
    }

    /// Sends a request and returns the opened response stream.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. Dropping the returned stream stops
    /// the underlying response.
    #[inline]
    pub async fn send_request(&self, req: ModelRequest) -> SendRequestResult {
        (self.handler_fn)(req).await
    }
}

/// A type-erased response of a [`ModelClient`].
pub struct ModelStream {
    inner: Pin<Box<dyn ErasedResponse>>,
}

impl ModelStream {
    /// Waits for the next event, `None` once the response has ended.
    pub async fn next_event(
        &mut self,
    ) -> Result<Option<ModelResponseEvent>, Box<dyn ModelProviderError>> {
        let event = poll_fn(|cx| self.inner.as_mut().poll_next_erased(cx)).await;
        match &event {
            Ok(Some(event)) => trace!("got an event: {event:?}"),
            Ok(None) => trace!("finished a request"),
            Err(err) => error!("response failed: {err}"),
        }
        event
    }
}

trait ErasedResponse: Send {
    fn poll_next_erased(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Box<dyn ModelProviderError>>>;
}

impl<R: ModelResponse> ErasedResponse for R {
    #[inline]
    fn poll_next_erased(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Box<dyn ModelProviderError>>>
    {
        self.poll_next_event(cx)
            .map_err(|err| Box::new(err) as Box<dyn ModelProviderError>)
    }
}
