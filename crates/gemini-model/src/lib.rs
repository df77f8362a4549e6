//! A model provider for the Gemini `streamGenerateContent` API.

#[macro_use]
extern crate tracing;

mod config;
mod io;
mod proto;
mod response;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use chat_relay_model::{
    ErrorKind, ModelProvider, ModelProviderError, ModelRequest,
};
use mime::Mime;
use reqwest::{Client, Response, StatusCode, header};

pub use config::{GeminiConfig, GeminiConfigBuilder};
use io::{Chunks, Sse};
use proto::{ApiError, ErrorEnvelope};
pub use response::GeminiResponse;

/// Error type for [`GeminiProvider`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    fn from_api_error(err: ApiError) -> Self {
        let kind = match StatusCode::from_u16(err.code) {
            Ok(StatusCode::TOO_MANY_REQUESTS) => ErrorKind::RateLimitExceeded,
            _ => ErrorKind::Other,
        };
        if err.status.is_empty() {
            Self::new(err.message, kind)
        } else {
            Self::new(format!("{} ({})", err.message, err.status), kind)
        }
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// Gemini model provider.
#[derive(Clone, Debug)]
pub struct GeminiProvider {
    client: Client,
    config: Arc<GeminiConfig>,
}

impl GeminiProvider {
    /// Creates a new `GeminiProvider` with the given configuration.
    #[inline]
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
        }
    }
}

impl ModelProvider for GeminiProvider {
    type Error = Error;
    type Response = GeminiResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let gemini_req = proto::create_request(req, &self.config);
        let resp_fut = self
            .client
            .post(self.config.stream_url())
            .header("x-goog-api-key", &self.config.api_key)
            .header(header::ACCEPT, "text/event-stream")
            .json(&gemini_req)
            .send();

        async move {
            let resp = match resp_fut.await {
                Ok(resp) => resp,
                Err(err) => {
                    return Err(Error::new(
                        format!("{err}"),
                        ErrorKind::Transport,
                    ));
                }
            };
            let resp = check_status(resp).await?;

            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            let is_event_stream = content_type
                .and_then(|v| v.parse().ok())
                .map(|m: Mime| m.subtype().as_str() == "event-stream")
                .unwrap_or(false);
            if !is_event_stream {
                return Err(Error::new(
                    format!("Unexpected content type: {content_type:?}"),
                    ErrorKind::Other,
                ));
            }

            // Here we got a successful response.
            debug!("gemini stream opened");
            let chunks = Chunks::from_response(resp);
            let sse = Sse::new(chunks);
            Ok(GeminiResponse::from_sse(sse))
        }
    }
}

/// Turns a non-2xx reply into an error, keeping the message the API sent.
async fn check_status(resp: Response) -> Result<Response, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    warn!("gemini replied with {status}");
    match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => {
            let mut err = envelope.error;
            if err.code == 0 {
                err.code = status.as_u16();
            }
            Err(Error::from_api_error(err))
        }
        Err(_) => {
            let kind = if status == StatusCode::TOO_MANY_REQUESTS {
                ErrorKind::RateLimitExceeded
            } else {
                ErrorKind::Other
            };
            Err(Error::new(format!("{status}: {body}"), kind))
        }
    }
}
