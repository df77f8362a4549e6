use std::error::Error;

use crate::error::ErrorKind;
use crate::request::ModelRequest;
use crate::response::ModelResponse;

/// Errors of a [`ModelProvider`], classified so that callers can pick a
/// status code or decide whether to retry.
pub trait ModelProviderError: Error + Send + Sync + 'static {
    /// Classifies the error.
    fn kind(&self) -> ErrorKind;
}

/// A backend that samples streaming answers.
///
/// The relay shares one provider across all concurrent turns, so it must
/// not keep per-request state.
pub trait ModelProvider: Send + Sync {
    /// Error of rejected requests and broken streams.
    type Error: ModelProviderError;

    /// Stream of one round.
    type Response: ModelResponse<Error = Self::Error>;

    /// Starts a round.
    ///
    /// The returned future resolves once the provider has accepted the
    /// request, before any event is streamed. A rejected request (bad
    /// status, unreachable host) must fail here rather than in the
    /// response.
    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static;
}
