use axum::body::Body;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chat_relay_core::conversation::{ChatRequest, ValidationError};
use chat_relay_core::{Relay, RelayError};
use serde_json::json;

/// Builds the HTTP routes of the relay.
pub fn router(relay: Relay) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/health", get(health))
        .with_state(relay)
}

/// A request that ended before any answer text was sent.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The body is not a chat request.
    #[error("invalid request body: {0}")]
    InvalidBody(String),
    /// The chat request breaks an invariant.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The turn failed before its first byte.
    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl ApiError {
    /// Returns the HTTP status of the error response.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidBody(_) | ApiError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Relay(RelayError::ToolRoundsExceeded(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Relay(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<JsonRejection> for ApiError {
    #[inline]
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidBody(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("turn failed before its first byte: {self}");
        } else {
            debug!("rejected chat request: {self}");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

async fn chat(
    State(relay): State<Relay>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body?;
    req.validate()?;

    let stream = relay.open(&req.messages).await?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(stream),
    )
        .into_response())
}

async fn health() -> &'static str {
    "ok"
}
