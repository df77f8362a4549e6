use chat_relay_core::conversation::{ChatRequest, Message};
use reqwest::Client;
use serde::Deserialize;

use crate::ClientError;
use crate::reader::ByteStream;

/// Opens turns against the relay's `/api/chat` endpoint.
#[derive(Clone, Debug)]
pub struct RelayClient {
    http: Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl RelayClient {
    pub fn new<S: Into<String>>(endpoint: S) -> Self {
        Self {
            http: Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// Posts the conversation and returns the answer stream once the
    /// relay has accepted the turn.
    pub async fn open(&self, messages: &[Message]) -> Result<ByteStream, ClientError> {
        let body = ChatRequest {
            messages: messages.to_vec(),
        };
        let resp = self.http.post(&self.endpoint).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ErrorBody>(&text) {
                Ok(body) => body.error,
                Err(_) => text,
            };
            return Err(ClientError::Relay {
                status: status.as_u16(),
                message,
            });
        }
        Ok(ByteStream::from_response(resp))
    }
}
