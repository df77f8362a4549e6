//! Conversation-related types.
//!
//! These are the wire types of the `/api/chat` boundary, shared by the
//! server and the client.

use std::collections::HashSet;

use chat_relay_model::ModelMessage;
use serde::{Deserialize, Serialize};

/// Who authored a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person typing.
    User,
    /// The model.
    Assistant,
}

/// One chat message.
///
/// Messages are values: updating one means replacing it. `content` of an
/// assistant message is the raw stream buffer, reasoning markers included.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Message {
    /// Author of the message.
    pub role: Role,
    /// Raw text of the message.
    pub content: String,
    /// Identifier, unique within a conversation.
    pub id: String,
    /// Whether the message is still receiving text.
    #[serde(default)]
    pub streaming: bool,
}

impl Message {
    /// Creates a finished user message.
    #[inline]
    pub fn user<I: Into<String>, S: Into<String>>(id: I, content: S) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            id: id.into(),
            streaming: false,
        }
    }

    /// Creates the empty assistant message of a turn whose stream has
    /// just opened.
    #[inline]
    pub fn assistant_streaming<I: Into<String>>(id: I) -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            id: id.into(),
            streaming: true,
        }
    }
}

/// The body of `POST /api/chat`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatRequest {
    /// Prior messages followed by the new user message.
    pub messages: Vec<Message>,
}

/// Why a [`ChatRequest`] was rejected.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// No messages at all.
    #[error("`messages` must not be empty")]
    Empty,
    /// The request does not end with a user turn.
    #[error("the last message must have role `user`")]
    LastNotUser,
    /// A message without an id.
    #[error("message at index {0} has an empty id")]
    EmptyId(usize),
    /// Two messages share an id.
    #[error("duplicate message id `{0}`")]
    DuplicateId(String),
}

impl ChatRequest {
    /// Checks the invariants the relay relies on.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let Some(last) = self.messages.last() else {
            return Err(ValidationError::Empty);
        };
        if last.role != Role::User {
            return Err(ValidationError::LastNotUser);
        }

        let mut seen = HashSet::with_capacity(self.messages.len());
        for (idx, msg) in self.messages.iter().enumerate() {
            if msg.id.is_empty() {
                return Err(ValidationError::EmptyId(idx));
            }
            if !seen.insert(msg.id.as_str()) {
                return Err(ValidationError::DuplicateId(msg.id.clone()));
            }
        }
        Ok(())
    }
}

/// Maps chat messages to model turns.
///
/// Messages without content are skipped, an empty turn is rejected by
/// providers and carries nothing anyway.
pub fn to_model_messages(messages: &[Message]) -> Vec<ModelMessage> {
    messages
        .iter()
        .filter(|msg| !msg.content.is_empty())
        .map(|msg| match msg.role {
            Role::User => ModelMessage::User(msg.content.clone()),
            Role::Assistant => ModelMessage::Assistant(msg.content.clone()),
        })
        .collect()
}
