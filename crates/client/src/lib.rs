//! Client side of the chat relay.
//!
//! A [`ChatSession`] posts the conversation to the relay, reads the plain
//! text answer as it arrives and keeps a [`History`] whose last assistant
//! message grows in place until the stream ends. Renderers consume
//! [`ChatUpdate`]s and use [`split`] to separate the model's reasoning
//! from its answer.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod decode;
mod error;
mod history;
mod reader;
mod relay_client;
mod segments;
mod session;

pub use decode::{DecodeError, Utf8Decoder};
pub use error::ClientError;
pub use history::History;
pub use segments::{SegmentPair, split};
pub use session::{ChatSession, ChatSessionBuilder, ChatUpdate};
