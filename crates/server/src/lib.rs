//! The HTTP face of the chat relay.
//!
//! `POST /api/chat` takes a conversation and streams the model's answer
//! back as plain text. Tool calls are resolved against the MCP server in
//! between and never reach the client.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod config;
mod http;

pub use config::ServerConfig;
pub use http::{ApiError, router};
