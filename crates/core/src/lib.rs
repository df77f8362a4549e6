//! Core logic of the chat relay: conversation types, the tool seam and
//! the generation loop that turns a model stream into plain bytes.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

pub mod conversation;
mod model_client;
mod relay;
pub mod tool;

pub use model_client::{ModelClient, ModelStream};
pub use relay::{
    DEFAULT_MAX_TOOL_ROUNDS, Relay, RelayBuilder, RelayError, RelayStream,
};
