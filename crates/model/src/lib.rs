//! A provider-neutral protocol for streaming generation with tools.
//!
//! The relay talks to every model backend through the types in this
//! crate, so a backend can be swapped without touching the relay loop.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
