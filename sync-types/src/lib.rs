//! # sync-types
//!
//! Wire format types for the ressync resource synchronization protocol.
//!
//! This crate provides the vocabulary shared by every ressync crate:
//! - [`Verb`] - the closed set of protocol verbs (`get`, `set`, `got`)
//! - [`Message`] - the flat message object exchanged with a peer
//! - [`Envelope`] - a packed resource (`{name, meta, value}`)
//! - [`MessageError`] - decoding errors

#![warn(missing_docs)]
#![warn(clippy::all)]

mod envelope;
mod error;
mod messages;

pub use envelope::{Envelope, Meta, TYPE_KEY};
pub use error::MessageError;
pub use messages::{Message, Verb};
