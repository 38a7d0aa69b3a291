//! Minimal IRC wire model for ironbnc.
//!
//! This crate carries just enough of the IRC protocol for a bouncer core:
//! an owned [`Message`] type with [`Prefix`] and [`Command`], line
//! parsing and serialization, a tokio-util [`codec::LineCodec`], and the
//! RFC 1459 wildcard matcher used by host access lists.
//!
//! It deliberately does not model IRCv3 tags, capability negotiation or
//! numerics beyond what the session layer emits; unknown commands round
//! trip through [`Command::Raw`].

pub mod codec;
mod command;
mod error;
mod message;
mod prefix;
pub mod util;

pub use codec::LineCodec;
pub use command::Command;
pub use error::ProtoError;
pub use message::Message;
pub use prefix::Prefix;
