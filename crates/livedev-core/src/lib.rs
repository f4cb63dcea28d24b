//! Core types for the live-preview protocol.
//!
//! This crate provides the protocol primitives shared by the editor-side
//! dispatcher, the transports and the remote runtime bridge: client ids,
//! the closed method table, the wire envelope and its codec.

mod codec;
mod location;
mod message;
mod method;

pub use codec::{CodecError, decode, encode};
pub use location::{TagId, TagLocation};
pub use message::{Envelope, Message, RemoteError};
pub use method::{Method, MethodKind, MethodParseError};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one connected remote page, assigned by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client#{}", self.0)
    }
}

impl From<u64> for ClientId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}
