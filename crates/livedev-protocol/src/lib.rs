//! Editor-side half of the live-preview protocol.
//!
//! The [`Dispatcher`] turns "do X in the remote page" calls into wire
//! messages and wire events into typed callbacks. It owns the connection
//! registry and the pending-request table; both are touched only by the
//! dispatcher task, so no locking is involved. Transports plug in through
//! the [`Transport`] trait.

mod dispatcher;
mod error;
mod handlers;
mod memory;
mod pending;
mod registry;
mod transport;

pub use dispatcher::{Dispatcher, DispatcherConfig, Target};
pub use error::RequestError;
pub use handlers::{Event, Handler};
pub use memory::{MemoryTransport, SentFrame};
pub use pending::ClientReply;
pub use registry::{Connection, ConnectionRegistry};
pub use transport::{Transport, TransportError, TransportEvent, TransportEvents};

pub use livedev_core::{ClientId, Method};
