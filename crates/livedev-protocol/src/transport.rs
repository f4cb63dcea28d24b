//! Transport abstraction.
//!
//! A transport moves serialized messages between the editor and remote
//! pages. It reports lifecycle and inbound traffic through the
//! [`TransportEvents`] handle it receives in [`Transport::start`].

use crate::dispatcher::Command;
use livedev_core::ClientId;
use tokio::sync::mpsc;

/// Error raised by a transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("transport not started")]
    NotStarted,
    #[error("client not connected: {0}")]
    NotConnected(ClientId),
    #[error("send failed: {0}")]
    Send(String),
    #[error("failed to start transport: {0}")]
    Start(String),
}

/// Something the transport observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A page finished its handshake.
    Connect { client: ClientId, url: String },
    /// A text frame arrived from a page.
    Message { client: ClientId, payload: String },
    /// A page went away.
    Close { client: ClientId },
    /// The transport itself is gone; every connection is dead.
    Lost,
}

/// Channel capability set required from a transport collaborator.
pub trait Transport: Send + 'static {
    /// Begin accepting connections, reporting through `events`.
    fn start(&mut self, events: TransportEvents) -> Result<(), TransportError>;

    /// Queue `payload` for each client, in call order per client.
    fn send(&self, clients: &[ClientId], payload: &str) -> Result<(), TransportError>;

    /// Drop one client's connection.
    fn close(&self, client: ClientId);

    /// Script the remote page must run to connect back, if any.
    fn remote_script(&self) -> Option<String>;

    /// Release resources; called when the transport is replaced.
    fn stop(&mut self) {}
}

/// Handle a transport uses to report events to its dispatcher.
///
/// Events are tagged with the install generation so that a replaced
/// transport cannot affect the registry after the swap.
#[derive(Debug, Clone)]
pub struct TransportEvents {
    generation: u64,
    commands: mpsc::WeakUnboundedSender<Command>,
}

impl TransportEvents {
    pub(crate) fn new(generation: u64, commands: mpsc::WeakUnboundedSender<Command>) -> Self {
        Self {
            generation,
            commands,
        }
    }

    /// Report an event. Returns false once the dispatcher is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        let Some(commands) = self.commands.upgrade() else {
            return false;
        };
        commands
            .send(Command::Transport {
                generation: self.generation,
                event,
            })
            .is_ok()
    }

    pub fn connect(&self, client: ClientId, url: impl Into<String>) -> bool {
        self.emit(TransportEvent::Connect {
            client,
            url: url.into(),
        })
    }

    pub fn message(&self, client: ClientId, payload: impl Into<String>) -> bool {
        self.emit(TransportEvent::Message {
            client,
            payload: payload.into(),
        })
    }

    pub fn close(&self, client: ClientId) -> bool {
        self.emit(TransportEvent::Close { client })
    }

    pub fn lost(&self) -> bool {
        self.emit(TransportEvent::Lost)
    }
}
