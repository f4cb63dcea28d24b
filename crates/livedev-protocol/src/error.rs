use crate::TransportError;
use livedev_core::{ClientId, RemoteError};
use std::time::Duration;

/// Why a request (or notification) did not produce a result.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("no transport installed")]
    NoTransport,
    #[error("no connected clients")]
    NoConnections,
    #[error("unknown client: {0}")]
    UnknownClient(ClientId),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("connection closed: {0}")]
    ConnectionClosed(ClientId),
    #[error("transport replaced while request was pending")]
    TransportReplaced,
    #[error("transport lost")]
    TransportLost,
    #[error("request {id} timed out after {after:?}")]
    Timeout { id: u64, after: Duration },
    #[error("remote error: {0}")]
    Remote(RemoteError),
    #[error("failed to encode message: {0}")]
    Encode(String),
    #[error("dispatcher is shut down")]
    DispatcherClosed,
}

impl RequestError {
    /// True when the request failed because its target went away.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            RequestError::ConnectionClosed(_)
                | RequestError::TransportReplaced
                | RequestError::TransportLost
        )
    }
}
