//! WebSocket transport for the live-preview protocol.
//!
//! Pages run the bootstrap script from [`WebSocketTransport::remote_script`],
//! open a socket to the listener, announce themselves with a
//! `{"type":"connect","url":...}` frame and then exchange protocol
//! messages wrapped in `{"type":"message","message":...}` frames.

mod frame;
mod server;

pub use frame::PageFrame;

use livedev_core::ClientId;
use livedev_protocol::{Transport, TransportError, TransportEvents};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const BOOTSTRAP: &str = include_str!("../assets/bootstrap.js");
const URL_PLACEHOLDER: &str = "__LIVEDEV_WS_URL__";

/// Queued work for one connection's writer.
#[derive(Debug)]
pub(crate) enum Outbound {
    Text(String),
    Close,
}

pub(crate) type Clients = Arc<RwLock<HashMap<ClientId, mpsc::UnboundedSender<Outbound>>>>;

pub struct WebSocketTransport {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    public_url: Option<String>,
    clients: Clients,
    next_client: Arc<AtomicU64>,
    accept_task: Option<JoinHandle<()>>,
}

impl WebSocketTransport {
    /// Bind the listener. Connections are accepted once the dispatcher starts us.
    pub async fn bind(addr: SocketAddr) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener: Some(listener),
            local_addr,
            public_url: None,
            clients: Arc::new(RwLock::new(HashMap::new())),
            next_client: Arc::new(AtomicU64::new(1)),
            accept_task: None,
        })
    }

    /// Override the URL pages connect to (e.g. behind a proxy).
    pub fn with_public_url(mut self, url: impl Into<String>) -> Self {
        self.public_url = Some(url.into());
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// URL pages open their socket to.
    pub fn url(&self) -> String {
        self.public_url
            .clone()
            .unwrap_or_else(|| format!("ws://{}", self.local_addr))
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }
}

impl Transport for WebSocketTransport {
    fn start(&mut self, events: TransportEvents) -> Result<(), TransportError> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| TransportError::Start("already started".to_string()))?;
        tracing::info!("Listening on ws://{}", self.local_addr);
        self.accept_task = Some(tokio::spawn(server::accept_loop(
            listener,
            events,
            self.clients.clone(),
            self.next_client.clone(),
        )));
        Ok(())
    }

    fn send(&self, clients: &[ClientId], payload: &str) -> Result<(), TransportError> {
        if self.accept_task.is_none() {
            return Err(TransportError::NotStarted);
        }
        let senders = self.clients.read();
        let mut queues = Vec::with_capacity(clients.len());
        for client in clients {
            let queue = senders
                .get(client)
                .ok_or(TransportError::NotConnected(*client))?;
            queues.push((client, queue));
        }
        // A queue can close between the lookup and the send; its
        // connection task reports the close.
        for (client, queue) in queues {
            if queue.send(Outbound::Text(payload.to_string())).is_err() {
                tracing::debug!(%client, "outbound queue closed");
            }
        }
        Ok(())
    }

    fn close(&self, client: ClientId) {
        if let Some(queue) = self.clients.read().get(&client) {
            let _ = queue.send(Outbound::Close);
        }
    }

    fn remote_script(&self) -> Option<String> {
        Some(BOOTSTRAP.replace(URL_PLACEHOLDER, &self.url()))
    }

    fn stop(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
        for (_, queue) in self.clients.write().drain() {
            let _ = queue.send(Outbound::Close);
        }
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.stop();
    }
}
