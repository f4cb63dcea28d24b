//! In-process transport.
//!
//! Used by tests and by embedders that host the remote side themselves.
//! Clones share state: hand one clone to the dispatcher and drive the
//! "remote" side through another.

use crate::{Transport, TransportError, TransportEvents};
use livedev_core::ClientId;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A payload the dispatcher sent to one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    pub client: ClientId,
    pub payload: String,
}

struct Inner {
    events: Option<TransportEvents>,
    connected: BTreeSet<ClientId>,
    outbox_tx: mpsc::UnboundedSender<SentFrame>,
    outbox_rx: Option<mpsc::UnboundedReceiver<SentFrame>>,
    closed: Vec<ClientId>,
    fail_sends: bool,
    script: Option<String>,
    stopped: bool,
}

#[derive(Clone)]
pub struct MemoryTransport {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Mutex::new(Inner {
                events: None,
                connected: BTreeSet::new(),
                outbox_tx,
                outbox_rx: Some(outbox_rx),
                closed: Vec::new(),
                fail_sends: false,
                script: None,
                stopped: false,
            })),
        }
    }

    pub fn with_script(script: impl Into<String>) -> Self {
        let transport = Self::new();
        transport.inner.lock().script = Some(script.into());
        transport
    }

    /// Take the stream of frames sent to clients. Yields `None` after the first call.
    pub fn outbox(&self) -> Option<mpsc::UnboundedReceiver<SentFrame>> {
        self.inner.lock().outbox_rx.take()
    }

    /// Simulate a page completing its handshake.
    pub fn connect(&self, client: ClientId, url: &str) -> bool {
        let events = {
            let mut inner = self.inner.lock();
            inner.connected.insert(client);
            inner.events.clone()
        };
        events.is_some_and(|events| events.connect(client, url))
    }

    /// Simulate a page sending a frame.
    pub fn deliver(&self, client: ClientId, payload: &str) -> bool {
        let events = self.inner.lock().events.clone();
        events.is_some_and(|events| events.message(client, payload))
    }

    /// Simulate a page going away.
    pub fn disconnect(&self, client: ClientId) -> bool {
        let events = {
            let mut inner = self.inner.lock();
            inner.connected.remove(&client);
            inner.events.clone()
        };
        events.is_some_and(|events| events.close(client))
    }

    /// Simulate the whole channel dying.
    pub fn lose(&self) -> bool {
        let events = {
            let mut inner = self.inner.lock();
            inner.connected.clear();
            inner.events.clone()
        };
        events.is_some_and(|events| events.lost())
    }

    /// Make subsequent sends fail.
    pub fn fail_sends(&self, fail: bool) {
        self.inner.lock().fail_sends = fail;
    }

    /// Clients the dispatcher asked to close.
    pub fn closed(&self) -> Vec<ClientId> {
        self.inner.lock().closed.clone()
    }

    pub fn is_started(&self) -> bool {
        self.inner.lock().events.is_some()
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.lock().stopped
    }
}

impl Transport for MemoryTransport {
    fn start(&mut self, events: TransportEvents) -> Result<(), TransportError> {
        let mut inner = self.inner.lock();
        inner.events = Some(events);
        inner.stopped = false;
        Ok(())
    }

    fn send(&self, clients: &[ClientId], payload: &str) -> Result<(), TransportError> {
        let inner = self.inner.lock();
        if inner.events.is_none() {
            return Err(TransportError::NotStarted);
        }
        if inner.fail_sends {
            return Err(TransportError::Send("send refused".to_string()));
        }
        if let Some(missing) = clients.iter().find(|c| !inner.connected.contains(*c)) {
            return Err(TransportError::NotConnected(*missing));
        }
        for client in clients {
            let _ = inner.outbox_tx.send(SentFrame {
                client: *client,
                payload: payload.to_string(),
            });
        }
        Ok(())
    }

    fn close(&self, client: ClientId) {
        let mut inner = self.inner.lock();
        inner.connected.remove(&client);
        inner.closed.push(client);
    }

    fn remote_script(&self) -> Option<String> {
        self.inner.lock().script.clone()
    }

    fn stop(&mut self) {
        // Events stay wired so late emissions can be observed being ignored.
        let mut inner = self.inner.lock();
        inner.stopped = true;
        inner.connected.clear();
    }
}
