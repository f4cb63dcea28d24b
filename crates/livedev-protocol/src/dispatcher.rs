//! The protocol dispatcher.
//!
//! `Dispatcher` is a cheap cloneable handle; the state lives in a single
//! task that processes commands and transport events one at a time, so
//! every handler runs to completion before the next message is looked at.
//!
//! Fan-in: `request` settles on the first response from any target
//! (success or remote error). `request_all` waits for one outcome per
//! target. In both modes a target that disconnects only removes itself;
//! the call fails with `ConnectionClosed` once no target is left.

use crate::handlers::{Event, Handler, HandlerTable};
use crate::pending::{ClientReply, PendingTable, ReplySink, Resolution};
use crate::{Connection, ConnectionRegistry, RequestError, Transport, TransportError};
use crate::{TransportEvent, TransportEvents};
use livedev_core::{ClientId, Message, Method, decode, encode};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Dispatcher settings.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Deadline for each request; `None` waits until the target goes away.
    pub request_timeout: Option<Duration>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(10)),
        }
    }
}

/// Who a request or notification goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Every registered connection.
    Broadcast,
    Client(ClientId),
    Clients(Vec<ClientId>),
}

impl From<ClientId> for Target {
    fn from(client: ClientId) -> Self {
        Target::Client(client)
    }
}

impl From<Option<ClientId>> for Target {
    fn from(client: Option<ClientId>) -> Self {
        client.map_or(Target::Broadcast, Target::Client)
    }
}

pub(crate) enum Command {
    SetTransport {
        transport: Box<dyn Transport>,
        ack: oneshot::Sender<Result<(), TransportError>>,
    },
    Request {
        id: u64,
        method: Method,
        params: Value,
        target: Target,
        timeout: Option<Duration>,
        sink: ReplySink,
    },
    Notify {
        method: Method,
        params: Value,
        target: Target,
        ack: oneshot::Sender<Result<(), RequestError>>,
    },
    Cancel {
        id: u64,
    },
    Expire {
        id: u64,
        after: Duration,
    },
    On {
        method: Method,
        handler: Handler,
    },
    Disconnect {
        client: ClientId,
    },
    Connections {
        reply: oneshot::Sender<Vec<Connection>>,
    },
    PendingCount {
        reply: oneshot::Sender<usize>,
    },
    RemoteScript {
        reply: oneshot::Sender<Option<String>>,
    },
    Transport {
        generation: u64,
        event: TransportEvent,
    },
}

/// Handle to a running dispatcher task.
#[derive(Clone)]
pub struct Dispatcher {
    commands: mpsc::UnboundedSender<Command>,
    next_id: Arc<AtomicU64>,
    config: DispatcherConfig,
}

impl Dispatcher {
    /// Start the dispatcher task on the current tokio runtime.
    pub fn spawn(config: DispatcherConfig) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let state = State {
            transport: None,
            generation: 0,
            registry: ConnectionRegistry::new(),
            pending: PendingTable::default(),
            handlers: HandlerTable::default(),
            commands: commands.downgrade(),
        };
        tokio::spawn(state.run(rx));

        Self {
            commands,
            next_id: Arc::new(AtomicU64::new(1)),
            config,
        }
    }

    /// Install `transport`, tearing down whatever was there before.
    pub async fn set_transport(&self, transport: impl Transport) -> Result<(), RequestError> {
        let (ack, rx) = oneshot::channel();
        self.send(Command::SetTransport {
            transport: Box::new(transport),
            ack,
        })?;
        rx.await.map_err(|_| RequestError::DispatcherClosed)??;
        Ok(())
    }

    /// Send a request and resolve with the first response.
    pub async fn request(
        &self,
        method: Method,
        params: Value,
        target: impl Into<Target>,
    ) -> Result<Value, RequestError> {
        self.request_with_timeout(method, params, target, self.config.request_timeout)
            .await
    }

    /// Like `request`, with an explicit deadline.
    pub async fn request_with_timeout(
        &self,
        method: Method,
        params: Value,
        target: impl Into<Target>,
        timeout: Option<Duration>,
    ) -> Result<Value, RequestError> {
        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        self.send(Command::Request {
            id,
            method,
            params,
            target: target.into(),
            timeout,
            sink: ReplySink::First(tx),
        })?;
        let mut guard = CancelOnDrop::new(&self.commands, id);
        let outcome = rx.await.map_err(|_| RequestError::DispatcherClosed);
        guard.disarm();
        outcome?
    }

    /// Send a request and collect one outcome per target.
    pub async fn request_all(
        &self,
        method: Method,
        params: Value,
        target: impl Into<Target>,
    ) -> Result<Vec<ClientReply>, RequestError> {
        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        self.send(Command::Request {
            id,
            method,
            params,
            target: target.into(),
            timeout: self.config.request_timeout,
            sink: ReplySink::All {
                tx,
                replies: Vec::new(),
            },
        })?;
        let mut guard = CancelOnDrop::new(&self.commands, id);
        let outcome = rx.await.map_err(|_| RequestError::DispatcherClosed);
        guard.disarm();
        outcome?
    }

    /// Fire-and-forget message; no id, no response.
    pub async fn notify(
        &self,
        method: Method,
        params: Value,
        target: impl Into<Target>,
    ) -> Result<(), RequestError> {
        let (ack, rx) = oneshot::channel();
        self.send(Command::Notify {
            method,
            params,
            target: target.into(),
            ack,
        })?;
        rx.await.map_err(|_| RequestError::DispatcherClosed)?
    }

    /// Register a handler for inbound events with `method`.
    pub fn on<F>(&self, method: Method, handler: F) -> Result<(), RequestError>
    where
        F: Fn(&Event) + Send + 'static,
    {
        self.send(Command::On {
            method,
            handler: Box::new(handler),
        })
    }

    /// Close one client's connection from the editor side.
    pub fn disconnect(&self, client: ClientId) -> Result<(), RequestError> {
        self.send(Command::Disconnect { client })
    }

    pub async fn connections(&self) -> Result<Vec<Connection>, RequestError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Connections { reply })?;
        rx.await.map_err(|_| RequestError::DispatcherClosed)
    }

    pub async fn pending_count(&self) -> Result<usize, RequestError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::PendingCount { reply })?;
        rx.await.map_err(|_| RequestError::DispatcherClosed)
    }

    /// The active transport's bootstrap script for remote pages.
    pub async fn remote_script(&self) -> Result<Option<String>, RequestError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::RemoteScript { reply })?;
        rx.await.map_err(|_| RequestError::DispatcherClosed)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn send(&self, command: Command) -> Result<(), RequestError> {
        self.commands
            .send(command)
            .map_err(|_| RequestError::DispatcherClosed)
    }
}

/// Removes a pending entry if the caller stops waiting for it.
struct CancelOnDrop<'a> {
    commands: &'a mpsc::UnboundedSender<Command>,
    id: u64,
    armed: bool,
}

impl<'a> CancelOnDrop<'a> {
    fn new(commands: &'a mpsc::UnboundedSender<Command>, id: u64) -> Self {
        Self {
            commands,
            id,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            let _ = self.commands.send(Command::Cancel { id: self.id });
        }
    }
}

struct State {
    transport: Option<Box<dyn Transport>>,
    generation: u64,
    registry: ConnectionRegistry,
    pending: PendingTable,
    handlers: HandlerTable,
    commands: mpsc::WeakUnboundedSender<Command>,
}

impl State {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            self.handle(command);
        }
        self.teardown(|| RequestError::DispatcherClosed);
        if let Some(mut transport) = self.transport.take() {
            transport.stop();
        }
        tracing::debug!("dispatcher stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::SetTransport { transport, ack } => {
                let _ = ack.send(self.install(transport));
            }
            Command::Request {
                id,
                method,
                params,
                target,
                timeout,
                sink,
            } => self.request(id, method, params, target, timeout, sink),
            Command::Notify {
                method,
                params,
                target,
                ack,
            } => {
                let _ = ack.send(self.notify(method, params, target));
            }
            Command::Cancel { id } => {
                if self.pending.cancel(id) {
                    tracing::debug!(id, "request abandoned by caller");
                }
            }
            Command::Expire { id, after } => {
                if self.pending.expire(id, after) {
                    tracing::warn!(id, ?after, "request timed out");
                }
            }
            Command::On { method, handler } => self.handlers.register(method, handler),
            Command::Disconnect { client } => {
                if let Some(transport) = &self.transport {
                    transport.close(client);
                }
                self.client_closed(client);
            }
            Command::Connections { reply } => {
                let _ = reply.send(self.registry.connections());
            }
            Command::PendingCount { reply } => {
                let _ = reply.send(self.pending.len());
            }
            Command::RemoteScript { reply } => {
                let script = self.transport.as_ref().and_then(|t| t.remote_script());
                let _ = reply.send(script);
            }
            Command::Transport { generation, event } => {
                if generation != self.generation || self.transport.is_none() {
                    tracing::debug!(generation, "ignoring event from replaced transport");
                    return;
                }
                self.transport_event(event);
            }
        }
    }

    fn install(&mut self, mut transport: Box<dyn Transport>) -> Result<(), TransportError> {
        if let Some(mut old) = self.transport.take() {
            tracing::info!("replacing transport");
            self.teardown(|| RequestError::TransportReplaced);
            old.stop();
        }
        self.generation += 1;
        transport.start(TransportEvents::new(self.generation, self.commands.clone()))?;
        self.transport = Some(transport);
        Ok(())
    }

    /// Reject everything outstanding and forget every connection.
    fn teardown(&mut self, reason: impl Fn() -> RequestError) {
        let rejected = self.pending.reject_all(reason);
        if rejected > 0 {
            tracing::warn!(rejected, "rejected pending requests");
        }
        for client in self.registry.clear() {
            self.emit(Method::ConnectionClose, client, Value::Null);
        }
    }

    fn resolve_targets(&self, target: &Target) -> Result<BTreeSet<ClientId>, RequestError> {
        let targets: BTreeSet<ClientId> = match target {
            Target::Broadcast => self.registry.ids().into_iter().collect(),
            Target::Client(client) => BTreeSet::from([*client]),
            Target::Clients(clients) => clients.iter().copied().collect(),
        };
        if targets.is_empty() {
            return Err(RequestError::NoConnections);
        }
        if let Some(unknown) = targets.iter().find(|c| !self.registry.contains(**c)) {
            return Err(RequestError::UnknownClient(*unknown));
        }
        Ok(targets)
    }

    fn request(
        &mut self,
        id: u64,
        method: Method,
        params: Value,
        target: Target,
        timeout: Option<Duration>,
        sink: ReplySink,
    ) {
        if self.transport.is_none() {
            sink.fail(RequestError::NoTransport);
            return;
        }
        let targets = match self.resolve_targets(&target) {
            Ok(targets) => targets,
            Err(err) => return sink.fail(err),
        };
        let payload = match encode(&Message::request(id, method, params)) {
            Ok(payload) => payload,
            Err(err) => return sink.fail(RequestError::Encode(err.to_string())),
        };
        let mut clients: Vec<ClientId> = targets.iter().copied().collect();
        if let Err(sink) = self.pending.insert(id, method, targets, sink) {
            tracing::error!(id, "request id already pending");
            return sink.fail(RequestError::Encode(format!("duplicate request id {id}")));
        }

        // A target can leave the transport before its close event reaches us.
        loop {
            match self.send_frame(&clients, &payload) {
                Ok(()) => break,
                Err(TransportError::NotConnected(gone)) if clients.contains(&gone) => {
                    tracing::debug!(id, client = %gone, "target already gone, skipping");
                    clients.retain(|c| *c != gone);
                    if self.pending.drop_target(id, gone) {
                        return;
                    }
                }
                Err(err) => {
                    tracing::warn!(id, %method, "send failed: {err}");
                    self.pending.fail(id, RequestError::Transport(err));
                    return;
                }
            }
        }
        tracing::debug!(id, %method, targets = clients.len(), "request sent");

        if let Some(after) = timeout {
            self.schedule_expiry(id, after);
        }
    }

    fn notify(&mut self, method: Method, params: Value, target: Target) -> Result<(), RequestError> {
        if self.transport.is_none() {
            return Err(RequestError::NoTransport);
        }
        let targets = self.resolve_targets(&target)?;
        let payload = encode(&Message::notification(method, params))
            .map_err(|err| RequestError::Encode(err.to_string()))?;
        let mut clients: Vec<ClientId> = targets.into_iter().collect();
        loop {
            match self.send_frame(&clients, &payload) {
                Ok(()) => return Ok(()),
                Err(TransportError::NotConnected(gone)) if clients.contains(&gone) => {
                    clients.retain(|c| *c != gone);
                    if clients.is_empty() {
                        return Err(RequestError::ConnectionClosed(gone));
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn send_frame(&self, clients: &[ClientId], payload: &str) -> Result<(), TransportError> {
        match &self.transport {
            Some(transport) => transport.send(clients, payload),
            None => Err(TransportError::NotStarted),
        }
    }

    fn schedule_expiry(&self, id: u64, after: Duration) {
        let commands = self.commands.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(commands) = commands.upgrade() {
                let _ = commands.send(Command::Expire { id, after });
            }
        });
    }

    fn transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connect { client, url } => {
                let url = (!url.is_empty()).then_some(url);
                let params = json!({ "url": url });
                if self
                    .registry
                    .insert(Connection::new(client, url))
                    .is_some()
                {
                    tracing::warn!(%client, "client reconnected without closing");
                }
                tracing::info!(%client, "client connected");
                self.emit(Method::ConnectionConnect, client, params);
            }
            TransportEvent::Close { client } => self.client_closed(client),
            TransportEvent::Message { client, payload } => self.inbound(client, &payload),
            TransportEvent::Lost => {
                tracing::warn!("transport lost");
                self.teardown(|| RequestError::TransportLost);
                self.transport = None;
            }
        }
    }

    fn client_closed(&mut self, client: ClientId) {
        if self.registry.remove(client).is_none() {
            return;
        }
        let rejected = self.pending.client_closed(client);
        tracing::info!(%client, rejected, "client closed");
        self.emit(Method::ConnectionClose, client, Value::Null);
    }

    fn inbound(&mut self, client: ClientId, payload: &str) {
        if !self.registry.contains(client) {
            tracing::debug!(%client, "dropping message from unregistered client");
            return;
        }
        let message = match decode(payload) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(%client, "dropping message: {err}");
                return;
            }
        };

        match message {
            Message::Response { orig, outcome } => {
                let method = self.pending.method(orig);
                match self.pending.resolve(orig, client, outcome) {
                    Resolution::Settled | Resolution::Partial => {
                        tracing::debug!(orig, ?method, %client, "response matched");
                    }
                    Resolution::UnknownId => {
                        tracing::debug!(orig, %client, "response for unknown request dropped");
                    }
                    Resolution::UnexpectedClient => {
                        tracing::warn!(orig, %client, "response from a client that was not asked");
                    }
                }
            }
            Message::Request { method, params, .. } | Message::Notification { method, params } => {
                if method.is_synthetic() {
                    tracing::warn!(%client, %method, "remote sent a reserved event");
                    return;
                }
                if method == Method::PageNavigated
                    && let Some(url) = params.get("url").and_then(Value::as_str)
                {
                    self.registry.set_navigated(client, url.to_string());
                }
                self.emit(method, client, params);
            }
        }
    }

    fn emit(&self, method: Method, client: ClientId, params: Value) {
        let event = Event {
            method,
            client,
            params,
        };
        if self.handlers.dispatch(&event) == 0 {
            tracing::trace!(%method, %client, "no handler for event");
        }
    }
}
