//! Pending-request table.
//!
//! Each entry remembers which clients the request went to. A request
//! settles exactly once: on the first response (first-wins), once every
//! target has answered or gone (collect-all), on expiry, or on teardown.

use crate::RequestError;
use livedev_core::{ClientId, Method, RemoteError};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tokio::sync::oneshot;

/// One target's outcome of a collect-all request.
#[derive(Debug)]
pub struct ClientReply {
    pub client: ClientId,
    pub outcome: Result<Value, RequestError>,
}

/// Where a request's outcome goes.
#[derive(Debug)]
pub(crate) enum ReplySink {
    First(oneshot::Sender<Result<Value, RequestError>>),
    All {
        tx: oneshot::Sender<Result<Vec<ClientReply>, RequestError>>,
        replies: Vec<ClientReply>,
    },
}

impl ReplySink {
    /// Fail the whole call before anything was sent.
    pub(crate) fn fail(self, error: RequestError) {
        match self {
            ReplySink::First(tx) => {
                let _ = tx.send(Err(error));
            }
            ReplySink::All { tx, .. } => {
                let _ = tx.send(Err(error));
            }
        }
    }
}

#[derive(Debug)]
struct PendingRequest {
    method: Method,
    targets: BTreeSet<ClientId>,
    sink: ReplySink,
}

/// Result of feeding a response into the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resolution {
    Settled,
    Partial,
    UnknownId,
    UnexpectedClient,
}

#[derive(Debug, Default)]
pub(crate) struct PendingTable {
    entries: HashMap<u64, PendingRequest>,
}

impl PendingTable {
    /// Register a request. Returns the sink back if the id is already pending.
    pub(crate) fn insert(
        &mut self,
        id: u64,
        method: Method,
        targets: BTreeSet<ClientId>,
        sink: ReplySink,
    ) -> Result<(), ReplySink> {
        if self.entries.contains_key(&id) {
            return Err(sink);
        }
        self.entries.insert(
            id,
            PendingRequest {
                method,
                targets,
                sink,
            },
        );
        Ok(())
    }

    pub(crate) fn method(&self, id: u64) -> Option<Method> {
        self.entries.get(&id).map(|entry| entry.method)
    }

    /// Feed a response from `client` for request `id`.
    pub(crate) fn resolve(
        &mut self,
        id: u64,
        client: ClientId,
        outcome: Result<Value, RemoteError>,
    ) -> Resolution {
        let Some(entry) = self.entries.get_mut(&id) else {
            return Resolution::UnknownId;
        };
        if !entry.targets.remove(&client) {
            return Resolution::UnexpectedClient;
        }
        let outcome = outcome.map_err(RequestError::Remote);

        if let ReplySink::All { replies, .. } = &mut entry.sink {
            replies.push(ClientReply { client, outcome });
            if !entry.targets.is_empty() {
                return Resolution::Partial;
            }
            self.settle(id, None);
            return Resolution::Settled;
        }
        self.settle(id, Some(outcome));
        Resolution::Settled
    }

    /// A client went away. Requests left without targets settle with
    /// `ConnectionClosed`; others keep waiting on their remaining targets.
    pub(crate) fn client_closed(&mut self, client: ClientId) -> usize {
        let mut settled = Vec::new();
        for (id, entry) in &mut self.entries {
            if !entry.targets.remove(&client) {
                continue;
            }
            if let ReplySink::All { replies, .. } = &mut entry.sink {
                replies.push(ClientReply {
                    client,
                    outcome: Err(RequestError::ConnectionClosed(client)),
                });
            }
            if entry.targets.is_empty() {
                settled.push(*id);
            }
        }
        for id in &settled {
            self.settle(*id, Some(Err(RequestError::ConnectionClosed(client))));
        }
        settled.len()
    }

    /// `client` could not be reached for request `id`. Returns true if that
    /// left the request without targets and settled it.
    pub(crate) fn drop_target(&mut self, id: u64, client: ClientId) -> bool {
        let Some(entry) = self.entries.get_mut(&id) else {
            return false;
        };
        if !entry.targets.remove(&client) {
            return false;
        }
        if let ReplySink::All { replies, .. } = &mut entry.sink {
            replies.push(ClientReply {
                client,
                outcome: Err(RequestError::ConnectionClosed(client)),
            });
        }
        if !entry.targets.is_empty() {
            return false;
        }
        self.settle(id, Some(Err(RequestError::ConnectionClosed(client))));
        true
    }

    /// Drop an entry whose deadline passed. Collect-all requests deliver what
    /// they have, with `Timeout` for the silent targets.
    pub(crate) fn expire(&mut self, id: u64, after: Duration) -> bool {
        let Some(entry) = self.entries.get_mut(&id) else {
            return false;
        };
        if let ReplySink::All { replies, .. } = &mut entry.sink {
            for client in std::mem::take(&mut entry.targets) {
                replies.push(ClientReply {
                    client,
                    outcome: Err(RequestError::Timeout { id, after }),
                });
            }
        }
        self.settle(id, Some(Err(RequestError::Timeout { id, after })));
        true
    }

    /// Forget an entry whose caller is gone.
    pub(crate) fn cancel(&mut self, id: u64) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Fail a single entry outright (e.g. the send itself failed).
    pub(crate) fn fail(&mut self, id: u64, error: RequestError) {
        if let Some(entry) = self.entries.remove(&id) {
            entry.sink.fail(error);
        }
    }

    /// Reject everything outstanding.
    pub(crate) fn reject_all(&mut self, reason: impl Fn() -> RequestError) -> usize {
        let count = self.entries.len();
        for (_, entry) in self.entries.drain() {
            entry.sink.fail(reason());
        }
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Remove `id` and deliver. For first-wins sinks `outcome` is sent; for
    /// collect-all sinks the accumulated replies are sent.
    fn settle(&mut self, id: u64, outcome: Option<Result<Value, RequestError>>) {
        let Some(entry) = self.entries.remove(&id) else {
            return;
        };
        match entry.sink {
            ReplySink::First(tx) => {
                if let Some(outcome) = outcome {
                    let _ = tx.send(outcome);
                }
            }
            ReplySink::All { tx, replies } => {
                let _ = tx.send(Ok(replies));
            }
        }
    }
}
