//! Live connection tracking.

use livedev_core::ClientId;
use std::collections::BTreeMap;
use std::time::SystemTime;

/// One live remote page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub client_id: ClientId,
    pub connected_at: SystemTime,
    pub navigated_url: Option<String>,
}

impl Connection {
    pub fn new(client_id: ClientId, url: Option<String>) -> Self {
        Self {
            client_id,
            connected_at: SystemTime::now(),
            navigated_url: url,
        }
    }
}

/// Connections keyed by client id, in id order.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: BTreeMap<ClientId, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection, returning the one it replaced.
    pub fn insert(&mut self, connection: Connection) -> Option<Connection> {
        self.connections.insert(connection.client_id, connection)
    }

    pub fn remove(&mut self, client: ClientId) -> Option<Connection> {
        self.connections.remove(&client)
    }

    pub fn get(&self, client: ClientId) -> Option<&Connection> {
        self.connections.get(&client)
    }

    pub fn contains(&self, client: ClientId) -> bool {
        self.connections.contains_key(&client)
    }

    /// Record the page a client navigated to. Returns false for unknown clients.
    pub fn set_navigated(&mut self, client: ClientId, url: String) -> bool {
        match self.connections.get_mut(&client) {
            Some(connection) => {
                connection.navigated_url = Some(url);
                true
            }
            None => false,
        }
    }

    pub fn ids(&self) -> Vec<ClientId> {
        self.connections.keys().copied().collect()
    }

    pub fn connections(&self) -> Vec<Connection> {
        self.connections.values().cloned().collect()
    }

    /// Remove everything, returning the ids that were live.
    pub fn clear(&mut self) -> Vec<ClientId> {
        let ids = self.ids();
        self.connections.clear();
        ids
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
