//! Registry of live connections
//!
//! A connection is present here exactly while its session sits between the
//! join notice and the leave notice. Sessions insert and remove themselves;
//! the broadcast router only ever reads, through `snapshot`, so a fan-out
//! never iterates the map while another task is mutating it.

use crate::connection::ConnectionHandle;
use log::{debug, info};
use shared::SessionId;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Registry shared between the supervisor, sessions and the router
pub type SharedRegistry = Arc<RwLock<ClientRegistry>>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("session {0} is already registered")]
    DuplicateSession(SessionId),
}

/// Live connections keyed by session id
///
/// Kept ordered by id so fan-out visits recipients in join order.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: BTreeMap<SessionId, ConnectionHandle>,
}

impl ClientRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry ready to be shared across tasks
    pub fn shared() -> SharedRegistry {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Adds a connection; ids are never registered twice
    pub fn register(&mut self, handle: ConnectionHandle) -> Result<(), RegistryError> {
        let id = handle.id();
        if self.clients.contains_key(&id) {
            return Err(RegistryError::DuplicateSession(id));
        }

        self.clients.insert(id, handle);
        info!("Client {} registered ({} online)", id, self.clients.len());
        Ok(())
    }

    /// Removes a connection if it is still present
    ///
    /// Returns true if it was found and removed. Calling this again for the
    /// same id is a no-op, which covers a session and the router both
    /// cleaning up after the same peer.
    pub fn deregister(&mut self, id: SessionId) -> bool {
        if self.clients.remove(&id).is_some() {
            info!("Client {} deregistered ({} online)", id, self.clients.len());
            true
        } else {
            debug!("Client {} was already deregistered", id);
            false
        }
    }

    /// Point-in-time copy of every live connection, for one fan-out
    pub fn snapshot(&self) -> Vec<ConnectionHandle> {
        self.clients.values().cloned().collect()
    }

    /// Returns true if `id` is currently registered
    pub fn contains(&self, id: SessionId) -> bool {
        self.clients.contains_key(&id)
    }

    /// Registered session ids in ascending order
    pub fn ids(&self) -> Vec<SessionId> {
        self.clients.keys().copied().collect()
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
