//! Per-connection control loop
//!
//! Each accepted peer gets one `ClientSession`, running as its own task:
//!
//! ```text
//! Connecting -> Joined -> Relaying -> Leaving -> Closed
//! ```
//!
//! - `Joined`: registered, join notice broadcast, private welcome sent
//! - `Relaying`: every inbound line is broadcast as `User <id>: <line>`
//! - `Leaving`: entered on end-of-stream, the exit sentinel, a read error or
//!   eviction; deregisters and broadcasts the leave notice
//! - `Closed`: socket closed, best effort
//!
//! An abrupt disconnect and a clean `EXIT` look the same to other peers.

use crate::broadcast::BroadcastRouter;
use crate::connection::Connection;
use log::{debug, error, info, warn};
use shared::{is_exit_sentinel, ChatMessage, SessionId};
use std::sync::Arc;

/// Lifecycle of one session, see the module docs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Joined,
    Relaying,
    Leaving,
    Closed,
}

impl SessionState {
    /// Whether the session may move from `self` to `next`
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Connecting, Joined)
                | (Connecting, Closed)
                | (Joined, Relaying)
                | (Relaying, Leaving)
                | (Leaving, Closed)
        )
    }
}

/// Why the relay loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeaveReason {
    EndOfStream,
    ExitRequested,
    ReadFailed,
    Evicted,
}

/// Control loop for one accepted peer
pub struct ClientSession {
    connection: Connection,
    router: Arc<BroadcastRouter>,
    state: SessionState,
}

impl ClientSession {
    /// A session in `Connecting`; nothing happens until `run`
    pub fn new(connection: Connection, router: Arc<BroadcastRouter>) -> Self {
        Self {
            connection,
            router,
            state: SessionState::Connecting,
        }
    }

    /// Session id of the peer being served
    pub fn id(&self) -> SessionId {
        self.connection.id()
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drives the session to completion; never fails
    pub async fn run(mut self) {
        if !self.join().await {
            self.transition(SessionState::Closed);
            self.connection.close().await;
            return;
        }

        self.transition(SessionState::Relaying);
        let reason = self.relay().await;
        debug!("Client {} leaving: {:?}", self.id(), reason);

        self.transition(SessionState::Leaving);
        self.leave().await;

        self.transition(SessionState::Closed);
        self.connection.close().await;
    }

    async fn join(&mut self) -> bool {
        let id = self.id();

        let handle = self.connection.handle();

        let registered = {
            let mut registry = self.router.registry().write().await;
            registry.register(handle.clone())
        };
        if let Err(e) = registered {
            error!("Refusing connection: {}", e);
            return false;
        }

        self.router
            .broadcast(&ChatMessage::Joined { id }.to_string())
            .await;
        if let Err(e) = handle
            .write_line(&ChatMessage::Welcome { id }.to_string())
            .await
        {
            debug!("Could not welcome client {}: {}", id, e);
        }

        self.transition(SessionState::Joined);
        true
    }

    async fn relay(&mut self) -> LeaveReason {
        let id = self.id();
        let eviction = self.connection.eviction_signal();

        loop {
            // An evicted session must not relay a line that was already waiting
            let read = tokio::select! {
                biased;
                _ = eviction.notified() => return LeaveReason::Evicted,
                read = self.connection.read_line() => read,
            };

            match read {
                Ok(Some(line)) if is_exit_sentinel(&line) => return LeaveReason::ExitRequested,
                Ok(Some(text)) => {
                    self.router
                        .broadcast(&ChatMessage::Chat { id, text }.to_string())
                        .await;
                }
                Ok(None) => return LeaveReason::EndOfStream,
                Err(e) => {
                    warn!("Client {} error: {}", id, e);
                    return LeaveReason::ReadFailed;
                }
            }
        }
    }

    async fn leave(&mut self) {
        let id = self.id();

        {
            let mut registry = self.router.registry().write().await;
            registry.deregister(id);
        }
        self.router.broadcast(&ChatMessage::Left { id }.to_string()).await;

        match self.connection.peer_addr() {
            Some(addr) => info!("Client {} ({}) disconnected", id, addr),
            None => info!("Client {} disconnected", id),
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid session transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!("Client {}: {:?} -> {:?}", self.id(), self.state, next);
        self.state = next;
    }
}
