//! Server supervisor: owns the listener and spawns one session per peer

use crate::broadcast::BroadcastRouter;
use crate::connection::{Connection, ConnectionOptions};
use crate::error::ServerError;
use crate::registry::{ClientRegistry, SharedRegistry};
use crate::session::ClientSession;
use log::{error, info};
use shared::{
    FlushGuard, SessionId, TranscriptStore, DEFAULT_LOG_DIR, DEFAULT_PORT,
    SERVER_TRANSCRIPT_PREFIX,
};
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};

/// Everything needed to start a server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `host:port` to listen on
    pub address: String,
    /// Directory the transcript is written to at shutdown
    pub log_dir: PathBuf,
    /// Applied to every accepted connection
    pub connection: ConnectionOptions,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: format!("127.0.0.1:{}", DEFAULT_PORT),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            connection: ConnectionOptions::default(),
        }
    }
}

/// Chat relay server
///
/// The registry and transcript live here and are handed to every session
/// through the broadcast router; nothing is process-global.
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    router: Arc<BroadcastRouter>,
    /// Next id to hand out; ids start at 1 and are never reused
    next_session_id: AtomicU32,
}

impl Server {
    /// Binds the listening socket with an empty registry and transcript
    ///
    /// Binding port 0 picks a free port; see `local_addr`.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.address)
            .await
            .map_err(|e| ServerError::bind(config.address.as_str(), e))?;

        let router = BroadcastRouter::new(
            ClientRegistry::shared(),
            Arc::new(TranscriptStore::new(SERVER_TRANSCRIPT_PREFIX)),
        );

        Ok(Server {
            listener,
            config,
            router: Arc::new(router),
            next_session_id: AtomicU32::new(1),
        })
    }

    /// Address the server actually listens on
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr().map_err(ServerError::LocalAddr)
    }

    pub fn registry(&self) -> SharedRegistry {
        Arc::clone(self.router.registry())
    }

    pub fn transcript(&self) -> Arc<TranscriptStore> {
        Arc::clone(self.router.transcript())
    }

    /// Accepts peers until `shutdown` resolves or accepting fails
    ///
    /// The transcript is flushed exactly once whichever way the loop ends.
    /// An accept failure is returned after the flush.
    pub async fn run<F>(&self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let guard = FlushGuard::new(self.transcript(), self.config.log_dir.clone());
        info!("Server listening on {}", self.local_addr()?);

        tokio::pin!(shutdown);

        let result = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Server shutting down");
                    break Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.spawn_session(stream, addr),
                    Err(e) => {
                        error!("Server error: {}", e);
                        break Err(ServerError::Accept(e));
                    }
                },
            }
        };

        match guard.finish() {
            Ok(Some(path)) => info!("Conversation saved to: {}", path.display()),
            Ok(None) => info!("No messages exchanged, nothing to save"),
            Err(e) => error!("Failed to save conversation: {}", e),
        }

        result
    }

    fn spawn_session(&self, stream: TcpStream, addr: SocketAddr) {
        let id = self.allocate_session_id();
        info!("Client {} connected from {}", id, addr);

        let connection = Connection::from_tcp(id, stream, self.config.connection);
        let session = ClientSession::new(connection, Arc::clone(&self.router));
        tokio::spawn(session.run());
    }

    fn allocate_session_id(&self) -> SessionId {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }
}
