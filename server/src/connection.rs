//! Line-oriented duplex channel over a single accepted socket
//!
//! A `Connection` is split in two:
//! - the reading side stays with the owning session and yields one line at a time
//! - a cloneable `ConnectionHandle` is what the registry and broadcast router hold
//!
//! Writes go through a bounded per-connection queue drained by a dedicated
//! writer task, so a slow peer only ever stalls its own queue. A send waits at
//! most `send_timeout` for queue space before giving up on that recipient.
//!
//! Inbound lines are capped at `max_line_length` bytes. A peer that keeps
//! sending without a newline gets a read error instead of growing our buffer.

use log::{debug, warn};
use shared::SessionId;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Why a line could not be handed to a recipient
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("connection {0} is closed")]
    Closed(SessionId),
    #[error("send to connection {0} timed out")]
    TimedOut(SessionId),
}

/// Tuning for the outbound side of every connection
#[derive(Debug, Clone, Copy)]
pub struct ConnectionOptions {
    /// Longest a single send may wait for room in the outbound queue
    pub send_timeout: Duration,
    /// Lines that may be queued for a peer before sends start waiting
    pub queue_capacity: usize,
    /// Longest inbound line accepted, not counting the `\n`
    pub max_line_length: usize,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_millis(500),
            queue_capacity: 256,
            max_line_length: 64 * 1024,
        }
    }
}

/// Sending half of a connection, shared with the registry
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: SessionId,
    sender: mpsc::Sender<String>,
    send_timeout: Duration,
    /// Shared with the owning `Connection`; fired by `evict`
    eviction: Arc<Notify>,
}

impl ConnectionHandle {
    /// Session this handle delivers to
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Queues `line` for the peer; a trailing newline is added on the wire
    pub async fn write_line(&self, line: &str) -> Result<(), DeliveryError> {
        match timeout(self.send_timeout, self.sender.send(line.to_string())).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(DeliveryError::Closed(self.id)),
            Err(_) => Err(DeliveryError::TimedOut(self.id)),
        }
    }

    /// Tells the owning session to wind down
    ///
    /// The notice is remembered, so it is not lost if the session is not
    /// currently waiting on it.
    pub fn evict(&self) {
        self.eviction.notify_one();
    }
}

/// One accepted peer, owned by its session
pub struct Connection {
    /// Session id assigned at accept time
    id: SessionId,
    /// Remote address, unknown for in-memory streams
    peer_addr: Option<SocketAddr>,
    reader: BufReader<BoxedReader>,
    /// Bytes of the line currently being read, kept across cancelled reads
    pending: Vec<u8>,
    max_line_length: usize,
    handle: ConnectionHandle,
    /// Task draining the outbound queue onto the socket
    writer: JoinHandle<()>,
    /// How long `close` waits for queued lines to drain
    close_grace: Duration,
}

impl Connection {
    /// Wraps an arbitrary reader/writer pair and starts the writer task
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new<R, W>(id: SessionId, reader: R, writer: W, options: ConnectionOptions) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (sender, receiver) = mpsc::channel(options.queue_capacity.max(1));
        let writer = tokio::spawn(write_loop(id, Box::new(writer), receiver));
        let reader: BoxedReader = Box::new(reader);

        Self {
            id,
            peer_addr: None,
            reader: BufReader::new(reader),
            pending: Vec::new(),
            max_line_length: options.max_line_length,
            handle: ConnectionHandle {
                id,
                sender,
                send_timeout: options.send_timeout,
                eviction: Arc::new(Notify::new()),
            },
            writer,
            close_grace: options.send_timeout * 2,
        }
    }

    /// Wraps an accepted socket, remembering the peer address for logging
    pub fn from_tcp(id: SessionId, stream: TcpStream, options: ConnectionOptions) -> Self {
        let peer_addr = stream.peer_addr().ok();
        let (reader, writer) = stream.into_split();

        let mut connection = Self::new(id, reader, writer, options);
        connection.peer_addr = peer_addr;
        connection
    }

    /// Session id this connection was accepted as
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Remote address, if this connection came from a socket
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// A new sending half for the registry or the session itself
    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    /// Signal that fires once the connection has been evicted
    pub fn eviction_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.handle.eviction)
    }

    /// Next line from the peer, without its `\n` or `\r\n` terminator
    ///
    /// `Ok(None)` is the normal end-of-stream disconnect. A line longer than
    /// `max_line_length` or one that is not UTF-8 is an `InvalidData` error.
    /// Cancel safe: a partly read line is kept for the next call.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        let budget = (self.max_line_length + 1).saturating_sub(self.pending.len());
        let read = (&mut self.reader)
            .take(budget as u64)
            .read_until(b'\n', &mut self.pending)
            .await?;

        if self.pending.last() == Some(&b'\n') {
            self.pending.pop();
            if self.pending.last() == Some(&b'\r') {
                self.pending.pop();
            }
        } else if self.pending.len() > self.max_line_length {
            self.pending.clear();
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("line exceeds {} bytes", self.max_line_length),
            ));
        } else if read == 0 && self.pending.is_empty() {
            return Ok(None);
        }

        // Anything left without a terminator at end of stream is the last line
        let line = std::mem::take(&mut self.pending);
        String::from_utf8(line)
            .map(Some)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Closes the connection, best effort
    ///
    /// Lines already queued are still written out unless the peer stops
    /// draining them; nothing here is reported to the caller.
    pub async fn close(self) {
        let Connection {
            id,
            reader,
            handle,
            mut writer,
            close_grace,
            ..
        } = self;

        drop(reader);
        drop(handle);

        match timeout(close_grace, &mut writer).await {
            Ok(Ok(())) => debug!("Connection {} closed", id),
            Ok(Err(e)) => warn!("Writer task for connection {} failed: {}", id, e),
            Err(_) => {
                warn!("Connection {} did not drain in time, dropping it", id);
                writer.abort();
            }
        }
    }
}

async fn write_loop(id: SessionId, mut writer: BoxedWriter, mut receiver: mpsc::Receiver<String>) {
    while let Some(mut line) = receiver.recv().await {
        line.push('\n');
        let written = match writer.write_all(line.as_bytes()).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            warn!("Failed to write to connection {}: {}", id, e);
            return;
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!("Error shutting down connection {}: {}", id, e);
    }
}
