//! In-memory peers for exercising connections, the router and sessions

use crate::broadcast::BroadcastRouter;
use crate::connection::{Connection, ConnectionOptions};
use crate::registry::ClientRegistry;
use shared::{SessionId, TranscriptStore, SERVER_TRANSCRIPT_PREFIX};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{
    duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf,
};
use tokio::time::timeout;

const PEER_BUFFER: usize = 64 * 1024;
const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// The remote end of an in-memory connection
pub(crate) struct TestPeer {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

impl TestPeer {
    /// Next line sent to this peer, `None` once the server side closed
    pub(crate) async fn next_line(&mut self) -> Option<String> {
        timeout(READ_TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for a line")
            .expect("failed to read from connection")
    }

    pub(crate) async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{}\n", line).as_bytes())
            .await
            .expect("failed to write to connection");
    }

    pub(crate) async fn hang_up(&mut self) {
        self.writer.shutdown().await.expect("failed to shut down peer");
    }
}

pub(crate) fn connected_pair(id: SessionId) -> (Connection, TestPeer) {
    connected_pair_with(id, ConnectionOptions::default(), PEER_BUFFER)
}

/// Like `connected_pair`, with custom options and in-flight byte capacity
///
/// A peer that never reads stops accepting bytes once `buffer` is full.
pub(crate) fn connected_pair_with(
    id: SessionId,
    options: ConnectionOptions,
    buffer: usize,
) -> (Connection, TestPeer) {
    let (local, remote) = duplex(buffer);
    let (reader, writer) = tokio::io::split(local);
    let connection = Connection::new(id, reader, writer, options);

    let (remote_reader, remote_writer) = tokio::io::split(remote);
    let peer = TestPeer {
        lines: BufReader::new(remote_reader).lines(),
        writer: remote_writer,
    };

    (connection, peer)
}

pub(crate) fn test_router() -> Arc<BroadcastRouter> {
    Arc::new(BroadcastRouter::new(
        ClientRegistry::shared(),
        Arc::new(TranscriptStore::new(SERVER_TRANSCRIPT_PREFIX)),
    ))
}
