use log::{debug, info, warn};
use shared::{
    is_exit_sentinel, FlushGuard, TranscriptStore, CLIENT_TRANSCRIPT_PREFIX, EXIT_SENTINEL,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Unable to connect to server: {0}")]
    Connect(#[source] io::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub struct Client {
    incoming: Lines<BufReader<OwnedReadHalf>>,
    outgoing: OwnedWriteHalf,
    transcript: Arc<TranscriptStore>,
    log_dir: PathBuf,
}

impl Client {
    pub async fn connect(
        server_addr: &str,
        log_dir: impl Into<PathBuf>,
    ) -> Result<Self, ClientError> {
        info!("Connecting to server...");
        let stream = TcpStream::connect(server_addr)
            .await
            .map_err(ClientError::Connect)?;
        let (reader, writer) = stream.into_split();

        Ok(Client {
            incoming: BufReader::new(reader).lines(),
            outgoing: writer,
            transcript: Arc::new(TranscriptStore::new(CLIENT_TRANSCRIPT_PREFIX)),
            log_dir: log_dir.into(),
        })
    }

    pub fn transcript(&self) -> Arc<TranscriptStore> {
        Arc::clone(&self.transcript)
    }

    /// Chats until the user sends `EXIT`, input ends or the server hangs up
    ///
    /// Server lines and the user's own messages (as `Client: <text>`) are
    /// shown on `output` and recorded. On the way out the transcript is saved
    /// under the log directory and its path returned, if anything was said.
    pub async fn run<O>(
        self,
        mut input: mpsc::Receiver<String>,
        mut output: O,
    ) -> Result<Option<PathBuf>, ClientError>
    where
        O: AsyncWrite + Unpin,
    {
        let Client {
            mut incoming,
            mut outgoing,
            transcript,
            log_dir,
        } = self;
        let guard = FlushGuard::new(Arc::clone(&transcript), log_dir);
        let mut said_goodbye = false;

        loop {
            tokio::select! {
                received = incoming.next_line() => match received {
                    Ok(Some(line)) => {
                        show(&mut output, &line).await?;
                        transcript.append(line);
                    }
                    Ok(None) => {
                        info!("Server closed the connection");
                        break;
                    }
                    Err(e) => {
                        warn!("Error receiving message: {}", e);
                        show(&mut output, "Connection closed.").await?;
                        break;
                    }
                },

                typed = input.recv() => {
                    let Some(typed) = typed else {
                        break;
                    };
                    let message = typed.trim();
                    if message.is_empty() {
                        continue;
                    }

                    send_line(&mut outgoing, message).await?;
                    let formatted = format!("Client: {}", message);
                    show(&mut output, &formatted).await?;
                    transcript.append(formatted);

                    if is_exit_sentinel(message) {
                        said_goodbye = true;
                        break;
                    }
                },
            }
        }

        if !said_goodbye {
            if let Err(e) = send_line(&mut outgoing, EXIT_SENTINEL).await {
                debug!("Could not say goodbye to server: {}", e);
            }
        }
        if let Err(e) = outgoing.shutdown().await {
            debug!("Error closing socket: {}", e);
        }

        let saved = match guard.finish() {
            Ok(saved) => saved,
            Err(e) => {
                show(&mut output, &format!("Failed to save conversation: {}", e)).await?;
                return Ok(None);
            }
        };
        if let Some(path) = &saved {
            show(&mut output, &format!("Conversation saved to: {}", path.display())).await?;
        }

        Ok(saved)
    }
}

async fn send_line(writer: &mut OwnedWriteHalf, line: &str) -> io::Result<()> {
    writer.write_all(format!("{}\n", line).as_bytes()).await?;
    writer.flush().await
}

async fn show<O: AsyncWrite + Unpin>(output: &mut O, line: &str) -> io::Result<()> {
    output.write_all(format!("{}\n", line).as_bytes()).await?;
    output.flush().await
}
