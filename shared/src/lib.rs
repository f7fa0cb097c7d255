use std::fmt;

pub mod transcript;

pub use transcript::{FlushGuard, TranscriptError, TranscriptStore};

pub const DEFAULT_PORT: u16 = 5000;
pub const EXIT_SENTINEL: &str = "EXIT";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const SERVER_TRANSCRIPT_PREFIX: &str = "server_chat";
pub const CLIENT_TRANSCRIPT_PREFIX: &str = "client_chat";

/// Session identifier handed out by the server, starting at 1.
pub type SessionId = u32;

/// Every line the server produces on the wire.
///
/// `Joined`, `Left` and `Chat` are broadcast and recorded in the transcript;
/// `Welcome` is only ever sent privately to the peer that just joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatMessage {
    Joined { id: SessionId },
    Left { id: SessionId },
    Chat { id: SessionId, text: String },
    Welcome { id: SessionId },
}

impl fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatMessage::Joined { id } => write!(f, "User {} joined the chat.", id),
            ChatMessage::Left { id } => write!(f, "User {} left the chat.", id),
            ChatMessage::Chat { id, text } => write!(f, "User {}: {}", id, text),
            ChatMessage::Welcome { id } => write!(
                f,
                "Connected as User {}. Type messages to chat. Send {} to quit.",
                id, EXIT_SENTINEL
            ),
        }
    }
}

/// Returns true if the peer asked to end its session
///
/// Surrounding whitespace is ignored and the comparison is case-insensitive,
/// so `exit`, ` Exit ` and `EXIT` all qualify.
pub fn is_exit_sentinel(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case(EXIT_SENTINEL)
}
