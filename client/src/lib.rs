//! # Chat Relay Client Library
//!
//! Terminal peer for the chat relay server. It connects over TCP, shows
//! every line the server broadcasts, forwards whatever the user types, and
//! keeps its own transcript of the conversation which is written to
//! `logs/client_chat_<timestamp>.txt` when the session ends.
//!
//! ## Session Lifecycle
//!
//! - Connection failure is reported as `Unable to connect to server: <reason>`
//!   and nothing else happens
//! - Typed lines are trimmed; blank lines are ignored; each sent line is
//!   shown and recorded as `Client: <text>`
//! - Typing `EXIT` (any case) ends the session; so does the end of input, in
//!   which case `EXIT` is sent on the user's behalf
//! - If the server goes away the session ends as well
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::connect("127.0.0.1:5000", "logs").await?;
//!
//!     let (tx, rx) = mpsc::channel(16);
//!     tx.send("hello everyone".to_string()).await?;
//!     tx.send("EXIT".to_string()).await?;
//!
//!     client.run(rx, tokio::io::stdout()).await?;
//!     Ok(())
//! }
//! ```

pub mod network;
