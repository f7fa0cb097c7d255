//! # Chat Relay Server Library
//!
//! A multi-client text chat relay. Peers connect over plain TCP and exchange
//! UTF-8, newline-terminated lines; every line a peer sends is fanned out to
//! every connected peer as `User <id>: <line>`, and the whole conversation is
//! written to a transcript file when the server stops.
//!
//! ## Architecture
//!
//! ### One Task Per Peer
//! The supervisor (`network::Server`) accepts connections and spawns an
//! independent `session::ClientSession` task for each. A session only ever
//! blocks itself: reads suspend its own task, and writes go through a bounded
//! per-connection queue with a send timeout, so one slow peer cannot stall
//! delivery to the others.
//!
//! ### Shared State
//! The client registry and the transcript store are the only state that
//! crosses session boundaries. Both are created by the supervisor and reach
//! sessions through the broadcast router, never as globals.
//!
//! ### Ordering
//! Appending to the transcript and fanning a message out happen as a single
//! critical section, so every peer receives messages in transcript order.
//!
//! ## Module Organization
//!
//! - `connection`: line-oriented duplex wrapper around one socket
//! - `registry`: concurrency-safe set of live connections
//! - `broadcast`: append-then-fan-out router with per-recipient isolation
//! - `session`: per-peer state machine (join, relay, leave, close)
//! - `network`: listener, accept loop and the guaranteed transcript flush
//! - `error`: failures that end the supervisor
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind(ServerConfig::default()).await?;
//!
//!     // Runs until Ctrl+C, then writes logs/server_chat_<timestamp>.txt
//!     server
//!         .run(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Wire Protocol
//!
//! - Reads tolerate `\n` and `\r\n`; writes always use `\n`
//! - A new peer receives the join notice, then a private welcome line
//! - Sending `EXIT` (any case) ends the session; it is never relayed
//! - Idle connections are never timed out

pub mod broadcast;
pub mod connection;
pub mod error;
pub mod network;
pub mod registry;
pub mod session;

#[cfg(test)]
mod test_support;
