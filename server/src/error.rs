//! Errors that end the server supervisor
//!
//! Per-connection failures never show up here; they are contained in the
//! owning session and surface only as a leave notice.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to accept connection: {0}")]
    Accept(#[source] std::io::Error),
    #[error("failed to read local address: {0}")]
    LocalAddr(#[source] std::io::Error),
}

impl ServerError {
    pub(crate) fn bind(addr: impl Into<String>, source: std::io::Error) -> Self {
        ServerError::Bind {
            addr: addr.into(),
            source,
        }
    }
}

