//! Server errors.

use std::net::SocketAddr;

pub type Result<T> = std::result::Result<T, ServerError>;

/// Probe server error type.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}
