use std::{io, net::SocketAddr};

use mio::Token;

pub type Result<T> = std::result::Result<T, NetworkError>;

/// Errors surfaced by the event loop and its boundary operations.
///
/// Per-connection failures never escape the loop as values of this type; they are
/// logged and resolved by closing the affected connection. Only setup failures and
/// failures of the readiness primitive itself are returned to callers.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),

    #[error("Accept Error: {0}")]
    Accept(io::Error),

    #[error("Token {0:?} is already registered")]
    DuplicateRegistration(Token),

    #[error("Max connections reached, rejecting {0}")]
    MaxConnectionsReached(SocketAddr),

    #[error("Configuration Error: {0}")]
    Configuration(String),

    #[error("Event loop failed to start: {0}")]
    StartupFailed(String),

    #[error("EventLoop is gone")]
    EventLoopGone,
}
