//! Error types shared by the server, the dispatcher and the client.

use thiserror::Error;

use crate::handler::HandlerError;
use crate::server::protocol::ProtocolError;

#[derive(Debug, Error)]
pub enum RpcError {
    /// Malformed stream. Fatal to the connection, never to the server.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// One request failed inside the handler. Fatal to that request only.
    #[error("handler error: {0}")]
    Handler(#[from] HandlerError),

    /// Read or write on the socket failed.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// A session task ended abnormally while the server was draining.
    #[error("shutdown error: {0}")]
    Shutdown(String),
}

pub type Result<T> = std::result::Result<T, RpcError>;
