//! Top-level client errors.

use crate::socket::SocketError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Socket error: {0}")]
    Socket(#[from] SocketError),

    /// The relay refused the credentials. Never retried automatically.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// The first connection never got as far as a successful login, so there
    /// is nothing to reconnect to.
    #[error("Could not establish a connection")]
    ConnectionFailed,

    /// The reconnect bound was exhausted after a working session dropped.
    #[error("Connection lost and could not be re-established")]
    ConnectionLost,
}
