//! Signaling transport: the persistent relay connection and its
//! reconnection policy.

mod error;
mod reconnect;
mod websocket;

pub use error::{Result, SocketError};
pub use reconnect::ReconnectPolicy;
pub use websocket::SignalingSocket;
