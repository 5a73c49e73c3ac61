//! Client configuration.

use crate::socket::ReconnectPolicy;
use std::time::Duration;

/// How long an outgoing call rings before it is cancelled as unanswered.
const DEFAULT_RING_TIMEOUT: Duration = Duration::from_secs(45);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay websocket endpoint, e.g. `wss://chat.example/ws`.
    pub server_url: String,
    pub username: String,
    pub password: String,
    pub ring_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl ClientConfig {
    pub fn new(
        server_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            username: username.into(),
            password: password.into(),
            ring_timeout: DEFAULT_RING_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
        }
    }
}
